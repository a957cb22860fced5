//! A plugin that changes nothing. Useful as a pipeline placeholder and
//! in tests.

use async_trait::async_trait;

use crate::types::{ConnectRequest, ConnectResponse, Plugin};
use crate::PluginError;

pub struct NoopPlugin {
    name: String,
}

impl NoopPlugin {
    pub fn new(name: impl Into<String>) -> Self {
        NoopPlugin { name: name.into() }
    }
}

#[async_trait]
impl Plugin for NoopPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    async fn on_connect(&self, _req: ConnectRequest) -> Result<ConnectResponse, PluginError> {
        Ok(ConnectResponse::default())
    }

    async fn close(&self) -> Result<(), PluginError> {
        Ok(())
    }
}
