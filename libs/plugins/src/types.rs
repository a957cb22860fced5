//! Typed records crossing the plugin boundary.
//!
//! Both transports serialize these to JSON; the pipeline interior only
//! ever sees the typed forms.

use async_trait::async_trait;
use hyrp_routing::Backend;
use serde::{Deserialize, Serialize};

use crate::PluginError;

/// Read-only connection facts handed to every plugin.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectEvent {
    pub sni: String,
    pub client_cert_fingerprint: String,
    pub protocol_hash: String,
    pub client_type: u8,
    pub uuid: String,
    pub username: String,
    pub language: String,
    pub identity_token_present: bool,
}

/// Per-plugin call input: the event plus the pipeline's current state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectRequest {
    pub event: ConnectEvent,
    pub strategy: String,
    pub candidates: Vec<Backend>,
    pub selected_index: i32,
    pub backend: Backend,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referral_content: Option<Vec<u8>>,
}

/// Plugin response. Absent fields leave the pipeline state unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectResponse {
    pub deny: bool,
    pub deny_reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidates: Option<Vec<Backend>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_index: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<Backend>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referral_content: Option<Vec<u8>>,
}

/// Final pipeline state after all plugins ran (or a deny short-circuit).
///
/// Index/backend consistency matches the routing decision invariant:
/// when `selected_index >= 0`, `backend == candidates[selected_index]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplyResult {
    pub denied: bool,
    pub deny_reason: String,
    pub strategy: String,
    pub candidates: Vec<Backend>,
    pub selected_index: i32,
    pub backend: Backend,
    pub referral_content: Option<Vec<u8>>,
}

/// A loaded plugin, whatever its transport.
#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    async fn on_connect(&self, req: ConnectRequest) -> Result<ConnectResponse, PluginError>;

    /// Best-effort resource release at manager shutdown.
    async fn close(&self) -> Result<(), PluginError>;
}
