//! Plugin construction from configuration.

use crate::config::PluginConfig;
use crate::grpc::GrpcPlugin;
use crate::types::Plugin;
use crate::wasm::WasmPlugin;
use crate::PluginError;

/// Build every configured plugin, in the given (already ordered) order.
pub fn load_all(cfgs: &[PluginConfig]) -> Result<Vec<Box<dyn Plugin>>, PluginError> {
    let mut out: Vec<Box<dyn Plugin>> = Vec::with_capacity(cfgs.len());
    for c in cfgs {
        match c.plugin_type.to_ascii_lowercase().as_str() {
            "grpc" => {
                let address = c
                    .grpc
                    .as_ref()
                    .map(|g| g.address.as_str())
                    .unwrap_or_default();
                out.push(Box::new(GrpcPlugin::connect(&c.name, address)?));
            }
            "wasm" => {
                let path = c.wasm.as_ref().map(|w| w.path.as_str()).unwrap_or_default();
                out.push(Box::new(WasmPlugin::load(&c.name, path)?));
            }
            other => {
                return Err(PluginError::InvalidConfig(format!(
                    "unknown plugin type: {other:?}"
                )));
            }
        }
    }
    Ok(out)
}
