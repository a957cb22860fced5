//! Plugin configuration.

use serde::{Deserialize, Serialize};

use crate::PluginError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginConfig {
    pub name: String,
    /// `grpc` or `wasm`.
    #[serde(rename = "type")]
    pub plugin_type: String,
    /// `deny`, `route` (default) or `mutate`.
    pub stage: String,
    /// Names of same-stage plugins that must run after this one.
    pub before: Vec<String>,
    /// Names of same-stage plugins that must run before this one.
    pub after: Vec<String>,
    pub grpc: Option<GrpcPluginConfig>,
    pub wasm: Option<WasmPluginConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GrpcPluginConfig {
    pub address: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WasmPluginConfig {
    pub path: String,
}

/// Validate a plugin list: unique non-empty names, known stages, and a
/// transport section matching the type.
pub fn validate_plugin_configs(cfgs: &[PluginConfig]) -> Result<(), PluginError> {
    let mut seen = std::collections::HashSet::new();
    for (i, p) in cfgs.iter().enumerate() {
        if p.name.is_empty() {
            return Err(invalid(format!("plugins[{i}].name must not be empty")));
        }
        if !seen.insert(p.name.clone()) {
            return Err(invalid(format!("plugins[{i}].name must be unique")));
        }
        if !p.stage.is_empty() {
            let stage = p.stage.to_ascii_lowercase();
            if stage != "deny" && stage != "route" && stage != "mutate" {
                return Err(invalid(format!(
                    "plugins[{i}].stage must be one of: deny, route, mutate"
                )));
            }
        }
        match p.plugin_type.to_ascii_lowercase().as_str() {
            "grpc" => {
                if p.grpc.as_ref().map(|g| g.address.as_str()).unwrap_or("").is_empty() {
                    return Err(invalid(format!(
                        "plugins[{i}].grpc.address must not be empty"
                    )));
                }
            }
            "wasm" => {
                if p.wasm.as_ref().map(|w| w.path.as_str()).unwrap_or("").is_empty() {
                    return Err(invalid(format!("plugins[{i}].wasm.path must not be empty")));
                }
            }
            _ => {
                return Err(invalid(format!(
                    "plugins[{i}].type must be one of: grpc, wasm"
                )));
            }
        }
    }
    Ok(())
}

fn invalid(msg: String) -> PluginError {
    PluginError::InvalidConfig(msg)
}
