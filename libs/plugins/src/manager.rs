//! The plugin pipeline.

use std::time::Duration;

use hyrp_routing::Decision;
use tracing::info;

use crate::types::{ApplyResult, ConnectEvent, ConnectRequest, Plugin};
use crate::PluginError;

/// Upper bound on a single plugin call.
pub const PLUGIN_CALL_TIMEOUT: Duration = Duration::from_secs(1);

/// Runs loaded plugins in order against each Connect.
///
/// Immutable after construction; plugin-internal state is the plugin's
/// own responsibility.
pub struct Manager {
    plugins: Vec<Box<dyn Plugin>>,
}

impl Manager {
    pub fn new(plugins: Vec<Box<dyn Plugin>>) -> Self {
        Manager { plugins }
    }

    /// Apply every plugin to the seeded decision state.
    ///
    /// Timeouts and call errors are logged and skipped; the pipeline
    /// continues with unchanged state. A deny response short-circuits
    /// the remaining plugins.
    pub async fn apply_on_connect(
        &self,
        event: &ConnectEvent,
        decision: &Decision,
        referral_content: Option<Vec<u8>>,
    ) -> ApplyResult {
        let mut res = ApplyResult {
            denied: false,
            deny_reason: String::new(),
            strategy: decision.strategy.clone(),
            candidates: decision.candidates.clone(),
            selected_index: decision.selected_index,
            backend: decision.backend.clone(),
            referral_content,
        };

        for plugin in &self.plugins {
            let req = ConnectRequest {
                event: event.clone(),
                strategy: res.strategy.clone(),
                candidates: res.candidates.clone(),
                selected_index: res.selected_index,
                backend: res.backend.clone(),
                referral_content: res.referral_content.clone(),
            };

            let outcome = tokio::time::timeout(PLUGIN_CALL_TIMEOUT, plugin.on_connect(req)).await;
            let response = match outcome {
                Err(_) => {
                    info!(plugin = plugin.name(), error = %PluginError::Timeout, "plugin error");
                    continue;
                }
                Ok(Err(e)) => {
                    info!(plugin = plugin.name(), error = %e, "plugin error");
                    continue;
                }
                Ok(Ok(response)) => response,
            };

            if response.deny {
                res.denied = true;
                res.deny_reason = response.deny_reason;
                return res;
            }
            if let Some(candidates) = response.candidates {
                if !candidates.is_empty() {
                    res.candidates = candidates;
                }
            }
            if let Some(idx) = response.selected_index {
                if idx >= 0 && (idx as usize) < res.candidates.len() {
                    res.selected_index = idx;
                    res.backend = res.candidates[idx as usize].clone();
                }
            }
            if let Some(backend) = response.backend {
                res.backend = backend;
                for (i, b) in res.candidates.iter().enumerate() {
                    if b.host == res.backend.host && b.port == res.backend.port {
                        res.selected_index = i as i32;
                        break;
                    }
                }
            }
            if res.backend.host.is_empty() && !res.candidates.is_empty() {
                res.selected_index = 0;
                res.backend = res.candidates[0].clone();
            }
            if let Some(content) = response.referral_content {
                res.referral_content = Some(content);
            }
        }

        res
    }

    /// Best-effort close of every plugin.
    pub async fn close(&self) {
        for plugin in &self.plugins {
            if let Err(e) = plugin.close().await {
                info!(plugin = plugin.name(), error = %e, "plugin close failed");
            }
        }
    }
}
