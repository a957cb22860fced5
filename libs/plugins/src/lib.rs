//! Connect plugin pipeline.
//!
//! Plugins observe each decoded Connect packet together with the current
//! routing decision and may deny the connection, steer it to a different
//! backend, or attach referral content. The pipeline runs them in a
//! deterministic order (stage buckets, then before/after constraints),
//! bounds every call with a one-second timeout and isolates failures:
//! a broken plugin never breaks the connection.
//!
//! Two transports exist behind the [`Plugin`] capability: a gRPC unary
//! client speaking JSON over `/hyrp.Plugin/OnConnect`, and a WASM module
//! exchanging JSON through `alloc`/`on_connect` exports.

mod config;
mod grpc;
mod load;
mod manager;
mod noop;
mod order;
mod types;
mod wasm;

pub use config::{validate_plugin_configs, GrpcPluginConfig, PluginConfig, WasmPluginConfig};
pub use grpc::{GrpcPlugin, JsonCodec};
pub use load::load_all;
pub use manager::{Manager, PLUGIN_CALL_TIMEOUT};
pub use noop::NoopPlugin;
pub use order::order_plugin_configs;
pub use types::{ApplyResult, ConnectEvent, ConnectRequest, ConnectResponse, Plugin};
pub use wasm::WasmPlugin;

use thiserror::Error;

/// Plugin pipeline failures.
#[derive(Debug, Error)]
pub enum PluginError {
    /// The plugin call exceeded the pipeline timeout.
    #[error("plugin call timed out")]
    Timeout,

    /// The plugin transport returned an error.
    #[error("plugin call failed: {0}")]
    CallFailed(String),

    /// before/after constraints form a cycle within a stage.
    #[error("stage {stage:?}: cycle in before/after constraints")]
    Cycle { stage: String },

    /// A plugin could not be constructed from its configuration.
    #[error("plugin {name:?}: {message}")]
    LoadFailed { name: String, message: String },

    /// Configuration validation failure.
    #[error("{0}")]
    InvalidConfig(String),
}
