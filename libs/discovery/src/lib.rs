//! Backend discovery plumbing.
//!
//! Cluster-API watchers live outside this crate; they plug in behind the
//! [`BackendSource`] capability (list the current backends of one
//! provider). Everything the router owns around that seam lives here:
//! the provider registry, read-mostly snapshot cells with serialized
//! rebuilds, allocation pacing for allocate-style providers, metadata
//! conventions and provider configuration.

mod config;
mod limiter;
mod manager;
mod meta;
mod snapshot;

pub use config::{
    AgonesAddressConfig, AgonesDiscoveryConfig, DiscoveryConfig, KubernetesDiscoveryConfig,
    KubernetesFilterConfig, KubernetesMetadataConfig, KubernetesPortConfig,
    KubernetesResourceConfig, KubernetesSelector, KubernetesServiceRef, ProviderConfig,
};
pub use limiter::AllocationLimiter;
pub use manager::{
    AllocatingProvider, BackendSource, Manager, Provider, SnapshotProvider, REBUILD_INTERVAL,
};
pub use meta::{
    apply_weight_from_meta, copy_selected_annotations, copy_selected_labels, ANNOTATION_PREFIX,
    COUNTER_PREFIX, LABEL_PREFIX, WEIGHT_KEY,
};
pub use snapshot::SnapshotCell;

use thiserror::Error;

/// Discovery failures.
#[derive(Debug, Error, Clone)]
pub enum DiscoveryError {
    /// No provider is registered under the requested name.
    #[error("unknown discovery provider {0:?}")]
    UnknownProvider(String),

    /// A provider-internal failure, attributed by name.
    #[error("discovery provider {name:?}: {message}")]
    Provider { name: String, message: String },

    /// Configuration validation failure.
    #[error("{0}")]
    InvalidConfig(String),

    /// The caller's cancellation fired while waiting for an allocation
    /// slot.
    #[error("allocation wait canceled")]
    AllocationCanceled,
}
