//! Routing error taxonomy.

use thiserror::Error;

/// Distinguishable routing failures.
///
/// `NoBackends` is the only kind the fallback chain retries on; every
/// other kind aborts the decision.
#[derive(Debug, Error)]
pub enum RouteError {
    /// The candidate set is empty after resolution or filtering.
    #[error("no backends")]
    NoBackends,

    /// The pool names a selection strategy the engine does not know.
    #[error("unknown strategy {0:?}")]
    UnknownStrategy(String),

    /// A weighted pool resolved to a non-positive total weight.
    #[error("invalid weighted pool")]
    InvalidWeightedPool,

    /// The discovery resolver failed; wraps the provider error.
    #[error("discovery error: {0}")]
    Discovery(Box<dyn std::error::Error + Send + Sync>),

    /// The pool references discovery but no resolver is installed.
    #[error("discovery resolver not set")]
    DiscoveryNotSet,

    /// The pool's discovery mode is neither `union` nor `prefer`.
    #[error("invalid discovery mode {0:?}")]
    InvalidDiscoveryMode(String),

    /// A strategy that ranks by key was configured without one.
    #[error("key must not be empty for strategy {0}")]
    MissingStrategyKey(&'static str),

    /// Configuration validation failure.
    #[error("{0}")]
    InvalidConfig(String),
}

impl RouteError {
    /// True for the discovery family of failures, which the connection
    /// handler maps to a dedicated disconnect message.
    pub fn is_discovery(&self) -> bool {
        matches!(
            self,
            RouteError::Discovery(_)
                | RouteError::DiscoveryNotSet
                | RouteError::InvalidDiscoveryMode(_)
        )
    }
}
