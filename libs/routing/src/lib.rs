//! Routing engine for the connection router.
//!
//! A [`Config`] maps canonical SNI hostnames to backend [`Pool`]s. For a
//! given request the engine resolves the pool's candidate set (static
//! backends merged with discovered ones), applies filters, sorting and a
//! limit, then picks one backend with the pool's selection strategy.
//! Fallback chains re-run the selection with partial config overrides
//! when the filtered set comes up empty.
//!
//! [`StaticEngine`] is safe for unbounded concurrent `decide` calls:
//! round-robin counters are atomic and the shared RNG is drawn under a
//! short mutex.

mod engine;
mod error;
mod filters;
mod matcher;
mod sort;
mod types;
mod validate;

pub use engine::StaticEngine;
pub use error::RouteError;
pub use matcher::{canonical_host, hostname_matches};
pub use types::{
    Backend, CompareOp, Config, Decision, DiscoveryResolver, Engine, Fallback, Filter, Match,
    Pool, PoolDiscovery, Request, Route, SortKey, SortOrder, SortValueType, Target,
    WhitelistSubject,
};

/// Normalize a strategy-like identifier: trim, lowercase, `-` to `_`.
pub(crate) fn normalize(s: &str) -> String {
    s.trim().to_ascii_lowercase().replace('-', "_")
}
