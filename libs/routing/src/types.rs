//! Routing data model.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::RouteError;

/// A `host:port` pair without metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    pub host: String,
    pub port: u16,
}

/// A routable backend.
///
/// `meta` carries discovery metadata under the `label.<k>`,
/// `annotation.<k>` and `counter.<name>.count|capacity` conventions.
/// Immutable once emitted from discovery.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Backend {
    pub host: String,
    pub port: u16,
    pub weight: u32,
    pub meta: HashMap<String, String>,
}

impl Backend {
    pub fn target(&self) -> Target {
        Target {
            host: self.host.clone(),
            port: self.port,
        }
    }
}

/// Selection set configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Pool {
    pub strategy: String,
    pub key: String,
    pub sample: usize,
    pub sort: Vec<SortKey>,
    pub limit: usize,
    pub filters: Vec<Filter>,
    pub fallback: Vec<Fallback>,
    pub backends: Vec<Backend>,
    pub discovery: Option<PoolDiscovery>,
}

/// Reference from a pool to a discovery provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolDiscovery {
    pub provider: String,
    /// `union` (default) or `prefer`.
    pub mode: String,
}

/// One key of a stable multi-key sort.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SortKey {
    pub key: String,
    #[serde(default)]
    pub order: SortOrder,
    #[serde(default, rename = "type")]
    pub value_type: SortValueType,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortValueType {
    #[default]
    String,
    Number,
}

/// Candidate filter. Filters are AND-composed per selection attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Filter {
    /// Keep the backend when `left op right` holds; both sides resolve
    /// through the sort-value accessor with a number hint.
    Compare {
        left: String,
        op: CompareOp,
        right: String,
    },
    /// When `meta[enabled_key]` is truthy, keep only backends whose
    /// `meta[list_key]` list contains the request subject.
    Whitelist {
        enabled_key: String,
        list_key: String,
        #[serde(default)]
        subject: WhitelistSubject,
    },
    /// Keep backends whose start timestamp under `key` lies in the
    /// future (or is absent / the `-1` sentinel).
    GameStartNotPast { key: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Lt,
    Lte,
    Gt,
    Gte,
    Eq,
    Neq,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WhitelistSubject {
    #[default]
    Uuid,
    Username,
}

/// Partial pool override tried in order when selection yields
/// `NoBackends`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Fallback {
    pub strategy: Option<String>,
    pub key: Option<String>,
    pub sample: Option<usize>,
    pub sort: Option<Vec<SortKey>>,
    pub limit: Option<usize>,
    pub filters: Option<Vec<Filter>>,
}

/// Hostname matcher for a route: a single pattern or a pattern list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Match {
    pub hostname: String,
    pub hostnames: Vec<String>,
}

impl Match {
    /// Patterns in declaration order; `hostnames` wins over `hostname`.
    pub fn patterns(&self) -> Vec<&str> {
        if !self.hostnames.is_empty() {
            return self.hostnames.iter().map(String::as_str).collect();
        }
        if !self.hostname.is_empty() {
            return vec![self.hostname.as_str()];
        }
        Vec::new()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Route {
    #[serde(rename = "match")]
    pub match_: Match,
    pub pool: Pool,
}

/// Routing configuration: ordered routes plus an optional default pool
/// used only when no route matches.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub default: Option<Pool>,
    pub routes: Vec<Route>,
}

/// Per-request routing input. Only `sni` is known at connection time;
/// the remaining fields feed whitelist filter subjects.
#[derive(Debug, Clone, Default)]
pub struct Request {
    pub sni: String,
    pub uuid: String,
    pub username: String,
    pub language: String,
}

/// Outcome of a routing decision.
///
/// Whenever a backend is chosen, `selected_index` lies in
/// `[0, candidates.len())` and `backend == candidates[selected_index]`;
/// otherwise both are sentinels (`-1`, empty backend).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decision {
    pub matched: bool,
    pub route_index: i32,
    pub strategy: String,
    pub candidates: Vec<Backend>,
    pub selected_index: i32,
    pub backend: Backend,
}

impl Default for Decision {
    fn default() -> Self {
        Decision {
            matched: false,
            route_index: -1,
            strategy: String::new(),
            candidates: Vec::new(),
            selected_index: -1,
            backend: Backend::default(),
        }
    }
}

/// A routing decision capability.
#[async_trait]
pub trait Engine: Send + Sync {
    async fn decide(&self, req: &Request) -> Result<Decision, RouteError>;
}

/// Resolves a named discovery provider to its current backend set.
///
/// Unknown providers and watcher failures surface as errors; the engine
/// wraps them in [`RouteError::Discovery`].
#[async_trait]
pub trait DiscoveryResolver: Send + Sync {
    async fn resolve(
        &self,
        provider: &str,
    ) -> Result<Vec<Backend>, Box<dyn std::error::Error + Send + Sync>>;
}
