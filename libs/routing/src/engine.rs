//! The static routing engine.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::filters::apply_filters;
use crate::matcher::{canonical_host, hostname_matches};
use crate::normalize;
use crate::sort::{apply_sort, numeric_value};
use crate::types::{
    Backend, Config, Decision, DiscoveryResolver, Engine, Fallback, Filter, Pool, Request,
    SortKey,
};
use crate::RouteError;

/// Routing engine over an immutable config snapshot.
///
/// `decide` is safe for unbounded parallel callers: per-route and
/// default round-robin counters are atomic and the shared RNG is drawn
/// under a short critical section.
pub struct StaticEngine {
    cfg: Config,
    rr: Vec<AtomicU64>,
    rr_default: AtomicU64,
    rng: Mutex<StdRng>,
    discovery: Option<Arc<dyn DiscoveryResolver>>,
}

impl StaticEngine {
    pub fn new(cfg: Config) -> Self {
        let rr = (0..cfg.routes.len()).map(|_| AtomicU64::new(0)).collect();
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default();
        StaticEngine {
            cfg,
            rr,
            rr_default: AtomicU64::new(0),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            discovery: None,
        }
    }

    /// Install the discovery resolver consulted by pools that reference
    /// a provider.
    pub fn set_discovery(&mut self, resolver: Arc<dyn DiscoveryResolver>) {
        self.discovery = Some(resolver);
    }

    async fn decide_pool(
        &self,
        req: &Request,
        pool: &Pool,
        rr: &AtomicU64,
        matched: bool,
        route_index: i32,
    ) -> Result<Decision, RouteError> {
        let candidates = self.resolve_candidates(pool).await?;
        let (candidates, idx) = self.select_candidates(req, pool, candidates, rr)?;
        let backend = if idx >= 0 && (idx as usize) < candidates.len() {
            candidates[idx as usize].clone()
        } else {
            Backend::default()
        };
        Ok(Decision {
            matched,
            route_index,
            strategy: normalize(&pool.strategy),
            candidates,
            selected_index: idx,
            backend,
        })
    }

    /// Build the candidate set for a pool: static backends merged with
    /// discovered ones per the pool's discovery mode, deduplicated by
    /// `(host, port)` with first-seen winning.
    async fn resolve_candidates(&self, pool: &Pool) -> Result<Vec<Backend>, RouteError> {
        let strategy = normalize(&pool.strategy);

        let Some(discovery) = &pool.discovery else {
            if pool.backends.is_empty() {
                return Err(RouteError::NoBackends);
            }
            return Ok(pool.backends.clone());
        };

        let resolver = self.discovery.as_ref().ok_or(RouteError::DiscoveryNotSet)?;

        let provider = discovery.provider.trim();
        let discovered = resolver
            .resolve(provider)
            .await
            .map_err(RouteError::Discovery)?;

        let mode = normalize(&discovery.mode);
        let mode = if mode.is_empty() { "union".into() } else { mode };
        let merged = match mode.as_str() {
            "prefer" => {
                if discovered.is_empty() {
                    pool.backends.clone()
                } else {
                    discovered
                }
            }
            "union" => {
                let mut merged = discovered;
                merged.extend(pool.backends.iter().cloned());
                merged
            }
            _ => return Err(RouteError::InvalidDiscoveryMode(discovery.mode.clone())),
        };

        let mut merged = dedupe_backends(merged);
        if strategy == "weighted" {
            for b in &mut merged {
                if b.weight == 0 {
                    b.weight = 1;
                }
            }
        }
        if merged.is_empty() {
            return Err(RouteError::NoBackends);
        }
        Ok(merged)
    }

    /// Run selection with the pool's base config, walking the fallback
    /// chain on `NoBackends`. Any other error aborts the decision.
    fn select_candidates(
        &self,
        req: &Request,
        pool: &Pool,
        backends: Vec<Backend>,
        rr: &AtomicU64,
    ) -> Result<(Vec<Backend>, i32), RouteError> {
        if backends.is_empty() {
            return Err(RouteError::NoBackends);
        }
        let base = SelectionConfig::from_pool(pool);
        match self.select_with_config(req, &base, &backends, rr) {
            Ok(out) => return Ok(out),
            Err(RouteError::NoBackends) => {}
            Err(e) => return Err(e),
        }
        for fb in &pool.fallback {
            let mut cfg = base.clone();
            cfg.merge_fallback(fb);
            match self.select_with_config(req, &cfg, &backends, rr) {
                Ok(out) => return Ok(out),
                Err(RouteError::NoBackends) => {}
                Err(e) => return Err(e),
            }
        }
        Err(RouteError::NoBackends)
    }

    fn select_with_config(
        &self,
        req: &Request,
        cfg: &SelectionConfig,
        backends: &[Backend],
        rr: &AtomicU64,
    ) -> Result<(Vec<Backend>, i32), RouteError> {
        let mut filtered = apply_filters(req, backends, &cfg.filters);
        if filtered.is_empty() {
            return Err(RouteError::NoBackends);
        }
        apply_sort(&mut filtered, &cfg.sort);
        if cfg.limit > 0 && filtered.len() > cfg.limit {
            filtered.truncate(cfg.limit);
        }
        let idx = self.select_index(cfg, &filtered, rr)?;
        Ok((filtered, idx))
    }

    fn select_index(
        &self,
        cfg: &SelectionConfig,
        backends: &[Backend],
        rr: &AtomicU64,
    ) -> Result<i32, RouteError> {
        if backends.is_empty() {
            return Err(RouteError::NoBackends);
        }
        match cfg.strategy.as_str() {
            "round_robin" => {
                let v = rr.fetch_add(1, Ordering::Relaxed);
                Ok((v % backends.len() as u64) as i32)
            }
            "random" => {
                let mut rng = self.rng.lock().expect("rng lock");
                Ok(rng.gen_range(0..backends.len()) as i32)
            }
            "weighted" => {
                let total: u64 = backends.iter().map(|b| u64::from(b.weight.max(1))).sum();
                if total == 0 {
                    return Err(RouteError::InvalidWeightedPool);
                }
                let r = {
                    let mut rng = self.rng.lock().expect("rng lock");
                    rng.gen_range(0..total)
                };
                let mut acc = 0u64;
                for (i, b) in backends.iter().enumerate() {
                    acc += u64::from(b.weight.max(1));
                    if r < acc {
                        return Ok(i as i32);
                    }
                }
                Ok(backends.len() as i32 - 1)
            }
            "least_loaded" => {
                let key = cfg.key.trim();
                if key.is_empty() {
                    return Err(RouteError::MissingStrategyKey("least_loaded"));
                }
                let mut best_idx: i32 = -1;
                let mut best = f64::INFINITY;
                for (i, b) in backends.iter().enumerate() {
                    let Some(n) = numeric_value(b, key) else {
                        continue;
                    };
                    if n < best {
                        best = n;
                        best_idx = i as i32;
                    }
                }
                Ok(if best_idx >= 0 { best_idx } else { 0 })
            }
            "p2c" => {
                let key = cfg.key.trim();
                if key.is_empty() {
                    return Err(RouteError::MissingStrategyKey("p2c"));
                }
                let sample = if cfg.sample == 0 { 2 } else { cfg.sample };
                let sample = sample.min(backends.len());
                let mut chosen = HashSet::new();
                let mut best_idx: i32 = -1;
                let mut best = f64::INFINITY;
                while chosen.len() < sample {
                    let idx = {
                        let mut rng = self.rng.lock().expect("rng lock");
                        rng.gen_range(0..backends.len())
                    };
                    if !chosen.insert(idx) {
                        continue;
                    }
                    let n = numeric_value(&backends[idx], key).unwrap_or(f64::INFINITY);
                    if n < best {
                        best = n;
                        best_idx = idx as i32;
                    }
                }
                Ok(if best_idx >= 0 { best_idx } else { 0 })
            }
            other => Err(RouteError::UnknownStrategy(other.to_string())),
        }
    }
}

#[async_trait]
impl Engine for StaticEngine {
    async fn decide(&self, req: &Request) -> Result<Decision, RouteError> {
        let sni = canonical_host(&req.sni);

        for (i, route) in self.cfg.routes.iter().enumerate() {
            for pattern in route.match_.patterns() {
                if hostname_matches(pattern, &sni) {
                    return self
                        .decide_pool(req, &route.pool, &self.rr[i], true, i as i32)
                        .await;
                }
            }
        }

        if let Some(default) = &self.cfg.default {
            return self
                .decide_pool(req, default, &self.rr_default, false, -1)
                .await;
        }

        Ok(Decision::default())
    }
}

/// Effective selection settings: the pool's, or a fallback merged over
/// them.
#[derive(Debug, Clone)]
struct SelectionConfig {
    strategy: String,
    key: String,
    sample: usize,
    sort: Vec<SortKey>,
    limit: usize,
    filters: Vec<Filter>,
}

impl SelectionConfig {
    fn from_pool(p: &Pool) -> Self {
        SelectionConfig {
            strategy: normalize(&p.strategy),
            key: p.key.trim().to_string(),
            sample: p.sample,
            sort: p.sort.clone(),
            limit: p.limit,
            filters: p.filters.clone(),
        }
    }

    fn merge_fallback(&mut self, fb: &Fallback) {
        if let Some(strategy) = &fb.strategy {
            self.strategy = normalize(strategy);
        }
        if let Some(key) = &fb.key {
            self.key = key.trim().to_string();
        }
        if let Some(sample) = fb.sample {
            self.sample = sample;
        }
        if let Some(limit) = fb.limit {
            self.limit = limit;
        }
        if let Some(sort) = &fb.sort {
            self.sort = sort.clone();
        }
        if let Some(filters) = &fb.filters {
            self.filters = filters.clone();
        }
    }
}

fn dedupe_backends(input: Vec<Backend>) -> Vec<Backend> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(input.len());
    for b in input {
        if seen.insert(b.target()) {
            out.push(b);
        }
    }
    out
}
