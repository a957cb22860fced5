//! Load-time validation of the routing configuration.

use crate::normalize;
use crate::types::{Backend, Config, Fallback, Pool, SortKey};
use crate::RouteError;

const STRATEGIES: [&str; 5] = ["round_robin", "random", "weighted", "least_loaded", "p2c"];

impl Config {
    pub fn validate(&self) -> Result<(), RouteError> {
        if let Some(default) = &self.default {
            validate_pool(default).map_err(|e| invalid(format!("routing.default: {e}")))?;
        }
        for (i, r) in self.routes.iter().enumerate() {
            validate_pool(&r.pool)
                .map_err(|e| invalid(format!("routing.routes[{i}].pool: {e}")))?;
            if r.match_.patterns().is_empty() {
                return Err(invalid(format!("routing.routes[{i}].match must not be empty")));
            }
        }
        Ok(())
    }
}

fn invalid(msg: String) -> RouteError {
    RouteError::InvalidConfig(msg)
}

fn validate_backend(b: &Backend) -> Result<(), String> {
    if b.host.is_empty() {
        return Err("host must not be empty".into());
    }
    if b.port == 0 {
        return Err("port must be between 1 and 65535".into());
    }
    Ok(())
}

fn validate_pool(p: &Pool) -> Result<(), String> {
    if p.backends.is_empty() && p.discovery.is_none() {
        return Err("backends must not be empty".into());
    }
    let strategy = normalize(&p.strategy);
    if strategy.is_empty() {
        return Err("strategy must not be empty".into());
    }
    if !STRATEGIES.contains(&strategy.as_str()) {
        return Err(format!("unknown strategy {:?}", p.strategy));
    }
    if (strategy == "least_loaded" || strategy == "p2c") && p.key.trim().is_empty() {
        return Err(format!("key must not be empty for strategy {:?}", p.strategy));
    }
    for (i, s) in p.sort.iter().enumerate() {
        validate_sort_key(s).map_err(|e| format!("sort[{i}].{e}"))?;
    }
    for (i, fb) in p.fallback.iter().enumerate() {
        validate_fallback(fb).map_err(|e| format!("fallback[{i}]: {e}"))?;
    }
    if let Some(discovery) = &p.discovery {
        if discovery.provider.trim().is_empty() {
            return Err("discovery.provider must not be empty".into());
        }
        let mode = normalize(&discovery.mode);
        if !mode.is_empty() && mode != "union" && mode != "prefer" {
            return Err("discovery.mode must be one of: union, prefer".into());
        }
    }
    for (i, b) in p.backends.iter().enumerate() {
        validate_backend(b).map_err(|e| format!("backends[{i}]: {e}"))?;
        if strategy == "weighted" && b.weight == 0 {
            return Err(format!("backends[{i}].weight must be > 0 for weighted strategy"));
        }
    }
    Ok(())
}

fn validate_sort_key(s: &SortKey) -> Result<(), String> {
    if s.key.trim().is_empty() {
        return Err("key must not be empty".into());
    }
    Ok(())
}

fn validate_fallback(fb: &Fallback) -> Result<(), String> {
    if let Some(strategy) = &fb.strategy {
        let normalized = normalize(strategy);
        if !STRATEGIES.contains(&normalized.as_str()) {
            return Err(format!("unknown strategy {strategy:?}"));
        }
        if (normalized == "least_loaded" || normalized == "p2c")
            && fb.key.as_deref().map(str::trim).unwrap_or("").is_empty()
        {
            return Err(format!("key must not be empty for strategy {strategy:?}"));
        }
    }
    if let Some(sort) = &fb.sort {
        for (i, s) in sort.iter().enumerate() {
            validate_sort_key(s).map_err(|e| format!("sort[{i}].{e}"))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Match, PoolDiscovery, Route};

    fn backend(host: &str, port: u16, weight: u32) -> Backend {
        Backend {
            host: host.into(),
            port,
            weight,
            ..Backend::default()
        }
    }

    fn valid_pool() -> Pool {
        Pool {
            strategy: "round_robin".into(),
            backends: vec![backend("a", 1, 0)],
            ..Pool::default()
        }
    }

    #[test]
    fn accepts_valid_config() {
        let cfg = Config {
            default: Some(valid_pool()),
            routes: vec![Route {
                match_: Match {
                    hostname: "play.example.com".into(),
                    hostnames: Vec::new(),
                },
                pool: valid_pool(),
            }],
        };
        cfg.validate().unwrap();
    }

    #[test]
    fn rejects_empty_match() {
        let cfg = Config {
            default: None,
            routes: vec![Route {
                match_: Match::default(),
                pool: valid_pool(),
            }],
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_pool_without_backends_or_discovery() {
        let cfg = Config {
            default: Some(Pool {
                strategy: "round_robin".into(),
                ..Pool::default()
            }),
            routes: Vec::new(),
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn discovery_reference_allows_empty_backends() {
        let cfg = Config {
            default: Some(Pool {
                strategy: "round_robin".into(),
                discovery: Some(PoolDiscovery {
                    provider: "k8s".into(),
                    mode: String::new(),
                }),
                ..Pool::default()
            }),
            routes: Vec::new(),
        };
        cfg.validate().unwrap();
    }

    #[test]
    fn rejects_unknown_strategy_and_missing_key() {
        let mut p = valid_pool();
        p.strategy = "fastest".into();
        assert!(Config {
            default: Some(p),
            routes: Vec::new()
        }
        .validate()
        .is_err());

        let mut p = valid_pool();
        p.strategy = "least_loaded".into();
        assert!(Config {
            default: Some(p),
            routes: Vec::new()
        }
        .validate()
        .is_err());
    }

    #[test]
    fn strategy_names_normalize_dashes_and_case() {
        let mut p = valid_pool();
        p.strategy = "Round-Robin".into();
        Config {
            default: Some(p),
            routes: Vec::new(),
        }
        .validate()
        .unwrap();
    }

    #[test]
    fn rejects_invalid_backends() {
        let mut p = valid_pool();
        p.backends = vec![backend("", 1, 0)];
        assert!(Config {
            default: Some(p),
            routes: Vec::new()
        }
        .validate()
        .is_err());

        let mut p = valid_pool();
        p.backends = vec![backend("a", 0, 0)];
        assert!(Config {
            default: Some(p),
            routes: Vec::new()
        }
        .validate()
        .is_err());
    }

    #[test]
    fn weighted_requires_positive_weights() {
        let mut p = valid_pool();
        p.strategy = "weighted".into();
        p.backends = vec![backend("a", 1, 0)];
        assert!(Config {
            default: Some(p.clone()),
            routes: Vec::new()
        }
        .validate()
        .is_err());

        p.backends = vec![backend("a", 1, 2)];
        Config {
            default: Some(p),
            routes: Vec::new(),
        }
        .validate()
        .unwrap();
    }

    #[test]
    fn rejects_bad_discovery_mode() {
        let mut p = valid_pool();
        p.discovery = Some(PoolDiscovery {
            provider: "k8s".into(),
            mode: "merge".into(),
        });
        assert!(Config {
            default: Some(p),
            routes: Vec::new()
        }
        .validate()
        .is_err());
    }

    #[test]
    fn fallback_strategy_needs_its_own_key() {
        let mut p = valid_pool();
        p.fallback = vec![Fallback {
            strategy: Some("p2c".into()),
            ..Fallback::default()
        }];
        assert!(Config {
            default: Some(p.clone()),
            routes: Vec::new()
        }
        .validate()
        .is_err());

        p.fallback = vec![Fallback {
            strategy: Some("p2c".into()),
            key: Some("load".into()),
            ..Fallback::default()
        }];
        Config {
            default: Some(p),
            routes: Vec::new(),
        }
        .validate()
        .unwrap();
    }
}
