//! Candidate filters.

use chrono::Utc;

use crate::sort::numeric_value;
use crate::types::{Backend, CompareOp, Filter, Request, WhitelistSubject};

/// Apply AND-composed filters, preserving input order.
pub(crate) fn apply_filters(req: &Request, backends: &[Backend], filters: &[Filter]) -> Vec<Backend> {
    if filters.is_empty() {
        return backends.to_vec();
    }
    backends
        .iter()
        .filter(|b| filters.iter().all(|f| filter_matches(req, b, f)))
        .cloned()
        .collect()
}

fn filter_matches(req: &Request, b: &Backend, f: &Filter) -> bool {
    match f {
        Filter::Compare { left, op, right } => {
            let (Some(ln), Some(rn)) = (numeric_value(b, left), numeric_value(b, right)) else {
                return false;
            };
            match op {
                CompareOp::Lt => ln < rn,
                CompareOp::Lte => ln <= rn,
                CompareOp::Gt => ln > rn,
                CompareOp::Gte => ln >= rn,
                CompareOp::Eq => ln == rn,
                CompareOp::Neq => ln != rn,
            }
        }
        Filter::Whitelist {
            enabled_key,
            list_key,
            subject,
        } => {
            let enabled_key = enabled_key.trim();
            if enabled_key.is_empty() {
                return false;
            }
            let v = meta_get(b, enabled_key).trim().to_ascii_lowercase();
            let enabled = v == "true" || v == "1" || v == "yes";
            if !enabled {
                return true;
            }
            let list_key = list_key.trim();
            if list_key.is_empty() {
                return false;
            }
            let raw = meta_get(b, list_key);
            let raw = raw.trim();
            if raw.is_empty() {
                return false;
            }
            let want = match subject {
                WhitelistSubject::Uuid => req.uuid.trim(),
                WhitelistSubject::Username => req.username.trim(),
            };
            if want.is_empty() {
                return false;
            }
            list_contains(raw, want)
        }
        Filter::GameStartNotPast { key } => {
            let key = key.trim();
            if key.is_empty() {
                return false;
            }
            let raw = meta_get(b, key);
            let raw = raw.trim();
            if raw.is_empty() {
                return true;
            }
            let Ok(n) = raw.parse::<i64>() else {
                return false;
            };
            if n == -1 {
                return true;
            }
            let now_ms = Utc::now().timestamp_millis();
            // Values below 10^10 are second-resolution timestamps.
            let value_ms = if n > 0 && n < 10_000_000_000 {
                n * 1000
            } else {
                n
            };
            value_ms > now_ms
        }
    }
}

/// Membership test against a JSON string array (when the value starts
/// with `[`) or a comma-separated list.
fn list_contains(raw: &str, want: &str) -> bool {
    let raw = raw.trim();
    if raw.is_empty() {
        return false;
    }
    if raw.starts_with('[') {
        let Ok(xs) = serde_json::from_str::<Vec<String>>(raw) else {
            return false;
        };
        return xs.iter().any(|x| x == want);
    }
    raw.split(',').any(|p| p.trim() == want)
}

fn meta_get<'a>(b: &'a Backend, key: &str) -> &'a str {
    b.meta.get(key).map(String::as_str).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(meta: &[(&str, &str)]) -> Backend {
        Backend {
            host: "h".into(),
            port: 1,
            weight: 0,
            meta: meta
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    fn req(uuid: &str, username: &str) -> Request {
        Request {
            uuid: uuid.into(),
            username: username.into(),
            ..Request::default()
        }
    }

    #[test]
    fn compare_keeps_backends_with_headroom() {
        let full = backend(&[
            ("counter.players.count", "10"),
            ("counter.players.capacity", "10"),
        ]);
        let open = backend(&[
            ("counter.players.count", "3"),
            ("counter.players.capacity", "10"),
        ]);
        let f = Filter::Compare {
            left: "counter:players.count".into(),
            op: CompareOp::Lt,
            right: "counter:players.capacity".into(),
        };
        assert!(!filter_matches(&Request::default(), &full, &f));
        assert!(filter_matches(&Request::default(), &open, &f));
    }

    #[test]
    fn compare_rejects_missing_values() {
        let b = backend(&[("counter.players.count", "3")]);
        let f = Filter::Compare {
            left: "counter:players.count".into(),
            op: CompareOp::Lt,
            right: "counter:players.capacity".into(),
        };
        assert!(!filter_matches(&Request::default(), &b, &f));
    }

    #[test]
    fn compare_operators() {
        let b = backend(&[("a", "2"), ("b", "3")]);
        let case = |op| Filter::Compare {
            left: "a".into(),
            op,
            right: "b".into(),
        };
        assert!(filter_matches(&Request::default(), &b, &case(CompareOp::Lt)));
        assert!(filter_matches(&Request::default(), &b, &case(CompareOp::Lte)));
        assert!(!filter_matches(&Request::default(), &b, &case(CompareOp::Gt)));
        assert!(!filter_matches(&Request::default(), &b, &case(CompareOp::Gte)));
        assert!(!filter_matches(&Request::default(), &b, &case(CompareOp::Eq)));
        assert!(filter_matches(&Request::default(), &b, &case(CompareOp::Neq)));
    }

    #[test]
    fn whitelist_disabled_passes_everyone() {
        let b = backend(&[("wl.enabled", "false")]);
        let f = Filter::Whitelist {
            enabled_key: "wl.enabled".into(),
            list_key: "wl.list".into(),
            subject: WhitelistSubject::Uuid,
        };
        assert!(filter_matches(&req("u-1", ""), &b, &f));
    }

    #[test]
    fn whitelist_comma_list() {
        let b = backend(&[("wl.enabled", "true"), ("wl.list", "u-1, u-2 ,u-3")]);
        let f = Filter::Whitelist {
            enabled_key: "wl.enabled".into(),
            list_key: "wl.list".into(),
            subject: WhitelistSubject::Uuid,
        };
        assert!(filter_matches(&req("u-2", ""), &b, &f));
        assert!(!filter_matches(&req("u-9", ""), &b, &f));
    }

    #[test]
    fn whitelist_json_array_and_username_subject() {
        let b = backend(&[("wl.enabled", "YES"), ("wl.list", r#"["alice","bob"]"#)]);
        let f = Filter::Whitelist {
            enabled_key: "wl.enabled".into(),
            list_key: "wl.list".into(),
            subject: WhitelistSubject::Username,
        };
        assert!(filter_matches(&req("", "bob"), &b, &f));
        assert!(!filter_matches(&req("", "carol"), &b, &f));
        // Empty subject can never be whitelisted.
        assert!(!filter_matches(&req("", ""), &b, &f));
    }

    #[test]
    fn whitelist_malformed_json_rejects() {
        let b = backend(&[("wl.enabled", "true"), ("wl.list", "[not json")]);
        let f = Filter::Whitelist {
            enabled_key: "wl.enabled".into(),
            list_key: "wl.list".into(),
            subject: WhitelistSubject::Uuid,
        };
        assert!(!filter_matches(&req("u-1", ""), &b, &f));
    }

    #[test]
    fn game_start_not_past() {
        let f = Filter::GameStartNotPast {
            key: "annotation.game-start".into(),
        };
        // Absent value passes.
        assert!(filter_matches(&Request::default(), &backend(&[]), &f));
        // Sentinel -1 passes.
        assert!(filter_matches(
            &Request::default(),
            &backend(&[("annotation.game-start", "-1")]),
            &f
        ));
        // Unparseable rejects.
        assert!(!filter_matches(
            &Request::default(),
            &backend(&[("annotation.game-start", "soon")]),
            &f
        ));
        // A timestamp in the past rejects (seconds resolution).
        assert!(!filter_matches(
            &Request::default(),
            &backend(&[("annotation.game-start", "1000000000")]),
            &f
        ));
        // A timestamp far in the future passes (milliseconds).
        assert!(filter_matches(
            &Request::default(),
            &backend(&[("annotation.game-start", "99999999999999")]),
            &f
        ));
    }

    #[test]
    fn filters_are_and_composed() {
        let a = backend(&[("a", "1"), ("b", "2")]);
        let b = backend(&[("a", "3"), ("b", "2")]);
        let filters = vec![
            Filter::Compare {
                left: "a".into(),
                op: CompareOp::Lt,
                right: "b".into(),
            },
            Filter::GameStartNotPast { key: "start".into() },
        ];
        let out = apply_filters(&Request::default(), &[a.clone(), b], &filters);
        assert_eq!(out, vec![a]);
    }
}
