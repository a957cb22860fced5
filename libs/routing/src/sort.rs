//! Stable multi-key candidate sorting and the shared meta accessor.

use std::cmp::Ordering;

use crate::types::{Backend, SortKey, SortOrder, SortValueType};

/// A resolved sort value: text or parsed number, per the key's hint.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum MetaValue {
    Text(String),
    Number(f64),
}

impl MetaValue {
    pub(crate) fn as_number(&self) -> Option<f64> {
        match self {
            MetaValue::Number(n) => Some(*n),
            MetaValue::Text(_) => None,
        }
    }
}

/// Resolve a sort key against a backend.
///
/// Key syntax: `host`, `port`, `weight`, `label:NAME`, `annotation:NAME`,
/// `counter:PATH`, otherwise a literal meta key. Missing values and
/// unparseable numbers resolve to `None`.
pub(crate) fn sort_value(b: &Backend, key: &str, number: bool) -> Option<MetaValue> {
    let key = key.trim();
    if key.is_empty() {
        return None;
    }

    if number {
        if key == "port" {
            return Some(MetaValue::Number(f64::from(b.port)));
        }
        if key == "weight" {
            return Some(MetaValue::Number(f64::from(b.weight)));
        }
    }

    let raw = match key {
        "host" => b.host.clone(),
        "port" => b.port.to_string(),
        "weight" => b.weight.to_string(),
        _ => {
            let meta_key = if let Some(name) = key.strip_prefix("label:") {
                format!("label.{}", name.trim())
            } else if let Some(name) = key.strip_prefix("annotation:") {
                format!("annotation.{}", name.trim())
            } else if let Some(path) = key.strip_prefix("counter:") {
                format!("counter.{}", path.trim())
            } else {
                key.to_string()
            };
            b.meta.get(&meta_key).cloned().unwrap_or_default()
        }
    };

    if raw.is_empty() {
        return None;
    }
    if number {
        return raw.parse::<f64>().ok().map(MetaValue::Number);
    }
    Some(MetaValue::Text(raw))
}

/// Numeric accessor used by compare filters and ranking strategies.
pub(crate) fn numeric_value(b: &Backend, key: &str) -> Option<f64> {
    sort_value(b, key, true).and_then(|v| v.as_number())
}

/// Stable multi-key sort. Backends with a present value always precede
/// those without, regardless of the key's order.
pub(crate) fn apply_sort(backends: &mut [Backend], keys: &[SortKey]) {
    if keys.is_empty() {
        return;
    }
    backends.sort_by(|a, b| {
        for k in keys {
            let number = k.value_type == SortValueType::Number;
            let av = sort_value(a, &k.key, number);
            let bv = sort_value(b, &k.key, number);
            let ord = match (av, bv) {
                (Some(_), None) => return Ordering::Less,
                (None, Some(_)) => return Ordering::Greater,
                (None, None) => continue,
                (Some(MetaValue::Number(x)), Some(MetaValue::Number(y))) => {
                    x.partial_cmp(&y).unwrap_or(Ordering::Equal)
                }
                (Some(MetaValue::Text(x)), Some(MetaValue::Text(y))) => x.cmp(&y),
                _ => Ordering::Equal,
            };
            let ord = match k.order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn backend(host: &str, meta: &[(&str, &str)]) -> Backend {
        Backend {
            host: host.into(),
            port: 1,
            weight: 0,
            meta: meta
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    fn sort_key(key: &str, order: SortOrder, value_type: SortValueType) -> SortKey {
        SortKey {
            key: key.into(),
            order,
            value_type,
        }
    }

    #[test]
    fn resolves_key_syntax() {
        let b = Backend {
            host: "h".into(),
            port: 25565,
            weight: 3,
            meta: HashMap::from([
                ("label.region".to_string(), "eu".to_string()),
                ("annotation.zone".to_string(), "a".to_string()),
                ("counter.players.count".to_string(), "7".to_string()),
                ("raw".to_string(), "x".to_string()),
            ]),
        };
        assert_eq!(
            sort_value(&b, "host", false),
            Some(MetaValue::Text("h".into()))
        );
        assert_eq!(
            sort_value(&b, "port", true),
            Some(MetaValue::Number(25565.0))
        );
        assert_eq!(sort_value(&b, "weight", true), Some(MetaValue::Number(3.0)));
        assert_eq!(
            sort_value(&b, "label:region", false),
            Some(MetaValue::Text("eu".into()))
        );
        assert_eq!(
            sort_value(&b, "annotation:zone", false),
            Some(MetaValue::Text("a".into()))
        );
        assert_eq!(
            sort_value(&b, "counter:players.count", true),
            Some(MetaValue::Number(7.0))
        );
        assert_eq!(
            sort_value(&b, "raw", false),
            Some(MetaValue::Text("x".into()))
        );
        assert_eq!(sort_value(&b, "missing", false), None);
        assert_eq!(sort_value(&b, "", false), None);
    }

    #[test]
    fn unparseable_number_is_missing() {
        let b = backend("h", &[("counter.players.count", "lots")]);
        assert_eq!(sort_value(&b, "counter:players.count", true), None);
    }

    #[test]
    fn empty_sort_preserves_order() {
        let mut backends = vec![backend("c", &[]), backend("a", &[]), backend("b", &[])];
        apply_sort(&mut backends, &[]);
        let hosts: Vec<_> = backends.iter().map(|b| b.host.as_str()).collect();
        assert_eq!(hosts, ["c", "a", "b"]);
    }

    #[test]
    fn sorts_by_string_key() {
        let mut backends = vec![
            backend("x", &[("region", "b")]),
            backend("y", &[("region", "a")]),
            backend("z", &[("region", "c")]),
        ];
        apply_sort(
            &mut backends,
            &[sort_key("region", SortOrder::Asc, SortValueType::String)],
        );
        let hosts: Vec<_> = backends.iter().map(|b| b.host.as_str()).collect();
        assert_eq!(hosts, ["y", "x", "z"]);
    }

    #[test]
    fn sorts_by_number_desc() {
        let mut backends = vec![
            backend("x", &[("counter.players.count", "2")]),
            backend("y", &[("counter.players.count", "10")]),
            backend("z", &[("counter.players.count", "5")]),
        ];
        apply_sort(
            &mut backends,
            &[sort_key(
                "counter:players.count",
                SortOrder::Desc,
                SortValueType::Number,
            )],
        );
        let hosts: Vec<_> = backends.iter().map(|b| b.host.as_str()).collect();
        assert_eq!(hosts, ["y", "z", "x"]);
    }

    #[test]
    fn present_before_absent_regardless_of_order() {
        for order in [SortOrder::Asc, SortOrder::Desc] {
            let mut backends = vec![
                backend("missing", &[]),
                backend("present", &[("k", "1")]),
            ];
            apply_sort(&mut backends, &[sort_key("k", order, SortValueType::Number)]);
            assert_eq!(backends[0].host, "present");
        }
    }

    #[test]
    fn multi_key_stable() {
        let mut backends = vec![
            backend("b1", &[("region", "eu"), ("load", "5")]),
            backend("b2", &[("region", "eu"), ("load", "2")]),
            backend("b3", &[("region", "ap"), ("load", "9")]),
        ];
        apply_sort(
            &mut backends,
            &[
                sort_key("region", SortOrder::Asc, SortValueType::String),
                sort_key("load", SortOrder::Asc, SortValueType::Number),
            ],
        );
        let hosts: Vec<_> = backends.iter().map(|b| b.host.as_str()).collect();
        assert_eq!(hosts, ["b3", "b2", "b1"]);
    }
}
