//! Backend metadata conventions shared with the routing engine.
//!
//! Discovery publishes labels as `label.<k>`, annotations as
//! `annotation.<k>` and counters as `counter.<name>.count|capacity`.
//! A backend without an explicit weight picks one up from the
//! `hyrouter/weight` annotation or label.

use std::collections::HashMap;

use hyrp_routing::Backend;

pub const LABEL_PREFIX: &str = "label.";
pub const ANNOTATION_PREFIX: &str = "annotation.";
pub const COUNTER_PREFIX: &str = "counter.";

/// Label/annotation key carrying an explicit backend weight.
pub const WEIGHT_KEY: &str = "hyrouter/weight";

/// Copy the listed label keys into `meta` under the label prefix.
pub fn copy_selected_labels(
    meta: &mut HashMap<String, String>,
    labels: &HashMap<String, String>,
    include: &[String],
) {
    for k in include {
        if let Some(v) = labels.get(k) {
            meta.insert(format!("{LABEL_PREFIX}{k}"), v.clone());
        }
    }
}

/// Copy the listed annotation keys into `meta` under the annotation
/// prefix.
pub fn copy_selected_annotations(
    meta: &mut HashMap<String, String>,
    annotations: &HashMap<String, String>,
    include: &[String],
) {
    for k in include {
        if let Some(v) = annotations.get(k) {
            meta.insert(format!("{ANNOTATION_PREFIX}{k}"), v.clone());
        }
    }
}

/// Pick up an explicit weight from annotations (preferred) or labels
/// when the backend has none. Non-positive and unparseable values are
/// ignored.
pub fn apply_weight_from_meta(
    backend: &mut Backend,
    labels: &HashMap<String, String>,
    annotations: &HashMap<String, String>,
) {
    if backend.weight > 0 {
        return;
    }
    for source in [annotations, labels] {
        if let Some(v) = source.get(WEIGHT_KEY) {
            if let Ok(n) = v.parse::<u32>() {
                if n > 0 {
                    backend.weight = n;
                    return;
                }
            }
        }
    }
}
