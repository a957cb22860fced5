//! Deterministic plugin execution ordering.

use std::collections::HashMap;

use crate::config::PluginConfig;
use crate::PluginError;

const STAGES: [&str; 3] = ["deny", "route", "mutate"];

/// Order plugin configs for execution.
///
/// Plugins are bucketed by lowercase stage (`deny` then `route` then
/// `mutate`, with unknown stages after in first-declaration order; an
/// empty stage counts as `route`). Within a bucket, before/after
/// constraints form a DAG resolved by Kahn's algorithm, always taking
/// the first-declared ready plugin so the result is a pure function of
/// the input. Constraints naming plugins outside the bucket are
/// ignored; a cycle is an error.
pub fn order_plugin_configs(cfgs: &[PluginConfig]) -> Result<Vec<PluginConfig>, PluginError> {
    let mut idxs_by_stage: HashMap<String, Vec<usize>> = HashMap::new();
    let mut stage_order: Vec<String> = Vec::new();
    for (i, p) in cfgs.iter().enumerate() {
        let mut stage = p.stage.to_ascii_lowercase();
        if stage.is_empty() {
            stage = "route".into();
        }
        if !idxs_by_stage.contains_key(&stage) {
            stage_order.push(stage.clone());
        }
        idxs_by_stage.entry(stage).or_default().push(i);
    }

    let mut ordered = Vec::with_capacity(cfgs.len());
    for stage in STAGES {
        if let Some(ids) = idxs_by_stage.remove(stage) {
            ordered.extend(topo_sort_by_constraints(cfgs, &ids, stage)?);
        }
    }
    for stage in stage_order {
        if let Some(ids) = idxs_by_stage.remove(&stage) {
            ordered.extend(topo_sort_by_constraints(cfgs, &ids, &stage)?);
        }
    }

    Ok(ordered.into_iter().map(|i| cfgs[i].clone()).collect())
}

fn topo_sort_by_constraints(
    cfgs: &[PluginConfig],
    ids: &[usize],
    stage: &str,
) -> Result<Vec<usize>, PluginError> {
    let name_to_idx: HashMap<&str, usize> =
        ids.iter().map(|&i| (cfgs[i].name.as_str(), i)).collect();

    let mut indegree: HashMap<usize, usize> = HashMap::new();
    let mut edges: HashMap<usize, Vec<usize>> = HashMap::new();

    for &idx in ids {
        let p = &cfgs[idx];
        // after: [x] means x runs before this plugin.
        for dep in &p.after {
            if let Some(&j) = name_to_idx.get(dep.as_str()) {
                edges.entry(j).or_default().push(idx);
                *indegree.entry(idx).or_default() += 1;
            }
        }
        // before: [x] means x runs after this plugin.
        for dep in &p.before {
            if let Some(&j) = name_to_idx.get(dep.as_str()) {
                edges.entry(idx).or_default().push(j);
                *indegree.entry(j).or_default() += 1;
            }
        }
    }

    let mut processed = vec![false; cfgs.len()];
    let mut out = Vec::with_capacity(ids.len());

    while out.len() < ids.len() {
        let Some(&found) = ids
            .iter()
            .find(|&&idx| !processed[idx] && indegree.get(&idx).copied().unwrap_or(0) == 0)
        else {
            return Err(PluginError::Cycle {
                stage: stage.to_string(),
            });
        };
        processed[found] = true;
        out.push(found);
        if let Some(next) = edges.get(&found) {
            for &to in next {
                if let Some(d) = indegree.get_mut(&to) {
                    *d = d.saturating_sub(1);
                }
            }
        }
    }

    Ok(out)
}
