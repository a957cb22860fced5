//! Discovery provider configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::DiscoveryError;

/// Top-level discovery section: a list of uniquely named providers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub providers: Vec<ProviderConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub name: String,
    /// `kubernetes` or `agones`.
    #[serde(rename = "type")]
    pub provider_type: String,
    pub kubernetes: Option<KubernetesDiscoveryConfig>,
    pub agones: Option<AgonesDiscoveryConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KubernetesDiscoveryConfig {
    pub kubeconfig: String,
    pub namespaces: Vec<String>,
    pub resources: Vec<KubernetesResourceConfig>,
    pub filters: KubernetesFilterConfig,
    pub metadata: KubernetesMetadataConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KubernetesResourceConfig {
    /// `pods` or `endpointslices`.
    pub kind: String,
    pub service: Option<KubernetesServiceRef>,
    pub selector: Option<KubernetesSelector>,
    pub port: KubernetesPortConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KubernetesServiceRef {
    pub name: String,
    pub namespace: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KubernetesSelector {
    /// `k=v` pairs, comma-separated.
    pub labels: String,
    pub annotations: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KubernetesPortConfig {
    pub name: String,
    pub number: u16,
    pub container_port: u16,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KubernetesFilterConfig {
    pub require_pod_ready: bool,
    pub require_pod_phase: Vec<String>,
    pub require_endpoint_ready: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KubernetesMetadataConfig {
    pub include_labels: Vec<String>,
    pub include_annotations: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgonesDiscoveryConfig {
    pub kubeconfig: String,
    pub namespaces: Vec<String>,
    /// `watch` (default) or `allocate`.
    pub mode: String,
    /// Minimum spacing between allocate calls, as a duration string.
    pub allocate_min_interval: String,
    pub state: Vec<String>,
    pub selector: Option<KubernetesSelector>,
    pub metadata: KubernetesMetadataConfig,
    pub address: Option<AgonesAddressConfig>,
    pub port: KubernetesPortConfig,
}

impl AgonesDiscoveryConfig {
    /// Parsed allocation spacing; zero when unset.
    pub fn allocate_min_interval(&self) -> Result<Duration, DiscoveryError> {
        let s = self.allocate_min_interval.trim();
        if s.is_empty() {
            return Ok(Duration::ZERO);
        }
        humantime::parse_duration(s).map_err(|e| {
            DiscoveryError::InvalidConfig(format!("agones.allocate_min_interval is invalid: {e}"))
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgonesAddressConfig {
    /// `address` or `addresses`.
    pub source: String,
    pub preference: Vec<String>,
}

impl DiscoveryConfig {
    pub fn validate(&self) -> Result<(), DiscoveryError> {
        let mut seen = std::collections::HashSet::new();
        for (i, p) in self.providers.iter().enumerate() {
            if p.name.is_empty() {
                return Err(invalid(format!(
                    "discovery.providers[{i}].name must not be empty"
                )));
            }
            if !seen.insert(p.name.clone()) {
                return Err(invalid(format!(
                    "discovery.providers[{i}].name must be unique"
                )));
            }
            match p.provider_type.trim().to_ascii_lowercase().as_str() {
                "kubernetes" => {
                    let Some(k8s) = &p.kubernetes else {
                        return Err(invalid(format!(
                            "discovery.providers[{i}].kubernetes must be set"
                        )));
                    };
                    for (j, r) in k8s.resources.iter().enumerate() {
                        if let Some(selector) = &r.selector {
                            validate_selector(&selector.labels).map_err(|e| {
                                invalid(format!(
                                    "discovery.providers[{i}].kubernetes.resources[{j}].selector.labels is invalid: {e}"
                                ))
                            })?;
                            validate_selector(&selector.annotations).map_err(|e| {
                                invalid(format!(
                                    "discovery.providers[{i}].kubernetes.resources[{j}].selector.annotations is invalid: {e}"
                                ))
                            })?;
                        }
                    }
                }
                "agones" => {
                    let Some(agones) = &p.agones else {
                        return Err(invalid(format!(
                            "discovery.providers[{i}].agones must be set"
                        )));
                    };
                    if let Some(selector) = &agones.selector {
                        validate_selector(&selector.labels).map_err(|e| {
                            invalid(format!(
                                "discovery.providers[{i}].agones.selector.labels is invalid: {e}"
                            ))
                        })?;
                        validate_selector(&selector.annotations).map_err(|e| {
                            invalid(format!(
                                "discovery.providers[{i}].agones.selector.annotations is invalid: {e}"
                            ))
                        })?;
                    }
                    if let Some(address) = &agones.address {
                        let source = address.source.trim().to_ascii_lowercase();
                        if !source.is_empty() && source != "address" && source != "addresses" {
                            return Err(invalid(format!(
                                "discovery.providers[{i}].agones.address.source must be one of: address, addresses"
                            )));
                        }
                    }
                    agones.allocate_min_interval().map_err(|e| {
                        invalid(format!("discovery.providers[{i}].{e}"))
                    })?;
                }
                _ => {
                    return Err(invalid(format!(
                        "discovery.providers[{i}].type must be one of: kubernetes, agones"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Names of all configured providers, for reference validation.
    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name.as_str()).collect()
    }
}

fn invalid(msg: String) -> DiscoveryError {
    DiscoveryError::InvalidConfig(msg)
}

/// Validate a `k=v,k2=v2` selector expression.
fn validate_selector(expr: &str) -> Result<(), String> {
    let expr = expr.trim();
    if expr.is_empty() {
        return Ok(());
    }
    for token in expr.split(',') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        let Some((k, v)) = token.split_once('=') else {
            return Err(format!("invalid selector token {token:?}"));
        };
        if k.trim().is_empty() || v.trim().is_empty() {
            return Err(format!("invalid selector token {token:?}"));
        }
    }
    Ok(())
}
