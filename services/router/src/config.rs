//! Router configuration: defaults, file loading and validation.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use hyrp_discovery::DiscoveryConfig;
use hyrp_plugins::{validate_plugin_configs, PluginConfig};
use serde::{Deserialize, Serialize};

use crate::messages::{DisconnectMessages, DisconnectOverrides};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// UDP listen address; a bare `:port` binds all interfaces.
    pub listen: String,
    pub tls: TlsConfig,
    pub quic: QuicConfig,
    pub routing: hyrp_routing::Config,
    pub referral: Option<ReferralConfig>,
    pub plugins: Vec<PluginConfig>,
    pub discovery: Option<DiscoveryConfig>,
    pub messages: MessagesConfig,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listen: ":5520".into(),
            tls: TlsConfig::default(),
            quic: QuicConfig::default(),
            routing: hyrp_routing::Config::default(),
            referral: None,
            plugins: Vec::new(),
            discovery: None,
            messages: MessagesConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    pub cert_file: String,
    pub key_file: String,
    pub alpn: Vec<String>,
}

impl Default for TlsConfig {
    fn default() -> Self {
        TlsConfig {
            cert_file: String::new(),
            key_file: String::new(),
            alpn: vec!["hytale/*".into()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuicConfig {
    /// Duration string, e.g. `30s`.
    pub max_idle_timeout: String,
}

impl Default for QuicConfig {
    fn default() -> Self {
        QuicConfig {
            max_idle_timeout: "30s".into(),
        }
    }
}

/// Envelope signing credentials handed to referral-producing plugins.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferralConfig {
    pub key_id: u8,
    /// Supports `base64:` and `hex:` prefixes.
    pub hmac_secret: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MessagesConfig {
    pub disconnect: DisconnectMessages,
    pub disconnect_locales: HashMap<String, DisconnectOverrides>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub log_client_ip: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            log_client_ip: true,
        }
    }
}

impl Config {
    /// Load a configuration file, YAML or JSON by extension, apply the
    /// built-in locale tables when none are configured, and validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        let mut cfg: Config = match ext.as_str() {
            "yaml" | "yml" => serde_yaml::from_str(&raw).context("parse yaml config")?,
            "json" => serde_json::from_str(&raw).context("parse json config")?,
            other => bail!("unsupported config extension: {other:?}"),
        };

        if cfg.messages.disconnect_locales.is_empty() {
            cfg.messages.disconnect_locales = crate::messages::builtin_locales();
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.listen.is_empty() {
            bail!("listen must not be empty");
        }
        if self.tls.cert_file.is_empty() != self.tls.key_file.is_empty() {
            bail!("tls.cert_file and tls.key_file must be set together");
        }
        if self.tls.alpn.is_empty() {
            bail!("tls.alpn must not be empty");
        }
        if !self.quic.max_idle_timeout.is_empty() {
            humantime::parse_duration(&self.quic.max_idle_timeout)
                .context("invalid quic.max_idle_timeout")?;
        }
        self.routing.validate()?;

        if let Some(referral) = &self.referral {
            if !referral.hmac_secret.is_empty() {
                hyrp_referral::decode_secret(&referral.hmac_secret)
                    .context("invalid referral.hmac_secret")?;
            }
        }

        validate_plugin_configs(&self.plugins)?;

        let mut providers = std::collections::HashSet::new();
        if let Some(discovery) = &self.discovery {
            discovery.validate()?;
            providers.extend(discovery.provider_names().iter().map(|s| s.to_string()));
        }
        self.validate_discovery_refs(&providers)?;

        Ok(())
    }

    fn validate_discovery_refs(
        &self,
        providers: &std::collections::HashSet<String>,
    ) -> Result<()> {
        let check = |path: &str, pool: &hyrp_routing::Pool| -> Result<()> {
            let Some(discovery) = &pool.discovery else {
                return Ok(());
            };
            if providers.is_empty() {
                bail!("{path}: discovery is configured but top-level discovery section is missing");
            }
            if !providers.contains(&discovery.provider) {
                bail!("{path}: unknown discovery provider {:?}", discovery.provider);
            }
            Ok(())
        };

        if let Some(default) = &self.routing.default {
            check("routing.default", default)?;
        }
        for (i, route) in self.routing.routes.iter().enumerate() {
            check(&format!("routing.routes[{i}].pool"), &route.pool)?;
        }
        Ok(())
    }

    /// The listen address as a socket address; `:port` binds `0.0.0.0`.
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        let addr = if self.listen.starts_with(':') {
            format!("0.0.0.0{}", self.listen)
        } else {
            self.listen.clone()
        };
        addr.parse()
            .with_context(|| format!("invalid listen address {:?}", self.listen))
    }

    /// Parsed QUIC idle timeout; 30 s when unset.
    pub fn max_idle_timeout(&self) -> Result<Duration> {
        if self.quic.max_idle_timeout.is_empty() {
            return Ok(Duration::from_secs(30));
        }
        humantime::parse_duration(&self.quic.max_idle_timeout)
            .context("invalid quic.max_idle_timeout")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &tempfile::TempDir, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn defaults_are_sensible() {
        let cfg = Config::default();
        assert_eq!(cfg.listen, ":5520");
        assert_eq!(cfg.tls.alpn, vec!["hytale/*".to_string()]);
        assert_eq!(cfg.quic.max_idle_timeout, "30s");
        assert!(cfg.logging.log_client_ip);
        assert_eq!(cfg.max_idle_timeout().unwrap(), Duration::from_secs(30));
    }

    #[test]
    fn listen_addr_accepts_bare_port() {
        let cfg = Config::default();
        assert_eq!(cfg.listen_addr().unwrap().port(), 5520);
        let cfg = Config {
            listen: "127.0.0.1:7000".into(),
            ..Config::default()
        };
        assert_eq!(cfg.listen_addr().unwrap().to_string(), "127.0.0.1:7000");
    }

    #[test]
    fn loads_yaml_with_defaults_filled() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            "config.yaml",
            r#"
listen: ":6000"
routing:
  default:
    strategy: round_robin
    backends:
      - host: play.example.com
        port: 5520
"#,
        );
        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.listen, ":6000");
        assert_eq!(cfg.tls.alpn, vec!["hytale/*".to_string()]);
        let default = cfg.routing.default.as_ref().unwrap();
        assert_eq!(default.backends[0].host, "play.example.com");
        // Built-in locale tables land when none are configured.
        assert!(cfg.messages.disconnect_locales.contains_key("de"));
    }

    #[test]
    fn loads_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            "config.json",
            r#"{"listen": ":6001", "tls": {"alpn": ["hytale/1"]}}"#,
        );
        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.listen, ":6001");
        assert_eq!(cfg.tls.alpn, vec!["hytale/1".to_string()]);
    }

    #[test]
    fn rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "config.toml", "listen = ':6000'");
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn configured_locales_are_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            "config.yaml",
            r#"
messages:
  disconnect_locales:
    de:
      no_route: "Kein Server."
"#,
        );
        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.messages.disconnect_locales.len(), 1);
        assert_eq!(
            cfg.messages.disconnect_locales["de"].no_route,
            "Kein Server."
        );
    }

    #[test]
    fn validation_rejects_bad_tls_pairing() {
        let cfg = Config {
            tls: TlsConfig {
                cert_file: "cert.pem".into(),
                key_file: String::new(),
                ..TlsConfig::default()
            },
            ..Config::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validation_rejects_bad_idle_timeout() {
        let cfg = Config {
            quic: QuicConfig {
                max_idle_timeout: "soon".into(),
            },
            ..Config::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validation_rejects_bad_referral_secret() {
        let cfg = Config {
            referral: Some(ReferralConfig {
                key_id: 1,
                hmac_secret: "hex:zz".into(),
            }),
            ..Config::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = Config {
            referral: Some(ReferralConfig {
                key_id: 1,
                hmac_secret: "base64:aGVsbG8=".into(),
            }),
            ..Config::default()
        };
        cfg.validate().unwrap();
    }

    #[test]
    fn validation_resolves_discovery_references() {
        let pool = hyrp_routing::Pool {
            strategy: "round_robin".into(),
            discovery: Some(hyrp_routing::PoolDiscovery {
                provider: "k8s".into(),
                mode: String::new(),
            }),
            ..hyrp_routing::Pool::default()
        };
        let cfg = Config {
            routing: hyrp_routing::Config {
                default: Some(pool.clone()),
                routes: Vec::new(),
            },
            ..Config::default()
        };
        // Reference without a discovery section.
        assert!(cfg.validate().is_err());

        let cfg = Config {
            discovery: Some(DiscoveryConfig {
                providers: vec![hyrp_discovery::ProviderConfig {
                    name: "k8s".into(),
                    provider_type: "kubernetes".into(),
                    kubernetes: Some(hyrp_discovery::KubernetesDiscoveryConfig::default()),
                    agones: None,
                }],
            }),
            ..cfg
        };
        cfg.validate().unwrap();
    }

    #[test]
    fn validation_surfaces_plugin_errors() {
        let cfg = Config {
            plugins: vec![PluginConfig {
                name: "p".into(),
                plugin_type: "grpc".into(),
                ..PluginConfig::default()
            }],
            ..Config::default()
        };
        assert!(cfg.validate().is_err());
    }
}
