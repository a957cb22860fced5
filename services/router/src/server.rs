//! QUIC listener and per-connection handling.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use hyrp_discovery::{
    AllocatingProvider, BackendSource, Manager as DiscoveryManager, Provider, SnapshotProvider,
};
use hyrp_plugins::{load_all, order_plugin_configs, ConnectEvent, Manager as PluginManager};
use hyrp_routing::{Backend, Decision, DiscoveryResolver, Engine, Request, StaticEngine};
use quinn::crypto::rustls::QuicServerConfig;
use quinn::{Connection, Endpoint, IdleTimeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, Instrument};

use crate::config::Config;
use crate::streams::{pump_frames, StreamContext};
use crate::tls;

/// The router server: routing engine, discovery, plugins and the QUIC
/// endpoint.
pub struct Server {
    cfg: Arc<Config>,
    engine: Arc<StaticEngine>,
    discovery: Option<Arc<DiscoveryManager>>,
    plugins: Option<Arc<PluginManager>>,
}

impl Server {
    /// Build a server without discovery sources. Configurations that
    /// reference discovery providers need [`Server::with_sources`].
    pub fn new(cfg: Config) -> Result<Self> {
        Self::with_sources(cfg, HashMap::new())
    }

    /// Build a server, wiring `sources` (provider name to watcher
    /// capability) into the configured discovery providers.
    pub fn with_sources(
        cfg: Config,
        sources: HashMap<String, Arc<dyn BackendSource>>,
    ) -> Result<Self> {
        let discovery = match &cfg.discovery {
            Some(discovery_cfg) => Some(Arc::new(build_discovery_manager(
                discovery_cfg,
                sources,
            )?)),
            None => None,
        };

        let mut engine = StaticEngine::new(cfg.routing.clone());
        if let Some(manager) = &discovery {
            engine.set_discovery(Arc::new(ManagerResolver(Arc::clone(manager))));
        }

        Ok(Server {
            cfg: Arc::new(cfg),
            engine: Arc::new(engine),
            discovery,
            plugins: None,
        })
    }

    /// Run until the cancellation token fires. Startup failures are
    /// fatal; a fired token drains into a clean shutdown.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<()> {
        let crypto = tls::build_server_crypto(&self.cfg.tls)?;
        let quic_crypto =
            QuicServerConfig::try_from(crypto).context("build QUIC server crypto")?;
        let mut server_config = quinn::ServerConfig::with_crypto(Arc::new(quic_crypto));

        let idle = self.cfg.max_idle_timeout()?;
        let transport = Arc::get_mut(&mut server_config.transport)
            .context("transport config unshared at startup")?;
        transport.max_idle_timeout(Some(
            IdleTimeout::try_from(idle).context("quic.max_idle_timeout out of range")?,
        ));

        if let Some(discovery) = &self.discovery {
            discovery.start(shutdown.clone()).await?;
        }
        self.init_plugins()?;

        let endpoint = Endpoint::server(server_config, self.cfg.listen_addr()?)
            .context("bind QUIC endpoint")?;
        info!(addr = %self.cfg.listen, "listening");

        let server = Arc::new(self);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                incoming = endpoint.accept() => {
                    let Some(incoming) = incoming else { break };
                    let server = Arc::clone(&server);
                    let shutdown = shutdown.clone();
                    tokio::spawn(async move {
                        match incoming.await {
                            Ok(connection) => server.handle_conn(connection, shutdown).await,
                            Err(e) => debug!(error = %e, "connection handshake failed"),
                        }
                    });
                }
            }
        }

        endpoint.close(0u32.into(), b"shutdown");
        if let Some(plugins) = &server.plugins {
            plugins.close().await;
        }
        Ok(())
    }

    fn init_plugins(&mut self) -> Result<()> {
        if self.cfg.plugins.is_empty() {
            return Ok(());
        }
        let ordered = order_plugin_configs(&self.cfg.plugins)?;
        let plugins = load_all(&ordered)?;
        self.plugins = Some(Arc::new(PluginManager::new(plugins)));
        Ok(())
    }

    async fn handle_conn(&self, connection: Connection, shutdown: CancellationToken) {
        let (sni, alpn) = handshake_fields(&connection);
        let remote = connection.remote_address();

        let span = if self.cfg.logging.log_client_ip {
            tracing::info_span!("conn", remote = %remote, sni = %sni, alpn = %alpn)
        } else {
            tracing::info_span!("conn", sni = %sni, alpn = %alpn)
        };

        async {
            let mut decision = Decision::default();
            let mut route_err = None;
            match self
                .engine
                .decide(&Request {
                    sni: sni.clone(),
                    ..Request::default()
                })
                .await
            {
                Ok(d) => decision = d,
                Err(e) => {
                    info!(error = %e, "routing error");
                    route_err = Some(Arc::new(e));
                }
            }

            let fingerprint = peer_fingerprint(&connection);
            info!(
                client_cert_present = !fingerprint.is_empty(),
                client_cert_fingerprint = %fingerprint,
                "accepted connection"
            );

            let cx = StreamContext {
                decision: Arc::new(decision),
                route_err,
                base_event: ConnectEvent {
                    sni,
                    client_cert_fingerprint: fingerprint,
                    ..ConnectEvent::default()
                },
                plugins: self.plugins.clone(),
                messages: Arc::new(self.cfg.messages.clone()),
            };

            let bidi = tokio::spawn(accept_bidi_streams(connection.clone(), cx.clone()));
            let uni = tokio::spawn(accept_uni_streams(connection.clone(), cx));

            tokio::select! {
                _ = shutdown.cancelled() => {
                    connection.close(0u32.into(), b"shutdown");
                }
                _ = connection.closed() => {}
            }
            bidi.abort();
            uni.abort();
        }
        .instrument(span)
        .await
    }
}

async fn accept_bidi_streams(connection: Connection, cx: StreamContext) {
    loop {
        match connection.accept_bi().await {
            Ok((mut send, mut recv)) => {
                let cx = cx.clone();
                tokio::spawn(async move {
                    debug!(stream_type = "bidi", "accepted stream");
                    pump_frames(&mut recv, Some(&mut send), cx).await;
                });
            }
            Err(e) => {
                debug!(error = %e, "accept bidi stream failed");
                return;
            }
        }
    }
}

async fn accept_uni_streams(connection: Connection, cx: StreamContext) {
    loop {
        match connection.accept_uni().await {
            Ok(mut recv) => {
                let cx = cx.clone();
                tokio::spawn(async move {
                    debug!(stream_type = "uni", "accepted stream");
                    pump_frames::<_, quinn::SendStream>(&mut recv, None, cx).await;
                });
            }
            Err(e) => {
                debug!(error = %e, "accept uni stream failed");
                return;
            }
        }
    }
}

fn handshake_fields(connection: &Connection) -> (String, String) {
    let mut sni = String::new();
    let mut alpn = String::new();
    if let Some(data) = connection.handshake_data() {
        if let Some(hs) = data.downcast_ref::<quinn::crypto::rustls::HandshakeData>() {
            if let Some(name) = &hs.server_name {
                sni = name.clone();
            }
            if let Some(protocol) = &hs.protocol {
                alpn = String::from_utf8_lossy(protocol).into_owned();
            }
        }
    }
    (sni, alpn)
}

fn peer_fingerprint(connection: &Connection) -> String {
    let Some(identity) = connection.peer_identity() else {
        return String::new();
    };
    let Some(certs) = identity.downcast_ref::<Vec<rustls::pki_types::CertificateDer<'static>>>()
    else {
        return String::new();
    };
    match certs.first() {
        Some(cert) => tls::certificate_fingerprint(cert.as_ref()),
        None => String::new(),
    }
}

/// Adapts the discovery manager to the routing engine's resolver seam.
struct ManagerResolver(Arc<DiscoveryManager>);

#[async_trait]
impl DiscoveryResolver for ManagerResolver {
    async fn resolve(
        &self,
        provider: &str,
    ) -> Result<Vec<Backend>, Box<dyn std::error::Error + Send + Sync>> {
        self.0.resolve(provider).await.map_err(Into::into)
    }
}

/// Build the discovery manager from configuration, attaching each
/// provider to its registered watcher source.
fn build_discovery_manager(
    cfg: &hyrp_discovery::DiscoveryConfig,
    mut sources: HashMap<String, Arc<dyn BackendSource>>,
) -> Result<DiscoveryManager> {
    let mut providers: HashMap<String, Arc<dyn Provider>> = HashMap::new();
    for p in &cfg.providers {
        let source = sources.remove(&p.name).with_context(|| {
            format!(
                "no backend source registered for discovery provider {:?}",
                p.name
            )
        })?;
        let provider: Arc<dyn Provider> = match p.provider_type.trim().to_ascii_lowercase().as_str()
        {
            "kubernetes" => Arc::new(SnapshotProvider::new(&p.name, source)),
            "agones" => {
                let agones = p
                    .agones
                    .as_ref()
                    .with_context(|| format!("provider {:?} missing agones section", p.name))?;
                if agones.mode.trim().eq_ignore_ascii_case("allocate") {
                    Arc::new(AllocatingProvider::new(
                        &p.name,
                        source,
                        agones.allocate_min_interval()?,
                    ))
                } else {
                    Arc::new(SnapshotProvider::new(&p.name, source))
                }
            }
            other => bail!("unknown discovery provider type {other:?}"),
        };
        providers.insert(p.name.clone(), provider);
    }
    Ok(DiscoveryManager::new(providers))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyrp_discovery::{DiscoveryConfig, KubernetesDiscoveryConfig, ProviderConfig};

    struct EmptySource;

    #[async_trait]
    impl BackendSource for EmptySource {
        async fn list(
            &self,
        ) -> Result<Vec<Backend>, Box<dyn std::error::Error + Send + Sync>> {
            Ok(Vec::new())
        }
    }

    fn discovery_cfg() -> DiscoveryConfig {
        DiscoveryConfig {
            providers: vec![ProviderConfig {
                name: "k8s".into(),
                provider_type: "kubernetes".into(),
                kubernetes: Some(KubernetesDiscoveryConfig::default()),
                agones: None,
            }],
        }
    }

    #[test]
    fn discovery_manager_requires_registered_sources() {
        let err = build_discovery_manager(&discovery_cfg(), HashMap::new()).unwrap_err();
        assert!(err.to_string().contains("no backend source registered"));
    }

    #[test]
    fn discovery_manager_builds_with_sources() {
        let mut sources: HashMap<String, Arc<dyn BackendSource>> = HashMap::new();
        sources.insert("k8s".into(), Arc::new(EmptySource));
        let manager = build_discovery_manager(&discovery_cfg(), sources).unwrap();
        assert!(!manager.is_empty());
    }

    #[test]
    fn server_builds_from_default_config() {
        let server = Server::new(Config::default()).unwrap();
        assert!(server.plugins.is_none());
        assert!(server.discovery.is_none());
    }
}
