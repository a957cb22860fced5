//! Provider capability and the named provider registry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hyrp_routing::Backend;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::limiter::AllocationLimiter;
use crate::snapshot::SnapshotCell;
use crate::DiscoveryError;

/// Forced snapshot rebuild period, in addition to event-driven rebuilds.
pub const REBUILD_INTERVAL: Duration = Duration::from_secs(30);

/// The watcher capability a provider is built around: list the current
/// backends. Cluster-API clients implement this outside the router.
#[async_trait]
pub trait BackendSource: Send + Sync {
    async fn list(&self) -> Result<Vec<Backend>, Box<dyn std::error::Error + Send + Sync>>;
}

/// A named discovery provider.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Bring the provider up; called once before the first resolve.
    async fn start(&self, shutdown: CancellationToken) -> Result<(), DiscoveryError>;

    /// The provider's current backend set.
    async fn resolve(&self) -> Result<Vec<Backend>, DiscoveryError>;
}

/// Watch-style provider: serves an atomically-swapped snapshot rebuilt
/// from its source, with a periodic forced rebuild.
pub struct SnapshotProvider {
    name: String,
    source: Arc<dyn BackendSource>,
    snapshot: Arc<SnapshotCell>,
    rebuild_interval: Duration,
}

impl SnapshotProvider {
    pub fn new(name: impl Into<String>, source: Arc<dyn BackendSource>) -> Self {
        SnapshotProvider {
            name: name.into(),
            source,
            snapshot: Arc::new(SnapshotCell::new()),
            rebuild_interval: REBUILD_INTERVAL,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_rebuild_interval(mut self, interval: Duration) -> Self {
        self.rebuild_interval = interval;
        self
    }

    /// Rebuild the snapshot from the source now. Event-driven watcher
    /// callbacks land here.
    pub async fn refresh(&self) -> Result<(), DiscoveryError> {
        let source = Arc::clone(&self.source);
        self.snapshot
            .rebuild_with(move || async move { source.list().await })
            .await
            .map_err(|e| DiscoveryError::Provider {
                name: self.name.clone(),
                message: e.to_string(),
            })
    }
}

#[async_trait]
impl Provider for SnapshotProvider {
    async fn start(&self, shutdown: CancellationToken) -> Result<(), DiscoveryError> {
        // The initial sync is fatal, matching startup semantics; later
        // failures keep the previous snapshot.
        self.refresh().await?;

        let source = Arc::clone(&self.source);
        let snapshot = Arc::clone(&self.snapshot);
        let name = self.name.clone();
        let interval = self.rebuild_interval;
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {
                        let source = Arc::clone(&source);
                        let result = snapshot
                            .rebuild_with(move || async move { source.list().await })
                            .await;
                        match result {
                            Ok(()) => debug!(provider = %name, "discovery snapshot rebuilt"),
                            Err(e) => warn!(provider = %name, error = %e, "discovery rebuild failed"),
                        }
                    }
                }
            }
        });
        Ok(())
    }

    async fn resolve(&self) -> Result<Vec<Backend>, DiscoveryError> {
        Ok(self.snapshot.load())
    }
}

/// Allocate-style provider: every resolve asks the source for a fresh
/// allocation, paced by the minimum-interval limiter.
pub struct AllocatingProvider {
    name: String,
    source: Arc<dyn BackendSource>,
    limiter: AllocationLimiter,
    shutdown: CancellationToken,
}

impl AllocatingProvider {
    pub fn new(
        name: impl Into<String>,
        source: Arc<dyn BackendSource>,
        min_interval: Duration,
    ) -> Self {
        AllocatingProvider {
            name: name.into(),
            source,
            limiter: AllocationLimiter::new(min_interval),
            shutdown: CancellationToken::new(),
        }
    }
}

#[async_trait]
impl Provider for AllocatingProvider {
    async fn start(&self, shutdown: CancellationToken) -> Result<(), DiscoveryError> {
        let local = self.shutdown.clone();
        tokio::spawn(async move {
            shutdown.cancelled().await;
            local.cancel();
        });
        Ok(())
    }

    async fn resolve(&self) -> Result<Vec<Backend>, DiscoveryError> {
        self.limiter.wait(&self.shutdown).await?;
        self.source
            .list()
            .await
            .map_err(|e| DiscoveryError::Provider {
                name: self.name.clone(),
                message: e.to_string(),
            })
    }
}

/// Named provider registry with start-once semantics.
pub struct Manager {
    providers: HashMap<String, Arc<dyn Provider>>,
    started: tokio::sync::OnceCell<Result<(), DiscoveryError>>,
}

impl std::fmt::Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager")
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .field("started", &self.started.get().is_some())
            .finish()
    }
}

impl Manager {
    pub fn new(providers: HashMap<String, Arc<dyn Provider>>) -> Self {
        Manager {
            providers,
            started: tokio::sync::OnceCell::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Start every provider. Subsequent calls return the first outcome.
    pub async fn start(&self, shutdown: CancellationToken) -> Result<(), DiscoveryError> {
        self.started
            .get_or_init(|| async {
                for (name, p) in &self.providers {
                    debug!(provider = %name, "starting discovery provider");
                    p.start(shutdown.clone()).await?;
                }
                Ok(())
            })
            .await
            .clone()
    }

    /// Resolve a provider by name.
    pub async fn resolve(&self, provider: &str) -> Result<Vec<Backend>, DiscoveryError> {
        let p = self
            .providers
            .get(provider)
            .ok_or_else(|| DiscoveryError::UnknownProvider(provider.to_string()))?;
        p.resolve().await
    }
}
