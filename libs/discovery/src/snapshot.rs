//! Read-mostly backend snapshots.

use std::sync::Arc;

use arc_swap::ArcSwap;
use hyrp_routing::Backend;
use tokio::sync::Mutex;

/// An atomically-swapped, immutable backend snapshot.
///
/// Readers load the current snapshot without blocking; rebuilds are
/// serialized by an internal lock and publish a complete replacement in
/// a single pointer swap.
pub struct SnapshotCell {
    snapshot: ArcSwap<Vec<Backend>>,
    rebuild_lock: Mutex<()>,
}

impl SnapshotCell {
    pub fn new() -> Self {
        SnapshotCell {
            snapshot: ArcSwap::from_pointee(Vec::new()),
            rebuild_lock: Mutex::new(()),
        }
    }

    /// The current snapshot. Callers own the returned vector.
    pub fn load(&self) -> Vec<Backend> {
        self.snapshot.load().as_ref().clone()
    }

    /// Publish a new snapshot directly.
    pub fn publish(&self, backends: Vec<Backend>) {
        self.snapshot.store(Arc::new(backends));
    }

    /// Rebuild under the internal lock and publish the result.
    ///
    /// Concurrent rebuilds queue here; readers keep serving the previous
    /// snapshot until the swap.
    pub async fn rebuild_with<F, Fut, E>(&self, f: F) -> Result<(), E>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<Vec<Backend>, E>>,
    {
        let _guard = self.rebuild_lock.lock().await;
        let backends = f().await?;
        self.snapshot.store(Arc::new(backends));
        Ok(())
    }
}

impl Default for SnapshotCell {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(host: &str) -> Backend {
        Backend {
            host: host.into(),
            port: 1,
            ..Backend::default()
        }
    }

    #[test]
    fn starts_empty() {
        let cell = SnapshotCell::new();
        assert!(cell.load().is_empty());
    }

    #[tokio::test]
    async fn rebuild_publishes_atomically() {
        let cell = SnapshotCell::new();
        cell.rebuild_with(|| async { Ok::<_, ()>(vec![backend("a"), backend("b")]) })
            .await
            .unwrap();
        assert_eq!(cell.load().len(), 2);
    }

    #[tokio::test]
    async fn failed_rebuild_keeps_previous_snapshot() {
        let cell = SnapshotCell::new();
        cell.publish(vec![backend("keep")]);
        let res: Result<(), &str> = cell.rebuild_with(|| async { Err("boom") }).await;
        assert!(res.is_err());
        assert_eq!(cell.load()[0].host, "keep");
    }

    #[tokio::test]
    async fn loads_are_independent_copies() {
        let cell = SnapshotCell::new();
        cell.publish(vec![backend("a")]);
        let mut copy = cell.load();
        copy[0].host = "mutated".into();
        assert_eq!(cell.load()[0].host, "a");
    }
}
