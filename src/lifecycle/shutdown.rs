//! Shutdown coordination for the router.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;

/// Coordinator for graceful shutdown.
///
/// Provides a broadcast channel that all long-running tasks can subscribe to.
#[derive(Clone)]
pub struct Shutdown {
    /// Broadcast channel sender.
    tx: broadcast::Sender<()>,
    triggered: Arc<AtomicBool>,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            tx,
            triggered: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        self.triggered.store(true, Ordering::SeqCst);
        let _ = self.tx.send(());
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Resolve once shutdown was triggered, even if that happened before
    /// this call.
    pub async fn triggered(&self) {
        let mut rx = self.tx.subscribe();
        if self.is_triggered() {
            return;
        }
        let _ = rx.recv().await;
    }

    /// Get the number of active subscribers (tasks still running).
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-wide "stop accepting new work" flag.
///
/// Consulted once per dispatch, before any lookup or lock. While set, every
/// request is answered with 503.
#[derive(Debug, Default)]
pub struct ShutdownFlag {
    requested: AtomicBool,
}

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the flag changed.
    pub fn mark(&self) -> bool {
        let changed = !self.requested.swap(true, Ordering::SeqCst);
        if changed {
            tracing::warn!("Shutdown requested: new requests will be rejected with 503");
        }
        changed
    }

    /// Returns `true` if the flag changed.
    pub fn unmark(&self) -> bool {
        let changed = self.requested.swap(false, Ordering::SeqCst);
        if changed {
            tracing::info!("Shutdown request withdrawn: accepting requests again");
        }
        changed
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_toggles() {
        let flag = ShutdownFlag::new();
        assert!(!flag.is_requested());
        assert!(flag.mark());
        assert!(!flag.mark());
        assert!(flag.is_requested());
        assert!(flag.unmark());
        assert!(!flag.unmark());
        assert!(!flag.is_requested());
    }

    #[tokio::test]
    async fn test_broadcast_reaches_subscribers() {
        let shutdown = Shutdown::new();
        let mut rx = shutdown.subscribe();
        assert_eq!(shutdown.receiver_count(), 1);
        shutdown.trigger();
        assert!(rx.recv().await.is_ok());
    }

    #[tokio::test]
    async fn test_triggered_resolves_after_the_fact() {
        let shutdown = Shutdown::new();
        shutdown.trigger();
        assert!(shutdown.is_triggered());
        tokio::time::timeout(std::time::Duration::from_secs(1), shutdown.triggered())
            .await
            .unwrap();
    }
}
