//! Handler slot.
//!
//! # Responsibilities
//! - Own one registered handler and its read/write lock
//! - Hand out read guards for the duration of a request
//! - Destroy the handler once every in-flight request has drained
//!
//! # Design Decisions
//! - Requests hold an owned read guard; destroy takes the write guard, so it
//!   waits for in-flight requests and no request starts on a destroyed slot
//! - A guard acquired after destroy completed is refused (`None`); the
//!   dispatcher treats that like a missing alias
//! - The destroy hook is skipped when the owning module is already gone

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{OwnedRwLockReadGuard, RwLock};

use crate::handler::SharedHandler;

/// Why a slot is being torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownReason {
    /// Explicit unregister by the owning module.
    Unregistered,
    /// Bulk teardown after the owning module unloaded; its code must not run.
    OwnerGone,
    /// Server-wide stop.
    Stopped,
}

impl TeardownReason {
    pub fn runs_destroy_hook(&self) -> bool {
        !matches!(self, TeardownReason::OwnerGone)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TeardownReason::Unregistered => "unregistered",
            TeardownReason::OwnerGone => "owner_gone",
            TeardownReason::Stopped => "stopped",
        }
    }
}

/// Lock-guarded wrapper around one registered handler.
pub struct HandlerSlot {
    alias: String,
    owner: String,
    handler: SharedHandler,
    lock: Arc<RwLock<()>>,
    destroyed: AtomicBool,
    in_flight: AtomicUsize,
}

impl HandlerSlot {
    pub fn new(alias: impl Into<String>, owner: impl Into<String>, handler: SharedHandler) -> Self {
        Self {
            alias: alias.into(),
            owner: owner.into(),
            handler,
            lock: Arc::new(RwLock::new(())),
            destroyed: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
        }
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn handler(&self) -> &SharedHandler {
        &self.handler
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Requests currently holding a read guard.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// Take the read lock for servicing one request.
    ///
    /// Returns `None` if the slot was destroyed.
    pub async fn acquire(self: &Arc<Self>) -> Option<SlotGuard> {
        let guard = self.lock.clone().read_owned().await;
        if self.is_destroyed() {
            return None;
        }
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        Some(SlotGuard {
            slot: Arc::clone(self),
            _guard: guard,
        })
    }

    /// Wait for in-flight requests, mark destroyed and run the destroy hook.
    ///
    /// Returns `false` if the slot was already destroyed.
    pub async fn destroy(&self, reason: TeardownReason) -> bool {
        let _write = self.lock.write().await;
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return false;
        }

        if reason.runs_destroy_hook() {
            let handler = self.handler.clone();
            let hook = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| handler.destroy()));
            if hook.is_err() {
                tracing::error!(alias = %self.alias, owner = %self.owner, "Handler destroy hook panicked");
            }
        }

        tracing::debug!(
            alias = %self.alias,
            owner = %self.owner,
            reason = reason.as_str(),
            "Handler slot destroyed"
        );
        true
    }
}

impl std::fmt::Debug for HandlerSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerSlot")
            .field("alias", &self.alias)
            .field("owner", &self.owner)
            .field("handler", &self.handler.kind())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

/// Read guard held while a request is serviced. Releases on drop.
#[derive(Debug)]
pub struct SlotGuard {
    slot: Arc<HandlerSlot>,
    _guard: OwnedRwLockReadGuard<()>,
}

impl SlotGuard {
    pub fn handler(&self) -> &SharedHandler {
        &self.slot.handler
    }

    pub fn alias(&self) -> &str {
        &self.slot.alias
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.slot.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}
