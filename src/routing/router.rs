//! The router: registration table, filter registry and shutdown flag.
//!
//! # Responsibilities
//! - Register and unregister handlers and filters at run time
//! - Serialize every structural change through one lock
//! - Drain and destroy removed handlers without blocking other changes
//! - Expose the read side (lookup, chain building) lock-free to dispatch
//!
//! # Design Decisions
//! - One explicit object shared by `Arc`; no process globals
//! - Two-tier locking: the structural mutex covers table/registry shape
//!   only, each handler slot's RwLock covers that handler's lifetime
//! - The structural lock is released before waiting on a slot's write lock,
//!   so a slow in-flight request never blocks unrelated registrations

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;

use crate::config::schema::{DispatchMode, RouterConfig};
use crate::error::RegistrationError;
use crate::filter::registry::distinct_filters;
use crate::filter::{FilterInfo, FilterPriority, FilterRegistry, PathSpec};
use crate::handler::{InitParams, SharedFilter, SharedHandler};
use crate::http::error_page::{ErrorPageRenderer, HtmlErrorPage};
use crate::lifecycle::ShutdownFlag;
use crate::observability::metrics;
use crate::routing::dispatcher::Dispatcher;
use crate::routing::slot::{HandlerSlot, TeardownReason};
use crate::routing::table::{RegistrationTable, Structure};

/// Owner id used for registrations made by the server itself.
pub const SYSTEM_OWNER: &str = "system";

/// Serializable view of one registration.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AliasInfo {
    pub alias: String,
    pub owner: String,
    pub kind: String,
    pub in_flight: usize,
}

/// Builder for [`Router`].
pub struct RouterBuilder {
    mode: DispatchMode,
    priority: FilterPriority,
    error_pages: Arc<dyn ErrorPageRenderer>,
}

impl Default for RouterBuilder {
    fn default() -> Self {
        Self {
            mode: DispatchMode::default(),
            priority: FilterPriority::default(),
            error_pages: Arc::new(HtmlErrorPage::default()),
        }
    }
}

impl RouterBuilder {
    pub fn mode(mut self, mode: DispatchMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn filter_priority<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.priority = FilterPriority::new(names);
        self
    }

    pub fn error_pages(mut self, renderer: Arc<dyn ErrorPageRenderer>) -> Self {
        self.error_pages = renderer;
        self
    }

    pub fn build(self) -> Router {
        Router {
            structure: Mutex::new(Structure::default()),
            table: RegistrationTable::new(),
            filters: FilterRegistry::new(self.priority),
            shutdown: ShutdownFlag::new(),
            mode: self.mode,
            error_pages: self.error_pages,
        }
    }
}

/// Dynamic alias router.
pub struct Router {
    structure: Mutex<Structure>,
    table: RegistrationTable,
    filters: FilterRegistry,
    shutdown: ShutdownFlag,
    mode: DispatchMode,
    error_pages: Arc<dyn ErrorPageRenderer>,
}

impl Default for Router {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Router {
    pub fn builder() -> RouterBuilder {
        RouterBuilder::default()
    }

    /// Build from the dispatch and error page sections of a config.
    pub fn from_config(config: &RouterConfig) -> Self {
        Self::builder()
            .mode(config.dispatch.mode)
            .filter_priority(config.dispatch.filter_priority.iter().cloned())
            .error_pages(Arc::new(HtmlErrorPage::new(config.error_pages.server_name.clone())))
            .build()
    }

    /// Dispatcher bound to this router.
    pub fn dispatcher(self: &Arc<Self>) -> Dispatcher {
        Dispatcher::new(Arc::clone(self))
    }

    fn lock(&self) -> MutexGuard<'_, Structure> {
        self.structure.lock().unwrap_or_else(|e| e.into_inner())
    }

    // --- Handlers ---

    /// Register `handler` under `alias` on behalf of `owner`.
    ///
    /// The handler's `init` runs before the alias becomes visible; a failing
    /// init leaves the table untouched.
    pub fn register(
        &self,
        alias: &str,
        handler: SharedHandler,
        params: &InitParams,
        owner: &str,
    ) -> Result<(), RegistrationError> {
        let mut held = self.lock();
        if let Err(e) = self.table.check_available(&held, alias) {
            tracing::warn!(alias = %alias, owner = %owner, error = %e, "Rejected handler registration");
            return Err(e);
        }

        handler.init(params).map_err(|e| RegistrationError::InitFailed {
            target: alias.to_string(),
            message: e.to_string(),
        })?;

        let kind = handler.kind();
        self.table
            .insert(&mut held, Arc::new(HandlerSlot::new(alias, owner, handler)))?;
        let count = self.table.load().len();
        drop(held);

        tracing::info!(alias = %alias, owner = %owner, kind = kind, "Handler registered");
        metrics::record_registration("register");
        metrics::record_registered_aliases(count);
        Ok(())
    }

    /// Remove `alias` if `owner` registered it, running the destroy hook.
    ///
    /// Waits until every in-flight request against the handler finished.
    pub async fn unregister(&self, alias: &str, owner: &str) -> Result<(), RegistrationError> {
        let slot = {
            let mut held = self.lock();
            self.table.detach(&mut held, alias, owner)
        };
        let slot = match slot {
            Ok(slot) => slot,
            Err(e) => {
                tracing::warn!(alias = %alias, owner = %owner, error = %e, "Rejected unregister");
                return Err(e);
            }
        };

        slot.destroy(TeardownReason::Unregistered).await;
        tracing::info!(alias = %alias, owner = %owner, "Handler unregistered");
        metrics::record_registration("unregister");
        metrics::record_registered_aliases(self.table.load().len());
        Ok(())
    }

    /// Tear down everything `owner` registered, without running its hooks.
    ///
    /// Returns the number of aliases removed.
    pub async fn unregister_all_owned_by(&self, owner: &str) -> usize {
        let (slots, filters) = {
            let mut held = self.lock();
            let slots = self.table.detach_all_owned_by(&mut held, owner);
            let filters = self.filters.remove_owned_by(&mut held, owner);
            (slots, filters)
        };

        for slot in &slots {
            slot.destroy(TeardownReason::OwnerGone).await;
        }

        if !slots.is_empty() || !filters.is_empty() {
            tracing::info!(
                owner = %owner,
                aliases = slots.len(),
                filters = filters.len(),
                "Module registrations torn down"
            );
            metrics::record_registration("unregister_owner");
            metrics::record_registered_aliases(self.table.load().len());
        }
        slots.len()
    }

    /// Unregister every alias and filter server-wide, running destroy hooks.
    pub async fn stop(&self) {
        let (slots, filters) = {
            let mut held = self.lock();
            (self.table.detach_all(&mut held), self.filters.clear(&mut held))
        };

        for slot in &slots {
            slot.destroy(TeardownReason::Stopped).await;
        }
        for filter in distinct_filters(&filters) {
            destroy_filter(&filter);
        }

        tracing::info!(aliases = slots.len(), filters = filters.len(), "Router stopped");
        metrics::record_registered_aliases(0);
    }

    /// Exact lookup against the current table snapshot.
    pub fn lookup(&self, alias: &str) -> Option<Arc<HandlerSlot>> {
        self.table.lookup(alias)
    }

    /// All registrations, ordered by alias.
    pub fn aliases(&self) -> Vec<AliasInfo> {
        self.aliases_under("/")
    }

    /// Registrations at or below `prefix`, ordered by alias.
    pub fn aliases_under(&self, prefix: &str) -> Vec<AliasInfo> {
        let snapshot = self.table.load();
        snapshot
            .aliases_under(prefix)
            .into_iter()
            .filter_map(|alias| snapshot.get(alias))
            .map(|slot| AliasInfo {
                alias: slot.alias().to_string(),
                owner: slot.owner().to_string(),
                kind: slot.handler().kind().to_string(),
                in_flight: slot.in_flight(),
            })
            .collect()
    }

    /// Aliases owned by `owner`.
    pub fn owned_by(&self, owner: &str) -> Vec<String> {
        self.lock().owned_by(owner)
    }

    // --- Filters ---

    /// Register a filter. Returns `Ok(false)` when the same filter class is
    /// already registered under this classification; the call is then a
    /// no-op.
    pub fn register_filter(
        &self,
        filter: SharedFilter,
        spec: PathSpec,
        params: &InitParams,
        owner: &str,
    ) -> Result<bool, RegistrationError> {
        let mut held = self.lock();
        if self.filters.load().contains_class(&spec, filter.name()) {
            tracing::warn!(
                filter = %filter.name(),
                pattern = %spec,
                owner = %owner,
                "Filter already registered, ignoring"
            );
            return Ok(false);
        }

        filter.init(params).map_err(|e| RegistrationError::InitFailed {
            target: filter.name().to_string(),
            message: e.to_string(),
        })?;

        let name = filter.name().to_string();
        let inserted = self.filters.insert(&mut held, filter, spec.clone(), owner);
        drop(held);

        if inserted {
            tracing::info!(filter = %name, pattern = %spec, owner = %owner, "Filter registered");
            metrics::record_registration("register_filter");
        }
        Ok(inserted)
    }

    /// Remove every registration of this filter instance and run its
    /// destroy hook. Returns `false` if it was not registered.
    pub fn unregister_filter(&self, filter: &SharedFilter) -> bool {
        let removed = {
            let mut held = self.lock();
            self.filters.remove(&mut held, filter)
        };
        if removed.is_empty() {
            return false;
        }

        destroy_filter(filter);
        tracing::info!(filter = %filter.name(), entries = removed.len(), "Filter unregistered");
        metrics::record_registration("unregister_filter");
        true
    }

    /// Drop `filter`'s entry under exactly `spec` without running its
    /// destroy hook; the instance may still be registered elsewhere.
    pub fn remove_filter_at(&self, spec: &PathSpec, filter: &SharedFilter) -> bool {
        let removed = {
            let mut held = self.lock();
            self.filters.remove_at(&mut held, spec, filter)
        };
        if !removed.is_empty() {
            tracing::debug!(filter = %filter.name(), pattern = %spec, "Filter entry removed");
        }
        !removed.is_empty()
    }

    /// Filters that apply to `path`, in invocation order.
    pub fn build_chain_for(&self, path: &str) -> Vec<SharedFilter> {
        self.filters.build_chain_for(path)
    }

    pub fn filters(&self) -> Vec<FilterInfo> {
        self.filters.load().entries()
    }

    // --- Operational controls ---

    pub fn mark_shutdown_requested(&self) -> bool {
        self.shutdown.mark()
    }

    pub fn unmark_shutdown_requested(&self) -> bool {
        self.shutdown.unmark()
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown.is_requested()
    }

    pub fn mode(&self) -> DispatchMode {
        self.mode
    }

    pub fn error_pages(&self) -> &Arc<dyn ErrorPageRenderer> {
        &self.error_pages
    }

    /// Owners that currently hold at least one alias.
    pub fn owners(&self) -> Vec<String> {
        let owners: BTreeSet<String> = self
            .table
            .load()
            .slots()
            .map(|slot| slot.owner().to_string())
            .collect();
        owners.into_iter().collect()
    }
}

fn destroy_filter(filter: &SharedFilter) {
    let hook = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| filter.destroy()));
    if hook.is_err() {
        tracing::error!(filter = %filter.name(), "Filter destroy hook panicked");
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("aliases", &self.table.load().len())
            .field("filters", &self.filters.load().len())
            .field("mode", &self.mode)
            .field("shutdown_requested", &self.is_shutdown_requested())
            .finish()
    }
}
