//! Module-local registration facade.
//!
//! Every registrant talks to the router through a `ModuleContext` bound to
//! its owner id, so ownership checks never depend on the caller passing the
//! right id.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::RegistrationError;
use crate::filter::PathSpec;
use crate::handler::{
    DirectoryContext, Handler, InitParams, ResourceContext, ResourceHandler, SharedFilter,
};
use crate::routing::Router;

/// A filter applied to every handler the module registers.
#[derive(Clone)]
struct BootstrapFilter {
    filter: SharedFilter,
    params: InitParams,
}

/// Registration facade for one module.
pub struct ModuleContext {
    id: String,
    router: Arc<Router>,
    resources: Arc<dyn ResourceContext>,
    bootstrap: Vec<BootstrapFilter>,
    /// Bootstrap instances this facade inserted, by alias.
    applied: Mutex<HashMap<String, Vec<SharedFilter>>>,
}

impl ModuleContext {
    /// Facade for `id`, serving resources from the working directory unless
    /// another context is set.
    pub fn new(router: Arc<Router>, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            router,
            resources: Arc::new(DirectoryContext::new(".")),
            bootstrap: Vec::new(),
            applied: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_resource_context(mut self, context: Arc<dyn ResourceContext>) -> Self {
        self.resources = context;
        self
    }

    /// Apply `filter` to every handler registered from now on.
    pub fn add_bootstrap_filter(&mut self, filter: SharedFilter, params: InitParams) {
        self.bootstrap.push(BootstrapFilter { filter, params });
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    pub fn resource_context(&self) -> &Arc<dyn ResourceContext> {
        &self.resources
    }

    /// Register a handler under `alias`.
    ///
    /// `context` overrides the module's resource context for this
    /// registration; its description is passed to `init`.
    pub fn register_handler(
        &self,
        alias: &str,
        handler: Arc<dyn Handler>,
        params: InitParams,
        context: Option<Arc<dyn ResourceContext>>,
    ) -> Result<(), RegistrationError> {
        let mut params = params;
        let context = context.unwrap_or_else(|| Arc::clone(&self.resources));
        params.set_resource_context(context.describe());

        let mut applied = self.applied();
        self.router.register(alias, handler, &params, &self.id)?;
        self.apply_bootstrap(alias, &mut applied);
        Ok(())
    }

    /// Serve `prefix + path_info` from `context` (or the module's own
    /// resource context) under `alias`.
    pub fn register_resource_handler(
        &self,
        alias: &str,
        prefix: &str,
        context: Option<Arc<dyn ResourceContext>>,
    ) -> Result<(), RegistrationError> {
        let context = context.unwrap_or_else(|| Arc::clone(&self.resources));
        let handler = Arc::new(ResourceHandler::new(prefix, Arc::clone(&context)));
        self.register_handler(alias, handler, InitParams::new(), Some(context))
    }

    /// Register a filter for `pattern` (`/*`, `/p/*` or an exact path).
    ///
    /// Returns `Ok(false)` when the same filter class is already registered
    /// for that pattern.
    pub fn register_filter(
        &self,
        filter: SharedFilter,
        pattern: &str,
        params: InitParams,
        context: Option<Arc<dyn ResourceContext>>,
    ) -> Result<bool, RegistrationError> {
        let spec = PathSpec::parse(pattern)?;
        let mut params = params;
        let context = context.unwrap_or_else(|| Arc::clone(&self.resources));
        params.set_resource_context(context.describe());

        self.router.register_filter(filter, spec, &params, &self.id)
    }

    /// Unregister one of this module's aliases, running its destroy hook.
    ///
    /// Bootstrap filters this facade applied for `alias` go with it. Filters
    /// registered explicitly stay.
    pub async fn unregister(&self, alias: &str) -> Result<(), RegistrationError> {
        self.router.unregister(alias, &self.id).await?;

        let mut applied = self.applied();
        if self.router.owned_by(&self.id).iter().any(|owned| owned == alias) {
            // Registered again while the old handler drained; the new one
            // keeps the shared entries.
            return Ok(());
        }
        let spec = PathSpec::Prefix(alias.to_string());
        for filter in applied.remove(alias).unwrap_or_default() {
            self.router.remove_filter_at(&spec, &filter);
        }
        Ok(())
    }

    pub fn unregister_filter(&self, filter: &SharedFilter) -> bool {
        self.router.unregister_filter(filter)
    }

    /// Tear down every alias and filter this module registered.
    pub async fn unregister_all_owned(&self) -> usize {
        let removed = self.router.unregister_all_owned_by(&self.id).await;
        self.applied().clear();
        removed
    }

    /// Aliases this module currently owns.
    pub fn aliases(&self) -> Vec<String> {
        self.router.owned_by(&self.id)
    }

    fn applied(&self) -> MutexGuard<'_, HashMap<String, Vec<SharedFilter>>> {
        self.applied.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn apply_bootstrap(&self, alias: &str, applied: &mut HashMap<String, Vec<SharedFilter>>) {
        for entry in &self.bootstrap {
            let spec = PathSpec::Prefix(alias.to_string());
            match self
                .router
                .register_filter(entry.filter.clone(), spec, &entry.params, &self.id)
            {
                Ok(true) => applied
                    .entry(alias.to_string())
                    .or_default()
                    .push(entry.filter.clone()),
                Ok(false) => {}
                Err(e) => tracing::error!(
                    module = %self.id,
                    alias = %alias,
                    filter = %entry.filter.name(),
                    error = %e,
                    "Failed to apply bootstrap filter"
                ),
            }
        }
    }
}

impl std::fmt::Debug for ModuleContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleContext")
            .field("id", &self.id)
            .field("resources", &self.resources.describe())
            .field("bootstrap", &self.bootstrap.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceResult;
    use crate::filter::FilterChain;
    use crate::handler::Filter;
    use crate::http::{RouterRequest, RouterResponse};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Option<String>>,
    }

    #[async_trait]
    impl Handler for Recorder {
        fn init(&self, params: &InitParams) -> ServiceResult {
            *self.seen.lock().unwrap() = params.resource_context().map(str::to_string);
            Ok(())
        }

        async fn service(&self, _req: &mut RouterRequest, _resp: &mut RouterResponse) -> ServiceResult {
            Ok(())
        }
    }

    struct Pass;

    #[async_trait]
    impl Filter for Pass {
        async fn do_filter(
            &self,
            req: &mut RouterRequest,
            resp: &mut RouterResponse,
            chain: &mut FilterChain,
        ) -> ServiceResult {
            chain.proceed(req, resp).await
        }

        fn name(&self) -> &str {
            "pass"
        }
    }

    #[tokio::test]
    async fn test_ownership_is_bound_to_context() {
        let router = Arc::new(Router::default());
        let a = ModuleContext::new(router.clone(), "a");
        let b = ModuleContext::new(router.clone(), "b");

        a.register_handler("/x", Arc::new(Recorder::default()), InitParams::new(), None)
            .unwrap();

        let err = b.unregister("/x").await.unwrap_err();
        assert!(matches!(err, RegistrationError::NotOwner { .. }));
        assert!(router.lookup("/x").is_some());

        a.unregister("/x").await.unwrap();
        assert!(router.lookup("/x").is_none());
    }

    #[tokio::test]
    async fn test_init_sees_resource_context() {
        let router = Arc::new(Router::default());
        let ctx = ModuleContext::new(router, "m")
            .with_resource_context(Arc::new(DirectoryContext::new("/srv/www")));
        let handler = Arc::new(Recorder::default());

        ctx.register_handler("/x", handler.clone(), InitParams::new(), None)
            .unwrap();
        assert_eq!(handler.seen.lock().unwrap().as_deref(), Some("dir:/srv/www"));
    }

    #[tokio::test]
    async fn test_bootstrap_filters_follow_handlers() {
        let router = Arc::new(Router::default());
        let mut ctx = ModuleContext::new(router.clone(), "m");
        ctx.add_bootstrap_filter(Arc::new(Pass), InitParams::new());

        ctx.register_handler("/a", Arc::new(Recorder::default()), InitParams::new(), None)
            .unwrap();
        ctx.register_handler("/b", Arc::new(Recorder::default()), InitParams::new(), None)
            .unwrap();

        assert_eq!(router.build_chain_for("/a/deep").len(), 1);
        assert_eq!(router.build_chain_for("/b").len(), 1);
        assert!(router.build_chain_for("/c").is_empty());

        ctx.unregister("/a").await.unwrap();
        assert!(router.build_chain_for("/a/deep").is_empty());
        assert_eq!(router.build_chain_for("/b").len(), 1);
    }

    struct Named(&'static str);

    #[async_trait]
    impl Filter for Named {
        async fn do_filter(
            &self,
            req: &mut RouterRequest,
            resp: &mut RouterResponse,
            chain: &mut FilterChain,
        ) -> ServiceResult {
            chain.proceed(req, resp).await
        }

        fn name(&self) -> &str {
            self.0
        }
    }

    fn chain_names(router: &Router, path: &str) -> Vec<String> {
        router
            .build_chain_for(path)
            .iter()
            .map(|f| f.name().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_unregister_keeps_explicit_filters() {
        let router = Arc::new(Router::default());
        let mut ctx = ModuleContext::new(router.clone(), "m");
        ctx.add_bootstrap_filter(Arc::new(Named("boot")), InitParams::new());

        ctx.register_handler("/api", Arc::new(Recorder::default()), InitParams::new(), None)
            .unwrap();
        ctx.register_handler("/api/v1", Arc::new(Recorder::default()), InitParams::new(), None)
            .unwrap();
        ctx.register_filter(Arc::new(Named("auth")), "/api/*", InitParams::new(), None)
            .unwrap();
        assert_eq!(chain_names(&router, "/api/v1/x"), vec!["boot", "auth"]);

        ctx.unregister("/api").await.unwrap();
        assert_eq!(chain_names(&router, "/api/v1/x"), vec!["boot", "auth"]);
        assert_eq!(chain_names(&router, "/api/other"), vec!["auth"]);
    }

    #[tokio::test]
    async fn test_reregister_while_draining_keeps_bootstrap() {
        let router = Arc::new(Router::default());
        let mut ctx = ModuleContext::new(router.clone(), "m");
        ctx.add_bootstrap_filter(Arc::new(Named("boot")), InitParams::new());
        let ctx = Arc::new(ctx);

        ctx.register_handler("/a", Arc::new(Recorder::default()), InitParams::new(), None)
            .unwrap();
        let in_flight = router.lookup("/a").unwrap().acquire().await.unwrap();

        let unregister = {
            let ctx = Arc::clone(&ctx);
            tokio::spawn(async move { ctx.unregister("/a").await })
        };
        while router.lookup("/a").is_some() {
            tokio::task::yield_now().await;
        }

        ctx.register_handler("/a", Arc::new(Recorder::default()), InitParams::new(), None)
            .unwrap();
        drop(in_flight);
        unregister.await.unwrap().unwrap();

        assert!(router.lookup("/a").is_some());
        assert_eq!(chain_names(&router, "/a/x"), vec!["boot"]);

        ctx.unregister("/a").await.unwrap();
        assert!(chain_names(&router, "/a/x").is_empty());
    }

    #[tokio::test]
    async fn test_unregister_all_owned_clears_filters() {
        let router = Arc::new(Router::default());
        let ctx = ModuleContext::new(router.clone(), "m");
        ctx.register_resource_handler("/static", "", None).unwrap();
        ctx.register_filter(Arc::new(Pass), "/static/*", InitParams::new(), None)
            .unwrap();

        assert_eq!(ctx.aliases(), vec!["/static".to_string()]);
        assert_eq!(ctx.unregister_all_owned().await, 1);
        assert!(router.aliases().is_empty());
        assert!(router.filters().is_empty());
    }

    #[test]
    fn test_bad_pattern_is_rejected() {
        let ctx = ModuleContext::new(Arc::new(Router::default()), "m");
        let err = ctx
            .register_filter(Arc::new(Pass), "no-slash/*", InitParams::new(), None)
            .unwrap_err();
        assert!(matches!(err, RegistrationError::InvalidFilterPattern(_)));
    }
}
