//! Declarative modules from configuration.
//!
//! # Responsibilities
//! - Register the mounts and filters each configured module declares
//! - Reconcile on config reload: tear down removed or changed modules,
//!   register new or changed ones, leave unchanged ones alone
//!
//! # Design Decisions
//! - A module either registers completely or not at all; a failed module
//!   is torn down before the error is returned
//! - Teardown of a configured module goes through the owner-gone path, so
//!   handlers are drained but the module's hooks do not run

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::config::schema::ModuleConfig;
use crate::error::RegistrationError;
use crate::filter::builtin;
use crate::handler::{DirectoryContext, InitParams, ResourceContext};
use crate::module::context::ModuleContext;
use crate::routing::Router;

/// Failure to load one configured module.
#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("module `{module}`: unknown filter kind `{kind}`")]
    UnknownFilter { module: String, kind: String },

    #[error("module `{module}`: {source}")]
    Registration {
        module: String,
        #[source]
        source: RegistrationError,
    },
}

/// Summary of one reconcile pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReloadReport {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub replaced: Vec<String>,
    pub failed: Vec<String>,
}

/// Tracks which configured modules are currently registered.
pub struct ModuleLoader {
    router: Arc<Router>,
    loaded: HashMap<String, ModuleConfig>,
}

impl ModuleLoader {
    pub fn new(router: Arc<Router>) -> Self {
        Self {
            router,
            loaded: HashMap::new(),
        }
    }

    /// Ids of the modules currently registered, sorted.
    pub fn loaded(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.loaded.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Register one module.
    pub async fn load(&mut self, module: &ModuleConfig) -> Result<(), ModuleError> {
        if let Err(e) = self.register(module) {
            self.router.unregister_all_owned_by(&module.id).await;
            tracing::error!(module = %module.id, error = %e, "Module failed to load");
            return Err(e);
        }

        tracing::info!(
            module = %module.id,
            mounts = module.mounts.len(),
            filters = module.filters.len(),
            "Module loaded"
        );
        self.loaded.insert(module.id.clone(), module.clone());
        Ok(())
    }

    /// Register every module, continuing past failures.
    pub async fn load_all(&mut self, modules: &[ModuleConfig]) -> Vec<ModuleError> {
        let mut errors = Vec::new();
        for module in modules {
            if let Err(e) = self.load(module).await {
                errors.push(e);
            }
        }
        errors
    }

    /// Tear down one module. Returns the number of aliases removed, or
    /// `None` if it was not loaded.
    pub async fn unload(&mut self, id: &str) -> Option<usize> {
        self.loaded.remove(id)?;
        let aliases = self.router.unregister_all_owned_by(id).await;
        tracing::info!(module = %id, aliases = aliases, "Module unloaded");
        Some(aliases)
    }

    /// Bring the registered modules in line with `modules`.
    pub async fn reconcile(&mut self, modules: &[ModuleConfig]) -> ReloadReport {
        let mut report = ReloadReport::default();
        let wanted: HashMap<&str, &ModuleConfig> =
            modules.iter().map(|m| (m.id.as_str(), m)).collect();

        for id in self.loaded() {
            if !wanted.contains_key(id.as_str()) {
                self.unload(&id).await;
                report.removed.push(id);
            }
        }

        for module in modules {
            match self.loaded.get(&module.id) {
                Some(current) if current == module => continue,
                Some(_) => {
                    self.unload(&module.id).await;
                    report.replaced.push(module.id.clone());
                }
                None => report.added.push(module.id.clone()),
            }

            if self.load(module).await.is_err() {
                report.failed.push(module.id.clone());
            }
        }

        tracing::info!(
            added = report.added.len(),
            removed = report.removed.len(),
            replaced = report.replaced.len(),
            failed = report.failed.len(),
            "Modules reconciled"
        );
        report
    }

    fn register(&self, module: &ModuleConfig) -> Result<(), ModuleError> {
        let registration = |source: RegistrationError| ModuleError::Registration {
            module: module.id.clone(),
            source,
        };
        let unknown = |kind: &str| ModuleError::UnknownFilter {
            module: module.id.clone(),
            kind: kind.to_string(),
        };

        let mut ctx = ModuleContext::new(Arc::clone(&self.router), module.id.clone());
        for kind in &module.bootstrap_filters {
            let filter = builtin::from_kind(kind).ok_or_else(|| unknown(kind.as_str()))?;
            // Bootstrap filters reuse the params of a same-kind filter entry
            let params = module
                .filters
                .iter()
                .find(|f| &f.kind == kind)
                .map(|f| InitParams::from_map(f.params.clone()))
                .unwrap_or_default();
            ctx.add_bootstrap_filter(filter, params);
        }

        for mount in &module.mounts {
            let context: Arc<dyn ResourceContext> = Arc::new(DirectoryContext::new(&mount.root));
            ctx.register_resource_handler(&mount.alias, &mount.prefix, Some(context))
                .map_err(registration)?;
        }

        for filter in &module.filters {
            let instance = builtin::from_kind(&filter.kind).ok_or_else(|| unknown(filter.kind.as_str()))?;
            ctx.register_filter(
                instance,
                &filter.path,
                InitParams::from_map(filter.params.clone()),
                None,
            )
            .map_err(registration)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for ModuleLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleLoader")
            .field("loaded", &self.loaded())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{FilterConfig, MountConfig};

    fn module(id: &str, alias: &str, root: &str) -> ModuleConfig {
        ModuleConfig {
            id: id.to_string(),
            mounts: vec![MountConfig {
                alias: alias.to_string(),
                root: root.to_string(),
                prefix: String::new(),
            }],
            filters: Vec::new(),
            bootstrap_filters: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_load_registers_mounts_and_filters() {
        let router = Arc::new(Router::default());
        let mut loader = ModuleLoader::new(router.clone());

        let mut docs = module("docs", "/docs", ".");
        docs.filters.push(FilterConfig {
            kind: "access_log".into(),
            path: "/docs/*".into(),
            params: Default::default(),
        });
        docs.bootstrap_filters.push("security_headers".into());

        loader.load(&docs).await.unwrap();
        assert_eq!(router.owned_by("docs"), vec!["/docs".to_string()]);
        let names: Vec<String> = router.filters().into_iter().map(|f| f.name).collect();
        assert!(names.contains(&"access_log".to_string()));
        assert!(names.contains(&"security_headers".to_string()));
    }

    #[tokio::test]
    async fn test_failed_module_is_rolled_back() {
        let router = Arc::new(Router::default());
        let mut loader = ModuleLoader::new(router.clone());
        loader.load(&module("a", "/taken", ".")).await.unwrap();

        let mut b = module("b", "/b", ".");
        b.mounts.push(MountConfig {
            alias: "/taken".into(),
            root: ".".into(),
            prefix: String::new(),
        });

        let err = loader.load(&b).await.unwrap_err();
        assert!(matches!(err, ModuleError::Registration { .. }));
        assert!(router.owned_by("b").is_empty());
        assert_eq!(loader.loaded(), vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn test_bearer_auth_without_token_fails_init() {
        let router = Arc::new(Router::default());
        let mut loader = ModuleLoader::new(router.clone());
        let mut m = module("m", "/m", ".");
        m.filters.push(FilterConfig {
            kind: "bearer_auth".into(),
            path: "/m/*".into(),
            params: Default::default(),
        });

        let err = loader.load(&m).await.unwrap_err();
        assert!(err.to_string().contains("init failed"));
        assert!(router.aliases().is_empty());
    }

    #[tokio::test]
    async fn test_reconcile() {
        let router = Arc::new(Router::default());
        let mut loader = ModuleLoader::new(router.clone());
        loader
            .load_all(&[module("keep", "/keep", "."), module("drop", "/drop", "."), module("edit", "/edit", ".")])
            .await;

        let report = loader
            .reconcile(&[module("keep", "/keep", "."), module("edit", "/edited", "."), module("new", "/new", ".")])
            .await;

        assert_eq!(report.removed, vec!["drop".to_string()]);
        assert_eq!(report.replaced, vec!["edit".to_string()]);
        assert_eq!(report.added, vec!["new".to_string()]);
        assert!(report.failed.is_empty());

        let aliases: Vec<String> = router.aliases().into_iter().map(|a| a.alias).collect();
        assert_eq!(aliases, vec!["/edited", "/keep", "/new"]);
    }
}
