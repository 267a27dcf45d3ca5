//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate aliases and filter patterns with the router's own rules
//! - Detect duplicate module ids and aliases claimed twice
//! - Validate value ranges (timeouts > 0, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RouterConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::RouterConfig;
use crate::filter::builtin::KNOWN_KINDS;
use crate::filter::PathSpec;
use crate::routing::alias::validate_alias;

/// One semantic problem in a configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid address `{value}` for {field}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("duplicate module id `{0}`")]
    DuplicateModule(String),

    #[error("module `{module}`: {reason}")]
    InvalidAlias { module: String, reason: String },

    #[error("alias `{alias}` is claimed by more than one mount")]
    DuplicateAlias { alias: String },

    #[error("module `{module}`: unknown filter kind `{kind}`")]
    UnknownFilter { module: String, kind: String },

    #[error("module `{module}`: invalid filter pattern `{pattern}`")]
    InvalidPattern { module: String, pattern: String },
}

/// Validate a parsed configuration.
pub fn validate_config(config: &RouterConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if config.admin.enabled {
        check_address(&mut errors, "admin.bind_address", &config.admin.bind_address);
    }
    if config.observability.metrics_enabled {
        check_address(&mut errors, "observability.metrics_address", &config.observability.metrics_address);
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::Zero { field: "timeouts.request_secs" });
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::Zero { field: "listener.max_connections" });
    }
    if config.listener.max_body_bytes == 0 {
        errors.push(ValidationError::Zero { field: "listener.max_body_bytes" });
    }

    let mut ids = HashSet::new();
    let mut aliases = HashSet::new();
    for module in &config.modules {
        if !ids.insert(module.id.as_str()) {
            errors.push(ValidationError::DuplicateModule(module.id.clone()));
        }

        for mount in &module.mounts {
            if let Err(e) = validate_alias(&mount.alias) {
                errors.push(ValidationError::InvalidAlias {
                    module: module.id.clone(),
                    reason: e.to_string(),
                });
            } else if !aliases.insert(mount.alias.as_str()) {
                errors.push(ValidationError::DuplicateAlias {
                    alias: mount.alias.clone(),
                });
            }
        }

        let kinds = module
            .filters
            .iter()
            .map(|f| f.kind.as_str())
            .chain(module.bootstrap_filters.iter().map(String::as_str));
        for kind in kinds {
            if !KNOWN_KINDS.contains(&kind) {
                errors.push(ValidationError::UnknownFilter {
                    module: module.id.clone(),
                    kind: kind.to_string(),
                });
            }
        }

        for filter in &module.filters {
            if PathSpec::parse(&filter.path).is_err() {
                errors.push(ValidationError::InvalidPattern {
                    module: module.id.clone(),
                    pattern: filter.path.clone(),
                });
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{FilterConfig, ModuleConfig, MountConfig};

    fn module(id: &str, aliases: &[&str]) -> ModuleConfig {
        ModuleConfig {
            id: id.to_string(),
            mounts: aliases
                .iter()
                .map(|a| MountConfig {
                    alias: a.to_string(),
                    root: ".".into(),
                    prefix: String::new(),
                })
                .collect(),
            filters: Vec::new(),
            bootstrap_filters: Vec::new(),
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&RouterConfig::default()).is_ok());
    }

    #[test]
    fn test_reports_all_errors() {
        let mut config = RouterConfig::default();
        config.listener.bind_address = "not-an-address".into();
        config.timeouts.request_secs = 0;
        config.modules.push(module("a", &["/x", "bad", "/y/"]));
        config.modules.push(module("a", &["/x"]));

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::Zero { field: "timeouts.request_secs" }));
        assert!(errors.contains(&ValidationError::DuplicateModule("a".into())));
        assert!(errors.contains(&ValidationError::DuplicateAlias { alias: "/x".into() }));
        assert_eq!(
            errors
                .iter()
                .filter(|e| matches!(e, ValidationError::InvalidAlias { .. }))
                .count(),
            2
        );
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::InvalidAddress { .. })));
    }

    #[test]
    fn test_unknown_filter_and_bad_pattern() {
        let mut config = RouterConfig::default();
        let mut m = module("m", &[]);
        m.filters.push(FilterConfig {
            kind: "gzip".into(),
            path: "no-slash".into(),
            params: Default::default(),
        });
        m.bootstrap_filters.push("access_log".into());
        config.modules.push(m);

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors.contains(&ValidationError::UnknownFilter {
            module: "m".into(),
            kind: "gzip".into()
        }));
    }
}
