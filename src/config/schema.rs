//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the router.
//! All types derive Serde traits for deserialization from config files.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Root configuration for the router.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct RouterConfig {
    /// Listener configuration (bind address, connection limit).
    pub listener: ListenerConfig,

    /// Dispatch behaviour.
    pub dispatch: DispatchConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API settings.
    pub admin: AdminConfig,

    /// Generated error pages.
    pub error_pages: ErrorPageConfig,

    /// Modules registered at start-up and reconciled on reload.
    pub modules: Vec<ModuleConfig>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum concurrent in-flight requests (backpressure).
    pub max_connections: usize,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_connections: 10_000,
            max_body_bytes: 2 * 1024 * 1024,
        }
    }
}

/// How far the dispatcher walks up the path when no exact alias matches.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// Walk every `/` boundary up to the root alias.
    #[default]
    Hierarchical,
    /// Exact match, then a single fallback to the parent alias.
    SingleLevel,
}

/// Dispatch configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct DispatchConfig {
    /// Fallback mode.
    pub mode: DispatchMode,

    /// Filter class names in invocation order; unnamed filters run after.
    pub filter_priority: Vec<String>,
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

/// Error page configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ErrorPageConfig {
    /// Server name printed in the page footer.
    pub server_name: String,
}

impl Default for ErrorPageConfig {
    fn default() -> Self {
        Self {
            server_name: "hotswap-router".to_string(),
        }
    }
}

/// A declaratively configured module.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ModuleConfig {
    /// Owner id for every registration the module makes.
    pub id: String,

    /// Directories served under an alias.
    #[serde(default)]
    pub mounts: Vec<MountConfig>,

    /// Filters the module registers.
    #[serde(default)]
    pub filters: Vec<FilterConfig>,

    /// Filter kinds applied to every handler this module registers.
    #[serde(default)]
    pub bootstrap_filters: Vec<String>,
}

/// Directory served through a resource handler.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct MountConfig {
    /// Alias to register.
    pub alias: String,

    /// Directory on disk.
    pub root: String,

    /// Resource name prefix prepended to the path info.
    #[serde(default)]
    pub prefix: String,
}

/// Built-in filter attached by kind.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct FilterConfig {
    /// Built-in filter kind (`access_log`, `security_headers`, `bearer_auth`).
    pub kind: String,

    /// Pattern: `/*`, `/prefix/*` or an exact path.
    #[serde(default = "default_filter_path")]
    pub path: String,

    /// Init parameters.
    #[serde(default)]
    pub params: HashMap<String, String>,
}

fn default_filter_path() -> String {
    "/*".to_string()
}
