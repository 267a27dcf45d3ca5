use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::filter::FilterInfo;
use crate::http::server::AppState;
use crate::routing::AliasInfo;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub uptime_secs: u64,
    pub dispatch_mode: &'static str,
    pub shutdown_requested: bool,
    pub aliases: usize,
    pub filters: usize,
    pub modules: Vec<String>,
}

#[derive(Deserialize)]
pub struct AliasQuery {
    pub prefix: Option<String>,
}

#[derive(Serialize)]
pub struct ShutdownState {
    pub shutdown_requested: bool,
    pub changed: bool,
}

#[derive(Serialize)]
pub struct UnloadResult {
    pub module: String,
    pub aliases_removed: usize,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    let router = &state.router;
    let shutdown_requested = router.is_shutdown_requested();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: if shutdown_requested { "draining" } else { "operational" },
        uptime_secs: state.started_at.elapsed().as_secs(),
        dispatch_mode: match router.mode() {
            crate::config::DispatchMode::Hierarchical => "hierarchical",
            crate::config::DispatchMode::SingleLevel => "single_level",
        },
        shutdown_requested,
        aliases: router.aliases().len(),
        filters: router.filters().len(),
        modules: router.owners(),
    })
}

pub async fn get_aliases(
    State(state): State<AppState>,
    Query(query): Query<AliasQuery>,
) -> Json<Vec<AliasInfo>> {
    let aliases = match query.prefix.as_deref() {
        Some(prefix) => state.router.aliases_under(prefix),
        None => state.router.aliases(),
    };
    Json(aliases)
}

pub async fn get_filters(State(state): State<AppState>) -> Json<Vec<FilterInfo>> {
    Json(state.router.filters())
}

pub async fn mark_shutdown(State(state): State<AppState>) -> Json<ShutdownState> {
    let changed = state.router.mark_shutdown_requested();
    Json(ShutdownState {
        shutdown_requested: true,
        changed,
    })
}

pub async fn unmark_shutdown(State(state): State<AppState>) -> Json<ShutdownState> {
    let changed = state.router.unmark_shutdown_requested();
    Json(ShutdownState {
        shutdown_requested: false,
        changed,
    })
}

/// Tear down everything a module registered, configured or not.
pub async fn unload_module(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<UnloadResult>, StatusCode> {
    let configured = state.modules.lock().await.unload(&id).await;
    let aliases_removed = match configured {
        Some(removed) => removed,
        None => state.router.unregister_all_owned_by(&id).await,
    };

    if configured.is_none() && aliases_removed == 0 {
        return Err(StatusCode::NOT_FOUND);
    }

    tracing::info!(module = %id, "Module unloaded through admin API");
    Ok(Json(UnloadResult {
        module: id,
        aliases_removed,
    }))
}
