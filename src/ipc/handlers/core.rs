use crate::db;
use crate::error::AppResult;
use crate::ipc::helpers::{required_str, respond};
use crate::ipc::types::{AppState, Request};
use crate::session::SessionStore;
use anyhow::Context;
use serde_json::json;
use std::path::{Path, PathBuf};

fn handle_health(state: &mut AppState, _req: &Request) -> AppResult<serde_json::Value> {
    let (hits, misses) = state.cache.stats();
    Ok(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
        "activeQuarterId": state.session.active().map(|q| q.id.clone()),
        "guard": state.guard.state().label(),
        "cache": { "hits": hits, "misses": misses },
    }))
}

/// Opens (creating if needed) the workspace database and resets every piece
/// of per-workspace state.
pub fn open_workspace(state: &mut AppState, path: &Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(path)
        .with_context(|| format!("failed to create workspace {}", path.to_string_lossy()))?;
    let conn = db::open_db(path)?;
    let mut config = state.base_config.clone();
    if config.merge_workspace_file(path)? {
        log::info!("applied workspace config from {}", path.to_string_lossy());
    }
    let session = SessionStore::load(&conn)?;

    state.auth.reset();
    state.cache.clear();
    state.attendance_sheet = None;
    state.config = config;
    state.session = session;
    state.db = Some(conn);
    state.workspace = Some(path.to_path_buf());
    log::info!(
        "workspace opened at {} (active quarter: {})",
        path.to_string_lossy(),
        state
            .session
            .active()
            .map(|q| q.name.as_str())
            .unwrap_or("none")
    );
    Ok(())
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let path = PathBuf::from(required_str(&req.params, "path")?);
    open_workspace(state, &path)?;
    Ok(json!({
        "workspacePath": path.to_string_lossy(),
        "activeQuarter": state.session.active(),
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "health" => handle_health(state, req),
        "workspace.select" => handle_workspace_select(state, req),
        _ => return None,
    };
    Some(respond(&req.id, &req.method, result))
}
