use crate::db;
use crate::error::GradebookError;
use crate::ipc::helpers::{required_str, respond};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::{Path, PathBuf};

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    respond(
        req,
        Ok(json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string())
        })),
    )
}

pub fn select_workspace(state: &mut AppState, path: &Path) -> Result<(), GradebookError> {
    let conn = db::open_db(path).map_err(GradebookError::Open)?;
    // Dropping the previous connection closes it.
    state.db = Some(conn);
    state.workspace = Some(path.to_path_buf());
    tracing::info!(workspace = %path.display(), "workspace selected");
    Ok(())
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = required_str(&req.params, "path").and_then(|raw| {
        let path = PathBuf::from(raw);
        select_workspace(state, &path)?;
        Ok(json!({ "workspacePath": path.to_string_lossy() }))
    });
    respond(req, result)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        _ => None,
    }
}
