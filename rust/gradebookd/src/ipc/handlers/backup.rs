use crate::backup;
use crate::error::{GradebookError, Result};
use crate::ipc::handlers::core::select_workspace;
use crate::ipc::helpers::{required_str, respond};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

fn export_bundle(state: &AppState, req: &Request) -> Result<serde_json::Value> {
    let out = PathBuf::from(required_str(&req.params, "outPath")?);
    let workspace = state.workspace.clone().ok_or(GradebookError::NoWorkspace)?;
    let summary =
        backup::export_workspace_bundle(&workspace, &out).map_err(GradebookError::Backup)?;
    Ok(json!({
        "ok": true,
        "path": out.to_string_lossy(),
        "bundleFormat": summary.bundle_format,
        "dbSha256": summary.db_sha256,
        "dbBytes": summary.db_bytes
    }))
}

fn handle_export_workspace_bundle(state: &mut AppState, req: &Request) -> serde_json::Value {
    respond(req, export_bundle(state, req))
}

fn import_bundle(state: &mut AppState, req: &Request) -> Result<serde_json::Value> {
    let src = PathBuf::from(required_str(&req.params, "inPath")?);
    let workspace = state.workspace.clone().ok_or(GradebookError::NoWorkspace)?;
    if !src.is_file() {
        return Err(GradebookError::not_found(format!(
            "bundle file not found: {}",
            src.to_string_lossy()
        )));
    }

    // Drop the open handle before replacing the file.
    state.db = None;
    let imported = backup::import_workspace_bundle(&src, &workspace);
    // Reopen either way.
    select_workspace(state, &workspace)?;
    let summary = imported.map_err(GradebookError::Backup)?;
    Ok(json!({
        "ok": true,
        "workspacePath": workspace.to_string_lossy(),
        "bundleFormat": summary.bundle_format,
        "dbSha256": summary.db_sha256
    }))
}

fn handle_import_workspace_bundle(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = import_bundle(state, req);
    respond(req, result)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "backup.exportWorkspaceBundle" => Some(handle_export_workspace_bundle(state, req)),
        "backup.importWorkspaceBundle" => Some(handle_import_workspace_bundle(state, req)),
        _ => None,
    }
}
