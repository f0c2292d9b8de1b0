use crate::backup;
use crate::db;
use crate::ipc::helpers::{caller, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::policy::Role;
use serde_json::json;
use std::path::PathBuf;

fn require_admin(state: &AppState, what: &str) -> Result<(), HandlerErr> {
    let who = caller(state)?;
    who.require_role(&[Role::Admin], what)?;
    Ok(())
}

fn path_param(req: &Request, key: &str) -> Result<String, HandlerErr> {
    match req.params.get(key).and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(HandlerErr::new("bad_params", format!("missing {}", key))),
    }
}

fn workspace_path(state: &AppState) -> Result<PathBuf, HandlerErr> {
    state
        .workspace
        .clone()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

fn export_bundle(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    require_admin(state, "backup.exportWorkspaceBundle")?;
    let out_path = path_param(req, "outPath")?;
    let workspace = workspace_path(state)?;

    if let Some(conn) = state.db.as_ref() {
        let _ = conn.execute_batch("PRAGMA wal_checkpoint(FULL)");
    }

    let export = backup::export_workspace_bundle(&workspace, &PathBuf::from(&out_path)).map_err(|e| {
        log::error!("event=backup_export module=backup status=error error={e:?}");
        HandlerErr::new("io_failed", e.to_string()).with_details(json!({ "path": out_path }))
    })?;
    log::info!(
        "event=backup_export module=backup status=ok entries={}",
        export.entry_count
    );
    Ok(json!({
        "path": out_path,
        "bundleFormat": export.bundle_format,
        "entryCount": export.entry_count,
        "dbSha256": export.db_sha256,
    }))
}

fn import_bundle(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    require_admin(state, "backup.importWorkspaceBundle")?;
    let in_path = path_param(req, "inPath")?;
    let workspace = workspace_path(state)?;

    let src = PathBuf::from(&in_path);
    if !src.is_file() {
        return Err(HandlerErr::new("not_found", "bundle file not found")
            .with_details(json!({ "path": in_path })));
    }

    // Drop open handle before replacing file.
    state.db = None;
    let imported = backup::import_workspace_bundle(&src, &workspace);

    // Reopen whichever database is now on disk, restored or not.
    let conn = db::open_db(&workspace).map_err(|e| HandlerErr::new("db_open_failed", e.to_string()))?;
    state.db = Some(conn);

    let import = imported.map_err(|e| {
        log::error!("event=backup_import module=backup status=error error={e:?}");
        HandlerErr::new("io_failed", e.to_string()).with_details(json!({ "path": in_path }))
    })?;
    log::info!(
        "event=backup_import module=backup status=ok format={}",
        import.bundle_format_detected
    );
    Ok(json!({
        "workspacePath": workspace.to_string_lossy(),
        "bundleFormatDetected": import.bundle_format_detected,
    }))
}

fn handle_backup_export_workspace_bundle(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = export_bundle(state, req);
    respond(&req.id, result)
}

fn handle_backup_import_workspace_bundle(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = import_bundle(state, req);
    respond(&req.id, result)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "backup.exportWorkspaceBundle" => Some(handle_backup_export_workspace_bundle(state, req)),
        "backup.importWorkspaceBundle" => Some(handle_backup_import_workspace_bundle(state, req)),
        _ => None,
    }
}
