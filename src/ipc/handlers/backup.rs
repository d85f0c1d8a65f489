use crate::autosave;
use crate::backup;
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::setup;
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;
use tracing::info;

fn handle_export_workspace_bundle(state: &mut AppState, req: &Request) -> serde_json::Value {
    let out_path = match req.params.get("outPath").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing outPath", None),
    };
    let workspace_path = req
        .params
        .get("workspacePath")
        .and_then(|v| v.as_str())
        .map(PathBuf::from)
        .or_else(|| state.workspace.clone());
    let Some(workspace_path) = workspace_path else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    // Quiesce the writer while the file is copied. The worker is respawned
    // afterwards and re-arms from the persisted record.
    let exporting_open_workspace = state.workspace.as_deref() == Some(workspace_path.as_path());
    if exporting_open_workspace {
        if let Some(worker) = state.autosave.take() {
            worker.shutdown();
        }
        if let Some(conn) = state.db.as_ref() {
            let _ = conn.execute_batch("PRAGMA wal_checkpoint(FULL)");
        }
    }

    let out = PathBuf::from(&out_path);
    let export = backup::export_workspace_bundle(&workspace_path, &out);

    if exporting_open_workspace {
        if let Some(conn) = state.db.as_ref() {
            let tuning = setup::autosave_tuning(conn);
            match autosave::spawn(&workspace_path, tuning) {
                Ok(worker) => state.autosave = Some(worker),
                Err(e) => return err(&req.id, "db_open_failed", format!("{e:?}"), None),
            }
        }
    }

    match export {
        Ok(summary) => {
            info!(path = %out_path, "workspace bundle exported");
            ok(
                &req.id,
                json!({
                    "ok": true,
                    "path": out_path,
                    "bundleFormat": summary.bundle_format,
                    "entryCount": summary.entry_count
                }),
            )
        }
        Err(e) => err(
            &req.id,
            "io_failed",
            e.to_string(),
            Some(json!({ "path": out_path })),
        ),
    }
}

fn handle_import_workspace_bundle(state: &mut AppState, req: &Request) -> serde_json::Value {
    let in_path = match req.params.get("inPath").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing inPath", None),
    };
    let workspace_path = req
        .params
        .get("workspacePath")
        .and_then(|v| v.as_str())
        .map(PathBuf::from)
        .or_else(|| state.workspace.clone());
    let Some(workspace_path) = workspace_path else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let src = PathBuf::from(&in_path);
    if !src.is_file() {
        return err(
            &req.id,
            "not_found",
            "bundle file not found",
            Some(json!({ "path": in_path })),
        );
    }
    if let Err(e) = std::fs::create_dir_all(&workspace_path) {
        return err(
            &req.id,
            "io_failed",
            e.to_string(),
            Some(json!({ "path": workspace_path.to_string_lossy() })),
        );
    }

    // Drop every open handle before replacing the file. A failed import leaves
    // the workspace closed; the console re-selects it.
    if let Some(worker) = state.autosave.take() {
        worker.shutdown();
    }
    state.session = None;
    state.db = None;

    let import = match backup::import_workspace_bundle(&src, &workspace_path) {
        Ok(v) => v,
        Err(e) => {
            return err(
                &req.id,
                "bad_bundle",
                e.to_string(),
                Some(json!({ "path": src.to_string_lossy() })),
            )
        }
    };

    let conn = match db::open_db(&workspace_path) {
        Ok(conn) => conn,
        Err(e) => return err(&req.id, "db_open_failed", e.to_string(), None),
    };
    let tuning = setup::autosave_tuning(&conn);
    let worker = match autosave::spawn(&workspace_path, tuning) {
        Ok(handle) => handle,
        Err(e) => return err(&req.id, "db_open_failed", format!("{e:?}"), None),
    };

    info!(workspace = %workspace_path.to_string_lossy(), "workspace bundle imported");
    state.workspace = Some(workspace_path.clone());
    state.db = Some(conn);
    state.autosave = Some(worker);
    ok(
        &req.id,
        json!({
            "ok": true,
            "workspacePath": workspace_path.to_string_lossy(),
            "bundleFormatDetected": import.bundle_format_detected
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "backup.exportWorkspaceBundle" => Some(handle_export_workspace_bundle(state, req)),
        "backup.importWorkspaceBundle" => Some(handle_import_workspace_bundle(state, req)),
        _ => None,
    }
}
