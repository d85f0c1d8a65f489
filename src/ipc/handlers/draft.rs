use crate::draft::{self, DraftMetadata, SaveOutcome};
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::setup;
use crate::ipc::helpers::{autosave, db_conn, object_param, required_str};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

/// Storage trouble surfaces as `saved: false`, never as a protocol error; the
/// console treats autosave as strictly best-effort.
fn handle_draft_save(state: &mut AppState, req: &Request) -> serde_json::Value {
    let handle = match autosave(state, req) {
        Ok(h) => h,
        Err(resp) => return resp,
    };
    let fields = match object_param(req, "fields") {
        Ok(map) => map.clone(),
        Err(resp) => return resp,
    };
    let step = match required_str(req, "step") {
        Ok(s) => s,
        Err(resp) => return resp,
    };

    let Some(outcome) = handle.save_now(fields, &step) else {
        return err(&req.id, "worker_unavailable", "autosave worker is not responding", None);
    };
    match outcome {
        SaveOutcome::Saved { saved_at, saved_at_ms } => ok(
            &req.id,
            json!({ "saved": true, "savedAt": saved_at, "savedAtMs": saved_at_ms }),
        ),
        SaveOutcome::RejectedStep => ok(
            &req.id,
            json!({ "saved": false, "reason": "step_not_allowed" }),
        ),
        SaveOutcome::Failed { message } => ok(
            &req.id,
            json!({ "saved": false, "reason": "storage_failed", "message": message }),
        ),
    }
}

fn handle_draft_load(state: &mut AppState, req: &Request) -> serde_json::Value {
    let handle = match autosave(state, req) {
        Ok(h) => h,
        Err(resp) => return resp,
    };
    let Some(result) = handle.load() else {
        return err(&req.id, "worker_unavailable", "autosave worker is not responding", None);
    };
    match result {
        Ok(Some(fields)) => ok(&req.id, json!({ "draft": fields })),
        Ok(None) => ok(&req.id, json!({ "draft": null })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_draft_clear(state: &mut AppState, req: &Request) -> serde_json::Value {
    let handle = match autosave(state, req) {
        Ok(h) => h,
        Err(resp) => return resp,
    };
    let Some(result) = handle.clear() else {
        return err(&req.id, "worker_unavailable", "autosave worker is not responding", None);
    };
    match result {
        Ok(cleared) => ok(&req.id, json!({ "cleared": cleared })),
        Err(e) => err(&req.id, "db_update_failed", e.to_string(), None),
    }
}

/// Read-only look at the persisted record: used for the restore prompt before
/// a session opens. Never deletes, even when the record is already stale.
fn handle_draft_peek(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let expiry_ms = state
        .autosave
        .as_ref()
        .map(|h| h.tuning().expiry_ms)
        .unwrap_or(draft::DEFAULT_EXPIRY_MS);

    match draft::peek_metadata(conn, expiry_ms) {
        Ok(Some(meta)) => {
            let warning_ms = setup::expiry_warning_ms(conn);
            ok(
                &req.id,
                json!({ "present": true, "metadata": metadata_json(&meta, warning_ms) }),
            )
        }
        Ok(None) => ok(&req.id, json!({ "present": false, "metadata": null })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub(super) fn metadata_json(meta: &DraftMetadata, warning_ms: i64) -> serde_json::Value {
    json!({
        "lastSaved": meta.last_saved,
        "timeUntilExpiryMs": meta.time_until_expiry_ms,
        "step": meta.step,
        "expiresSoon": meta.time_until_expiry_ms <= warning_ms
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "draft.save" => Some(handle_draft_save(state, req)),
        "draft.load" => Some(handle_draft_load(state, req)),
        "draft.clear" => Some(handle_draft_clear(state, req)),
        "draft.peek" => Some(handle_draft_peek(state, req)),
        _ => None,
    }
}
