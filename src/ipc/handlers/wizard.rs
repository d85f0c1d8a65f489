use crate::draft;
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::draft::metadata_json;
use crate::ipc::handlers::setup;
use crate::ipc::helpers::{autosave, db_conn, object_param, required_str};
use crate::ipc::types::{AppState, Request};
use crate::progress::{self, ProgressTuning};
use crate::wizard::{WizardMode, WizardSession, STEP_COUNT};
use serde_json::json;
use tracing::info;

const RESTORE_NOTICE: &str = "đã khôi phục phiên làm việc trước";

fn current_tuning(state: &AppState) -> ProgressTuning {
    state
        .db
        .as_ref()
        .map(setup::progress_tuning)
        .unwrap_or_default()
}

fn handle_wizard_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    let mode_raw = match required_str(req, "mode") {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let Some(mode) = WizardMode::parse(&mode_raw) else {
        return err(&req.id, "bad_params", "mode must be one of: create, edit", None);
    };
    let handle = match autosave(state, req) {
        Ok(h) => h,
        Err(resp) => return resp,
    };

    let Some(loaded) = handle.load() else {
        return err(&req.id, "worker_unavailable", "autosave worker is not responding", None);
    };
    let restored_fields = match loaded {
        Ok(fields) => fields,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let expiry_ms = handle.tuning().expiry_ms;

    let mut session = WizardSession::new(mode);
    if let Some(fields) = restored_fields {
        session.draft.fields = fields;
        session.restored = true;
        // Resume at the step the draft was last saved on.
        if let Ok(conn) = db_conn(state, req) {
            if let Ok(Some(meta)) = draft::peek_metadata(conn, expiry_ms) {
                session.current_step = meta
                    .step
                    .parse::<usize>()
                    .ok()
                    .filter(|s| *s < STEP_COUNT)
                    .unwrap_or(0);
            }
        }
    }

    let response = json!({
        "mode": session.mode.as_str(),
        "currentStep": session.current_step,
        "restored": session.restored,
        "notice": if session.restored { json!(RESTORE_NOTICE) } else { json!(null) },
        "fields": session.draft.fields,
    });
    info!(mode = mode.as_str(), restored = session.restored, "wizard session opened");
    state.session = Some(session);
    ok(&req.id, response)
}

/// Merges form edits into the session immediately; persistence is a debounced
/// side effect and its failure never rolls the merge back.
fn handle_wizard_fields_changed(state: &mut AppState, req: &Request) -> serde_json::Value {
    let fields = match object_param(req, "fields") {
        Ok(map) => map.clone(),
        Err(resp) => return resp,
    };
    let Some(session) = state.session.as_mut() else {
        return err(&req.id, "no_session", "open a wizard session first", None);
    };

    session.draft.merge_fields(&fields);
    let step = session.current_step.to_string();
    let snapshot = session.draft.fields.clone();

    let scheduled = if draft::step_allows_save(&step) {
        state
            .autosave
            .as_ref()
            .map(|h| h.schedule_save(snapshot, &step))
            .unwrap_or(false)
    } else {
        false
    };

    ok(&req.id, json!({ "merged": true, "autosaveScheduled": scheduled }))
}

fn handle_wizard_set_step(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(target) = req.params.get("step").and_then(|v| v.as_i64()) else {
        return err(&req.id, "bad_params", "missing step", None);
    };
    if target < 0 || target as usize >= STEP_COUNT {
        return err(
            &req.id,
            "bad_params",
            format!("step must be in 0..={}", STEP_COUNT - 1),
            None,
        );
    }
    let target = target as usize;
    let tuning = current_tuning(state);

    let Some(session) = state.session.as_ref() else {
        return err(&req.id, "no_session", "open a wizard session first", None);
    };
    let current = session.current_step;

    // Moving backward is always allowed; moving forward requires every step
    // on the way to clear its gate.
    if target > current {
        let steps = progress::evaluate_steps(&session.draft, session.mode, &tuning);
        for step in steps.iter().take(target).skip(current) {
            if !step.can_proceed {
                let blocked = serde_json::to_value(step).unwrap_or(json!(null));
                return ok(
                    &req.id,
                    json!({ "accepted": false, "currentStep": current, "blockedBy": blocked }),
                );
            }
        }
    }

    let snapshot = session.draft.fields.clone();
    if let Some(session) = state.session.as_mut() {
        session.current_step = target;
    }

    // Navigation persists the draft right away on saveable steps.
    let step_str = target.to_string();
    let mut autosaved = false;
    if draft::step_allows_save(&step_str) {
        if let Some(handle) = state.autosave.as_ref() {
            if let Some(draft::SaveOutcome::Saved { .. }) = handle.save_now(snapshot, &step_str) {
                autosaved = true;
            }
        }
    }

    ok(
        &req.id,
        json!({ "accepted": true, "currentStep": target, "autosaved": autosaved }),
    )
}

fn handle_wizard_status(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let expiry_ms = state
        .autosave
        .as_ref()
        .map(|h| h.tuning().expiry_ms)
        .unwrap_or(draft::DEFAULT_EXPIRY_MS);
    let warning_ms = setup::expiry_warning_ms(conn);

    let draft_meta = match draft::peek_metadata(conn, expiry_ms) {
        Ok(Some(meta)) => json!({ "present": true, "metadata": metadata_json(&meta, warning_ms) }),
        Ok(None) => json!({ "present": false, "metadata": null }),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let autosave_status = state.autosave.as_ref().map(|h| {
        let st = h.status();
        json!({
            "pendingSave": st.pending_save,
            "lastSavedAt": st.last_saved_at,
            "armed": st.armed,
            "expiredCount": st.expired_count,
            "lastError": st.last_error,
        })
    });

    let session_part = match state.session.as_ref() {
        Some(session) => json!({
            "sessionOpen": true,
            "mode": session.mode.as_str(),
            "currentStep": session.current_step,
            "restored": session.restored,
        }),
        None => json!({ "sessionOpen": false, "mode": null, "currentStep": null, "restored": null }),
    };

    let mut result = session_part;
    result["autosave"] = autosave_status.unwrap_or(json!(null));
    result["draft"] = draft_meta;
    ok(&req.id, result)
}

/// Discards both the in-memory session and the persisted record.
fn handle_wizard_reset(state: &mut AppState, req: &Request) -> serde_json::Value {
    if state.session.is_none() {
        return err(&req.id, "no_session", "open a wizard session first", None);
    }
    let handle = match autosave(state, req) {
        Ok(h) => h,
        Err(resp) => return resp,
    };
    let Some(result) = handle.clear() else {
        return err(&req.id, "worker_unavailable", "autosave worker is not responding", None);
    };
    let cleared = match result {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_update_failed", e.to_string(), None),
    };
    if let Some(session) = state.session.as_mut() {
        session.reset();
    }
    ok(&req.id, json!({ "reset": true, "cleared": cleared }))
}

/// Ends the session but keeps the persisted draft so the lecturer can resume
/// later; only a queued-but-unflushed snapshot is dropped.
fn handle_wizard_close(state: &mut AppState, req: &Request) -> serde_json::Value {
    if state.session.take().is_none() {
        return err(&req.id, "no_session", "open a wizard session first", None);
    }
    if let Some(handle) = state.autosave.as_ref() {
        handle.cancel_pending();
    }
    ok(&req.id, json!({ "closed": true }))
}

fn handle_progress_evaluate(state: &mut AppState, req: &Request) -> serde_json::Value {
    let tuning = current_tuning(state);
    let Some(session) = state.session.as_ref() else {
        return err(&req.id, "no_session", "open a wizard session first", None);
    };

    let steps = progress::evaluate_steps(&session.draft, session.mode, &tuning);
    let can_proceed_to_next = steps
        .get(session.current_step)
        .map(|s| s.can_proceed)
        .unwrap_or(false);
    let steps_json = serde_json::to_value(&steps).unwrap_or(json!([]));

    ok(
        &req.id,
        json!({
            "steps": steps_json,
            "currentStep": session.current_step,
            "canProceedToNext": can_proceed_to_next,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "wizard.open" => Some(handle_wizard_open(state, req)),
        "wizard.fieldsChanged" => Some(handle_wizard_fields_changed(state, req)),
        "wizard.setStep" => Some(handle_wizard_set_step(state, req)),
        "wizard.status" => Some(handle_wizard_status(state, req)),
        "wizard.reset" => Some(handle_wizard_reset(state, req)),
        "wizard.close" => Some(handle_wizard_close(state, req)),
        "progress.evaluate" => Some(handle_progress_evaluate(state, req)),
        _ => None,
    }
}
