mod test_support;

use serde_json::json;
use test_support::{error_code, request, request_ok, spawn_sidecar, temp_dir};

fn full_information_fields() -> serde_json::Value {
    json!({
        "title": "Khóa học Rust",
        "description": "Lập trình hệ thống cho người mới",
        "subjectCode": "CS301",
        "level": "intermediate",
        "courseImageUrl": "https://img.lectern.vn/rust.png",
        "price": 250000
    })
}

#[test]
fn open_merge_and_forward_gating() {
    let workspace = temp_dir("lectern-wizard-gating");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let opened = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "wizard.open",
        json!({ "mode": "create" }),
    );
    assert_eq!(opened.get("restored"), Some(&json!(false)));
    assert_eq!(opened.get("currentStep"), Some(&json!(0)));
    assert_eq!(opened.get("notice"), Some(&json!(null)));

    // Step 0 edits merge but are not queued for autosave.
    let merged = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "wizard.fieldsChanged",
        json!({ "fields": { "title": "Khóa học Rust" } }),
    );
    assert_eq!(merged.get("merged"), Some(&json!(true)));
    assert_eq!(merged.get("autosaveScheduled"), Some(&json!(false)));

    // One of six fields: the information gate blocks the move.
    let blocked = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "wizard.setStep",
        json!({ "step": 1 }),
    );
    assert_eq!(blocked.get("accepted"), Some(&json!(false)));
    assert_eq!(blocked.get("currentStep"), Some(&json!(0)));
    assert_eq!(
        blocked.get("blockedBy").and_then(|b| b.get("stepId")),
        Some(&json!(0))
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "wizard.fieldsChanged",
        json!({ "fields": full_information_fields() }),
    );
    let accepted = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "wizard.setStep",
        json!({ "step": 1 }),
    );
    assert_eq!(accepted.get("accepted"), Some(&json!(true)));
    assert_eq!(accepted.get("currentStep"), Some(&json!(1)));
    // Navigation onto a saveable step persists right away.
    assert_eq!(accepted.get("autosaved"), Some(&json!(true)));

    // From step 1 edits are debounced to storage.
    let merged = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "wizard.fieldsChanged",
        json!({ "fields": { "subtitle": "Từ cơ bản đến nâng cao" } }),
    );
    assert_eq!(merged.get("autosaveScheduled"), Some(&json!(true)));

    // Backward moves never hit the gate.
    let back = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "wizard.setStep",
        json!({ "step": 0 }),
    );
    assert_eq!(back.get("accepted"), Some(&json!(true)));
    assert_eq!(back.get("autosaved"), Some(&json!(false)));
}

#[test]
fn forward_jump_is_blocked_by_first_failing_step() {
    let workspace = temp_dir("lectern-wizard-jump");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "wizard.open",
        json!({ "mode": "create" }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "wizard.fieldsChanged",
        json!({ "fields": full_information_fields() }),
    );

    // Information clears, but the empty curriculum stops a jump to pricing.
    let blocked = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "wizard.setStep",
        json!({ "step": 3 }),
    );
    assert_eq!(blocked.get("accepted"), Some(&json!(false)));
    let blocked_by = blocked.get("blockedBy").expect("blockedBy");
    assert_eq!(blocked_by.get("stepId"), Some(&json!(1)));
    assert_eq!(
        blocked_by.get("missingFields"),
        Some(&json!(["modules"]))
    );
}

#[test]
fn open_restores_persisted_draft_and_step() {
    let workspace = temp_dir("lectern-wizard-restore");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "draft.save",
        json!({
            "fields": { "title": "Khóa học dở dang", "basePrice": 500000 },
            "step": "3"
        }),
    );

    let opened = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "wizard.open",
        json!({ "mode": "edit" }),
    );
    assert_eq!(opened.get("restored"), Some(&json!(true)));
    assert_eq!(opened.get("currentStep"), Some(&json!(3)));
    assert_eq!(opened.get("mode"), Some(&json!("edit")));
    assert_eq!(
        opened.get("notice"),
        Some(&json!("đã khôi phục phiên làm việc trước"))
    );
    assert_eq!(
        opened.get("fields").and_then(|f| f.get("title")),
        Some(&json!("Khóa học dở dang"))
    );
}

#[test]
fn reset_clears_session_and_persisted_draft() {
    let workspace = temp_dir("lectern-wizard-reset");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "wizard.open",
        json!({ "mode": "create" }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "wizard.fieldsChanged",
        json!({ "fields": full_information_fields() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "draft.save",
        json!({ "fields": full_information_fields(), "step": "1" }),
    );

    let reset = request_ok(&mut stdin, &mut reader, "5", "wizard.reset", json!({}));
    assert_eq!(reset.get("reset"), Some(&json!(true)));
    assert_eq!(reset.get("cleared"), Some(&json!(true)));

    let loaded = request_ok(&mut stdin, &mut reader, "6", "draft.load", json!({}));
    assert_eq!(loaded.get("draft"), Some(&json!(null)));

    let progress = request_ok(&mut stdin, &mut reader, "7", "progress.evaluate", json!({}));
    assert_eq!(progress.get("currentStep"), Some(&json!(0)));
    let steps = progress.get("steps").and_then(|s| s.as_array()).expect("steps");
    assert_eq!(
        steps[0].get("completionPercentage"),
        Some(&json!(0.0))
    );
}

#[test]
fn close_keeps_persisted_draft_for_later_resume() {
    let workspace = temp_dir("lectern-wizard-close");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "draft.save",
        json!({ "fields": { "title": "Còn dang dở" }, "step": "2" }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "wizard.open",
        json!({ "mode": "create" }),
    );

    let closed = request_ok(&mut stdin, &mut reader, "4", "wizard.close", json!({}));
    assert_eq!(closed.get("closed"), Some(&json!(true)));

    let peeked = request_ok(&mut stdin, &mut reader, "5", "draft.peek", json!({}));
    assert_eq!(peeked.get("present"), Some(&json!(true)));

    // The session is gone until the next open.
    let resp = request(
        &mut stdin,
        &mut reader,
        "6",
        "wizard.fieldsChanged",
        json!({ "fields": { "title": "x" } }),
    );
    assert_eq!(error_code(&resp), "no_session");
}

#[test]
fn status_reports_session_autosave_and_draft() {
    let workspace = temp_dir("lectern-wizard-status");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let status = request_ok(&mut stdin, &mut reader, "2", "wizard.status", json!({}));
    assert_eq!(status.get("sessionOpen"), Some(&json!(false)));
    assert_eq!(
        status.get("draft").and_then(|d| d.get("present")),
        Some(&json!(false))
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "wizard.open",
        json!({ "mode": "create" }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "draft.save",
        json!({ "fields": { "title": "Đang soạn" }, "step": "1" }),
    );

    let status = request_ok(&mut stdin, &mut reader, "5", "wizard.status", json!({}));
    assert_eq!(status.get("sessionOpen"), Some(&json!(true)));
    assert_eq!(status.get("mode"), Some(&json!("create")));
    assert_eq!(status.get("currentStep"), Some(&json!(0)));
    let autosave = status.get("autosave").expect("autosave cell");
    assert_eq!(autosave.get("armed"), Some(&json!(true)));
    assert_eq!(autosave.get("pendingSave"), Some(&json!(false)));
    assert!(autosave.get("lastSavedAt").and_then(|v| v.as_str()).is_some());
    assert_eq!(
        status.get("draft").and_then(|d| d.get("present")),
        Some(&json!(true))
    );
}

#[test]
fn step_out_of_range_and_bad_mode_are_rejected() {
    let workspace = temp_dir("lectern-wizard-bad-params");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let resp = request(
        &mut stdin,
        &mut reader,
        "2",
        "wizard.open",
        json!({ "mode": "remix" }),
    );
    assert_eq!(error_code(&resp), "bad_params");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "wizard.open",
        json!({ "mode": "create" }),
    );
    let resp = request(
        &mut stdin,
        &mut reader,
        "4",
        "wizard.setStep",
        json!({ "step": 7 }),
    );
    assert_eq!(error_code(&resp), "bad_params");
}
