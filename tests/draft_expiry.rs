mod test_support;

use serde_json::json;
use std::path::Path;
use test_support::{request_ok, spawn_sidecar, temp_dir};

/// Ages the persisted draft in place so expiry paths run without waiting out
/// the real ten-minute window.
fn rewind_saved_at(workspace: &Path, by_ms: i64) {
    let conn = rusqlite::Connection::open(workspace.join("lectern.sqlite3"))
        .expect("open workspace db");
    let changed = conn
        .execute(
            "UPDATE drafts SET saved_at_ms = saved_at_ms - ?",
            [by_ms],
        )
        .expect("rewind saved_at_ms");
    assert_eq!(changed, 1, "expected one draft row to rewind");
}

#[test]
fn stale_draft_is_dropped_on_load() {
    let workspace = temp_dir("lectern-draft-expiry");
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
        json!({ "fields": { "title": "Khóa học bỏ dở" }, "step": "2" }),
    );

    // Past the ten-minute default window.
    rewind_saved_at(&workspace, 601_000);

    let loaded = request_ok(&mut stdin, &mut reader, "3", "draft.load", json!({}));
    assert_eq!(loaded.get("draft"), Some(&json!(null)));

    // The lazy delete already removed the row.
    let peeked = request_ok(&mut stdin, &mut reader, "4", "draft.peek", json!({}));
    assert_eq!(peeked.get("present"), Some(&json!(false)));
}

#[test]
fn peek_reports_stale_draft_as_absent_without_deleting() {
    let workspace = temp_dir("lectern-draft-peek-stale");
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
        json!({ "fields": { "title": "Sắp hết hạn" }, "step": "1" }),
    );

    rewind_saved_at(&workspace, 601_000);

    let peeked = request_ok(&mut stdin, &mut reader, "3", "draft.peek", json!({}));
    assert_eq!(peeked.get("present"), Some(&json!(false)));

    // peek is read-only: the row is still there for load to clean up.
    let conn = rusqlite::Connection::open(workspace.join("lectern.sqlite3"))
        .expect("open workspace db");
    let rows: i64 = conn
        .query_row("SELECT COUNT(*) FROM drafts", [], |r| r.get(0))
        .expect("count drafts");
    assert_eq!(rows, 1);
}

#[test]
fn peek_flags_drafts_nearing_expiry() {
    let workspace = temp_dir("lectern-draft-warning");
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
        json!({ "fields": { "title": "Gần hết hạn" }, "step": "3" }),
    );

    // Leave roughly one minute: inside the default two-minute warning band.
    rewind_saved_at(&workspace, 540_000);

    let peeked = request_ok(&mut stdin, &mut reader, "3", "draft.peek", json!({}));
    assert_eq!(peeked.get("present"), Some(&json!(true)));
    let meta = peeked.get("metadata").expect("metadata");
    assert_eq!(meta.get("expiresSoon"), Some(&json!(true)));
    let remaining = meta
        .get("timeUntilExpiryMs")
        .and_then(|v| v.as_i64())
        .expect("remaining ms");
    assert!(remaining > 0 && remaining <= 120_000);
}

#[test]
fn fresh_save_after_expiry_starts_a_new_window() {
    let workspace = temp_dir("lectern-draft-rearm");
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
        json!({ "fields": { "title": "Phiên cũ" }, "step": "1" }),
    );
    rewind_saved_at(&workspace, 601_000);
    let loaded = request_ok(&mut stdin, &mut reader, "3", "draft.load", json!({}));
    assert_eq!(loaded.get("draft"), Some(&json!(null)));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "draft.save",
        json!({ "fields": { "title": "Phiên mới" }, "step": "1" }),
    );
    let peeked = request_ok(&mut stdin, &mut reader, "5", "draft.peek", json!({}));
    assert_eq!(peeked.get("present"), Some(&json!(true)));
    let loaded = request_ok(&mut stdin, &mut reader, "6", "draft.load", json!({}));
    assert_eq!(
        loaded.get("draft").and_then(|d| d.get("title")),
        Some(&json!("Phiên mới"))
    );
}
