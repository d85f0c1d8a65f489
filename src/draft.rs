use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use serde_json::{Map, Value};

/// Storage slot for the course-creation wizard draft. One record at most; every
/// save fully replaces the previous one.
pub const DRAFT_SLOT: &str = "course_creation_draft";

/// Format tag written into every envelope.
pub const DRAFT_VERSION: &str = "1.0";

/// Draft lifetime from last write, in milliseconds (10 minutes).
pub const DEFAULT_EXPIRY_MS: i64 = 600_000;

/// Steps whose edits are auto-saved. Step "0" is synced through a different code
/// path in the console and never writes the draft slot.
pub const ALLOWED_SAVE_STEPS: &[&str] = &["1", "2", "3", "4"];

const METADATA_KEYS: &[&str] = &["timestamp", "version", "formStep"];

pub fn step_allows_save(step: &str) -> bool {
    ALLOWED_SAVE_STEPS.contains(&step)
}

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

#[derive(Debug, Clone)]
pub enum SaveOutcome {
    Saved { saved_at: String, saved_at_ms: i64 },
    RejectedStep,
    Failed { message: String },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftMetadata {
    pub last_saved: String,
    pub time_until_expiry_ms: i64,
    pub step: String,
}

/// Keeps only values the draft envelope may carry: non-empty strings, numbers
/// (zero included), booleans (false included), and arrays of non-empty strings.
/// Nulls, empty/whitespace strings, empty arrays, and object values are dropped,
/// as are keys that would collide with envelope metadata.
pub fn sanitize_fields(fields: &Map<String, Value>) -> Map<String, Value> {
    let mut out = Map::new();
    for (key, value) in fields {
        if METADATA_KEYS.contains(&key.as_str()) {
            continue;
        }
        match value {
            Value::Null => {}
            Value::String(s) => {
                let trimmed = s.trim();
                if !trimmed.is_empty() {
                    out.insert(key.clone(), Value::String(trimmed.to_string()));
                }
            }
            Value::Number(_) | Value::Bool(_) => {
                out.insert(key.clone(), value.clone());
            }
            Value::Array(items) => {
                let kept: Vec<Value> = items
                    .iter()
                    .filter_map(|item| {
                        let s = item.as_str()?.trim();
                        if s.is_empty() {
                            None
                        } else {
                            Some(Value::String(s.to_string()))
                        }
                    })
                    .collect();
                if !kept.is_empty() {
                    out.insert(key.clone(), Value::Array(kept));
                }
            }
            Value::Object(_) => {}
        }
    }
    out
}

/// Filters the snapshot, stamps time and step, and replaces the stored record.
/// Write failures come back as `Failed`, never as a propagated error.
pub fn save_draft(conn: &Connection, fields: &Map<String, Value>, step: &str) -> SaveOutcome {
    if !step_allows_save(step) {
        return SaveOutcome::RejectedStep;
    }

    let now = Utc::now();
    let saved_at = now.to_rfc3339();
    let saved_at_ms = now.timestamp_millis();

    let mut envelope = sanitize_fields(fields);
    envelope.insert("timestamp".to_string(), Value::String(saved_at.clone()));
    envelope.insert(
        "version".to_string(),
        Value::String(DRAFT_VERSION.to_string()),
    );
    envelope.insert("formStep".to_string(), Value::String(step.to_string()));

    let payload = match serde_json::to_string(&Value::Object(envelope)) {
        Ok(v) => v,
        Err(e) => {
            return SaveOutcome::Failed {
                message: e.to_string(),
            }
        }
    };

    match conn.execute(
        "INSERT INTO drafts(slot, payload, saved_at_ms) VALUES(?, ?, ?)
         ON CONFLICT(slot) DO UPDATE SET
           payload = excluded.payload,
           saved_at_ms = excluded.saved_at_ms",
        (DRAFT_SLOT, payload, saved_at_ms),
    ) {
        Ok(_) => SaveOutcome::Saved {
            saved_at,
            saved_at_ms,
        },
        Err(e) => SaveOutcome::Failed {
            message: e.to_string(),
        },
    }
}

/// Reads the stored fields, applying the lazy expiry check: a record past its
/// lifetime is deleted and reported as absent. Envelope metadata is stripped.
pub fn load_draft(
    conn: &Connection,
    expiry_ms: i64,
) -> anyhow::Result<Option<Map<String, Value>>> {
    let Some((payload, saved_at_ms)) = read_slot(conn)? else {
        return Ok(None);
    };

    if now_ms() - saved_at_ms > expiry_ms {
        // Delete only the exact row we judged stale.
        conn.execute(
            "DELETE FROM drafts WHERE slot = ? AND saved_at_ms = ?",
            (DRAFT_SLOT, saved_at_ms),
        )?;
        return Ok(None);
    }

    let envelope: Value = serde_json::from_str(&payload)?;
    let Value::Object(mut fields) = envelope else {
        anyhow::bail!("draft payload is not a JSON object");
    };
    for key in METADATA_KEYS {
        fields.remove(*key);
    }
    Ok(Some(fields))
}

/// Deletes the record. Returns whether one existed.
pub fn clear_draft(conn: &Connection) -> anyhow::Result<bool> {
    let deleted = conn.execute("DELETE FROM drafts WHERE slot = ?", [DRAFT_SLOT])?;
    Ok(deleted > 0)
}

/// Metadata for UI display. Never mutates: an already-expired record reads as
/// absent here and is removed by `load_draft` or the scheduler.
pub fn peek_metadata(conn: &Connection, expiry_ms: i64) -> anyhow::Result<Option<DraftMetadata>> {
    let Some((payload, saved_at_ms)) = read_slot(conn)? else {
        return Ok(None);
    };
    let remaining = saved_at_ms + expiry_ms - now_ms();
    if remaining <= 0 {
        return Ok(None);
    }

    let envelope: Value = serde_json::from_str(&payload)?;
    let last_saved = envelope
        .get("timestamp")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .unwrap_or_else(|| rfc3339_from_ms(saved_at_ms));
    let step = envelope
        .get("formStep")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();

    Ok(Some(DraftMetadata {
        last_saved,
        time_until_expiry_ms: remaining,
        step,
    }))
}

/// Guarded expiry delete: removes the record only when its recorded write time is
/// at or past the cutoff, so a stale timer can never clear a fresher save.
/// Returns whether a record was cleared.
pub fn expire_if_stale(conn: &Connection, expiry_ms: i64) -> anyhow::Result<bool> {
    let cutoff = now_ms() - expiry_ms;
    let deleted = conn.execute(
        "DELETE FROM drafts WHERE slot = ? AND saved_at_ms <= ?",
        (DRAFT_SLOT, cutoff),
    )?;
    Ok(deleted > 0)
}

/// Current write time of the stored record, if any. Used to re-arm the expiry
/// deadline from persisted state on process start.
pub fn saved_at_ms(conn: &Connection) -> anyhow::Result<Option<i64>> {
    let value = conn
        .query_row(
            "SELECT saved_at_ms FROM drafts WHERE slot = ?",
            [DRAFT_SLOT],
            |row| row.get::<_, i64>(0),
        )
        .optional()?;
    Ok(value)
}

fn read_slot(conn: &Connection) -> anyhow::Result<Option<(String, i64)>> {
    let row = conn
        .query_row(
            "SELECT payload, saved_at_ms FROM drafts WHERE slot = ?",
            [DRAFT_SLOT],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
        )
        .optional()?;
    Ok(row)
}

fn rfc3339_from_ms(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_default()
}
