use chrono::DateTime;
use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;

pub const DB_FILE: &str = "lectern.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;
    // The request thread and the autosave worker each hold a connection.
    conn.busy_timeout(Duration::from_secs(5))?;
    init_schema(&conn)?;
    Ok(conn)
}

/// Creates tables and applies additive migrations. Shared by the request thread and
/// the autosave worker, which opens its own connection to the same file.
pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS drafts(
            slot TEXT PRIMARY KEY,
            payload TEXT NOT NULL,
            saved_at_ms INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;

    // Early workspaces stored the JSON envelope only. Expiry checks run as guarded
    // SQL against the epoch column, so add and backfill it where missing.
    ensure_drafts_saved_at_ms(conn)?;

    Ok(())
}

pub fn settings_get_json(
    conn: &Connection,
    key: &str,
) -> anyhow::Result<Option<serde_json::Value>> {
    let mut stmt = conn.prepare("SELECT value FROM settings WHERE key = ?")?;
    let mut rows = stmt.query([key])?;
    let Some(row) = rows.next()? else {
        return Ok(None);
    };
    let raw: String = row.get(0)?;
    Ok(Some(serde_json::from_str(&raw)?))
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    let raw = serde_json::to_string(value)?;
    conn.execute(
        "INSERT INTO settings(key, value) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        (key, raw),
    )?;
    Ok(())
}

fn ensure_drafts_saved_at_ms(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "drafts", "saved_at_ms")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE drafts ADD COLUMN saved_at_ms INTEGER NOT NULL DEFAULT 0",
        [],
    )?;

    // Backfill from the envelope timestamp so pre-existing drafts keep their age.
    // Rows with an unreadable envelope stay at 0 and age out on the next check.
    let mut stmt = conn.prepare("SELECT slot, payload FROM drafts")?;
    let rows = stmt
        .query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    for (slot, payload) in rows {
        let Ok(envelope) = serde_json::from_str::<serde_json::Value>(&payload) else {
            continue;
        };
        let Some(ts) = envelope.get("timestamp").and_then(|v| v.as_str()) else {
            continue;
        };
        let Ok(parsed) = DateTime::parse_from_rfc3339(ts) else {
            continue;
        };
        conn.execute(
            "UPDATE drafts SET saved_at_ms = ? WHERE slot = ?",
            (parsed.timestamp_millis(), slot),
        )?;
    }
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
