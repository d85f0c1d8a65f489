use crate::autosave::AutosaveTuning;
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::progress::{ProgressTuning, DEFAULT_PRICE_FLOOR_VND, DEFAULT_PROCEED_THRESHOLD_PERCENT};
use rusqlite::Connection;
use serde_json::{json, Map, Value};

#[derive(Clone, Copy)]
enum SetupSection {
    Wizard,
    Pricing,
}

impl SetupSection {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "wizard" => Some(Self::Wizard),
            "pricing" => Some(Self::Pricing),
            _ => None,
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Wizard => "setup.wizard",
            Self::Pricing => "setup.pricing",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Wizard => json!({
            "autosaveDebounceMs": 2000,
            "draftExpiryMinutes": 10,
            "proceedThresholdPercent": DEFAULT_PROCEED_THRESHOLD_PERCENT,
            "expiryWarningSeconds": 120
        }),
        SetupSection::Pricing => json!({
            "priceFloorVnd": DEFAULT_PRICE_FLOOR_VND,
            "currency": "VND"
        }),
    }
}

fn as_object_mut(value: &mut Value) -> Result<&mut Map<String, Value>, String> {
    value
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v
        .as_i64()
        .ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn parse_string_max(v: &Value, key: &str, max_len: usize) -> Result<String, String> {
    let s = v.as_str().ok_or_else(|| format!("{} must be string", key))?;
    let s = s.trim();
    if s.len() > max_len {
        return Err(format!("{} length must be <= {}", key, max_len));
    }
    Ok(s.to_string())
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = as_object_mut(current)?;
    for (k, v) in patch {
        match section {
            SetupSection::Wizard => match k.as_str() {
                "autosaveDebounceMs" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 250, 10_000)?));
                }
                "draftExpiryMinutes" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 240)?));
                }
                "proceedThresholdPercent" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 50, 100)?));
                }
                "expiryWarningSeconds" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 30, 600)?));
                }
                _ => return Err(format!("unknown wizard field: {}", k)),
            },
            SetupSection::Pricing => match k.as_str() {
                "priceFloorVnd" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1_000, 10_000_000)?));
                }
                "currency" => {
                    let s = parse_string_max(v, k, 8)?.to_ascii_uppercase();
                    if s.is_empty() {
                        return Err("currency must not be empty".to_string());
                    }
                    obj.insert(k.clone(), Value::String(s));
                }
                _ => return Err(format!("unknown pricing field: {}", k)),
            },
        }
    }
    Ok(())
}

fn load_section(conn: &Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Best-effort apply: malformed historical values must not block setup.
            let _ = merge_section_patch(section, &mut current, saved_obj);
        }
    }
    Ok(current)
}

fn section_obj(conn: &Connection, key: &str) -> Map<String, Value> {
    db::settings_get_json(conn, key)
        .ok()
        .flatten()
        .and_then(|v| v.as_object().cloned())
        .unwrap_or_default()
}

/// Worker timing derived from the wizard section, with defaults when unset.
pub fn autosave_tuning(conn: &Connection) -> AutosaveTuning {
    let obj = section_obj(conn, SetupSection::Wizard.key());
    let debounce_ms = obj
        .get("autosaveDebounceMs")
        .and_then(|v| v.as_i64())
        .filter(|v| (250..=10_000).contains(v))
        .unwrap_or(2_000) as u64;
    let expiry_minutes = obj
        .get("draftExpiryMinutes")
        .and_then(|v| v.as_i64())
        .filter(|v| (1..=240).contains(v))
        .unwrap_or(10);
    AutosaveTuning {
        debounce_ms,
        expiry_ms: expiry_minutes * 60_000,
        ..AutosaveTuning::default()
    }
}

pub fn progress_tuning(conn: &Connection) -> ProgressTuning {
    let wizard = section_obj(conn, SetupSection::Wizard.key());
    let pricing = section_obj(conn, SetupSection::Pricing.key());
    let proceed_threshold_percent = wizard
        .get("proceedThresholdPercent")
        .and_then(|v| v.as_i64())
        .filter(|v| (50..=100).contains(v))
        .unwrap_or(DEFAULT_PROCEED_THRESHOLD_PERCENT);
    let price_floor_vnd = pricing
        .get("priceFloorVnd")
        .and_then(|v| v.as_i64())
        .filter(|v| *v > 0)
        .unwrap_or(DEFAULT_PRICE_FLOOR_VND);
    ProgressTuning {
        proceed_threshold_percent,
        price_floor_vnd,
    }
}

pub fn expiry_warning_ms(conn: &Connection) -> i64 {
    let obj = section_obj(conn, SetupSection::Wizard.key());
    obj.get("expiryWarningSeconds")
        .and_then(|v| v.as_i64())
        .filter(|v| (30..=600).contains(v))
        .unwrap_or(120)
        * 1_000
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let wizard = match load_section(conn, SetupSection::Wizard) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let pricing = match load_section(conn, SetupSection::Pricing) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    ok(
        &req.id,
        json!({
            "wizard": wizard,
            "pricing": pricing
        }),
    )
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(section_raw) = req.params.get("section").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing section", None);
    };
    let Some(section) = SetupSection::parse(section_raw) else {
        return err(&req.id, "bad_params", "unknown section", None);
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let mut current = match load_section(conn, section) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Err(msg) = merge_section_patch(section, &mut current, patch_obj) {
        return err(&req.id, "bad_params", msg, None);
    }
    if let Err(e) = db::settings_set_json(conn, section.key(), &current) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}
