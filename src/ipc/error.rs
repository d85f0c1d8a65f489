use serde_json::{json, Value};

pub fn ok(id: &str, result: Value) -> Value {
    json!({ "id": id, "ok": true, "result": result })
}

pub fn err(id: &str, code: &str, message: impl Into<String>, details: Option<Value>) -> Value {
    let mut error = serde_json::Map::new();
    error.insert("code".into(), Value::String(code.to_string()));
    error.insert("message".into(), Value::String(message.into()));
    if let Some(d) = details {
        error.insert("details".into(), d);
    }
    json!({ "id": id, "ok": false, "error": error })
}
