use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{parse_opt_i64, parse_opt_string, parse_required_string_array, required_str};
use crate::ipc::types::{AppState, Request};
use crate::wizard::{self, CourseDraft, Module, ModuleContent, WizardSession};
use serde_json::{json, Value};

fn session_mut<'a>(state: &'a mut AppState, req: &Request) -> Result<&'a mut WizardSession, Value> {
    state
        .session
        .as_mut()
        .ok_or_else(|| err(&req.id, "no_session", "open a wizard session first", None))
}

fn content_to_json(content: &ModuleContent, position: usize) -> Value {
    let mut value = serde_json::to_value(content).unwrap_or(json!({}));
    if let Some(obj) = value.as_object_mut() {
        obj.insert("position".to_string(), json!(position));
    }
    value
}

fn module_to_json(module: &Module, position: usize) -> Value {
    let contents: Vec<Value> = module
        .contents
        .iter()
        .enumerate()
        .map(|(i, c)| content_to_json(c, i))
        .collect();
    json!({
        "id": module.id,
        "name": module.name,
        "description": module.description,
        "durationMinutes": module.duration_minutes,
        "position": position,
        "isComplete": module.is_complete(),
        "contents": contents,
    })
}

fn modules_json(draft: &CourseDraft) -> Value {
    let modules: Vec<Value> = draft
        .modules
        .iter()
        .enumerate()
        .map(|(i, m)| module_to_json(m, i))
        .collect();
    json!(modules)
}

fn handle_modules_add(state: &mut AppState, req: &Request) -> serde_json::Value {
    let name = match parse_opt_string(req.params.get("name")) {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", format!("name {}", msg), None),
    };
    let description = match parse_opt_string(req.params.get("description")) {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", format!("description {}", msg), None),
    };
    let duration_minutes = match parse_opt_i64(req.params.get("durationMinutes")) {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", format!("durationMinutes {}", msg), None),
    };
    if duration_minutes.map(|m| m < 0).unwrap_or(false) {
        return err(&req.id, "bad_params", "durationMinutes must be >= 0", None);
    }

    let session = match session_mut(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let module = Module::new(name, description, duration_minutes);
    session.draft.modules.push(module);
    let position = session.draft.modules.len() - 1;
    let module = &session.draft.modules[position];
    ok(
        &req.id,
        json!({ "module": module_to_json(module, position), "position": position }),
    )
}

fn handle_modules_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let module_id = match required_str(req, "moduleId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };
    let patch = patch.clone();

    let session = match session_mut(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let Some(position) = session.draft.modules.iter().position(|m| m.id == module_id) else {
        return err(&req.id, "not_found", "module not found", None);
    };

    {
        let module = &mut session.draft.modules[position];
        for (key, value) in &patch {
            match key.as_str() {
                "name" => match parse_opt_string(Some(value)) {
                    Ok(v) => module.name = v,
                    Err(msg) => return err(&req.id, "bad_params", format!("name {}", msg), None),
                },
                "description" => match parse_opt_string(Some(value)) {
                    Ok(v) => module.description = v,
                    Err(msg) => {
                        return err(&req.id, "bad_params", format!("description {}", msg), None)
                    }
                },
                "durationMinutes" => match parse_opt_i64(Some(value)) {
                    Ok(Some(m)) if m < 0 => {
                        return err(&req.id, "bad_params", "durationMinutes must be >= 0", None)
                    }
                    Ok(v) => module.duration_minutes = v,
                    Err(msg) => {
                        return err(&req.id, "bad_params", format!("durationMinutes {}", msg), None)
                    }
                },
                _ => return err(&req.id, "bad_params", format!("unknown module field: {}", key), None),
            }
        }
    }

    let module = &session.draft.modules[position];
    ok(&req.id, json!({ "module": module_to_json(module, position) }))
}

fn handle_modules_remove(state: &mut AppState, req: &Request) -> serde_json::Value {
    let module_id = match required_str(req, "moduleId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let session = match session_mut(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    if !session.draft.remove_module(&module_id) {
        return err(&req.id, "not_found", "module not found", None);
    }
    ok(
        &req.id,
        json!({ "removed": true, "modules": modules_json(&session.draft) }),
    )
}

fn handle_modules_reorder(state: &mut AppState, req: &Request) -> serde_json::Value {
    let ids = match parse_required_string_array(req.params.get("moduleIds"), "moduleIds") {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    let session = match session_mut(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    if let Err(msg) = session.draft.reorder_modules(&ids) {
        return err(&req.id, "bad_params", msg, None);
    }
    ok(&req.id, json!({ "modules": modules_json(&session.draft) }))
}

fn handle_contents_add(state: &mut AppState, req: &Request) -> serde_json::Value {
    let module_id = match required_str(req, "moduleId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let kind = match required_str(req, "kind") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(params_obj) = req.params.as_object() else {
        return err(&req.id, "bad_params", "params must be an object", None);
    };
    let content = match ModuleContent::from_params(&kind, params_obj) {
        Ok(c) => c,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };

    let session = match session_mut(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let Some(module) = session.draft.module_mut(&module_id) else {
        return err(&req.id, "not_found", "module not found", None);
    };
    module.contents.push(content);
    let position = module.contents.len() - 1;
    ok(
        &req.id,
        json!({
            "content": content_to_json(&module.contents[position], position),
            "position": position
        }),
    )
}

fn handle_contents_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let module_id = match required_str(req, "moduleId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let content_id = match required_str(req, "contentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };
    let patch = patch.clone();

    let session = match session_mut(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let Some(module) = session.draft.module_mut(&module_id) else {
        return err(&req.id, "not_found", "module not found", None);
    };
    let Some(position) = module.contents.iter().position(|c| c.id() == content_id) else {
        return err(&req.id, "not_found", "content not found", None);
    };
    if let Err(msg) = module.contents[position].apply_patch(&patch) {
        return err(&req.id, "bad_params", msg, None);
    }
    ok(
        &req.id,
        json!({ "content": content_to_json(&module.contents[position], position) }),
    )
}

fn handle_contents_remove(state: &mut AppState, req: &Request) -> serde_json::Value {
    let module_id = match required_str(req, "moduleId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let content_id = match required_str(req, "contentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let session = match session_mut(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let Some(module) = session.draft.module_mut(&module_id) else {
        return err(&req.id, "not_found", "module not found", None);
    };
    let before = module.contents.len();
    module.contents.retain(|c| c.id() != content_id);
    if module.contents.len() == before {
        return err(&req.id, "not_found", "content not found", None);
    }
    let contents: Vec<Value> = module
        .contents
        .iter()
        .enumerate()
        .map(|(i, c)| content_to_json(c, i))
        .collect();
    ok(&req.id, json!({ "removed": true, "contents": contents }))
}

fn handle_contents_reorder(state: &mut AppState, req: &Request) -> serde_json::Value {
    let module_id = match required_str(req, "moduleId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let ids = match parse_required_string_array(req.params.get("contentIds"), "contentIds") {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    let session = match session_mut(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let Some(module) = session.draft.module_mut(&module_id) else {
        return err(&req.id, "not_found", "module not found", None);
    };
    if let Err(msg) = wizard::reorder_contents(module, &ids) {
        return err(&req.id, "bad_params", msg, None);
    }
    let contents: Vec<Value> = module
        .contents
        .iter()
        .enumerate()
        .map(|(i, c)| content_to_json(c, i))
        .collect();
    ok(&req.id, json!({ "contents": contents }))
}

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let session = match session_mut(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    ok(
        &req.id,
        json!({
            "modules": modules_json(&session.draft),
            "totalModules": session.draft.modules.len(),
            "totalDurationMinutes": session.draft.total_duration_minutes(),
            "videoLessonCount": session.draft.video_lesson_count(),
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "curriculum.modules.add" => Some(handle_modules_add(state, req)),
        "curriculum.modules.update" => Some(handle_modules_update(state, req)),
        "curriculum.modules.remove" => Some(handle_modules_remove(state, req)),
        "curriculum.modules.reorder" => Some(handle_modules_reorder(state, req)),
        "curriculum.contents.add" => Some(handle_contents_add(state, req)),
        "curriculum.contents.update" => Some(handle_contents_update(state, req)),
        "curriculum.contents.remove" => Some(handle_contents_remove(state, req)),
        "curriculum.contents.reorder" => Some(handle_contents_reorder(state, req)),
        "curriculum.list" => Some(handle_list(state, req)),
        _ => None,
    }
}
