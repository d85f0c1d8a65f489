use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Wizard flavour: a fresh course or an edit of a published one. Only the final
/// step's label differs ("publish" vs "confirmUpdate").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WizardMode {
    Create,
    Edit,
}

impl WizardMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "create" => Some(Self::Create),
            "edit" => Some(Self::Edit),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Edit => "edit",
        }
    }
}

/// Content item owned by a module. Tagged by `kind` so each shape carries only
/// the fields that are legal for it. A "lesson" is a `video` item.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ModuleContent {
    #[serde(rename_all = "camelCase")]
    Video {
        id: String,
        title: Option<String>,
        video_url: Option<String>,
        duration_minutes: Option<i64>,
    },
    #[serde(rename_all = "camelCase")]
    Quiz {
        id: String,
        title: Option<String>,
        question_count: Option<i64>,
        pass_percent: Option<i64>,
    },
    #[serde(rename_all = "camelCase")]
    Discussion {
        id: String,
        title: Option<String>,
        prompt: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Material {
        id: String,
        title: Option<String>,
        file_url: Option<String>,
    },
}

impl ModuleContent {
    pub fn from_params(kind: &str, obj: &Map<String, Value>) -> Result<Self, String> {
        let id = Uuid::new_v4().to_string();
        let title = opt_string(obj.get("title"))?;
        match kind {
            "video" => Ok(Self::Video {
                id,
                title,
                video_url: opt_string(obj.get("videoUrl"))?,
                duration_minutes: opt_i64(obj.get("durationMinutes"))?,
            }),
            "quiz" => Ok(Self::Quiz {
                id,
                title,
                question_count: opt_i64(obj.get("questionCount"))?,
                pass_percent: opt_i64(obj.get("passPercent"))?,
            }),
            "discussion" => Ok(Self::Discussion {
                id,
                title,
                prompt: opt_string(obj.get("prompt"))?,
            }),
            "material" => Ok(Self::Material {
                id,
                title,
                file_url: opt_string(obj.get("fileUrl"))?,
            }),
            other => Err(format!(
                "kind must be one of: video, quiz, discussion, material (got {})",
                other
            )),
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Video { id, .. }
            | Self::Quiz { id, .. }
            | Self::Discussion { id, .. }
            | Self::Material { id, .. } => id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Video { .. } => "video",
            Self::Quiz { .. } => "quiz",
            Self::Discussion { .. } => "discussion",
            Self::Material { .. } => "material",
        }
    }

    pub fn is_video_lesson(&self) -> bool {
        matches!(self, Self::Video { .. })
    }

    pub fn has_video_url(&self) -> bool {
        match self {
            Self::Video { video_url, .. } => video_url
                .as_deref()
                .map(|s| !s.trim().is_empty())
                .unwrap_or(false),
            _ => false,
        }
    }

    /// Applies a patch of kind-appropriate fields. `title` is shared; anything
    /// else must belong to the item's kind. Null values clear the field.
    pub fn apply_patch(&mut self, patch: &Map<String, Value>) -> Result<(), String> {
        for (key, value) in patch {
            if key == "title" {
                let parsed = opt_string(Some(value))?;
                self.set_title(parsed);
                continue;
            }
            match self {
                Self::Video {
                    video_url,
                    duration_minutes,
                    ..
                } => match key.as_str() {
                    "videoUrl" => *video_url = opt_string(Some(value))?,
                    "durationMinutes" => *duration_minutes = opt_i64(Some(value))?,
                    _ => return Err(format!("unknown video field: {}", key)),
                },
                Self::Quiz {
                    question_count,
                    pass_percent,
                    ..
                } => match key.as_str() {
                    "questionCount" => *question_count = opt_i64(Some(value))?,
                    "passPercent" => *pass_percent = opt_i64(Some(value))?,
                    _ => return Err(format!("unknown quiz field: {}", key)),
                },
                Self::Discussion { prompt, .. } => match key.as_str() {
                    "prompt" => *prompt = opt_string(Some(value))?,
                    _ => return Err(format!("unknown discussion field: {}", key)),
                },
                Self::Material { file_url, .. } => match key.as_str() {
                    "fileUrl" => *file_url = opt_string(Some(value))?,
                    _ => return Err(format!("unknown material field: {}", key)),
                },
            }
        }
        Ok(())
    }

    fn set_title(&mut self, value: Option<String>) {
        match self {
            Self::Video { title, .. }
            | Self::Quiz { title, .. }
            | Self::Discussion { title, .. }
            | Self::Material { title, .. } => *title = value,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Module {
    pub id: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub duration_minutes: Option<i64>,
    #[serde(default)]
    pub contents: Vec<ModuleContent>,
}

impl Module {
    pub fn new(
        name: Option<String>,
        description: Option<String>,
        duration_minutes: Option<i64>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            description,
            duration_minutes,
            contents: Vec::new(),
        }
    }

    /// A module counts as complete once name, description, and a positive
    /// duration are all present.
    pub fn is_complete(&self) -> bool {
        let has_name = self.name.as_deref().map(|s| !s.trim().is_empty()).unwrap_or(false);
        let has_description = self
            .description
            .as_deref()
            .map(|s| !s.trim().is_empty())
            .unwrap_or(false);
        let has_duration = self.duration_minutes.map(|m| m > 0).unwrap_or(false);
        has_name && has_description && has_duration
    }

    pub fn has_any_content(&self) -> bool {
        !self.contents.is_empty()
    }

    pub fn has_video_lesson(&self) -> bool {
        self.contents.iter().any(|c| c.is_video_lesson())
    }

    pub fn has_video_lesson_with_url(&self) -> bool {
        self.contents.iter().any(|c| c.has_video_url())
    }
}

/// In-memory course draft: the flat form-field map the Draft Store snapshots,
/// plus the curriculum tree, which is session-only and synced elsewhere.
#[derive(Debug, Clone, Default)]
pub struct CourseDraft {
    pub fields: Map<String, Value>,
    pub modules: Vec<Module>,
}

impl CourseDraft {
    /// Merges a partial field map. A null value removes the key; everything else
    /// overwrites. The in-memory map keeps raw values (empty strings included);
    /// filtering happens only at persistence time.
    pub fn merge_fields(&mut self, patch: &Map<String, Value>) {
        for (key, value) in patch {
            if value.is_null() {
                self.fields.remove(key);
            } else {
                self.fields.insert(key.clone(), value.clone());
            }
        }
    }

    pub fn module(&self, id: &str) -> Option<&Module> {
        self.modules.iter().find(|m| m.id == id)
    }

    pub fn module_mut(&mut self, id: &str) -> Option<&mut Module> {
        self.modules.iter_mut().find(|m| m.id == id)
    }

    pub fn remove_module(&mut self, id: &str) -> bool {
        let before = self.modules.len();
        self.modules.retain(|m| m.id != id);
        self.modules.len() != before
    }

    /// Reorders modules to the provided id sequence. Ids must all exist; modules
    /// not mentioned keep their relative order after the mentioned ones.
    /// Positions stay dense because order is vector order.
    pub fn reorder_modules(&mut self, ids: &[String]) -> Result<(), String> {
        reorder_by_ids(&mut self.modules, ids, |m| &m.id, "module")
    }

    pub fn total_duration_minutes(&self) -> i64 {
        self.modules
            .iter()
            .filter_map(|m| m.duration_minutes)
            .filter(|m| *m > 0)
            .sum()
    }

    pub fn video_lesson_count(&self) -> usize {
        self.modules
            .iter()
            .map(|m| m.contents.iter().filter(|c| c.is_video_lesson()).count())
            .sum()
    }
}

/// One open editing session. Owns the CourseDraft exclusively for its lifetime.
#[derive(Debug)]
pub struct WizardSession {
    pub mode: WizardMode,
    pub current_step: usize,
    pub draft: CourseDraft,
    pub restored: bool,
}

pub const STEP_COUNT: usize = 5;

impl WizardSession {
    pub fn new(mode: WizardMode) -> Self {
        Self {
            mode,
            current_step: 0,
            draft: CourseDraft::default(),
            restored: false,
        }
    }

    pub fn reset(&mut self) {
        self.current_step = 0;
        self.draft = CourseDraft::default();
        self.restored = false;
    }
}

/// Shared reorder discipline: the id list must be duplicate-free and every id
/// must exist; unmentioned items follow in their previous order.
fn reorder_by_ids<T, F>(items: &mut Vec<T>, ids: &[String], id_of: F, noun: &str) -> Result<(), String>
where
    F: Fn(&T) -> &str,
{
    let mut seen = std::collections::HashSet::new();
    for id in ids {
        if !seen.insert(id.as_str()) {
            return Err(format!("duplicate {} id: {}", noun, id));
        }
        if !items.iter().any(|item| id_of(item) == id.as_str()) {
            return Err(format!("{} id not found: {}", noun, id));
        }
    }

    let mut reordered = Vec::with_capacity(items.len());
    for id in ids {
        if let Some(pos) = items.iter().position(|item| id_of(item) == id.as_str()) {
            reordered.push(items.remove(pos));
        }
    }
    reordered.append(items);
    *items = reordered;
    Ok(())
}

pub fn reorder_contents(module: &mut Module, ids: &[String]) -> Result<(), String> {
    reorder_by_ids(&mut module.contents, ids, |c| c.id(), "content")
}

fn opt_string(v: Option<&Value>) -> Result<Option<String>, String> {
    match v {
        None => Ok(None),
        Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Ok(None)
            } else {
                Ok(Some(trimmed.to_string()))
            }
        }
        Some(_) => Err("must be string or null".to_string()),
    }
}

fn opt_i64(v: Option<&Value>) -> Result<Option<i64>, String> {
    match v {
        None => Ok(None),
        Some(Value::Null) => Ok(None),
        Some(other) => other.as_i64().map(Some).ok_or_else(|| "must be integer or null".to_string()),
    }
}
