use serde::Serialize;
use serde_json::{Map, Value};

use crate::wizard::{CourseDraft, WizardMode, STEP_COUNT};

pub const TITLE_MAX_LEN: usize = 60;
pub const MIN_TOTAL_DURATION_MINUTES: i64 = 60;
pub const RECOMMENDED_MODULE_COUNT: usize = 3;

pub const DEFAULT_PROCEED_THRESHOLD_PERCENT: i64 = 80;
pub const DEFAULT_PRICE_FLOOR_VND: i64 = 10_000;

/// The one blocking validation in the whole wizard; its wording is load-bearing
/// for the console UI, which matches on it verbatim.
pub const ERR_DEAL_PRICE: &str = "giá khuyến mãi phải nhỏ hơn giá gốc";

/// Knobs the setup sections feed in. Defaults apply when no workspace is open.
#[derive(Debug, Clone, Copy)]
pub struct ProgressTuning {
    pub proceed_threshold_percent: i64,
    pub price_floor_vnd: i64,
}

impl Default for ProgressTuning {
    fn default() -> Self {
        Self {
            proceed_threshold_percent: DEFAULT_PROCEED_THRESHOLD_PERCENT,
            price_floor_vnd: DEFAULT_PRICE_FLOOR_VND,
        }
    }
}

/// A single advisory or blocking finding. `code` is stable English for logs and
/// tests; `message` is the Vietnamese text shown to the lecturer.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StepIssue {
    pub code: String,
    pub message: String,
}

impl StepIssue {
    fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepProgress {
    pub step_id: usize,
    pub step_name: String,
    pub required_fields: Vec<String>,
    pub completed_fields: Vec<String>,
    pub missing_fields: Vec<String>,
    pub errors: Vec<StepIssue>,
    pub warnings: Vec<StepIssue>,
    pub completion_percentage: f64,
    pub is_completed: bool,
    pub can_proceed: bool,
}

/// Evaluates all five steps against the current draft. Pure: same draft and
/// tuning always yield the same report.
pub fn evaluate_steps(draft: &CourseDraft, mode: WizardMode, tuning: &ProgressTuning) -> Vec<StepProgress> {
    vec![
        step_information(draft, tuning),
        step_curriculum(draft, tuning),
        step_content(draft, tuning),
        step_pricing(draft, tuning),
        step_final(draft, mode, tuning),
    ]
}

pub fn step_progress(
    draft: &CourseDraft,
    mode: WizardMode,
    tuning: &ProgressTuning,
    step_id: usize,
) -> Option<StepProgress> {
    if step_id >= STEP_COUNT {
        return None;
    }
    Some(match step_id {
        0 => step_information(draft, tuning),
        1 => step_curriculum(draft, tuning),
        2 => step_content(draft, tuning),
        3 => step_pricing(draft, tuning),
        _ => step_final(draft, mode, tuning),
    })
}

fn step_information(draft: &CourseDraft, tuning: &ProgressTuning) -> StepProgress {
    let required = ["title", "description", "subjectCode", "level", "courseImageUrl", "price"];
    let mut completed = Vec::new();
    let mut missing = Vec::new();
    for name in required {
        let ok = if name == "price" {
            positive_number(&draft.fields, name)
        } else {
            non_empty_string(&draft.fields, name).is_some()
        };
        if ok {
            completed.push(name.to_string());
        } else {
            missing.push(name.to_string());
        }
    }

    let mut warnings = Vec::new();
    if let Some(title) = non_empty_string(&draft.fields, "title") {
        if title.chars().count() > TITLE_MAX_LEN {
            warnings.push(StepIssue::new(
                "title_too_long",
                format!("tiêu đề dài hơn {} ký tự, nên rút gọn", TITLE_MAX_LEN),
            ));
        }
    }
    if let Some(price) = number_field(&draft.fields, "price") {
        if price > 0.0 && price < tuning.price_floor_vnd as f64 {
            warnings.push(StepIssue::new(
                "price_below_floor",
                format!("giá thấp hơn mức tối thiểu {} VND", tuning.price_floor_vnd),
            ));
        }
    }

    let pct = ratio_percentage(completed.len(), required.len());
    let is_completed = missing.is_empty();
    finish_step(
        0,
        "information",
        required.iter().map(|s| s.to_string()).collect(),
        completed,
        missing,
        Vec::new(),
        warnings,
        pct,
        is_completed,
        tuning,
    )
}

fn step_curriculum(draft: &CourseDraft, tuning: &ProgressTuning) -> StepProgress {
    let required = vec!["modules".to_string()];
    let total = draft.modules.len();
    let valid = draft.modules.iter().filter(|m| m.is_complete()).count();
    let incomplete = total - valid;

    let (completed, missing) = if total > 0 {
        (required.clone(), Vec::new())
    } else {
        (Vec::new(), required.clone())
    };

    let mut warnings = Vec::new();
    if incomplete > 0 {
        warnings.push(StepIssue::new(
            "module_incomplete",
            format!("{} chương chưa hoàn thiện (thiếu tên, mô tả hoặc thời lượng)", incomplete),
        ));
    }
    if total > 0 && total < RECOMMENDED_MODULE_COUNT {
        warnings.push(StepIssue::new(
            "few_modules",
            format!("khóa học mới có {} chương, nên có ít nhất {}", total, RECOMMENDED_MODULE_COUNT),
        ));
    }
    let total_duration = draft.total_duration_minutes();
    if total > 0 && total_duration < MIN_TOTAL_DURATION_MINUTES {
        warnings.push(StepIssue::new(
            "short_duration",
            format!(
                "tổng thời lượng {} phút, nên đạt tối thiểu {} phút",
                total_duration, MIN_TOTAL_DURATION_MINUTES
            ),
        ));
    }

    // Percentage tracks module validity, not the bare required-field ratio.
    let pct = if total == 0 {
        0.0
    } else {
        ratio_percentage(valid, total)
    };
    let is_completed = total >= 2 && incomplete == 0;
    finish_step(
        1,
        "curriculum",
        required,
        completed,
        missing,
        Vec::new(),
        warnings,
        pct,
        is_completed,
        tuning,
    )
}

fn step_content(draft: &CourseDraft, tuning: &ProgressTuning) -> StepProgress {
    let required = vec!["lessons".to_string()];
    let total = draft.modules.len();
    let with_video_url = draft
        .modules
        .iter()
        .filter(|m| m.has_video_lesson_with_url())
        .count();
    let without_any_content = draft.modules.iter().filter(|m| !m.has_any_content()).count();
    let without_video = draft.modules.iter().filter(|m| !m.has_video_lesson()).count();

    let has_lessons = draft.video_lesson_count() > 0;
    let (completed, missing) = if has_lessons {
        (required.clone(), Vec::new())
    } else {
        (Vec::new(), required.clone())
    };

    let mut warnings = Vec::new();
    if without_any_content > 0 {
        warnings.push(StepIssue::new(
            "module_no_content",
            format!("{} chương chưa có nội dung", without_any_content),
        ));
    }
    if total > 0 && without_video > 0 {
        warnings.push(StepIssue::new(
            "module_no_video",
            format!("{} chương chưa có bài giảng video", without_video),
        ));
    }

    let pct = if total == 0 {
        0.0
    } else {
        ratio_percentage(with_video_url, total)
    };
    let is_completed = total > 0 && with_video_url == total;
    finish_step(
        2,
        "content",
        required,
        completed,
        missing,
        Vec::new(),
        warnings,
        pct,
        is_completed,
        tuning,
    )
}

fn step_pricing(draft: &CourseDraft, tuning: &ProgressTuning) -> StepProgress {
    let required = vec!["basePrice".to_string()];
    let base = number_field(&draft.fields, "basePrice");
    let deal = number_field(&draft.fields, "dealPrice");
    let has_base = base.map(|v| v > 0.0).unwrap_or(false);

    let (completed, missing) = if has_base {
        (required.clone(), Vec::new())
    } else {
        (Vec::new(), required.clone())
    };

    let mut errors = Vec::new();
    if let (Some(base), Some(deal)) = (base, deal) {
        if deal >= base {
            errors.push(StepIssue::new("deal_price_not_lower", ERR_DEAL_PRICE));
        }
    }

    let mut warnings = Vec::new();
    if let Some(base) = base {
        if base > 0.0 && base < tuning.price_floor_vnd as f64 {
            warnings.push(StepIssue::new(
                "price_below_floor",
                format!("giá thấp hơn mức tối thiểu {} VND", tuning.price_floor_vnd),
            ));
        }
    }

    let is_completed = has_base && errors.is_empty();
    let pct = if is_completed { 100.0 } else { 0.0 };
    finish_step(
        3,
        "pricing",
        required,
        completed,
        missing,
        errors,
        warnings,
        pct,
        is_completed,
        tuning,
    )
}

fn step_final(draft: &CourseDraft, mode: WizardMode, tuning: &ProgressTuning) -> StepProgress {
    let step_name = match mode {
        WizardMode::Create => "publish",
        WizardMode::Edit => "confirmUpdate",
    };
    let required = vec!["readyToPublish".to_string()];

    let info = step_information(draft, tuning);
    let curriculum_ok =
        !draft.modules.is_empty() && draft.modules.iter().all(|m| m.is_complete());
    let has_video = draft.video_lesson_count() > 0;

    let mut warnings = Vec::new();
    if !info.is_completed {
        warnings.push(StepIssue::new(
            "information_incomplete",
            "thông tin khóa học chưa hoàn thiện",
        ));
    }
    if !curriculum_ok {
        warnings.push(StepIssue::new(
            "curriculum_incomplete",
            "chương trình học chưa hoàn thiện",
        ));
    }
    if !has_video {
        warnings.push(StepIssue::new(
            "content_missing",
            "khóa học chưa có bài giảng video nào",
        ));
    }

    let ready = info.is_completed && curriculum_ok && has_video;
    let (completed, missing) = if ready {
        (required.clone(), Vec::new())
    } else {
        (Vec::new(), required.clone())
    };
    let pct = if ready { 100.0 } else { 0.0 };
    finish_step(
        4,
        step_name,
        required,
        completed,
        missing,
        Vec::new(),
        warnings,
        pct,
        ready,
        tuning,
    )
}

#[allow(clippy::too_many_arguments)]
fn finish_step(
    step_id: usize,
    step_name: &str,
    required_fields: Vec<String>,
    completed_fields: Vec<String>,
    missing_fields: Vec<String>,
    errors: Vec<StepIssue>,
    warnings: Vec<StepIssue>,
    completion_percentage: f64,
    is_completed: bool,
    tuning: &ProgressTuning,
) -> StepProgress {
    let can_proceed = errors.is_empty()
        && (is_completed || completion_percentage >= tuning.proceed_threshold_percent as f64);
    StepProgress {
        step_id,
        step_name: step_name.to_string(),
        required_fields,
        completed_fields,
        missing_fields,
        errors,
        warnings,
        completion_percentage,
        is_completed,
        can_proceed,
    }
}

/// Completed-over-required as a percentage, one decimal. An empty requirement
/// list means there is nothing left to do, so it reads as 100.
fn ratio_percentage(completed: usize, required: usize) -> f64 {
    if required == 0 {
        return 100.0;
    }
    round_1dp(completed as f64 / required as f64 * 100.0)
}

fn round_1dp(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

fn non_empty_string<'a>(fields: &'a Map<String, Value>, name: &str) -> Option<&'a str> {
    fields
        .get(name)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn number_field(fields: &Map<String, Value>, name: &str) -> Option<f64> {
    fields.get(name).and_then(Value::as_f64)
}

fn positive_number(fields: &Map<String, Value>, name: &str) -> bool {
    number_field(fields, name).map(|v| v > 0.0).unwrap_or(false)
}
