use crate::db;
use crate::directory::EmailMatch;
use crate::generator::FALLBACK_TOPIC_TAG;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::db_conn;
use crate::ipc::types::{AppState, Request};
use crate::quota::AllocationMethod;
use rusqlite::Connection;
use serde_json::{json, Map, Value};

#[derive(Clone, Copy)]
enum SetupSection {
    Roster,
    Questions,
}

impl SetupSection {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "roster" => Some(Self::Roster),
            "questions" => Some(Self::Questions),
            _ => None,
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Roster => "setup.roster",
            Self::Questions => "setup.questions",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Roster => json!({
            "emailMatch": EmailMatch::default().as_str(),
            "defaultActive": true,
            "includeSkippedRows": true
        }),
        SetupSection::Questions => json!({
            "allocationMethod": AllocationMethod::default().as_str(),
            "fallbackTopicTag": FALLBACK_TOPIC_TAG,
            "maxQuestionCount": 200
        }),
    }
}

fn parse_bool(v: &Value, key: &str) -> Result<bool, String> {
    v.as_bool().ok_or_else(|| format!("{} must be boolean", key))
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v.as_i64().ok_or_else(|| format!("{} must be integer", key))?;
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
    let obj = current
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())?;
    for (k, v) in patch {
        match section {
            SetupSection::Roster => match k.as_str() {
                "emailMatch" => {
                    let s = parse_string_max(v, k, 24)?;
                    let mode = EmailMatch::parse(&s)
                        .ok_or("emailMatch must be one of: case_insensitive, exact")?;
                    obj.insert(k.clone(), Value::String(mode.as_str().to_string()));
                }
                "defaultActive" | "includeSkippedRows" => {
                    obj.insert(k.clone(), Value::Bool(parse_bool(v, k)?));
                }
                _ => return Err(format!("unknown roster field: {}", k)),
            },
            SetupSection::Questions => match k.as_str() {
                "allocationMethod" => {
                    let s = parse_string_max(v, k, 32)?;
                    let method = AllocationMethod::parse(&s).ok_or(
                        "allocationMethod must be one of: independent_rounding, largest_remainder",
                    )?;
                    obj.insert(k.clone(), Value::String(method.as_str().to_string()));
                }
                "fallbackTopicTag" => {
                    let s = parse_string_max(v, k, 64)?;
                    if s.is_empty() {
                        return Err("fallbackTopicTag must not be empty".into());
                    }
                    obj.insert(k.clone(), Value::String(s));
                }
                "maxQuestionCount" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 500)?));
                }
                _ => return Err(format!("unknown questions field: {}", k)),
            },
        }
    }
    Ok(())
}

fn load_section(conn: &Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Fields are applied one by one so a single bad value only loses itself.
            for (k, v) in saved_obj {
                let mut one = Map::new();
                one.insert(k.clone(), v.clone());
                let _ = merge_section_patch(section, &mut current, &one);
            }
        }
    }
    Ok(current)
}

#[derive(Debug, Clone)]
pub struct RosterSettings {
    pub email_match: EmailMatch,
    pub default_active: bool,
    pub include_skipped_rows: bool,
}

#[derive(Debug, Clone)]
pub struct QuestionSettings {
    pub allocation_method: AllocationMethod,
    pub fallback_topic_tag: String,
    pub max_question_count: u32,
}

pub fn roster_settings(conn: &Connection) -> anyhow::Result<RosterSettings> {
    let v = load_section(conn, SetupSection::Roster)?;
    Ok(RosterSettings {
        email_match: v["emailMatch"]
            .as_str()
            .and_then(EmailMatch::parse)
            .unwrap_or_default(),
        default_active: v["defaultActive"].as_bool().unwrap_or(true),
        include_skipped_rows: v["includeSkippedRows"].as_bool().unwrap_or(true),
    })
}

pub fn question_settings(conn: &Connection) -> anyhow::Result<QuestionSettings> {
    let v = load_section(conn, SetupSection::Questions)?;
    Ok(QuestionSettings {
        allocation_method: v["allocationMethod"]
            .as_str()
            .and_then(AllocationMethod::parse)
            .unwrap_or_default(),
        fallback_topic_tag: v["fallbackTopicTag"]
            .as_str()
            .unwrap_or(FALLBACK_TOPIC_TAG)
            .to_string(),
        max_question_count: v["maxQuestionCount"]
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or(200),
    })
}

impl Default for RosterSettings {
    fn default() -> Self {
        Self {
            email_match: EmailMatch::default(),
            default_active: true,
            include_skipped_rows: true,
        }
    }
}

impl Default for QuestionSettings {
    fn default() -> Self {
        Self {
            allocation_method: AllocationMethod::default(),
            fallback_topic_tag: FALLBACK_TOPIC_TAG.to_string(),
            max_question_count: 200,
        }
    }
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    let roster = match load_section(conn, SetupSection::Roster) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let questions = match load_section(conn, SetupSection::Questions) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    ok(&req.id, json!({ "roster": roster, "questions": questions }))
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
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
    tracing::info!(section = section.key(), "setup updated");
    ok(&req.id, json!({ "ok": true, "section": current }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}
