use crate::db;
use crate::generator::{stubs_for_counts, usable_topic_tags};
use crate::ipc::error::ok;
use crate::ipc::handlers::setup::{question_settings, QuestionSettings};
use crate::ipc::helpers::{db_conn, opt_str, string_array, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::quota::{allocate, AllocationMethod, GenerationConfig};
use serde_json::{json, Value};

struct GenerationRequest {
    config: GenerationConfig,
    method: AllocationMethod,
    settings: QuestionSettings,
}

fn parse_generation_request(state: &AppState, params: &Value) -> Result<GenerationRequest, HandlerErr> {
    let settings = match state.db.as_ref() {
        Some(conn) => question_settings(conn).map_err(|e| HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        })?,
        None => QuestionSettings::default(),
    };
    let config: GenerationConfig = serde_json::from_value(params.clone())
        .map_err(|e| HandlerErr::bad_params(format!("invalid generation config: {}", e)))?;
    config
        .validate(settings.max_question_count)
        .map_err(HandlerErr::bad_params)?;
    let method = match opt_str(params, "allocationMethod")? {
        Some(s) => AllocationMethod::parse(&s).ok_or_else(|| {
            HandlerErr::bad_params(
                "allocationMethod must be one of: independent_rounding, largest_remainder",
            )
        })?,
        None => settings.allocation_method,
    };
    Ok(GenerationRequest {
        config,
        method,
        settings,
    })
}

fn topic_tags(state: &AppState, params: &Value, fallback: &str) -> Result<Vec<String>, HandlerErr> {
    let mut tags = string_array(params, "topicTags")?;
    if let Some(unit_id) = opt_str(params, "unitId")? {
        let conn = db_conn(state)?;
        let unit = db::get_unit(conn, &unit_id).map_err(|e| HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        })?;
        let Some(unit) = unit else {
            return Err(HandlerErr {
                code: "not_found",
                message: "unit not found".to_string(),
                details: Some(json!({ "unitId": unit_id })),
            });
        };
        for t in unit.topics {
            if !tags.contains(&t) {
                tags.push(t);
            }
        }
    }
    Ok(usable_topic_tags(&tags, fallback))
}

fn handle_questions_allocate(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let gr = parse_generation_request(state, &req.params)?;
    let counts = allocate(&gr.config, gr.method);
    Ok(json!({
        "allocationMethod": gr.method.as_str(),
        "targetQuestionCount": gr.config.target_question_count,
        "counts": counts,
        "total": counts.total(),
        "drift": counts.drift(gr.config.target_question_count)
    }))
}

fn handle_questions_generate(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let gr = parse_generation_request(state, &req.params)?;
    let tags = topic_tags(state, &req.params, &gr.settings.fallback_topic_tag)?;
    let counts = allocate(&gr.config, gr.method);
    let questions = stubs_for_counts(&counts, &tags);
    tracing::debug!(
        total = questions.len(),
        target = gr.config.target_question_count,
        method = gr.method.as_str(),
        "generated question stubs"
    );
    Ok(json!({
        "allocationMethod": gr.method.as_str(),
        "counts": counts,
        "total": counts.total(),
        "drift": counts.drift(gr.config.target_question_count),
        "topicTags": tags,
        "questions": questions
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "questions.allocate" => handle_questions_allocate(state, req),
        "questions.generate" => handle_questions_generate(state, req),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
