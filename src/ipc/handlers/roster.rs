use crate::db::SqliteDirectory;
use crate::directory::{plan, reconcile, ReconcileOptions};
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::setup::{roster_settings, RosterSettings};
use crate::ipc::helpers::{db_conn, now_ts, opt_str, roster_text, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::roster::{parse_roster, ParsedRoster};
use serde_json::{json, Value};

fn parse_from_params(params: &Value) -> Result<ParsedRoster, HandlerErr> {
    let text = roster_text(params)?;
    let parsed = parse_roster(&text)?;
    for s in &parsed.skipped {
        tracing::warn!(line = s.line, reason = ?s.reason, "skipped roster row");
    }
    Ok(parsed)
}

fn skipped_json(parsed: &ParsedRoster, settings: &RosterSettings) -> Value {
    if settings.include_skipped_rows {
        json!(parsed.skipped)
    } else {
        json!([])
    }
}

fn handle_roster_parse(state: &mut AppState, req: &Request) -> Value {
    let settings = match state.db.as_ref().map(roster_settings).transpose() {
        Ok(v) => v.unwrap_or_default(),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let parsed = match parse_from_params(&req.params) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    ok(
        &req.id,
        json!({
            "rowsTotal": parsed.rows_total,
            "rowsParsed": parsed.entries.len(),
            "entries": parsed.entries,
            "skipped": skipped_json(&parsed, &settings)
        }),
    )
}

fn handle_roster_preview(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    let settings = match roster_settings(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let parsed = match parse_from_params(&req.params) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let rows = match plan(&parsed.entries, &SqliteDirectory::new(conn), settings.email_match) {
        Ok(v) => v,
        Err(e) => return HandlerErr::from(e).response(&req.id),
    };
    let new_count = rows.iter().filter(|r| r.is_create()).count();

    ok(
        &req.id,
        json!({
            "emailMatch": settings.email_match.as_str(),
            "rowsTotal": parsed.rows_total,
            "rowsParsed": parsed.entries.len(),
            "new": new_count,
            "matched": rows.len() - new_count,
            "skipped": parsed.skipped.len(),
            "skippedRows": skipped_json(&parsed, &settings),
            "previewRows": rows
        }),
    )
}

fn handle_roster_apply(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    let settings = match roster_settings(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let default_class_id = match opt_str(&req.params, "classId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let parsed = match parse_from_params(&req.params) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let opts = ReconcileOptions {
        email_match: settings.email_match,
        default_active: settings.default_active,
        default_class_id,
    };

    let tx = match conn.unchecked_transaction() {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let result = match reconcile(&parsed.entries, &mut SqliteDirectory::new(&tx), &opts, &now_ts()) {
        Ok(v) => v,
        Err(e) => {
            let _ = tx.rollback();
            return HandlerErr::from(e).response(&req.id);
        }
    };
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    tracing::info!(
        created = result.created,
        updated = result.updated,
        skipped = parsed.skipped.len(),
        "roster applied"
    );

    ok(
        &req.id,
        json!({
            "ok": true,
            "emailMatch": settings.email_match.as_str(),
            "created": result.created,
            "updated": result.updated,
            "skipped": parsed.skipped.len(),
            "warnings": skipped_json(&parsed, &settings)
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "roster.parse" => Some(handle_roster_parse(state, req)),
        "roster.preview" => Some(handle_roster_preview(state, req)),
        "roster.apply" => Some(handle_roster_apply(state, req)),
        _ => None,
    }
}
