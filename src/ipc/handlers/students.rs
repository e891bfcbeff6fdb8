use crate::db;
use crate::ipc::error::ok;
use crate::ipc::helpers::{db_conn, now_ts, opt_bool, opt_str, required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::roster::write_roster_csv;
use serde_json::{json, Value};
use std::path::PathBuf;

fn handle_students_list(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let class_id = opt_str(&req.params, "classId")?;
    let include_inactive = opt_bool(&req.params, "includeInactive", true)?;
    let students = db::list_students(conn, class_id.as_deref(), include_inactive)?;
    Ok(json!({ "students": students }))
}

fn handle_students_set_active(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let student_id = required_str(&req.params, "studentId")?;
    let Some(active) = req.params.get("active").and_then(|v| v.as_bool()) else {
        return Err(HandlerErr::bad_params("active must be boolean"));
    };
    db::set_student_active(conn, &student_id, active, &now_ts())?;
    Ok(json!({ "ok": true, "studentId": student_id, "isActive": active }))
}

fn write_text_file(path: &str, contents: &str) -> Result<(), HandlerErr> {
    let out = PathBuf::from(path);
    if let Some(parent) = out.parent() {
        std::fs::create_dir_all(parent).map_err(|e| HandlerErr {
            code: "io_failed",
            message: e.to_string(),
            details: Some(json!({ "path": path })),
        })?;
    }
    std::fs::write(&out, contents).map_err(|e| HandlerErr {
        code: "io_failed",
        message: e.to_string(),
        details: Some(json!({ "path": path })),
    })
}

fn handle_students_export_csv(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let class_id = opt_str(&req.params, "classId")?;
    let out_path = opt_str(&req.params, "outPath")?;
    let students = db::list_students(conn, class_id.as_deref(), true)?;
    let csv = write_roster_csv(&students);
    if let Some(path) = out_path.as_deref() {
        write_text_file(path, &csv)?;
    }
    Ok(json!({
        "rowsExported": students.len(),
        "outPath": out_path,
        "csv": csv
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "students.list" => handle_students_list(state, req),
        "students.setActive" => handle_students_set_active(state, req),
        "students.exportCsv" => handle_students_export_csv(state, req),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}

