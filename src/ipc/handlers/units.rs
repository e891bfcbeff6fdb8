use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, now_ts, required_str, string_array};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Value};
use uuid::Uuid;

fn handle_units_create(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    let title = match required_str(&req.params, "title") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let topics = match string_array(&req.params, "topics") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    // A unit's topics are a set; request-level topicTags may repeat to weight a tag.
    let mut unique = Vec::with_capacity(topics.len());
    for t in topics {
        if !unique.contains(&t) {
            unique.push(t);
        }
    }
    let topics = unique;
    let unit_id = Uuid::new_v4().to_string();
    if let Err(e) = db::create_unit(conn, &unit_id, &title, &topics, &now_ts()) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "unitId": unit_id, "topics": topics }))
}

fn handle_units_list(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "units": [] }));
    };
    match db::list_units(conn) {
        Ok(units) => ok(&req.id, json!({ "units": units })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "units.create" => Some(handle_units_create(state, req)),
        "units.list" => Some(handle_units_list(state, req)),
        _ => None,
    }
}
