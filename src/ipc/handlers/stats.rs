use crate::ipc::error::ok;
use crate::ipc::helpers::{db_conn, required_i64, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::stats::{class_statistics, StatsScope};
use rusqlite::Connection;
use serde_json::json;

fn class_stats(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let class_id = required_i64(params, "classId")?;
    let scope = match params.get("scope").and_then(|v| v.as_str()) {
        None | Some("teacher") => StatsScope::ClassWide,
        Some("student") => {
            let student_id = required_i64(params, "studentId")?;
            StatsScope::Student(student_id)
        }
        Some(other) => {
            return Err(HandlerErr::bad_params(format!(
                "scope must be teacher or student, got {}",
                other
            )))
        }
    };
    let stats = class_statistics(conn, class_id, scope)?;
    Ok(json!(stats))
}

fn handle_stats_class(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state) {
        Ok(c) => c,
        Err(error) => return error.response(&req.id),
    };
    match class_stats(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "stats.class" => Some(handle_stats_class(state, req)),
        _ => None,
    }
}
