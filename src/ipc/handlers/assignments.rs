use crate::ipc::error::ok;
use crate::ipc::helpers::{db_conn, required_i64, required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

fn create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = required_i64(params, "classId")?;
    let found: Option<i64> = conn
        .query_row("SELECT 1 FROM classes WHERE id = ?", [class_id], |r| r.get(0))
        .optional()?;
    if found.is_none() {
        return Err(HandlerErr::not_found("class not found"));
    }

    let title = required_str(params, "title")?.trim().to_string();
    if title.is_empty() {
        return Err(HandlerErr::bad_params("title must not be empty"));
    }
    // Zero questions is allowed; such assignments chart at 0% and stay out
    // of the overall average.
    let questions = match params.get("questions") {
        None => Vec::new(),
        Some(v) => v
            .as_array()
            .cloned()
            .ok_or_else(|| HandlerErr::bad_params("questions must be an array"))?,
    };
    let mut contents = Vec::with_capacity(questions.len());
    for q in &questions {
        let text = q
            .as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| HandlerErr::bad_params("each question must be a non-empty string"))?;
        contents.push(text.to_string());
    }

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO assignments(class_id, title) VALUES(?, ?)",
        (class_id, &title),
    )?;
    let assignment_id = tx.last_insert_rowid();
    let mut question_ids = Vec::with_capacity(contents.len());
    for content in &contents {
        tx.execute(
            "INSERT INTO questions(assignment_id, content) VALUES(?, ?)",
            (assignment_id, content),
        )?;
        question_ids.push(tx.last_insert_rowid());
    }
    tx.commit()?;

    Ok(json!({ "assignmentId": assignment_id, "questionIds": question_ids }))
}

fn list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = required_i64(params, "classId")?;
    let found: Option<i64> = conn
        .query_row("SELECT 1 FROM classes WHERE id = ?", [class_id], |r| r.get(0))
        .optional()?;
    if found.is_none() {
        return Err(HandlerErr::not_found("class not found"));
    }

    let mut stmt = conn.prepare(
        "SELECT a.id, a.title,
                (SELECT COUNT(*) FROM questions q WHERE q.assignment_id = a.id),
                (SELECT COUNT(*) FROM assignment_grades g WHERE g.assignment_id = a.id)
         FROM assignments a
         WHERE a.class_id = ?
         ORDER BY a.id",
    )?;
    let assignments = stmt
        .query_map([class_id], |r| {
            Ok(json!({
                "id": r.get::<_, i64>(0)?,
                "title": r.get::<_, String>(1)?,
                "questionCount": r.get::<_, i64>(2)?,
                "gradeCount": r.get::<_, i64>(3)?,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "assignments": assignments }))
}

fn get(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let assignment_id = required_i64(params, "assignmentId")?;
    let row = conn
        .query_row(
            "SELECT class_id, title FROM assignments WHERE id = ?",
            [assignment_id],
            |r| Ok((r.get::<_, i64>(0)?, r.get::<_, String>(1)?)),
        )
        .optional()?;
    let Some((class_id, title)) = row else {
        return Err(HandlerErr::not_found("assignment not found"));
    };

    let mut stmt = conn.prepare(
        "SELECT id, content FROM questions WHERE assignment_id = ? ORDER BY id",
    )?;
    let questions = stmt
        .query_map([assignment_id], |r| {
            Ok(json!({
                "questionId": r.get::<_, i64>(0)?,
                "content": r.get::<_, String>(1)?,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(json!({
        "assignmentId": assignment_id,
        "classId": class_id,
        "title": title,
        "questions": questions
    }))
}

fn handle_assignments_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state) {
        Ok(c) => c,
        Err(error) => return error.response(&req.id),
    };
    match create(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_assignments_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state) {
        Ok(c) => c,
        Err(error) => return error.response(&req.id),
    };
    match list(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_assignments_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state) {
        Ok(c) => c,
        Err(error) => return error.response(&req.id),
    };
    match get(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "assignments.create" => Some(handle_assignments_create(state, req)),
        "assignments.list" => Some(handle_assignments_list(state, req)),
        "assignments.get" => Some(handle_assignments_get(state, req)),
        _ => None,
    }
}
