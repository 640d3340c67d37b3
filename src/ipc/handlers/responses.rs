use crate::ipc::error::ok;
use crate::ipc::helpers::{db_conn, required_i64, required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::stats::{self, round1};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

fn required_marks(params: &serde_json::Value) -> Result<f64, HandlerErr> {
    params
        .get("marks")
        .and_then(|v| v.as_f64())
        .ok_or_else(|| HandlerErr::bad_params("missing marks"))
}

/// A grader correcting the agent's judgement on one question. Marks are on
/// the 0 to 10 question scale; the assignment grade is recomputed from the
/// response rows afterwards so the two never drift apart.
fn update_marks(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let response_id = required_i64(params, "responseId")?;
    let marks = required_marks(params)?;
    if !(0.0..=10.0).contains(&marks) {
        return Err(HandlerErr::bad_params("marks must be between 0 and 10"));
    }

    let row = conn
        .query_row(
            "SELECT qr.student_id, q.assignment_id
             FROM question_responses qr
             JOIN questions q ON q.id = qr.question_id
             WHERE qr.id = ?",
            [response_id],
            |r| Ok((r.get::<_, i64>(0)?, r.get::<_, i64>(1)?)),
        )
        .optional()?;
    let Some((student_id, assignment_id)) = row else {
        return Err(HandlerErr::not_found("response not found"));
    };

    conn.execute(
        "UPDATE question_responses SET marks = ?, graded = 1, grader = 'manual' WHERE id = ?",
        (marks, response_id),
    )?;
    let assignment_marks = stats::recompute_assignment_grade(conn, assignment_id, student_id)?;

    Ok(json!({
        "responseId": response_id,
        "marks": marks,
        "assignmentId": assignment_id,
        "studentId": student_id,
        "assignmentMarks": assignment_marks
    }))
}

fn comment(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let response_id = required_i64(params, "responseId")?;
    let user_id = required_str(params, "userId")?;
    let content = required_str(params, "content")?.trim().to_string();
    if content.is_empty() {
        return Err(HandlerErr::bad_params("content must not be empty"));
    }

    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM question_responses WHERE id = ?",
            [response_id],
            |r| r.get(0),
        )
        .optional()?;
    if found.is_none() {
        return Err(HandlerErr::not_found("response not found"));
    }

    let created_at = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO grade_review_comments(response_id, user_id, content, created_at)
         VALUES(?, ?, ?, ?)",
        (response_id, &user_id, &content, &created_at),
    )?;

    Ok(json!({
        "commentId": conn.last_insert_rowid(),
        "createdAt": created_at
    }))
}

/// Sets the assignment-level grade directly, bypassing per-question marks.
fn set_grade(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let assignment_id = required_i64(params, "assignmentId")?;
    let student_id = required_i64(params, "studentId")?;
    let marks = required_marks(params)?;
    if marks < 0.0 {
        return Err(HandlerErr::bad_params("marks must not be negative"));
    }

    let question_count = conn
        .query_row(
            "SELECT (SELECT COUNT(*) FROM questions q WHERE q.assignment_id = a.id)
             FROM assignments a WHERE a.id = ?",
            [assignment_id],
            |r| r.get::<_, i64>(0),
        )
        .optional()?;
    let Some(question_count) = question_count else {
        return Err(HandlerErr::not_found("assignment not found"));
    };

    let feedback = match params.get("feedback") {
        None => None,
        Some(v) if v.is_null() => Some(None),
        Some(v) => match v.as_str() {
            Some(s) => Some(Some(s.to_string())),
            None => return Err(HandlerErr::bad_params("feedback must be a string or null")),
        },
    };

    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM assignment_grades WHERE assignment_id = ? AND student_id = ?",
            (assignment_id, student_id),
            |r| r.get(0),
        )
        .optional()?;
    match (existing, &feedback) {
        (Some(id), Some(fb)) => {
            conn.execute(
                "UPDATE assignment_grades SET marks = ?, feedback = ? WHERE id = ?",
                (marks, fb, id),
            )?;
        }
        (Some(id), None) => {
            conn.execute(
                "UPDATE assignment_grades SET marks = ? WHERE id = ?",
                (marks, id),
            )?;
        }
        (None, _) => {
            conn.execute(
                "INSERT INTO assignment_grades(assignment_id, student_id, marks, feedback)
                 VALUES(?, ?, ?, ?)",
                (
                    assignment_id,
                    student_id,
                    marks,
                    feedback.clone().flatten(),
                ),
            )?;
        }
    }

    let possible = 10.0 * question_count as f64;
    let percentage = if possible > 0.0 {
        round1(marks / possible * 100.0)
    } else {
        0.0
    };
    Ok(json!({
        "assignmentId": assignment_id,
        "studentId": student_id,
        "marks": marks,
        "percentage": percentage
    }))
}

fn handle_responses_update_marks(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state) {
        Ok(c) => c,
        Err(error) => return error.response(&req.id),
    };
    match update_marks(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_responses_comment(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state) {
        Ok(c) => c,
        Err(error) => return error.response(&req.id),
    };
    match comment(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_grades_set(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state) {
        Ok(c) => c,
        Err(error) => return error.response(&req.id),
    };
    match set_grade(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "responses.updateMarks" => Some(handle_responses_update_marks(state, req)),
        "responses.comment" => Some(handle_responses_comment(state, req)),
        "grades.set" => Some(handle_grades_set(state, req)),
        _ => None,
    }
}
