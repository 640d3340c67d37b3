use crate::agent;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, required_i64, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::stats::round1;
use crate::submit::{self, AnswerInput};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

fn parse_answers(params: &serde_json::Value) -> Result<Vec<AnswerInput>, HandlerErr> {
    let entries = params
        .get("responses")
        .and_then(|v| v.as_array())
        .ok_or_else(|| HandlerErr::bad_params("missing responses"))?;
    let mut answers = Vec::with_capacity(entries.len());
    for entry in entries {
        let question_id = entry
            .get("questionId")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| HandlerErr::bad_params("each response needs a questionId"))?;
        let answer = entry
            .get("answer")
            .and_then(|v| v.as_str())
            .ok_or_else(|| HandlerErr::bad_params("each response needs an answer string"))?;
        answers.push(AnswerInput {
            question_id,
            answer: answer.to_string(),
        });
    }
    Ok(answers)
}

fn question_count(conn: &Connection, assignment_id: i64) -> Result<i64, HandlerErr> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM questions WHERE assignment_id = ?",
        [assignment_id],
        |r| r.get(0),
    )?;
    Ok(count)
}

fn list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let assignment_id = required_i64(params, "assignmentId")?;
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM assignments WHERE id = ?",
            [assignment_id],
            |r| r.get(0),
        )
        .optional()?;
    if found.is_none() {
        return Err(HandlerErr::not_found("assignment not found"));
    }

    let possible = 10.0 * question_count(conn, assignment_id)? as f64;
    let mut stmt = conn.prepare(
        "SELECT qr.student_id, COUNT(*), MIN(qr.graded)
         FROM question_responses qr
         JOIN questions q ON q.id = qr.question_id
         WHERE q.assignment_id = ?
         GROUP BY qr.student_id
         ORDER BY qr.student_id",
    )?;
    let rows = stmt
        .query_map([assignment_id], |r| {
            Ok((r.get::<_, i64>(0)?, r.get::<_, i64>(1)?, r.get::<_, i64>(2)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut submissions = Vec::with_capacity(rows.len());
    for (student_id, response_count, min_graded) in rows {
        let marks: Option<f64> = conn
            .query_row(
                "SELECT marks FROM assignment_grades
                 WHERE assignment_id = ? AND student_id = ?",
                (assignment_id, student_id),
                |r| r.get(0),
            )
            .optional()?;
        let percentage = marks.map(|m| {
            if possible > 0.0 {
                round1(m / possible * 100.0)
            } else {
                0.0
            }
        });
        submissions.push(json!({
            "studentId": student_id,
            "responseCount": response_count,
            "status": if min_graded == 1 { "graded" } else { "pending" },
            "marks": marks,
            "percentage": percentage,
        }));
    }
    Ok(json!({ "assignmentId": assignment_id, "submissions": submissions }))
}

/// Full graded detail for one student's submission, including per-question
/// marks and any review comments. Only available once a grade exists.
fn review(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let assignment_id = required_i64(params, "assignmentId")?;
    let student_id = required_i64(params, "studentId")?;
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM assignments WHERE id = ?",
            [assignment_id],
            |r| r.get(0),
        )
        .optional()?;
    if found.is_none() {
        return Err(HandlerErr::not_found("assignment not found"));
    }

    let grade = conn
        .query_row(
            "SELECT marks, feedback FROM assignment_grades
             WHERE assignment_id = ? AND student_id = ?",
            (assignment_id, student_id),
            |r| Ok((r.get::<_, f64>(0)?, r.get::<_, Option<String>>(1)?)),
        )
        .optional()?;
    let Some((marks, feedback)) = grade else {
        return Err(HandlerErr::not_found("submission not graded yet"));
    };

    let mut stmt = conn.prepare(
        "SELECT q.id, q.content, qr.id, qr.content, qr.marks, qr.feedback, qr.graded, qr.grader
         FROM questions q
         LEFT JOIN question_responses qr
           ON qr.question_id = q.id AND qr.student_id = ?
         WHERE q.assignment_id = ?
         ORDER BY q.id",
    )?;
    let rows = stmt
        .query_map((student_id, assignment_id), |r| {
            Ok((
                r.get::<_, i64>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, Option<i64>>(2)?,
                r.get::<_, Option<String>>(3)?,
                r.get::<_, Option<f64>>(4)?,
                r.get::<_, Option<String>>(5)?,
                r.get::<_, Option<i64>>(6)?,
                r.get::<_, Option<String>>(7)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut questions = Vec::with_capacity(rows.len());
    for (question_id, content, response_id, answer, q_marks, q_feedback, graded, grader) in rows {
        let comments = match response_id {
            None => Vec::new(),
            Some(rid) => {
                let mut cstmt = conn.prepare(
                    "SELECT id, user_id, content, created_at
                     FROM grade_review_comments
                     WHERE response_id = ?
                     ORDER BY created_at, id",
                )?;
                let comments = cstmt
                    .query_map([rid], |r| {
                        Ok(json!({
                            "commentId": r.get::<_, i64>(0)?,
                            "userId": r.get::<_, String>(1)?,
                            "content": r.get::<_, String>(2)?,
                            "createdAt": r.get::<_, String>(3)?,
                        }))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                comments
            }
        };
        questions.push(json!({
            "questionId": question_id,
            "content": content,
            "responseId": response_id,
            "answer": answer,
            "marks": q_marks,
            "feedback": q_feedback,
            "graded": graded.unwrap_or(0) == 1,
            "grader": grader,
            "comments": comments,
        }));
    }

    let possible = 10.0 * question_count(conn, assignment_id)? as f64;
    let percentage = if possible > 0.0 {
        round1(marks / possible * 100.0)
    } else {
        0.0
    };

    Ok(json!({
        "assignmentId": assignment_id,
        "studentId": student_id,
        "marks": marks,
        "possible": possible,
        "percentage": percentage,
        "feedback": feedback,
        "questions": questions
    }))
}

fn handle_submissions_submit(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let assignment_id = match required_i64(&req.params, "assignmentId") {
        Ok(v) => v,
        Err(error) => return error.response(&req.id),
    };
    let student_id = match required_i64(&req.params, "studentId") {
        Ok(v) => v,
        Err(error) => return error.response(&req.id),
    };
    let answers = match parse_answers(&req.params) {
        Ok(v) => v,
        Err(error) => return error.response(&req.id),
    };

    let grader = agent::grading_agent(&state.agents);
    match submit::process_submission(conn, assignment_id, student_id, &answers, grader.as_ref()) {
        Ok(outcome) => ok(
            &req.id,
            json!({
                "status": outcome.status.as_str(),
                "marks": outcome.marks,
                "possible": outcome.possible,
                "percentage": outcome.percentage,
                "feedback": outcome.feedback,
                "responseIds": outcome.response_ids,
            }),
        ),
        Err(e) => HandlerErr::from(e).response(&req.id),
    }
}

fn handle_submissions_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state) {
        Ok(c) => c,
        Err(error) => return error.response(&req.id),
    };
    match list(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_submissions_review(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state) {
        Ok(c) => c,
        Err(error) => return error.response(&req.id),
    };
    match review(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "submissions.submit" => Some(handle_submissions_submit(state, req)),
        "submissions.list" => Some(handle_submissions_list(state, req)),
        "submissions.review" => Some(handle_submissions_review(state, req)),
        _ => None,
    }
}
