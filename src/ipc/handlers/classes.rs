use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::json;

fn handle_classes_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "classes": [] }));
    };

    // Include basic counts so the UI can show a useful dashboard.
    // Use correlated subqueries to avoid double-counting from joins.
    let mut stmt = match conn.prepare(
        "SELECT
           c.id,
           c.name,
           c.course_name,
           (SELECT COUNT(*) FROM resources r WHERE r.class_id = c.id) AS resource_count,
           (SELECT COUNT(*) FROM assignments a WHERE a.class_id = c.id) AS assignment_count
         FROM classes c
         ORDER BY c.name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([], |row| {
            let id: i64 = row.get(0)?;
            let name: String = row.get(1)?;
            let course_name: Option<String> = row.get(2)?;
            let resource_count: i64 = row.get(3)?;
            let assignment_count: i64 = row.get(4)?;
            Ok(json!({
                "id": id,
                "name": name,
                "courseName": course_name,
                "resourceCount": resource_count,
                "assignmentCount": assignment_count
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(classes) => ok(&req.id, json!({ "classes": classes })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_classes_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let name = match req.params.get("name").and_then(|v| v.as_str()) {
        Some(v) => v.trim().to_string(),
        None => return err(&req.id, "bad_params", "missing name", None),
    };
    if name.is_empty() {
        return err(&req.id, "bad_params", "name must not be empty", None);
    }
    let course_name = req
        .params
        .get("courseName")
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());

    if let Err(e) = conn.execute(
        "INSERT INTO classes(name, course_name) VALUES(?, ?)",
        (&name, &course_name),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "classes" })),
        );
    }
    let class_id = conn.last_insert_rowid();

    ok(
        &req.id,
        json!({ "classId": class_id, "name": name, "courseName": course_name }),
    )
}

fn handle_classes_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let class_id = match req.params.get("classId").and_then(|v| v.as_i64()) {
        Some(v) => v,
        None => return err(&req.id, "bad_params", "missing classId", None),
    };

    let exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM classes WHERE id = ?", [class_id], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    if exists.is_none() {
        return err(&req.id, "not_found", "class not found", None);
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    // Explicitly delete in dependency order (no ON DELETE CASCADE).
    // Topics are shared across classes and are left alone.
    if let Err(e) = tx.execute(
        "DELETE FROM topic_scores
         WHERE batch_id IN (
           SELECT b.id
           FROM submission_batches b
           JOIN assignments a ON a.id = b.assignment_id
           WHERE a.class_id = ?
         )",
        [class_id],
    ) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "topic_scores" })),
        );
    }

    if let Err(e) = tx.execute(
        "DELETE FROM submission_batches
         WHERE assignment_id IN (SELECT id FROM assignments WHERE class_id = ?)",
        [class_id],
    ) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "submission_batches" })),
        );
    }

    if let Err(e) = tx.execute(
        "DELETE FROM grade_review_comments
         WHERE response_id IN (
           SELECT qr.id
           FROM question_responses qr
           JOIN questions q ON q.id = qr.question_id
           JOIN assignments a ON a.id = q.assignment_id
           WHERE a.class_id = ?
         )",
        [class_id],
    ) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "grade_review_comments" })),
        );
    }

    if let Err(e) = tx.execute(
        "DELETE FROM question_responses
         WHERE question_id IN (
           SELECT q.id
           FROM questions q
           JOIN assignments a ON a.id = q.assignment_id
           WHERE a.class_id = ?
         )",
        [class_id],
    ) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "question_responses" })),
        );
    }

    if let Err(e) = tx.execute(
        "DELETE FROM questions
         WHERE assignment_id IN (SELECT id FROM assignments WHERE class_id = ?)",
        [class_id],
    ) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "questions" })),
        );
    }

    if let Err(e) = tx.execute(
        "DELETE FROM assignment_grades
         WHERE assignment_id IN (SELECT id FROM assignments WHERE class_id = ?)",
        [class_id],
    ) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "assignment_grades" })),
        );
    }

    if let Err(e) = tx.execute("DELETE FROM assignments WHERE class_id = ?", [class_id]) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "assignments" })),
        );
    }

    if let Err(e) = tx.execute(
        "DELETE FROM key_concepts
         WHERE occurrence_id IN (
           SELECT o.id
           FROM occurrences o
           JOIN resources r ON r.id = o.resource_id
           WHERE r.class_id = ?
         )",
        [class_id],
    ) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "key_concepts" })),
        );
    }

    if let Err(e) = tx.execute(
        "DELETE FROM occurrences
         WHERE resource_id IN (SELECT id FROM resources WHERE class_id = ?)",
        [class_id],
    ) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "occurrences" })),
        );
    }

    if let Err(e) = tx.execute("DELETE FROM resources WHERE class_id = ?", [class_id]) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "resources" })),
        );
    }

    if let Err(e) = tx.execute("DELETE FROM classes WHERE id = ?", [class_id]) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "classes" })),
        );
    }

    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "classes.list" => Some(handle_classes_list(state, req)),
        "classes.create" => Some(handle_classes_create(state, req)),
        "classes.delete" => Some(handle_classes_delete(state, req)),
        _ => None,
    }
}
