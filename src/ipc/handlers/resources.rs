use crate::agent;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, optional_str, required_i64, required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

fn class_exists(conn: &Connection, class_id: i64) -> Result<(), HandlerErr> {
    let found: Option<i64> = conn
        .query_row("SELECT 1 FROM classes WHERE id = ?", [class_id], |r| r.get(0))
        .optional()?;
    if found.is_none() {
        return Err(HandlerErr::not_found("class not found"));
    }
    Ok(())
}

fn resource_exists(conn: &Connection, resource_id: i64) -> Result<(), HandlerErr> {
    let found: Option<i64> = conn
        .query_row("SELECT 1 FROM resources WHERE id = ?", [resource_id], |r| {
            r.get(0)
        })
        .optional()?;
    if found.is_none() {
        return Err(HandlerErr::not_found("resource not found"));
    }
    Ok(())
}

fn create(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<(i64, Option<String>), HandlerErr> {
    let class_id = required_i64(params, "classId")?;
    class_exists(conn, class_id)?;

    let title = required_str(params, "title")?.trim().to_string();
    if title.is_empty() {
        return Err(HandlerErr::bad_params("title must not be empty"));
    }
    let kind = optional_str(params, "type");
    let url = optional_str(params, "url")
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty());
    let content = optional_str(params, "content");

    conn.execute(
        "INSERT INTO resources(class_id, title, type, url, content) VALUES(?, ?, ?, ?, ?)",
        (class_id, &title, &kind, &url, &content),
    )?;
    Ok((conn.last_insert_rowid(), url))
}

fn list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = required_i64(params, "classId")?;
    class_exists(conn, class_id)?;

    let mut stmt = conn.prepare(
        "SELECT r.id, r.title, r.type, r.url,
                (SELECT COUNT(*) FROM occurrences o WHERE o.resource_id = r.id),
                (SELECT COUNT(*)
                 FROM key_concepts kc
                 JOIN occurrences o2 ON o2.id = kc.occurrence_id
                 WHERE o2.resource_id = r.id)
         FROM resources r
         WHERE r.class_id = ?
         ORDER BY r.id",
    )?;
    let resources = stmt
        .query_map([class_id], |r| {
            Ok(json!({
                "id": r.get::<_, i64>(0)?,
                "title": r.get::<_, String>(1)?,
                "type": r.get::<_, Option<String>>(2)?,
                "url": r.get::<_, Option<String>>(3)?,
                "occurrenceCount": r.get::<_, i64>(4)?,
                "conceptCount": r.get::<_, i64>(5)?,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "resources": resources }))
}

fn delete(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let resource_id = required_i64(params, "resourceId")?;
    resource_exists(conn, resource_id)?;

    // Topics stay; only this resource's occurrences and their concepts go.
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "DELETE FROM key_concepts
         WHERE occurrence_id IN (SELECT id FROM occurrences WHERE resource_id = ?)",
        [resource_id],
    )
    .map_err(|e| HandlerErr::db_delete("key_concepts", e))?;
    tx.execute("DELETE FROM occurrences WHERE resource_id = ?", [resource_id])
        .map_err(|e| HandlerErr::db_delete("occurrences", e))?;
    tx.execute("DELETE FROM resources WHERE id = ?", [resource_id])
        .map_err(|e| HandlerErr::db_delete("resources", e))?;
    tx.commit()?;
    Ok(json!({ "ok": true }))
}

/// Everything the analysis pipeline attached to one resource, grouped by
/// topic for display.
fn analysis_view(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let resource_id = required_i64(params, "resourceId")?;
    resource_exists(conn, resource_id)?;

    let mut stmt = conn.prepare(
        "SELECT t.id, t.name, t.outline,
                kc.id, kc.name, kc.description, kc.timestamp_start, kc.timestamp_end,
                kc.page_number, kc.section
         FROM occurrences o
         JOIN topics t ON t.id = o.topic_id
         LEFT JOIN key_concepts kc ON kc.occurrence_id = o.id
         WHERE o.resource_id = ?
         ORDER BY t.name, t.id, kc.id",
    )?;
    let rows = stmt
        .query_map([resource_id], |r| {
            Ok((
                r.get::<_, i64>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, Option<String>>(2)?,
                r.get::<_, Option<i64>>(3)?,
                r.get::<_, Option<String>>(4)?,
                r.get::<_, Option<String>>(5)?,
                r.get::<_, Option<i64>>(6)?,
                r.get::<_, Option<i64>>(7)?,
                r.get::<_, Option<i64>>(8)?,
                r.get::<_, Option<String>>(9)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut topics: Vec<serde_json::Value> = Vec::new();
    for (topic_id, name, outline, kc_id, kc_name, kc_desc, ts_start, ts_end, page, section) in rows
    {
        let start_new = topics
            .last()
            .map(|t| t["topicId"].as_i64() != Some(topic_id))
            .unwrap_or(true);
        if start_new {
            topics.push(json!({
                "topicId": topic_id,
                "name": name,
                "outline": outline,
                "keyConcepts": []
            }));
        }
        let (Some(concept_id), Some(concept_name)) = (kc_id, kc_name) else {
            continue;
        };
        if let Some(list) = topics
            .last_mut()
            .and_then(|t| t["keyConcepts"].as_array_mut())
        {
            list.push(json!({
                "conceptId": concept_id,
                "name": concept_name,
                "description": kc_desc,
                "timestampStart": ts_start,
                "timestampEnd": ts_end,
                "pageNumber": page,
                "section": section
            }));
        }
    }
    Ok(json!({ "resourceId": resource_id, "topics": topics }))
}

fn handle_resources_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match create(conn, &req.params) {
        Ok((resource_id, url)) => {
            let mut analysis = "skipped";
            if let (Some(url), Some(workspace)) = (url.as_deref(), state.workspace.as_ref()) {
                if state.agents.analysis_url.is_some() {
                    agent::spawn_resource_analysis(
                        &state.agents,
                        workspace.clone(),
                        resource_id,
                        url,
                    );
                    analysis = "triggered";
                }
            }
            ok(
                &req.id,
                json!({ "resourceId": resource_id, "analysis": analysis }),
            )
        }
        Err(error) => error.response(&req.id),
    }
}

fn handle_resources_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state) {
        Ok(c) => c,
        Err(error) => return error.response(&req.id),
    };
    match list(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_resources_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state) {
        Ok(c) => c,
        Err(error) => return error.response(&req.id),
    };
    match delete(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_resources_analysis(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state) {
        Ok(c) => c,
        Err(error) => return error.response(&req.id),
    };
    match analysis_view(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "resources.create" => Some(handle_resources_create(state, req)),
        "resources.list" => Some(handle_resources_list(state, req)),
        "resources.delete" => Some(handle_resources_delete(state, req)),
        "resources.analysis" => Some(handle_resources_analysis(state, req)),
        _ => None,
    }
}
