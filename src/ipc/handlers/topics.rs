use crate::ipc::error::ok;
use crate::ipc::helpers::{db_conn, optional_str, required_i64, required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::timecode;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

fn authored_timestamp(concept: &serde_json::Value, key: &str) -> Result<i64, HandlerErr> {
    match concept.get(key) {
        None => Ok(0),
        Some(v) => timecode::normalize_timestamp(v)
            .map_err(|e| HandlerErr::bad_params(format!("{}: {}", key, e))),
    }
}

fn authored_page(concept: &serde_json::Value) -> Result<Option<i64>, HandlerErr> {
    match concept.get("pageNumber") {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => v
            .as_i64()
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params("pageNumber must be an integer or null")),
    }
}

/// Creates a topic by hand. Unlike agent-discovered topics these are not
/// tied to any resource; supplied concepts hang off an occurrence with a
/// NULL resource.
fn create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let name = required_str(params, "name")?.trim().to_string();
    if name.is_empty() {
        return Err(HandlerErr::bad_params("name must not be empty"));
    }
    let outline = optional_str(params, "outline");
    let concepts = match params.get("concepts") {
        None => Vec::new(),
        Some(v) => v
            .as_array()
            .cloned()
            .ok_or_else(|| HandlerErr::bad_params("concepts must be an array"))?,
    };

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO topics(name, outline) VALUES(?, ?)",
        (&name, &outline),
    )?;
    let topic_id = tx.last_insert_rowid();

    let mut occurrence_id: Option<i64> = None;
    let mut concept_ids = Vec::new();
    if !concepts.is_empty() {
        tx.execute(
            "INSERT INTO occurrences(topic_id, resource_id) VALUES(?, NULL)",
            [topic_id],
        )?;
        let occ_id = tx.last_insert_rowid();
        occurrence_id = Some(occ_id);

        for concept in &concepts {
            let concept_name = concept
                .get("name")
                .and_then(|v| v.as_str())
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .ok_or_else(|| HandlerErr::bad_params("each concept needs a name"))?;
            let description = concept.get("description").and_then(|v| v.as_str());
            let ts_start = authored_timestamp(concept, "timestampStart")?;
            let ts_end = authored_timestamp(concept, "timestampEnd")?;
            let page_number = authored_page(concept)?;
            let section = concept.get("section").and_then(|v| v.as_str());

            tx.execute(
                "INSERT INTO key_concepts(occurrence_id, name, description,
                                          timestamp_start, timestamp_end, page_number, section)
                 VALUES(?, ?, ?, ?, ?, ?, ?)",
                (
                    occ_id,
                    concept_name,
                    description,
                    ts_start,
                    ts_end,
                    page_number,
                    section,
                ),
            )?;
            concept_ids.push(tx.last_insert_rowid());
        }
    }
    tx.commit()?;

    Ok(json!({
        "topicId": topic_id,
        "occurrenceId": occurrence_id,
        "conceptIds": concept_ids
    }))
}

fn list(conn: &Connection) -> Result<serde_json::Value, HandlerErr> {
    let mut stmt = conn.prepare(
        "SELECT t.id, t.name, t.outline,
                (SELECT COUNT(*)
                 FROM key_concepts kc
                 JOIN occurrences o ON o.id = kc.occurrence_id
                 WHERE o.topic_id = t.id),
                (SELECT COUNT(DISTINCT o2.resource_id)
                 FROM occurrences o2
                 WHERE o2.topic_id = t.id AND o2.resource_id IS NOT NULL)
         FROM topics t
         ORDER BY t.name",
    )?;
    let topics = stmt
        .query_map([], |r| {
            Ok(json!({
                "id": r.get::<_, i64>(0)?,
                "name": r.get::<_, String>(1)?,
                "outline": r.get::<_, Option<String>>(2)?,
                "conceptCount": r.get::<_, i64>(3)?,
                "resourceCount": r.get::<_, i64>(4)?,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "topics": topics }))
}

fn delete(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let topic_id = required_i64(params, "topicId")?;
    let found: Option<i64> = conn
        .query_row("SELECT 1 FROM topics WHERE id = ?", [topic_id], |r| r.get(0))
        .optional()?;
    if found.is_none() {
        return Err(HandlerErr::not_found("topic not found"));
    }

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "DELETE FROM key_concepts
         WHERE occurrence_id IN (SELECT id FROM occurrences WHERE topic_id = ?)",
        [topic_id],
    )
    .map_err(|e| HandlerErr::db_delete("key_concepts", e))?;
    tx.execute("DELETE FROM occurrences WHERE topic_id = ?", [topic_id])
        .map_err(|e| HandlerErr::db_delete("occurrences", e))?;
    tx.execute("DELETE FROM topic_scores WHERE topic_id = ?", [topic_id])
        .map_err(|e| HandlerErr::db_delete("topic_scores", e))?;
    tx.execute("DELETE FROM topics WHERE id = ?", [topic_id])
        .map_err(|e| HandlerErr::db_delete("topics", e))?;
    tx.commit()?;
    Ok(json!({ "ok": true }))
}

/// Partial edit of one key concept. Absent fields keep their value; null
/// clears the nullable ones.
fn update_concept(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let concept_id = required_i64(params, "conceptId")?;
    let row = conn
        .query_row(
            "SELECT name, description, timestamp_start, timestamp_end, page_number, section
             FROM key_concepts WHERE id = ?",
            [concept_id],
            |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, Option<String>>(1)?,
                    r.get::<_, Option<i64>>(2)?,
                    r.get::<_, Option<i64>>(3)?,
                    r.get::<_, Option<i64>>(4)?,
                    r.get::<_, Option<String>>(5)?,
                ))
            },
        )
        .optional()?;
    let Some((mut name, mut description, mut ts_start, mut ts_end, mut page, mut section)) = row
    else {
        return Err(HandlerErr::not_found("key concept not found"));
    };

    if let Some(v) = params.get("name") {
        let Some(n) = v.as_str().map(str::trim).filter(|s| !s.is_empty()) else {
            return Err(HandlerErr::bad_params("name must not be empty"));
        };
        name = n.to_string();
    }
    if let Some(v) = params.get("description") {
        description = if v.is_null() {
            None
        } else {
            match v.as_str() {
                Some(s) => Some(s.to_string()),
                None => {
                    return Err(HandlerErr::bad_params("description must be a string or null"))
                }
            }
        };
    }
    if let Some(v) = params.get("timestampStart") {
        ts_start = Some(
            timecode::normalize_timestamp(v)
                .map_err(|e| HandlerErr::bad_params(format!("timestampStart: {}", e)))?,
        );
    }
    if let Some(v) = params.get("timestampEnd") {
        ts_end = Some(
            timecode::normalize_timestamp(v)
                .map_err(|e| HandlerErr::bad_params(format!("timestampEnd: {}", e)))?,
        );
    }
    if let Some(v) = params.get("pageNumber") {
        page = if v.is_null() {
            None
        } else {
            match v.as_i64() {
                Some(n) => Some(n),
                None => {
                    return Err(HandlerErr::bad_params("pageNumber must be an integer or null"))
                }
            }
        };
    }
    if let Some(v) = params.get("section") {
        section = if v.is_null() {
            None
        } else {
            match v.as_str() {
                Some(s) => Some(s.to_string()),
                None => return Err(HandlerErr::bad_params("section must be a string or null")),
            }
        };
    }

    conn.execute(
        "UPDATE key_concepts
         SET name = ?, description = ?, timestamp_start = ?, timestamp_end = ?,
             page_number = ?, section = ?
         WHERE id = ?",
        (&name, &description, ts_start, ts_end, page, &section, concept_id),
    )?;

    Ok(json!({
        "conceptId": concept_id,
        "name": name,
        "description": description,
        "timestampStart": ts_start,
        "timestampEnd": ts_end,
        "pageNumber": page,
        "section": section
    }))
}

fn handle_topics_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state) {
        Ok(c) => c,
        Err(error) => return error.response(&req.id),
    };
    match create(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_topics_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state) {
        Ok(c) => c,
        Err(error) => return error.response(&req.id),
    };
    match list(conn) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_topics_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state) {
        Ok(c) => c,
        Err(error) => return error.response(&req.id),
    };
    match delete(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_concepts_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state) {
        Ok(c) => c,
        Err(error) => return error.response(&req.id),
    };
    match update_concept(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "topics.create" => Some(handle_topics_create(state, req)),
        "topics.list" => Some(handle_topics_list(state, req)),
        "topics.delete" => Some(handle_topics_delete(state, req)),
        "concepts.update" => Some(handle_concepts_update(state, req)),
        _ => None,
    }
}
