use crate::extract;
use crate::ipc::error::ok;
use crate::ipc::helpers::{db_conn, required_i64, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::reconcile;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

/// Feeds an agent response that arrived out of band (saved file, manual
/// paste, webhook relay) through the same extraction and reconcile path
/// the background analysis thread uses.
fn ingest(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let resource_id = required_i64(params, "resourceId")?;
    let found: Option<i64> = conn
        .query_row("SELECT 1 FROM resources WHERE id = ?", [resource_id], |r| {
            r.get(0)
        })
        .optional()?;
    if found.is_none() {
        return Err(HandlerErr::not_found("resource not found"));
    }
    let Some(body) = params.get("body") else {
        return Err(HandlerErr::bad_params("missing body"));
    };

    let Some(payload) = extract::extract_payload(body) else {
        return Ok(json!({ "status": "pending" }));
    };
    let summary = reconcile::reconcile(conn, resource_id, &payload)?;
    Ok(json!({
        "status": "saved",
        "topicsCreated": summary.topics_created,
        "occurrencesCreated": summary.occurrences_created,
        "keyConceptsCreated": summary.key_concepts_created,
        "skippedTopics": summary.skipped_topics,
        "skippedOccurrences": summary.skipped_occurrences,
        "skippedKeyConcepts": summary.skipped_key_concepts,
    }))
}

fn handle_analysis_ingest(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state) {
        Ok(c) => c,
        Err(error) => return error.response(&req.id),
    };
    match ingest(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "analysis.ingest" => Some(handle_analysis_ingest(state, req)),
        _ => None,
    }
}
