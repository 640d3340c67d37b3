use std::collections::HashMap;

use rusqlite::Connection;
use serde_json::Value;

use crate::error::CoreError;
use crate::timecode;

/// Counts of what an analysis payload turned into. Skips are entities the
/// payload named but that could not be tied into the graph.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub topics_created: usize,
    pub occurrences_created: usize,
    pub key_concepts_created: usize,
    pub skipped_topics: usize,
    pub skipped_occurrences: usize,
    pub skipped_key_concepts: usize,
}

/// Persists an extracted analysis payload against `resource_id`.
///
/// The payload arrives flattened, with agent-local ids wiring topics,
/// occurrences and key concepts together. Each entity group is written in
/// its own transaction, in dependency order, remapping agent-local ids to
/// the durable row ids as it goes. A dangling reference or a nameless entry
/// skips that entity with a warning; a database failure rolls back only the
/// group it happened in, leaving earlier groups committed.
pub fn reconcile(
    conn: &Connection,
    resource_id: i64,
    payload: &Value,
) -> Result<ReconcileSummary, CoreError> {
    let mut summary = ReconcileSummary::default();
    let mut topic_map: HashMap<String, i64> = HashMap::new();
    let mut occurrence_map: HashMap<String, i64> = HashMap::new();

    let tx = conn.unchecked_transaction()?;
    for t in entries(payload, "topics") {
        let Some(name) = t.get("name").and_then(|v| v.as_str()).filter(|s| !s.is_empty()) else {
            tracing::warn!("skipping topic without a name: {t}");
            summary.skipped_topics += 1;
            continue;
        };
        tx.execute(
            "INSERT INTO topics(name, outline) VALUES(?, ?)",
            (name, t.get("outline").and_then(|v| v.as_str())),
        )?;
        summary.topics_created += 1;
        if let Some(key) = local_id(t.get("id")) {
            topic_map.insert(key, tx.last_insert_rowid());
        }
    }
    tx.commit()?;

    let tx = conn.unchecked_transaction()?;
    for occ in entries(payload, "occurrences") {
        let topic_id = match resolve(&topic_map, "topic", local_id(occ.get("topic_id"))) {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!("skipping occurrence: {e}");
                summary.skipped_occurrences += 1;
                continue;
            }
        };
        tx.execute(
            "INSERT INTO occurrences(topic_id, resource_id) VALUES(?, ?)",
            (topic_id, resource_id),
        )?;
        summary.occurrences_created += 1;
        if let Some(key) = local_id(occ.get("id")) {
            occurrence_map.insert(key, tx.last_insert_rowid());
        }
    }
    tx.commit()?;

    let tx = conn.unchecked_transaction()?;
    for kc in entries(payload, "key_concepts") {
        // Some agent builds misspell the reference field; accept both.
        let occ_key =
            local_id(kc.get("occurrence_id")).or_else(|| local_id(kc.get("occurence_id")));
        let occurrence_id = match resolve(&occurrence_map, "occurrence", occ_key) {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!("skipping key concept: {e}");
                summary.skipped_key_concepts += 1;
                continue;
            }
        };
        let Some(name) = kc.get("name").and_then(|v| v.as_str()).filter(|s| !s.is_empty())
        else {
            tracing::warn!("skipping key concept without a name: {kc}");
            summary.skipped_key_concepts += 1;
            continue;
        };
        tx.execute(
            "INSERT INTO key_concepts(
                occurrence_id, name, description,
                timestamp_start, timestamp_end, page_number, section
             ) VALUES(?, ?, ?, ?, ?, ?, ?)",
            (
                occurrence_id,
                name,
                kc.get("description").and_then(|v| v.as_str()),
                timecode::normalize_or_zero(kc.get("timestamp_start")),
                timecode::normalize_or_zero(kc.get("timestamp_end")),
                page_number(kc.get("page_number")),
                kc.get("section").and_then(|v| v.as_str()),
            ),
        )?;
        summary.key_concepts_created += 1;
    }
    tx.commit()?;

    Ok(summary)
}

fn entries<'a>(payload: &'a Value, key: &str) -> impl Iterator<Item = &'a Value> {
    payload
        .get(key)
        .and_then(|v| v.as_array())
        .into_iter()
        .flatten()
}

/// Agent-local ids arrive as strings or numbers; both forms address the
/// same mapping slot.
fn local_id(v: Option<&Value>) -> Option<String> {
    match v? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn resolve(
    map: &HashMap<String, i64>,
    kind: &'static str,
    key: Option<String>,
) -> Result<i64, CoreError> {
    let key = key.ok_or(CoreError::Reference {
        kind,
        reference: "missing".to_string(),
    })?;
    map.get(&key).copied().ok_or(CoreError::Reference {
        kind,
        reference: key,
    })
}

fn page_number(v: Option<&Value>) -> Option<i64> {
    match v? {
        Value::Number(n) => n.as_f64().map(|f| f as i64),
        Value::String(s) => s.trim().parse::<f64>().ok().map(|f| f as i64),
        _ => None,
    }
}
