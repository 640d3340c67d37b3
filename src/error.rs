use thiserror::Error;

/// Errors produced by the core pipeline (reconcile, submit, stats).
///
/// `Parse` and `Reference` are absorbed close to where they occur: agent
/// output that fails to parse leaves the system in its prior state, and a
/// dangling agent-local reference skips one entity. Only `NotFound`,
/// `Conflict` and `Db` travel up to the IPC layer.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("parse error: {0}")]
    Parse(String),

    #[error("unresolved {kind} reference: {reference}")]
    Reference { kind: &'static str, reference: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: i64 },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Db(#[from] rusqlite::Error),
}

impl CoreError {
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        CoreError::NotFound { entity, id }
    }

    /// Wire error code for the IPC envelope.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::Parse(_) => "parse_failed",
            CoreError::Reference { .. } => "unresolved_reference",
            CoreError::NotFound { .. } => "not_found",
            CoreError::Conflict(_) => "conflict",
            CoreError::Db(_) => "db_query_failed",
        }
    }
}
