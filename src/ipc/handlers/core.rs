use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string())
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    match db::open_db(&path) {
        Ok(conn) => {
            state.workspace = Some(path.clone());
            state.db = Some(conn);
            ok(&req.id, json!({ "workspacePath": path.to_string_lossy() }))
        }
        Err(e) => err(&req.id, "db_open_failed", format!("{e:?}"), None),
    }
}

/// One endpoint key: absent leaves the current value alone, explicit null
/// clears it, a non-empty string replaces it.
fn endpoint_update(
    params: &serde_json::Value,
    key: &str,
) -> Result<Option<Option<String>>, String> {
    match params.get(key) {
        None => Ok(None),
        Some(serde_json::Value::Null) => Ok(Some(None)),
        Some(v) => match v.as_str().map(str::trim).filter(|s| !s.is_empty()) {
            Some(url) => Ok(Some(Some(url.to_string()))),
            None => Err(format!("{} must be a non-empty string or null", key)),
        },
    }
}

fn handle_agents_configure(state: &mut AppState, req: &Request) -> serde_json::Value {
    match endpoint_update(&req.params, "analysisUrl") {
        Ok(None) => {}
        Ok(Some(url)) => state.agents.analysis_url = url,
        Err(message) => return err(&req.id, "bad_params", message, None),
    }
    match endpoint_update(&req.params, "gradingUrl") {
        Ok(None) => {}
        Ok(Some(url)) => state.agents.grading_url = url,
        Err(message) => return err(&req.id, "bad_params", message, None),
    }

    if let Some(v) = req.params.get("timeoutSecs") {
        let Some(secs) = v.as_u64().filter(|s| *s > 0) else {
            return err(
                &req.id,
                "bad_params",
                "timeoutSecs must be a positive integer",
                None,
            );
        };
        state.agents.timeout = Duration::from_secs(secs);
    }

    ok(
        &req.id,
        json!({
            "analysisUrl": state.agents.analysis_url,
            "gradingUrl": state.agents.grading_url,
            "timeoutSecs": state.agents.timeout.as_secs(),
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        "agents.configure" => Some(handle_agents_configure(state, req)),
        _ => None,
    }
}
