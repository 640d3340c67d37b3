use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::extract;

/// Agents are slow: a grading round trip routinely takes minutes.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("agent call failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("agent message could not be serialized: {0}")]
    Json(#[from] serde_json::Error),
}

/// Endpoint configuration for the two external agents. Seeded from the
/// environment at startup, adjustable at runtime via `agents.configure`.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub analysis_url: Option<String>,
    pub grading_url: Option<String>,
    pub timeout: Duration,
}

impl AgentConfig {
    pub fn from_env() -> Self {
        AgentConfig {
            analysis_url: std::env::var("LMSD_ANALYSIS_AGENT_URL").ok(),
            grading_url: std::env::var("LMSD_GRADING_AGENT_URL").ok(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

pub trait AnalysisAgent {
    fn analyze(&self, resource_id: i64, url: &str) -> Result<Option<Value>, AgentError>;
}

pub trait GradingAgent {
    fn grade(&self, request: &GradingRequest) -> Result<Option<GradingResult>, AgentError>;
}

/// Context handed to the grading agent alongside the student's answers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingRequest {
    pub assignment_id: i64,
    pub student_id: i64,
    pub questions: Vec<QuestionAnswer>,
    pub topics: Vec<TopicContext>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionAnswer {
    pub question_id: i64,
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicContext {
    pub id: i64,
    pub name: String,
    pub outline: Option<String>,
    pub key_concepts: Vec<ConceptContext>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConceptContext {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
}

/// The structured grading payload. Field names are the agent's output
/// contract, so they stay snake_case.
#[derive(Debug, Clone, Deserialize)]
pub struct GradingResult {
    pub assignment_marks: f64,
    #[serde(default)]
    pub feedback: Option<String>,
    #[serde(default)]
    pub question_scores: Vec<QuestionScore>,
    #[serde(default)]
    pub topic_scores: Vec<TopicScoreResult>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuestionScore {
    pub question_id: i64,
    pub marks: f64,
    #[serde(default)]
    pub feedback: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TopicScoreResult {
    pub topic_id: i64,
    pub marks: f64,
}

/// JSON-RPC client for one agent endpoint.
pub struct HttpAgent {
    client: reqwest::blocking::Client,
    url: String,
}

impl HttpAgent {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, AgentError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(HttpAgent {
            client,
            url: url.to_string(),
        })
    }

    fn send_message(
        &self,
        task_id: String,
        context_id: String,
        text: String,
    ) -> Result<Value, AgentError> {
        let payload = json!({
            "jsonrpc": "2.0",
            "method": "message/send",
            "params": {
                "message": {
                    "role": "user",
                    "parts": [{ "kind": "text", "text": text }],
                    "messageId": Uuid::new_v4().simple().to_string(),
                    "contextId": context_id
                },
                "configuration": {}
            },
            "id": task_id
        });
        let resp = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()?
            .error_for_status()?;
        Ok(resp.json()?)
    }
}

impl AnalysisAgent for HttpAgent {
    fn analyze(&self, resource_id: i64, url: &str) -> Result<Option<Value>, AgentError> {
        let body = self.send_message(
            format!("resource_{resource_id}"),
            format!("ctx_{resource_id}"),
            format!("Analyze this resource: {url}"),
        )?;
        Ok(extract::extract_payload(&body))
    }
}

impl GradingAgent for HttpAgent {
    fn grade(&self, request: &GradingRequest) -> Result<Option<GradingResult>, AgentError> {
        let text = serde_json::to_string(request)?;
        let body = self.send_message(
            format!("grading_{}_{}", request.assignment_id, request.student_id),
            format!("ctx_grading_{}_{}", request.assignment_id, request.student_id),
            text,
        )?;
        let Some(payload) = extract::extract_payload(&body) else {
            return Ok(None);
        };
        match serde_json::from_value::<GradingResult>(payload) {
            Ok(parsed) => Ok(Some(parsed)),
            Err(e) => {
                tracing::warn!("grading payload did not match the expected shape: {e}");
                Ok(None)
            }
        }
    }
}

/// Stand-in collaborator used when no endpoint is configured. Every call
/// reports "no payload", which downstream code surfaces as a pending
/// outcome.
pub struct PendingAgent;

impl GradingAgent for PendingAgent {
    fn grade(&self, _request: &GradingRequest) -> Result<Option<GradingResult>, AgentError> {
        Ok(None)
    }
}

/// Builds the grading collaborator for the current configuration, falling
/// back to `PendingAgent` when no endpoint is usable.
pub fn grading_agent(cfg: &AgentConfig) -> Box<dyn GradingAgent> {
    if let Some(url) = &cfg.grading_url {
        match HttpAgent::new(url, cfg.timeout) {
            Ok(agent) => return Box::new(agent),
            Err(e) => tracing::warn!("grading agent unavailable: {e}"),
        }
    }
    Box::new(PendingAgent)
}

/// Fires resource analysis on a detached thread. The caller returns to the
/// user immediately; the thread posts to the agent, extracts the payload
/// and reconciles it on its own connection to the workspace database.
/// Failures anywhere along the way are logged and leave no durable trace.
pub fn spawn_resource_analysis(
    cfg: &AgentConfig,
    workspace: PathBuf,
    resource_id: i64,
    resource_url: &str,
) {
    let Some(agent_url) = cfg.analysis_url.clone() else {
        tracing::info!(resource_id, "no analysis agent configured; skipping analysis");
        return;
    };
    let timeout = cfg.timeout;
    let resource_url = resource_url.to_string();
    std::thread::spawn(move || {
        if let Err(e) =
            run_resource_analysis(&agent_url, timeout, &workspace, resource_id, &resource_url)
        {
            tracing::warn!(resource_id, "resource analysis failed: {e}");
        }
    });
}

fn run_resource_analysis(
    agent_url: &str,
    timeout: Duration,
    workspace: &Path,
    resource_id: i64,
    resource_url: &str,
) -> anyhow::Result<()> {
    let agent = HttpAgent::new(agent_url, timeout)?;
    let Some(payload) = agent.analyze(resource_id, resource_url)? else {
        tracing::warn!(resource_id, "analysis reply carried no payload");
        return Ok(());
    };
    let conn = crate::db::open_db(workspace)?;
    let summary = crate::reconcile::reconcile(&conn, resource_id, &payload)?;
    tracing::info!(
        resource_id,
        topics = summary.topics_created,
        occurrences = summary.occurrences_created,
        key_concepts = summary.key_concepts_created,
        "analysis saved"
    );
    Ok(())
}
