//! Inbound webhook receiver for completed CI runs.
//!
//! Verifies an HMAC-SHA256 signature over the raw request body before
//! parsing anything. Unresolvable events answer 200 `{"ignored": true}` so
//! the provider stops retrying; only signature problems produce an error
//! status.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::Json,
};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use crate::lifecycle::{CallbackOutcome, Correlation, RunResult};

use super::routes::AppState;

type HmacSha256 = Hmac<Sha256>;

/// Verify a `sha256=<hex>` signature header against the raw body.
///
/// Comparison is constant-time via `Mac::verify_slice`.
pub fn verify_signature(secret: &str, body: &[u8], signature_header: &str) -> bool {
    let hex_digest = match signature_header.strip_prefix("sha256=") {
        Some(rest) => rest,
        None => return false,
    };
    let expected = match hex::decode(hex_digest) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Compute the signature header value for a body (test and client helper).
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts any key length");
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

#[derive(Debug, Deserialize)]
struct WebhookPayload {
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    workflow_run: Option<RunPayload>,
    #[serde(default)]
    repository: Option<RepositoryPayload>,
    /// Structured dispatch inputs, when the provider echoes them.
    #[serde(default)]
    inputs: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RunPayload {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    conclusion: Option<String>,
    #[serde(default)]
    head_branch: Option<String>,
    #[serde(default)]
    html_url: Option<String>,
    /// Runner report text, when the workflow publishes it.
    #[serde(default)]
    summary: Option<String>,
    /// Structured dispatch inputs, when echoed on the run itself.
    #[serde(default)]
    inputs: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RepositoryPayload {
    full_name: String,
}

fn ignored(reason: &str) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ignored": true, "reason": reason }))
}

fn input_str(inputs: &Option<serde_json::Value>, key: &str) -> Option<String> {
    inputs
        .as_ref()
        .and_then(|v| v.get(key))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

/// Pull a task id out of the runner report (`== spec <task-id>` lines).
fn task_id_from_summary(summary: &Option<String>) -> Option<String> {
    summary.as_ref()?.lines().find_map(|line| {
        line.trim()
            .strip_prefix("== spec ")
            .and_then(|rest| rest.split_whitespace().next())
            .map(|id| id.to_string())
    })
}

/// Handle a signed CI callback.
pub async fn receive(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let secret = state.config.webhook_secret.as_deref().ok_or_else(|| {
        (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "error": "webhook_secret_not_configured" })),
        )
    })?;
    let signature = headers
        .get("x-hub-signature-256")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            (
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({ "error": "missing_signature" })),
            )
        })?;
    if !verify_signature(secret, &body, signature) {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "error": "invalid_signature" })),
        ));
    }

    let event = headers
        .get("x-github-event")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if event != "workflow_run" {
        return Ok(ignored("unsupported event"));
    }

    let payload: WebhookPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::warn!("undecodable webhook payload: {}", e);
            return Ok(ignored("undecodable payload"));
        }
    };
    if payload.action.as_deref() != Some("completed") {
        return Ok(ignored("run not completed"));
    }
    let run = match payload.workflow_run {
        Some(run) => run,
        None => return Ok(ignored("no run in payload")),
    };
    if run.status.as_deref() != Some("completed") || run.conclusion.is_none() {
        return Ok(ignored("run not completed"));
    }

    // Correlation order: structured inputs, then the runner summary, then
    // the repo + branch heuristic (branch names embed the task id).
    let correlation = Correlation {
        project_id: input_str(&run.inputs, "projectId")
            .or_else(|| input_str(&payload.inputs, "projectId")),
        task_id: input_str(&run.inputs, "taskId")
            .or_else(|| input_str(&payload.inputs, "taskId"))
            .or_else(|| task_id_from_summary(&run.summary)),
        repo_full_name: payload.repository.map(|r| r.full_name),
        branch: run.head_branch,
    };
    let result = RunResult {
        conclusion: run.conclusion.unwrap_or_default(),
        url: run.html_url,
        summary: run.summary,
    };

    match state.engine.apply_ci_callback(correlation, result).await {
        CallbackOutcome::Applied {
            project_id,
            task_id,
        } => Ok(Json(serde_json::json!({
            "ignored": false,
            "project_id": project_id,
            "task_id": task_id,
        }))),
        CallbackOutcome::Ignored(reason) => Ok(ignored(&reason)),
    }
}
