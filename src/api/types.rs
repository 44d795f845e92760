//! API request and response types.

use axum::http::StatusCode;
use axum::response::Json;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::spec::ProjectStack;

/// Request to publish a new project.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateProjectRequest {
    pub title: String,

    #[serde(default)]
    pub description: String,

    /// Provider login of the project owner
    pub owner: String,

    /// Linked repository as `owner/name` (optional)
    #[serde(default)]
    pub repo: Option<String>,

    /// Declared technology stack (optional; normalized downstream)
    #[serde(default)]
    pub stack: Option<ProjectStack>,

    /// Initial backlog
    #[serde(default)]
    pub tasks: Vec<NewTaskRequest>,
}

/// One backlog entry in a project publish request.
#[derive(Debug, Clone, Deserialize)]
pub struct NewTaskRequest {
    pub title: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub acceptance_criteria: String,
}

/// Body for task actions (assign, unassign, submit, verify).
#[derive(Debug, Clone, Deserialize)]
pub struct ActionRequest {
    /// Provider login of the acting user
    pub actor: String,
}

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    /// Whether inbound webhooks can be verified
    pub webhook_configured: bool,
}

/// Map an engine error to the structured API error body.
///
/// Every body carries the stable `error` code; `access_required` also
/// carries the current membership state and the invite URL so callers can
/// self-remediate.
pub fn reject(err: EngineError) -> (StatusCode, Json<serde_json::Value>) {
    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut body = serde_json::json!({
        "error": err.code(),
        "message": err.to_string(),
    });
    if let serde_json::Value::Object(context) = err.context() {
        if let serde_json::Value::Object(map) = &mut body {
            for (key, value) in context {
                map.insert(key, value);
            }
        }
    }
    (status, Json(body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reject_merges_remediation_context() {
        let (status, Json(body)) = reject(EngineError::AccessRequired {
            state: "invited".to_string(),
            invite_url: "https://github.com/acme/shop/invitations".to_string(),
        });
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "access_required");
        assert_eq!(body["state"], "invited");
        assert!(body["invite_url"].as_str().unwrap().contains("/invitations"));
    }

    #[test]
    fn reject_keeps_plain_errors_minimal() {
        let (status, Json(body)) = reject(EngineError::TaskAlreadyAssigned);
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "task_already_assigned");
        assert!(body.get("state").is_none());
    }
}
