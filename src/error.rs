//! Engine error taxonomy.
//!
//! Every failure surfaced to API callers carries a stable structured code
//! (see [`EngineError::code`]) instead of a raw provider error, plus enough
//! context for the caller to self-remediate (membership state, invite URL).

use crate::github::ProviderError;

/// Errors surfaced by engine actions (assign, unassign, submit, run-verify).
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("no linked source-control account for {login}")]
    AccountNotConnected { login: String },

    #[error("project has no linked repository")]
    RepoMissing,

    #[error("invalid repository reference: {0}")]
    InvalidRepoReference(String),

    #[error("provider rejected the operation: {0}")]
    PermissionDenied(String),

    /// Actor's membership on the linked repository is below ACTIVE.
    #[error("repository access required (current state: {state})")]
    AccessRequired { state: String, invite_url: String },

    #[error("failed to create branch {branch}: {reason}")]
    BranchCreateFailed { branch: String, reason: String },

    #[error("failed to commit verification files: {0}")]
    CommitFailed(String),

    #[error("failed to dispatch verification workflow: {0}")]
    DispatchFailed(String),

    #[error("task is already assigned")]
    TaskAlreadyAssigned,

    #[error("concurrent task limit reached ({limit})")]
    MaxConcurrentTasks { limit: usize },

    #[error("invalid column transition from {from} to {to}")]
    InvalidColumnTransition { from: String, to: String },

    #[error("project {0} not found")]
    ProjectNotFound(String),

    #[error("task {0} not found")]
    TaskNotFound(String),

    #[error("storage error: {0}")]
    Store(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl EngineError {
    /// Stable machine-readable code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::AccountNotConnected { .. } => "account_not_connected",
            Self::RepoMissing => "repo_missing",
            Self::InvalidRepoReference(_) => "invalid_repo_reference",
            Self::PermissionDenied(_) => "permission_denied",
            Self::AccessRequired { .. } => "access_required",
            Self::BranchCreateFailed { .. } => "branch_create_failed",
            Self::CommitFailed(_) => "spec_or_scaffold_commit_failed",
            Self::DispatchFailed(_) => "workflow_dispatch_failed",
            Self::TaskAlreadyAssigned => "task_already_assigned",
            Self::MaxConcurrentTasks { .. } => "max_concurrent_tasks_reached",
            Self::InvalidColumnTransition { .. } => "invalid_column_transition",
            Self::ProjectNotFound(_) => "project_not_found",
            Self::TaskNotFound(_) => "task_not_found",
            Self::Store(_) => "storage_error",
            Self::Provider(_) => "provider_error",
        }
    }

    /// HTTP status the API layer maps this error to.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::ProjectNotFound(_) | Self::TaskNotFound(_) => 404,
            Self::PermissionDenied(_) | Self::AccessRequired { .. } => 403,
            Self::TaskAlreadyAssigned
            | Self::MaxConcurrentTasks { .. }
            | Self::InvalidColumnTransition { .. } => 409,
            Self::AccountNotConnected { .. }
            | Self::RepoMissing
            | Self::InvalidRepoReference(_) => 422,
            Self::BranchCreateFailed { .. }
            | Self::CommitFailed(_)
            | Self::DispatchFailed(_)
            | Self::Store(_)
            | Self::Provider(_) => 502,
        }
    }

    /// Extra JSON context merged into the API error body.
    pub fn context(&self) -> serde_json::Value {
        match self {
            Self::AccessRequired { state, invite_url } => serde_json::json!({
                "state": state,
                "invite_url": invite_url,
            }),
            Self::MaxConcurrentTasks { limit } => serde_json::json!({ "limit": limit }),
            Self::InvalidColumnTransition { from, to } => serde_json::json!({
                "from": from,
                "to": to,
            }),
            _ => serde_json::Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(EngineError::TaskAlreadyAssigned.code(), "task_already_assigned");
        assert_eq!(
            EngineError::CommitFailed("x".into()).code(),
            "spec_or_scaffold_commit_failed"
        );
        assert_eq!(
            EngineError::MaxConcurrentTasks { limit: 2 }.code(),
            "max_concurrent_tasks_reached"
        );
    }

    #[test]
    fn access_required_carries_remediation_context() {
        let err = EngineError::AccessRequired {
            state: "invited".to_string(),
            invite_url: "https://github.com/acme/shop/invitations".to_string(),
        };
        let ctx = err.context();
        assert_eq!(ctx["state"], "invited");
        assert!(ctx["invite_url"].as_str().unwrap().contains("invitations"));
        assert_eq!(err.http_status(), 403);
    }
}
