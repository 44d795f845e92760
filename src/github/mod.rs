//! Provider interface for the external version-control / CI service.
//!
//! The engine talks to the provider exclusively through [`RepoProvider`],
//! so the orchestration logic can be exercised against an in-memory fake
//! while production uses the REST client in [`client`].

mod client;
#[cfg(test)]
pub mod fake;

pub use client::GitHubClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Error from provider API calls.
///
/// `PermissionDenied` is deliberately distinct from `NotFound`: callers need
/// to tell "you may not" apart from "it does not exist".
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The resource already exists (e.g. a ref with the same name).
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("provider API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("decode error: {0}")]
    Decode(String),
}

impl ProviderError {
    /// Whether a single retry is worthwhile (transient network / 5xx).
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Api { status, .. } => matches!(status, 500 | 502 | 503 | 504),
            _ => false,
        }
    }
}

/// A repository addressed as `owner/name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoId {
    pub owner: String,
    pub name: String,
}

impl RepoId {
    /// Parse an `owner/name` reference.
    ///
    /// # Errors
    ///
    /// Returns the offending string when it is not exactly two non-empty
    /// segments of repository-safe characters.
    pub fn parse(full_name: &str) -> Result<Self, String> {
        let mut parts = full_name.splitn(2, '/');
        let owner = parts.next().unwrap_or_default();
        let name = parts.next().unwrap_or_default();
        let valid = |s: &str| {
            !s.is_empty()
                && s.chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        };
        if valid(owner) && valid(name) {
            Ok(Self {
                owner: owner.to_string(),
                name: name.to_string(),
            })
        } else {
            Err(full_name.to_string())
        }
    }
}

impl std::fmt::Display for RepoId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Repository metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct RepoInfo {
    pub full_name: String,
    pub default_branch: String,
    pub html_url: String,
}

/// A git ref resolved to its head commit.
#[derive(Debug, Clone)]
pub struct GitRef {
    pub name: String,
    pub sha: String,
}

/// A file fetched from the provider, decoded.
#[derive(Debug, Clone)]
pub struct RepoFile {
    pub content: String,
    /// Blob version token, passed back on update.
    pub sha: String,
}

/// A CI workflow run as listed by the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub id: u64,
    pub status: String,
    pub conclusion: Option<String>,
    pub html_url: String,
    pub head_branch: String,
    pub created_at: String,
}

/// Operations the engine needs from the version-control + CI provider.
#[async_trait]
pub trait RepoProvider: Send + Sync {
    /// Get repository metadata (default branch, canonical URL).
    async fn repo(&self, repo: &RepoId) -> Result<RepoInfo, ProviderError>;

    /// Resolve `refs/heads/<branch>` to its head commit.
    async fn get_branch(&self, repo: &RepoId, branch: &str) -> Result<GitRef, ProviderError>;

    /// Create `refs/heads/<branch>` pointing at `sha`.
    ///
    /// Returns `Conflict` when the ref already exists.
    async fn create_branch(
        &self,
        repo: &RepoId,
        branch: &str,
        sha: &str,
    ) -> Result<GitRef, ProviderError>;

    /// Delete `refs/heads/<branch>`.
    async fn delete_branch(&self, repo: &RepoId, branch: &str) -> Result<(), ProviderError>;

    /// Fetch a file at a ref; `None` when it does not exist.
    async fn get_file(
        &self,
        repo: &RepoId,
        branch: &str,
        path: &str,
    ) -> Result<Option<RepoFile>, ProviderError>;

    /// Create or update a file on a branch. `sha` is the existing blob's
    /// version token and must be passed when updating.
    async fn put_file(
        &self,
        repo: &RepoId,
        branch: &str,
        path: &str,
        content: &str,
        message: &str,
        sha: Option<&str>,
    ) -> Result<(), ProviderError>;

    /// Dispatch a workflow (by file name) on a ref with structured inputs.
    async fn dispatch_workflow(
        &self,
        repo: &RepoId,
        workflow_file: &str,
        git_ref: &str,
        inputs: &serde_json::Value,
    ) -> Result<(), ProviderError>;

    /// List recent workflow runs for a branch, newest first.
    async fn list_workflow_runs(
        &self,
        repo: &RepoId,
        branch: &str,
    ) -> Result<Vec<WorkflowRun>, ProviderError>;

    /// Logins of current repository collaborators.
    async fn list_collaborators(&self, repo: &RepoId) -> Result<Vec<String>, ProviderError>;

    /// Logins with a pending collaborator invitation.
    async fn list_invitations(&self, repo: &RepoId) -> Result<Vec<String>, ProviderError>;

    /// Invite a user as a repository collaborator.
    ///
    /// Already-invited and already-collaborator outcomes are success.
    async fn invite_collaborator(
        &self,
        repo: &RepoId,
        username: &str,
    ) -> Result<(), ProviderError>;

    /// Login of the authenticated account behind the configured token.
    async fn authenticated_login(&self) -> Result<String, ProviderError>;

    /// Resolve a username to a provider account login; `None` when absent.
    async fn lookup_user(&self, username: &str) -> Result<Option<String>, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_id_parses_owner_and_name() {
        let id = RepoId::parse("acme/web-shop").unwrap();
        assert_eq!(id.owner, "acme");
        assert_eq!(id.name, "web-shop");
        assert_eq!(id.to_string(), "acme/web-shop");
    }

    #[test]
    fn repo_id_rejects_malformed_references() {
        assert!(RepoId::parse("acme").is_err());
        assert!(RepoId::parse("/shop").is_err());
        assert!(RepoId::parse("acme/").is_err());
        assert!(RepoId::parse("acme/shop/extra").is_err());
        assert!(RepoId::parse("acme/sh op").is_err());
    }

    #[test]
    fn transient_classification() {
        assert!(ProviderError::Network("reset".into()).is_transient());
        assert!(ProviderError::Api { status: 503, message: String::new() }.is_transient());
        assert!(!ProviderError::NotFound("x".into()).is_transient());
        assert!(!ProviderError::Api { status: 422, message: String::new() }.is_transient());
    }
}
