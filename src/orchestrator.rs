//! Repository orchestration: branches, file commits, invitations.
//!
//! Every operation is idempotent and individually retryable. Best-effort
//! cleanup (branch deletion) logs and swallows failures; essential-path
//! failures surface as structured [`EngineError`]s.

use std::sync::Arc;

use crate::error::EngineError;
use crate::github::{ProviderError, RepoId, RepoInfo, RepoProvider};
use crate::spec::{spec_path, VerificationSpec};
use crate::stacks::Scaffold;
use crate::workflow::WORKFLOW_PATH;

pub struct RepoOrchestrator {
    provider: Arc<dyn RepoProvider>,
}

impl RepoOrchestrator {
    pub fn new(provider: Arc<dyn RepoProvider>) -> Self {
        Self { provider }
    }

    /// Fetch repository metadata, mapping a missing repo to `repo_missing`.
    pub async fn repo_info(&self, repo: &RepoId) -> Result<RepoInfo, EngineError> {
        match self.provider.repo(repo).await {
            Ok(info) => Ok(info),
            Err(ProviderError::NotFound(_)) => Err(EngineError::RepoMissing),
            Err(ProviderError::PermissionDenied(msg)) => Err(EngineError::PermissionDenied(msg)),
            Err(e) => Err(e.into()),
        }
    }

    /// Create `branch` from the default branch head. An existing ref with
    /// the same name resolves to success.
    pub async fn ensure_branch(&self, repo: &RepoId, branch: &str) -> Result<(), EngineError> {
        let info = self.repo_info(repo).await?;
        let base = self
            .provider
            .get_branch(repo, &info.default_branch)
            .await
            .map_err(|e| EngineError::BranchCreateFailed {
                branch: branch.to_string(),
                reason: format!("default branch head: {}", e),
            })?;
        match self.provider.create_branch(repo, branch, &base.sha).await {
            Ok(_) => {
                tracing::info!(%repo, branch, "created task branch");
                Ok(())
            }
            Err(ProviderError::Conflict(_)) => Ok(()),
            Err(e) => Err(EngineError::BranchCreateFailed {
                branch: branch.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    /// Delete `branch` only when its head equals the default branch head,
    /// i.e. no work was committed. Never blocks the caller: every failure
    /// is logged and swallowed.
    pub async fn delete_branch_if_unchanged(&self, repo: &RepoId, branch: &str) {
        let result: Result<(), ProviderError> = async {
            let info = self.provider.repo(repo).await?;
            let base = self.provider.get_branch(repo, &info.default_branch).await?;
            let head = self.provider.get_branch(repo, branch).await?;
            if head.sha != base.sha {
                tracing::info!(%repo, branch, "leaving task branch intact: it has commits");
                return Ok(());
            }
            self.provider.delete_branch(repo, branch).await
        }
        .await;
        if let Err(e) = result {
            tracing::warn!(%repo, branch, "best-effort branch deletion failed: {}", e);
        }
    }

    /// Create-or-update a file; a byte-identical write is a no-op.
    ///
    /// Returns whether a write happened.
    pub async fn put_file_if_changed(
        &self,
        repo: &RepoId,
        branch: &str,
        path: &str,
        content: &str,
        message: &str,
    ) -> Result<bool, EngineError> {
        let existing = self
            .provider
            .get_file(repo, branch, path)
            .await
            .map_err(|e| EngineError::CommitFailed(format!("read {}: {}", path, e)))?;
        if let Some(file) = &existing {
            if file.content == content {
                return Ok(false);
            }
        }
        self.provider
            .put_file(
                repo,
                branch,
                path,
                content,
                message,
                existing.as_ref().map(|f| f.sha.as_str()),
            )
            .await
            .map_err(|e| EngineError::CommitFailed(format!("write {}: {}", path, e)))?;
        Ok(true)
    }

    /// Invite a user as a collaborator; already-invited resolves to success.
    pub async fn ensure_collaborator(
        &self,
        repo: &RepoId,
        username: &str,
    ) -> Result<(), EngineError> {
        match self.provider.invite_collaborator(repo, username).await {
            Ok(()) | Err(ProviderError::Conflict(_)) => Ok(()),
            Err(ProviderError::PermissionDenied(msg)) => Err(EngineError::PermissionDenied(msg)),
            Err(e) => Err(e.into()),
        }
    }

    /// Commit the spec, every generated test file, and the CI workflow
    /// definition to the task branch. Returns the number of actual writes.
    pub async fn commit_verification_files(
        &self,
        repo: &RepoId,
        branch: &str,
        spec: &VerificationSpec,
        scaffold: &Scaffold,
        workflow: &str,
    ) -> Result<usize, EngineError> {
        let spec_json = serde_json::to_string_pretty(spec)
            .map_err(|e| EngineError::CommitFailed(format!("serialize spec: {}", e)))?
            + "\n";
        let message = format!("chore: verification setup for {}", spec.task_id);

        let mut writes = 0;
        if self
            .put_file_if_changed(repo, branch, &spec_path(&spec.task_id), &spec_json, &message)
            .await?
        {
            writes += 1;
        }
        for file in &scaffold.files {
            if self
                .put_file_if_changed(repo, branch, &file.path, &file.content, &message)
                .await?
            {
                writes += 1;
            }
        }
        if self
            .put_file_if_changed(repo, branch, WORKFLOW_PATH, workflow, &message)
            .await?
        {
            writes += 1;
        }
        Ok(writes)
    }
}
