//! In-memory provider fake for exercising orchestration logic in tests.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{
    GitRef, ProviderError, RepoFile, RepoId, RepoInfo, RepoProvider, WorkflowRun,
};

#[derive(Debug, Default)]
struct FakeRepo {
    default_branch: String,
    /// branch -> head sha
    branches: HashMap<String, String>,
    /// (branch, path) -> (content, blob sha)
    files: HashMap<(String, String), (String, String)>,
    collaborators: Vec<String>,
    invitations: Vec<String>,
    runs: Vec<WorkflowRun>,
}

#[derive(Debug, Default)]
struct FakeState {
    repos: HashMap<String, FakeRepo>,
    users: Vec<String>,
    login: String,
    write_count: usize,
    dispatches: Vec<serde_json::Value>,
    sha_counter: usize,
    fail_delete: bool,
}

/// Scriptable in-memory [`RepoProvider`].
#[derive(Default)]
pub struct FakeProvider {
    state: Mutex<FakeState>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a repo with a default branch at an initial head commit.
    pub async fn add_repo(&self, full_name: &str, default_branch: &str) {
        let mut state = self.state.lock().await;
        let mut repo = FakeRepo {
            default_branch: default_branch.to_string(),
            ..FakeRepo::default()
        };
        repo.branches
            .insert(default_branch.to_string(), "sha-base".to_string());
        state.repos.insert(full_name.to_string(), repo);
    }

    pub async fn add_collaborator(&self, full_name: &str, login: &str) {
        let mut state = self.state.lock().await;
        if let Some(repo) = state.repos.get_mut(full_name) {
            repo.collaborators.push(login.to_string());
        }
    }

    pub async fn add_invitation(&self, full_name: &str, login: &str) {
        let mut state = self.state.lock().await;
        if let Some(repo) = state.repos.get_mut(full_name) {
            repo.invitations.push(login.to_string());
        }
    }

    pub async fn add_user(&self, login: &str) {
        self.state.lock().await.users.push(login.to_string());
    }

    pub async fn set_login(&self, login: &str) {
        self.state.lock().await.login = login.to_string();
    }

    /// Queue a workflow run to be returned by `list_workflow_runs`.
    pub async fn push_run(&self, full_name: &str, branch: &str, conclusion: Option<&str>) {
        let mut state = self.state.lock().await;
        if let Some(repo) = state.repos.get_mut(full_name) {
            let id = repo.runs.len() as u64 + 1;
            repo.runs.push(WorkflowRun {
                id,
                status: if conclusion.is_some() {
                    "completed".to_string()
                } else {
                    "in_progress".to_string()
                },
                conclusion: conclusion.map(|s| s.to_string()),
                html_url: format!("https://github.com/{}/actions/runs/{}", full_name, id),
                head_branch: branch.to_string(),
                created_at: format!("2026-01-01T00:00:{:02}Z", id),
            });
        }
    }

    /// Advance a branch head so it differs from the default branch.
    pub async fn advance_branch(&self, full_name: &str, branch: &str) {
        let mut state = self.state.lock().await;
        state.sha_counter += 1;
        let sha = format!("sha-{}", state.sha_counter);
        if let Some(repo) = state.repos.get_mut(full_name) {
            repo.branches.insert(branch.to_string(), sha);
        }
    }

    /// Make `delete_branch` fail, to exercise best-effort cleanup paths.
    pub async fn fail_deletes(&self) {
        self.state.lock().await.fail_delete = true;
    }

    pub async fn write_count(&self) -> usize {
        self.state.lock().await.write_count
    }

    pub async fn dispatches(&self) -> Vec<serde_json::Value> {
        self.state.lock().await.dispatches.clone()
    }

    pub async fn branch_exists(&self, full_name: &str, branch: &str) -> bool {
        self.state
            .lock()
            .await
            .repos
            .get(full_name)
            .map(|r| r.branches.contains_key(branch))
            .unwrap_or(false)
    }

    pub async fn file_content(&self, full_name: &str, branch: &str, path: &str) -> Option<String> {
        self.state
            .lock()
            .await
            .repos
            .get(full_name)
            .and_then(|r| r.files.get(&(branch.to_string(), path.to_string())))
            .map(|(content, _)| content.clone())
    }
}

#[async_trait]
impl RepoProvider for FakeProvider {
    async fn repo(&self, repo: &RepoId) -> Result<RepoInfo, ProviderError> {
        let state = self.state.lock().await;
        let full = repo.to_string();
        let stored = state
            .repos
            .get(&full)
            .ok_or_else(|| ProviderError::NotFound(full.clone()))?;
        Ok(RepoInfo {
            full_name: full.clone(),
            default_branch: stored.default_branch.clone(),
            html_url: format!("https://github.com/{}", full),
        })
    }

    async fn get_branch(&self, repo: &RepoId, branch: &str) -> Result<GitRef, ProviderError> {
        let state = self.state.lock().await;
        let stored = state
            .repos
            .get(&repo.to_string())
            .ok_or_else(|| ProviderError::NotFound(repo.to_string()))?;
        stored
            .branches
            .get(branch)
            .map(|sha| GitRef {
                name: branch.to_string(),
                sha: sha.clone(),
            })
            .ok_or_else(|| ProviderError::NotFound(format!("heads/{}", branch)))
    }

    async fn create_branch(
        &self,
        repo: &RepoId,
        branch: &str,
        sha: &str,
    ) -> Result<GitRef, ProviderError> {
        let mut state = self.state.lock().await;
        let stored = state
            .repos
            .get_mut(&repo.to_string())
            .ok_or_else(|| ProviderError::NotFound(repo.to_string()))?;
        if stored.branches.contains_key(branch) {
            return Err(ProviderError::Conflict(format!(
                "Reference already exists: {}",
                branch
            )));
        }
        stored.branches.insert(branch.to_string(), sha.to_string());
        Ok(GitRef {
            name: branch.to_string(),
            sha: sha.to_string(),
        })
    }

    async fn delete_branch(&self, repo: &RepoId, branch: &str) -> Result<(), ProviderError> {
        let mut state = self.state.lock().await;
        if state.fail_delete {
            return Err(ProviderError::PermissionDenied("deletes disabled".into()));
        }
        let stored = state
            .repos
            .get_mut(&repo.to_string())
            .ok_or_else(|| ProviderError::NotFound(repo.to_string()))?;
        stored
            .branches
            .remove(branch)
            .map(|_| ())
            .ok_or_else(|| ProviderError::NotFound(format!("heads/{}", branch)))
    }

    async fn get_file(
        &self,
        repo: &RepoId,
        branch: &str,
        path: &str,
    ) -> Result<Option<RepoFile>, ProviderError> {
        let state = self.state.lock().await;
        let stored = state
            .repos
            .get(&repo.to_string())
            .ok_or_else(|| ProviderError::NotFound(repo.to_string()))?;
        Ok(stored
            .files
            .get(&(branch.to_string(), path.to_string()))
            .map(|(content, sha)| RepoFile {
                content: content.clone(),
                sha: sha.clone(),
            }))
    }

    async fn put_file(
        &self,
        repo: &RepoId,
        branch: &str,
        path: &str,
        content: &str,
        _message: &str,
        sha: Option<&str>,
    ) -> Result<(), ProviderError> {
        let mut state = self.state.lock().await;
        state.write_count += 1;
        state.sha_counter += 1;
        let blob_sha = format!("blob-{}", state.sha_counter);
        let head_sha = format!("sha-{}", state.sha_counter);
        let stored = state
            .repos
            .get_mut(&repo.to_string())
            .ok_or_else(|| ProviderError::NotFound(repo.to_string()))?;
        let key = (branch.to_string(), path.to_string());
        if let Some((_, existing_sha)) = stored.files.get(&key) {
            match sha {
                Some(given) if given == existing_sha => {}
                _ => {
                    return Err(ProviderError::Conflict(format!(
                        "sha mismatch for {}",
                        path
                    )))
                }
            }
        }
        stored.files.insert(key, (content.to_string(), blob_sha));
        stored.branches.insert(branch.to_string(), head_sha);
        Ok(())
    }

    async fn dispatch_workflow(
        &self,
        repo: &RepoId,
        workflow_file: &str,
        git_ref: &str,
        inputs: &serde_json::Value,
    ) -> Result<(), ProviderError> {
        let mut state = self.state.lock().await;
        if !state.repos.contains_key(&repo.to_string()) {
            return Err(ProviderError::NotFound(repo.to_string()));
        }
        state.dispatches.push(serde_json::json!({
            "repo": repo.to_string(),
            "workflow": workflow_file,
            "ref": git_ref,
            "inputs": inputs,
        }));
        Ok(())
    }

    async fn list_workflow_runs(
        &self,
        repo: &RepoId,
        branch: &str,
    ) -> Result<Vec<WorkflowRun>, ProviderError> {
        let state = self.state.lock().await;
        let stored = state
            .repos
            .get(&repo.to_string())
            .ok_or_else(|| ProviderError::NotFound(repo.to_string()))?;
        let mut runs: Vec<WorkflowRun> = stored
            .runs
            .iter()
            .filter(|r| r.head_branch == branch)
            .cloned()
            .collect();
        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(runs)
    }

    async fn list_collaborators(&self, repo: &RepoId) -> Result<Vec<String>, ProviderError> {
        let state = self.state.lock().await;
        Ok(state
            .repos
            .get(&repo.to_string())
            .map(|r| r.collaborators.clone())
            .unwrap_or_default())
    }

    async fn list_invitations(&self, repo: &RepoId) -> Result<Vec<String>, ProviderError> {
        let state = self.state.lock().await;
        Ok(state
            .repos
            .get(&repo.to_string())
            .map(|r| r.invitations.clone())
            .unwrap_or_default())
    }

    async fn invite_collaborator(
        &self,
        repo: &RepoId,
        username: &str,
    ) -> Result<(), ProviderError> {
        let mut state = self.state.lock().await;
        let stored = state
            .repos
            .get_mut(&repo.to_string())
            .ok_or_else(|| ProviderError::NotFound(repo.to_string()))?;
        // Re-inviting is success, mirroring the provider contract.
        if !stored.collaborators.iter().any(|c| c == username)
            && !stored.invitations.iter().any(|i| i == username)
        {
            stored.invitations.push(username.to_string());
        }
        Ok(())
    }

    async fn authenticated_login(&self) -> Result<String, ProviderError> {
        Ok(self.state.lock().await.login.clone())
    }

    async fn lookup_user(&self, username: &str) -> Result<Option<String>, ProviderError> {
        let state = self.state.lock().await;
        Ok(state
            .users
            .iter()
            .find(|u| *u == username)
            .cloned()
            .or_else(|| {
                // Collaborators and invitees are resolvable accounts too.
                state.repos.values().find_map(|r| {
                    r.collaborators
                        .iter()
                        .chain(r.invitations.iter())
                        .find(|l| *l == username)
                        .cloned()
                })
            }))
    }
}
