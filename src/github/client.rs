//! GitHub REST client implementation with a single retry for transient errors.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use serde_json::json;

use super::{
    GitRef, ProviderError, RepoFile, RepoId, RepoInfo, RepoProvider, WorkflowRun,
};

/// Classify a provider HTTP status into a [`ProviderError`].
fn classify_status(status: StatusCode, message: String) -> ProviderError {
    match status.as_u16() {
        401 | 403 => ProviderError::PermissionDenied(message),
        404 => ProviderError::NotFound(message),
        409 => ProviderError::Conflict(message),
        // Ref creation on an existing name comes back as 422.
        422 if message.to_lowercase().contains("already exists") => {
            ProviderError::Conflict(message)
        }
        code => ProviderError::Api {
            status: code,
            message,
        },
    }
}

/// GitHub REST API client.
pub struct GitHubClient {
    client: Client,
    base_url: String,
    token: String,
}

impl GitHubClient {
    /// Create a client against the given API base URL (no trailing slash).
    pub fn new(base_url: impl Into<String>, token: impl Into<String>, timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Issue a request; transient failures get exactly one retry.
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<(StatusCode, String), ProviderError> {
        let mut last_err = None;
        for attempt in 0..2 {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
            let mut req = self
                .client
                .request(method.clone(), self.url(path))
                .header("Authorization", format!("Bearer {}", self.token))
                .header("Accept", "application/vnd.github+json")
                .header("User-Agent", "taskproof");
            if let Some(b) = body {
                req = req.json(b);
            }
            match req.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    let text = resp.text().await.unwrap_or_default();
                    if status.is_server_error() && attempt == 0 {
                        last_err = Some(classify_status(status, text));
                        continue;
                    }
                    return Ok((status, text));
                }
                Err(e) => {
                    let err = ProviderError::Network(format!("{}", e));
                    if attempt == 0 && err.is_transient() {
                        last_err = Some(err);
                        continue;
                    }
                    return Err(err);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| ProviderError::Network("request failed".to_string())))
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T, ProviderError> {
        let (status, body) = self.send(Method::GET, path, None).await?;
        if !status.is_success() {
            return Err(classify_status(status, body));
        }
        serde_json::from_str(&body).map_err(|e| ProviderError::Decode(format!("{}: {}", path, e)))
    }
}

#[derive(Debug, Deserialize)]
struct RefResponse {
    object: RefObject,
}

#[derive(Debug, Deserialize)]
struct RefObject {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct ContentResponse {
    content: Option<String>,
    sha: String,
}

#[derive(Debug, Deserialize)]
struct RunsResponse {
    workflow_runs: Vec<WorkflowRun>,
}

#[derive(Debug, Deserialize)]
struct LoginHolder {
    login: String,
}

#[derive(Debug, Deserialize)]
struct InvitationEntry {
    invitee: Option<LoginHolder>,
}

#[async_trait]
impl RepoProvider for GitHubClient {
    async fn repo(&self, repo: &RepoId) -> Result<RepoInfo, ProviderError> {
        self.get_json(&format!("/repos/{}/{}", repo.owner, repo.name))
            .await
    }

    async fn get_branch(&self, repo: &RepoId, branch: &str) -> Result<GitRef, ProviderError> {
        let resp: RefResponse = self
            .get_json(&format!(
                "/repos/{}/{}/git/ref/heads/{}",
                repo.owner, repo.name, branch
            ))
            .await?;
        Ok(GitRef {
            name: branch.to_string(),
            sha: resp.object.sha,
        })
    }

    async fn create_branch(
        &self,
        repo: &RepoId,
        branch: &str,
        sha: &str,
    ) -> Result<GitRef, ProviderError> {
        let body = json!({ "ref": format!("refs/heads/{}", branch), "sha": sha });
        let (status, text) = self
            .send(
                Method::POST,
                &format!("/repos/{}/{}/git/refs", repo.owner, repo.name),
                Some(&body),
            )
            .await?;
        if !status.is_success() {
            return Err(classify_status(status, text));
        }
        Ok(GitRef {
            name: branch.to_string(),
            sha: sha.to_string(),
        })
    }

    async fn delete_branch(&self, repo: &RepoId, branch: &str) -> Result<(), ProviderError> {
        let (status, text) = self
            .send(
                Method::DELETE,
                &format!(
                    "/repos/{}/{}/git/refs/heads/{}",
                    repo.owner, repo.name, branch
                ),
                None,
            )
            .await?;
        if !status.is_success() {
            return Err(classify_status(status, text));
        }
        Ok(())
    }

    async fn get_file(
        &self,
        repo: &RepoId,
        branch: &str,
        path: &str,
    ) -> Result<Option<RepoFile>, ProviderError> {
        let encoded = urlencoding::encode(path);
        let api_path = format!(
            "/repos/{}/{}/contents/{}?ref={}",
            repo.owner, repo.name, encoded, branch
        );
        let (status, body) = self.send(Method::GET, &api_path, None).await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(classify_status(status, body));
        }
        let resp: ContentResponse = serde_json::from_str(&body)
            .map_err(|e| ProviderError::Decode(format!("{}: {}", api_path, e)))?;
        let raw = resp.content.unwrap_or_default().replace(['\n', '\r'], "");
        let decoded = BASE64
            .decode(raw.as_bytes())
            .map_err(|e| ProviderError::Decode(format!("base64 for {}: {}", path, e)))?;
        Ok(Some(RepoFile {
            content: String::from_utf8_lossy(&decoded).into_owned(),
            sha: resp.sha,
        }))
    }

    async fn put_file(
        &self,
        repo: &RepoId,
        branch: &str,
        path: &str,
        content: &str,
        message: &str,
        sha: Option<&str>,
    ) -> Result<(), ProviderError> {
        let encoded = urlencoding::encode(path);
        let mut body = json!({
            "message": message,
            "content": BASE64.encode(content.as_bytes()),
            "branch": branch,
        });
        if let Some(sha) = sha {
            body["sha"] = json!(sha);
        }
        let (status, text) = self
            .send(
                Method::PUT,
                &format!("/repos/{}/{}/contents/{}", repo.owner, repo.name, encoded),
                Some(&body),
            )
            .await?;
        if !status.is_success() {
            return Err(classify_status(status, text));
        }
        Ok(())
    }

    async fn dispatch_workflow(
        &self,
        repo: &RepoId,
        workflow_file: &str,
        git_ref: &str,
        inputs: &serde_json::Value,
    ) -> Result<(), ProviderError> {
        let body = json!({ "ref": git_ref, "inputs": inputs });
        let (status, text) = self
            .send(
                Method::POST,
                &format!(
                    "/repos/{}/{}/actions/workflows/{}/dispatches",
                    repo.owner, repo.name, workflow_file
                ),
                Some(&body),
            )
            .await?;
        if !status.is_success() {
            return Err(classify_status(status, text));
        }
        Ok(())
    }

    async fn list_workflow_runs(
        &self,
        repo: &RepoId,
        branch: &str,
    ) -> Result<Vec<WorkflowRun>, ProviderError> {
        let resp: RunsResponse = self
            .get_json(&format!(
                "/repos/{}/{}/actions/runs?branch={}&per_page=10",
                repo.owner, repo.name, branch
            ))
            .await?;
        Ok(resp.workflow_runs)
    }

    async fn list_collaborators(&self, repo: &RepoId) -> Result<Vec<String>, ProviderError> {
        let entries: Vec<LoginHolder> = self
            .get_json(&format!(
                "/repos/{}/{}/collaborators?per_page=100",
                repo.owner, repo.name
            ))
            .await?;
        Ok(entries.into_iter().map(|e| e.login).collect())
    }

    async fn list_invitations(&self, repo: &RepoId) -> Result<Vec<String>, ProviderError> {
        let entries: Vec<InvitationEntry> = self
            .get_json(&format!(
                "/repos/{}/{}/invitations?per_page=100",
                repo.owner, repo.name
            ))
            .await?;
        Ok(entries
            .into_iter()
            .filter_map(|e| e.invitee.map(|i| i.login))
            .collect())
    }

    async fn invite_collaborator(
        &self,
        repo: &RepoId,
        username: &str,
    ) -> Result<(), ProviderError> {
        let (status, text) = self
            .send(
                Method::PUT,
                &format!(
                    "/repos/{}/{}/collaborators/{}",
                    repo.owner, repo.name, username
                ),
                None,
            )
            .await?;
        // 201 = invitation created, 204 = already a collaborator.
        if !status.is_success() {
            return Err(classify_status(status, text));
        }
        Ok(())
    }

    async fn authenticated_login(&self) -> Result<String, ProviderError> {
        let holder: LoginHolder = self.get_json("/user").await?;
        Ok(holder.login)
    }

    async fn lookup_user(&self, username: &str) -> Result<Option<String>, ProviderError> {
        let (status, body) = self
            .send(Method::GET, &format!("/users/{}", username), None)
            .await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(classify_status(status, body));
        }
        let holder: LoginHolder = serde_json::from_str(&body)
            .map_err(|e| ProviderError::Decode(format!("/users/{}: {}", username, e)))?;
        Ok(Some(holder.login))
    }
}
