//! CI workflow rendering, dispatch, and the single-shot result poll.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use crate::error::EngineError;
use crate::github::{RepoId, RepoProvider};
use crate::stacks::Scaffold;

/// Workflow file name used for dispatch-by-file.
pub const WORKFLOW_FILE: &str = "taskproof-verify.yml";

/// Path of the workflow definition inside the target repository.
pub const WORKFLOW_PATH: &str = ".github/workflows/taskproof-verify.yml";

/// Which ref carries the dispatched workflow.
///
/// `TaskBranch` runs the definition committed to the task branch itself;
/// `DefaultBranch` targets a single dispatch-only workflow pinned to the
/// default branch and parameterized by inputs, so the task branch needs no
/// push rights to the workflow scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchTarget {
    TaskBranch,
    DefaultBranch,
}

/// Outcome of the advisory post-dispatch poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// No completed run registered yet; the webhook path will finalize.
    Pending,
    Completed {
        conclusion: String,
        url: String,
    },
}

/// Render the verification workflow definition for a scaffold.
pub fn render_workflow(scaffold: &Scaffold) -> String {
    format!(
        "name: Task verification\n\
         on:\n\
         \x20 workflow_dispatch:\n\
         \x20   inputs:\n\
         \x20     projectId:\n\
         \x20       description: Project identifier\n\
         \x20       required: true\n\
         \x20     taskId:\n\
         \x20       description: Task identifier\n\
         \x20       required: true\n\
         \x20     branch:\n\
         \x20       description: Task branch to verify\n\
         \x20       required: true\n\
         jobs:\n\
         \x20 verify:\n\
         \x20   runs-on: ubuntu-latest\n\
         \x20   steps:\n\
         \x20     - uses: actions/checkout@v4\n\
         \x20       with:\n\
         \x20         ref: ${{{{ inputs.branch }}}}\n\
         \x20     - name: Install dependencies\n\
         \x20       run: {install}\n\
         \x20     - name: Run verification\n\
         \x20       run: {test}\n\
         \x20     - name: Upload verification artifacts\n\
         \x20       if: always()\n\
         \x20       uses: actions/upload-artifact@v4\n\
         \x20       with:\n\
         \x20         name: verification-report\n\
         \x20         path: verification/\n",
        install = scaffold.install_command,
        test = scaffold.test_command,
    )
}

/// Dispatches runs and performs the bounded result poll.
#[derive(Clone)]
pub struct WorkflowService {
    provider: Arc<dyn RepoProvider>,
    poll_delay: Duration,
}

impl WorkflowService {
    pub fn new(provider: Arc<dyn RepoProvider>, poll_delay: Duration) -> Self {
        Self {
            provider,
            poll_delay,
        }
    }

    /// Trigger the verification workflow for a task branch.
    pub async fn dispatch(
        &self,
        repo: &RepoId,
        target: DispatchTarget,
        default_branch: &str,
        project_id: &str,
        task_id: &str,
        branch: &str,
    ) -> Result<(), EngineError> {
        let git_ref = match target {
            DispatchTarget::TaskBranch => branch,
            DispatchTarget::DefaultBranch => default_branch,
        };
        let inputs = json!({
            "projectId": project_id,
            "taskId": task_id,
            "branch": branch,
        });
        self.provider
            .dispatch_workflow(repo, WORKFLOW_FILE, git_ref, &inputs)
            .await
            .map_err(|e| EngineError::DispatchFailed(e.to_string()))?;
        tracing::info!(%repo, task_id, branch, ?target, "dispatched verification workflow");
        Ok(())
    }

    /// Wait the fixed registration delay, then inspect the most recent run
    /// on the branch once. Advisory: provider hiccups degrade to `Pending`
    /// rather than failing, since the webhook path still corrects the state.
    pub async fn poll_once(&self, repo: &RepoId, branch: &str) -> PollOutcome {
        tokio::time::sleep(self.poll_delay).await;
        let runs = match self.provider.list_workflow_runs(repo, branch).await {
            Ok(runs) => runs,
            Err(e) => {
                tracing::warn!(%repo, branch, "run poll failed, leaving pending: {}", e);
                return PollOutcome::Pending;
            }
        };
        match runs.first() {
            Some(run) if run.status == "completed" => match &run.conclusion {
                Some(conclusion) => PollOutcome::Completed {
                    conclusion: conclusion.clone(),
                    url: run.html_url.clone(),
                },
                None => PollOutcome::Pending,
            },
            _ => PollOutcome::Pending,
        }
    }
}
