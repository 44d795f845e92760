//! Task lifecycle controller: the state machine tying extraction, scaffold
//! generation, repository orchestration, and CI results together.
//!
//! Actions re-check their preconditions against freshly loaded state under a
//! per-project lock immediately before mutating, so two concurrent `assign`
//! calls cannot both win (atomic conditional update). Provider-side work is
//! idempotent and happens before the lock is taken.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::error::EngineError;
use crate::github::{RepoId, RepoProvider};
use crate::membership::{MembershipState, MembershipTracker};
use crate::model::store::ProjectStore;
use crate::model::{
    now_string, CheckState, Column, Project, RepoCheckStatus, Task, VerificationStatus,
};
use crate::orchestrator::RepoOrchestrator;
use crate::spec::{build_spec, VerificationSpec};
use crate::stacks::AdapterRegistry;
use crate::workflow::{render_workflow, DispatchTarget, PollOutcome, WorkflowService};

/// Correlation fields extracted from a CI callback.
#[derive(Debug, Clone, Default)]
pub struct Correlation {
    pub project_id: Option<String>,
    pub task_id: Option<String>,
    pub repo_full_name: Option<String>,
    pub branch: Option<String>,
}

/// A completed remote run as seen by a callback.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub conclusion: String,
    pub url: Option<String>,
    /// Structured summary text from the runner, when available.
    pub summary: Option<String>,
}

/// What a CI callback did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    Applied { project_id: String, task_id: String },
    /// Event could not be resolved to a task; nothing was mutated.
    Ignored(String),
}

/// Parse per-expectation results from a runner summary.
///
/// Recognizes the runner's `PASS <key>` / `FAIL <key>` lines. Anything else
/// yields `None`, degrading to a uniform result over all checklist items.
pub fn parse_summary(summary: &str) -> Option<HashMap<String, bool>> {
    let mut results = HashMap::new();
    for line in summary.lines() {
        let line = line.trim().trim_start_matches("- ");
        let (passed, rest) = if let Some(rest) = line.strip_prefix("PASS ") {
            (true, rest)
        } else if let Some(rest) = line.strip_prefix("FAIL ") {
            (false, rest)
        } else {
            continue;
        };
        if let Some(key) = rest.split_whitespace().next() {
            results.insert(key.to_string(), passed);
        }
    }
    if results.is_empty() {
        None
    } else {
        Some(results)
    }
}

pub struct LifecycleController {
    store: Arc<dyn ProjectStore>,
    provider: Arc<dyn RepoProvider>,
    orchestrator: RepoOrchestrator,
    workflows: WorkflowService,
    membership: MembershipTracker,
    registry: AdapterRegistry,
    max_doing: usize,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl LifecycleController {
    pub fn new(
        store: Arc<dyn ProjectStore>,
        provider: Arc<dyn RepoProvider>,
        max_doing: usize,
        poll_delay: Duration,
        membership_ttl_secs: u64,
    ) -> Self {
        Self {
            orchestrator: RepoOrchestrator::new(Arc::clone(&provider)),
            workflows: WorkflowService::new(Arc::clone(&provider), poll_delay),
            membership: MembershipTracker::new(Arc::clone(&provider), membership_ttl_secs),
            store,
            provider,
            registry: AdapterRegistry::standard(),
            max_doing,
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn project_lock(&self, project_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        Arc::clone(
            locks
                .entry(project_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    /// Load a project, normalizing legacy task data and persisting the
    /// repaired document before anything else runs against it.
    pub async fn load_project(&self, project_id: &str) -> Result<Project, EngineError> {
        let mut project = self
            .store
            .get(project_id)
            .await
            .map_err(EngineError::Store)?
            .ok_or_else(|| EngineError::ProjectNotFound(project_id.to_string()))?;
        if project.normalize() {
            tracing::info!(project_id, "normalized task identifiers");
            self.store.save(&project).await.map_err(EngineError::Store)?;
        }
        Ok(project)
    }

    pub async fn list_projects(&self) -> Result<Vec<Project>, EngineError> {
        self.store.list().await.map_err(EngineError::Store)
    }

    /// Publish a new project with its backlog.
    pub async fn create_project(&self, mut project: Project) -> Result<Project, EngineError> {
        if let Some(linked) = &project.repo {
            RepoId::parse(&linked.full_name)
                .map_err(EngineError::InvalidRepoReference)?;
        }
        if self
            .provider
            .lookup_user(&project.owner)
            .await?
            .is_none()
        {
            return Err(EngineError::AccountNotConnected {
                login: project.owner.clone(),
            });
        }
        project.normalize();
        self.store.save(&project).await.map_err(EngineError::Store)?;
        Ok(project)
    }

    fn linked_repo(project: &Project) -> Result<RepoId, EngineError> {
        let linked = project.repo.as_ref().ok_or(EngineError::RepoMissing)?;
        RepoId::parse(&linked.full_name).map_err(EngineError::InvalidRepoReference)
    }

    async fn resolve_account(&self, login: &str) -> Result<(), EngineError> {
        match self.provider.lookup_user(login).await? {
            Some(_) => Ok(()),
            None => Err(EngineError::AccountNotConnected {
                login: login.to_string(),
            }),
        }
    }

    /// Require ACTIVE membership; invite on NONE and surface the invite URL.
    async fn require_active(
        &self,
        repo: &RepoId,
        repo_url: &str,
        login: &str,
    ) -> Result<(), EngineError> {
        let record = self.membership.membership(repo, login).await?;
        if record.state.is_active() {
            return Ok(());
        }
        let mut state = record.state;
        if state == MembershipState::None {
            match self.orchestrator.ensure_collaborator(repo, login).await {
                Ok(()) => {
                    self.membership.invalidate(repo, login).await;
                    state = MembershipState::Invited;
                }
                Err(e) => {
                    tracing::warn!(%repo, login, "collaborator invite failed: {}", e);
                }
            }
        }
        Err(EngineError::AccessRequired {
            state: state.to_string(),
            invite_url: format!("{}/invitations", repo_url),
        })
    }

    /// Idempotently bring the task branch up to date: branch exists, spec,
    /// scaffold, and workflow definition committed.
    async fn ensure_artifacts(
        &self,
        project: &Project,
        task: &Task,
    ) -> Result<(RepoId, String, String, VerificationSpec), EngineError> {
        let repo = Self::linked_repo(project)?;
        let info = self.orchestrator.repo_info(&repo).await?;
        let branch = task
            .repo
            .branch
            .clone()
            .unwrap_or_else(|| task.branch_name());
        self.orchestrator.ensure_branch(&repo, &branch).await?;
        let spec = build_spec(task, project.stack.as_ref());
        let scaffold = self.registry.generate(&spec);
        let workflow = render_workflow(&scaffold);
        self.orchestrator
            .commit_verification_files(&repo, &branch, &spec, &scaffold, &workflow)
            .await?;
        Ok((repo, info.default_branch, branch, spec))
    }

    fn invalid_move(task: &Task, to: Column) -> EngineError {
        EngineError::InvalidColumnTransition {
            from: task.column.to_string(),
            to: to.to_string(),
        }
    }

    /// Assign a task: create/reuse the branch, commit spec and scaffolding,
    /// and move the task to `doing`.
    pub async fn assign(
        &self,
        project_id: &str,
        task_id: &str,
        actor: &str,
    ) -> Result<Task, EngineError> {
        let project = self.load_project(project_id).await?;
        let task = project
            .find_task(task_id)
            .ok_or_else(|| EngineError::TaskNotFound(task_id.to_string()))?
            .clone();

        if task.column != Column::Todo {
            return Err(Self::invalid_move(&task, Column::Doing));
        }
        if task.assignee.is_some() {
            return Err(EngineError::TaskAlreadyAssigned);
        }
        if actor == project.owner {
            return Err(EngineError::PermissionDenied(
                "project owners cannot take their own tasks".to_string(),
            ));
        }
        self.resolve_account(actor).await?;
        if project.doing_count_for(actor) >= self.max_doing {
            return Err(EngineError::MaxConcurrentTasks {
                limit: self.max_doing,
            });
        }
        let repo = Self::linked_repo(&project)?;
        let info = self.orchestrator.repo_info(&repo).await?;
        self.require_active(&repo, &info.html_url, actor).await?;

        let (repo, _default_branch, branch, spec) =
            self.ensure_artifacts(&project, &task).await?;

        // Conditional update: only finalize if the task is still free.
        let lock = self.project_lock(project_id).await;
        let _guard = lock.lock().await;
        let mut fresh = self.load_project(project_id).await?;
        let slot = fresh
            .find_task_mut(task_id)
            .ok_or_else(|| EngineError::TaskNotFound(task_id.to_string()))?;
        if slot.column != Column::Todo || slot.assignee.is_some() {
            return Err(EngineError::TaskAlreadyAssigned);
        }
        slot.assignee = Some(actor.to_string());
        slot.column = Column::Doing;
        slot.verification = VerificationStatus::NotSubmitted;
        slot.repo.full_name = Some(repo.to_string());
        slot.repo.branch = Some(branch);
        slot.repo.check = RepoCheckStatus::Idle;
        slot.sync_checklist(&spec.expectations, true);
        let updated = slot.clone();
        fresh.updated_at = now_string();
        self.store.save(&fresh).await.map_err(EngineError::Store)?;
        tracing::info!(project_id, task_id, actor, "task assigned");
        Ok(updated)
    }

    /// Unassign a task, releasing its branch when no work was committed.
    pub async fn unassign(
        &self,
        project_id: &str,
        task_id: &str,
        actor: &str,
    ) -> Result<Task, EngineError> {
        let project = self.load_project(project_id).await?;
        let task = project
            .find_task(task_id)
            .ok_or_else(|| EngineError::TaskNotFound(task_id.to_string()))?
            .clone();

        if task.column != Column::Doing {
            return Err(Self::invalid_move(&task, Column::Todo));
        }
        if task.assignee.as_deref() != Some(actor) {
            return Err(EngineError::PermissionDenied(
                "only the current assignee can unassign a task".to_string(),
            ));
        }

        // Best-effort cleanup; never blocks the unassign.
        if let (Ok(repo), Some(branch)) = (Self::linked_repo(&project), task.repo.branch.clone()) {
            self.orchestrator
                .delete_branch_if_unchanged(&repo, &branch)
                .await;
        }

        let lock = self.project_lock(project_id).await;
        let _guard = lock.lock().await;
        let mut fresh = self.load_project(project_id).await?;
        let slot = fresh
            .find_task_mut(task_id)
            .ok_or_else(|| EngineError::TaskNotFound(task_id.to_string()))?;
        if slot.column != Column::Doing || slot.assignee.as_deref() != Some(actor) {
            return Err(Self::invalid_move(slot, Column::Todo));
        }
        slot.assignee = None;
        slot.column = Column::Todo;
        slot.verification = VerificationStatus::NotSubmitted;
        slot.repo.branch = None;
        slot.repo.check = RepoCheckStatus::Idle;
        let updated = slot.clone();
        fresh.updated_at = now_string();
        self.store.save(&fresh).await.map_err(EngineError::Store)?;
        tracing::info!(project_id, task_id, actor, "task unassigned");
        Ok(updated)
    }

    /// Submit a task for review and dispatch verification fire-and-forget.
    pub async fn submit(
        &self,
        project_id: &str,
        task_id: &str,
        actor: &str,
    ) -> Result<Task, EngineError> {
        let project = self.load_project(project_id).await?;
        let task = project
            .find_task(task_id)
            .ok_or_else(|| EngineError::TaskNotFound(task_id.to_string()))?
            .clone();

        if task.column != Column::Doing {
            return Err(Self::invalid_move(&task, Column::Review));
        }
        if task.assignee.as_deref() != Some(actor) {
            return Err(EngineError::PermissionDenied(
                "only the current assignee can submit a task".to_string(),
            ));
        }

        let (repo, default_branch, branch, _spec) =
            self.ensure_artifacts(&project, &task).await?;

        let lock = self.project_lock(project_id).await;
        let _guard = lock.lock().await;
        let mut fresh = self.load_project(project_id).await?;
        let slot = fresh
            .find_task_mut(task_id)
            .ok_or_else(|| EngineError::TaskNotFound(task_id.to_string()))?;
        if slot.column != Column::Doing || slot.assignee.as_deref() != Some(actor) {
            return Err(Self::invalid_move(slot, Column::Review));
        }
        slot.column = Column::Review;
        slot.verification = VerificationStatus::Submitted;
        let updated = slot.clone();
        fresh.updated_at = now_string();
        self.store.save(&fresh).await.map_err(EngineError::Store)?;
        drop(_guard);

        // Fire-and-forget: the run's result lands via webhook or run-verify.
        let workflows = self.workflows.clone();
        let project_id = project_id.to_string();
        let task_id = task_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = workflows
                .dispatch(
                    &repo,
                    DispatchTarget::TaskBranch,
                    &default_branch,
                    &project_id,
                    &task_id,
                    &branch,
                )
                .await
            {
                tracing::warn!(%project_id, %task_id, "submit dispatch failed: {}", e);
            }
        });

        Ok(updated)
    }

    /// Run verification synchronously: dispatch, poll once, apply the
    /// conclusion when one is already available.
    pub async fn run_verify(
        &self,
        project_id: &str,
        task_id: &str,
        actor: &str,
    ) -> Result<Task, EngineError> {
        let project = self.load_project(project_id).await?;
        let task = project
            .find_task(task_id)
            .ok_or_else(|| EngineError::TaskNotFound(task_id.to_string()))?
            .clone();

        if task.column != Column::Review {
            return Err(Self::invalid_move(&task, Column::Done));
        }
        if task.assignee.as_deref() != Some(actor) {
            return Err(EngineError::PermissionDenied(
                "only the current assignee can run verification".to_string(),
            ));
        }
        if actor == project.owner {
            return Err(EngineError::PermissionDenied(
                "project owners cannot verify their own work".to_string(),
            ));
        }
        let repo = Self::linked_repo(&project)?;
        let info = self.orchestrator.repo_info(&repo).await?;
        self.require_active(&repo, &info.html_url, actor).await?;

        let (repo, default_branch, branch, _spec) =
            self.ensure_artifacts(&project, &task).await?;

        // Reset the check to pending before dispatching a new run.
        {
            let lock = self.project_lock(project_id).await;
            let _guard = lock.lock().await;
            let mut fresh = self.load_project(project_id).await?;
            let slot = fresh
                .find_task_mut(task_id)
                .ok_or_else(|| EngineError::TaskNotFound(task_id.to_string()))?;
            slot.repo.check = RepoCheckStatus::Pending;
            slot.repo.last_run_at = Some(now_string());
            fresh.updated_at = now_string();
            self.store.save(&fresh).await.map_err(EngineError::Store)?;
        }

        self.workflows
            .dispatch(
                &repo,
                DispatchTarget::TaskBranch,
                &default_branch,
                project_id,
                task_id,
                &branch,
            )
            .await?;

        match self.workflows.poll_once(&repo, &branch).await {
            PollOutcome::Pending => {
                let fresh = self.load_project(project_id).await?;
                fresh
                    .find_task(task_id)
                    .cloned()
                    .ok_or_else(|| EngineError::TaskNotFound(task_id.to_string()))
            }
            PollOutcome::Completed { conclusion, url } => {
                self.finalize_run(project_id, task_id, &conclusion, Some(&url), None)
                    .await
            }
        }
    }

    /// Apply a run conclusion to a task's three status axes.
    async fn finalize_run(
        &self,
        project_id: &str,
        task_id: &str,
        conclusion: &str,
        url: Option<&str>,
        summary: Option<&str>,
    ) -> Result<Task, EngineError> {
        let passed = conclusion == "success";
        let per_item = summary.and_then(parse_summary);
        if summary.is_some() && per_item.is_none() {
            // Degraded mode: unparseable summary falls back to uniform results.
            tracing::warn!(project_id, task_id, "run summary unparseable, applying uniform result");
        }

        let lock = self.project_lock(project_id).await;
        let _guard = lock.lock().await;
        let mut fresh = self.load_project(project_id).await?;
        let slot = fresh
            .find_task_mut(task_id)
            .ok_or_else(|| EngineError::TaskNotFound(task_id.to_string()))?;

        slot.repo.check = if passed {
            RepoCheckStatus::Passed
        } else {
            RepoCheckStatus::Failed
        };
        if let Some(url) = url {
            slot.repo.check_url = Some(url.to_string());
        }
        slot.repo.last_run_at = Some(now_string());

        match &per_item {
            Some(results) => {
                for item in &mut slot.checklist {
                    if let Some(&ok) = results.get(&item.key) {
                        item.status = if ok { CheckState::Passed } else { CheckState::Failed };
                    }
                }
            }
            None => {
                slot.set_checklist_uniform(if passed {
                    CheckState::Passed
                } else {
                    CheckState::Failed
                });
            }
        }

        if slot.checklist_all_passed() {
            if slot.column.can_move_to(Column::Done) {
                slot.column = Column::Done;
            }
            slot.verification = VerificationStatus::Approved;
        } else if !passed && slot.column == Column::Review {
            // Verification rejected: back to doing for rework.
            slot.column = Column::Doing;
            slot.verification = VerificationStatus::Rejected;
        }

        let updated = slot.clone();
        fresh.updated_at = now_string();
        self.store.save(&fresh).await.map_err(EngineError::Store)?;
        tracing::info!(project_id, task_id, conclusion, "applied run result");
        Ok(updated)
    }

    /// Apply an asynchronous CI callback. Never fails: unresolvable events
    /// are ignored so the provider does not retry forever.
    pub async fn apply_ci_callback(
        &self,
        correlation: Correlation,
        result: RunResult,
    ) -> CallbackOutcome {
        let resolved = self.resolve_callback(&correlation).await;
        let (project_id, task_id) = match resolved {
            Some(pair) => pair,
            None => {
                tracing::info!(?correlation, "ignoring unresolvable CI callback");
                return CallbackOutcome::Ignored("task not resolvable".to_string());
            }
        };
        match self
            .finalize_run(
                &project_id,
                &task_id,
                &result.conclusion,
                result.url.as_deref(),
                result.summary.as_deref(),
            )
            .await
        {
            Ok(_) => CallbackOutcome::Applied {
                project_id,
                task_id,
            },
            Err(e) => {
                tracing::warn!(%project_id, %task_id, "CI callback not applied: {}", e);
                CallbackOutcome::Ignored(e.code().to_string())
            }
        }
    }

    /// Resolve a callback to (project, task): explicit ids first, then a
    /// bare task id scoped by repo, then the branch heuristic (branch names
    /// embed the task id).
    async fn resolve_callback(&self, correlation: &Correlation) -> Option<(String, String)> {
        if let (Some(project_id), Some(task_id)) =
            (&correlation.project_id, &correlation.task_id)
        {
            let project = self.load_project(project_id).await.ok()?;
            project.find_task(task_id)?;
            return Some((project.id, task_id.clone()));
        }

        let repo = correlation.repo_full_name.as_ref()?;
        let projects = self.store.list().await.ok()?;
        for project in projects {
            let repo_matches = project
                .repo
                .as_ref()
                .map(|l| &l.full_name == repo)
                .unwrap_or(false);
            if !repo_matches {
                continue;
            }
            if let Some(task_id) = &correlation.task_id {
                if project.find_task(task_id).is_some() {
                    return Some((project.id.clone(), task_id.clone()));
                }
            }
            if let Some(branch) = &correlation.branch {
                if let Some(task) = project.find_task_by_branch(branch) {
                    return Some((project.id.clone(), task.id.clone()));
                }
                if let Some(task_id) = branch.strip_prefix("task/") {
                    if project.find_task(task_id).is_some() {
                        return Some((project.id.clone(), task_id.to_string()));
                    }
                }
            }
        }
        None
    }
}
