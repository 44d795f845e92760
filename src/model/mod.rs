//! Project and task aggregates with the three task status axes.
//!
//! # State machine
//! ```text
//! column:        todo -> doing -> review -> done
//!                  ^______|         |
//!                  (unassign)       v
//!                        doing <- review   (verification rejected)
//! verification:  not_submitted -> submitted -> approved | rejected
//! repo check:    idle -> pending -> passed | failed
//! ```
//! Illegal column moves are rejected by the lifecycle controller via
//! [`Column::can_move_to`]; the axes are stored together on [`Task`] so a
//! document is always a consistent snapshot.

pub mod store;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::spec::{Expectation, ProjectStack};

/// Get current timestamp as RFC3339 string.
pub fn now_string() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Board position of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    #[default]
    Todo,
    Doing,
    Review,
    Done,
}

impl Column {
    /// Whether moving to `to` is a legal transition.
    ///
    /// `doing -> todo` (unassign) and `review -> doing` (verification
    /// rejected) are the only backward moves; `done` is terminal.
    pub fn can_move_to(self, to: Column) -> bool {
        matches!(
            (self, to),
            (Column::Todo, Column::Doing)
                | (Column::Doing, Column::Review)
                | (Column::Doing, Column::Todo)
                | (Column::Review, Column::Done)
                | (Column::Review, Column::Doing)
        )
    }
}

impl std::fmt::Display for Column {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Column::Todo => "todo",
            Column::Doing => "doing",
            Column::Review => "review",
            Column::Done => "done",
        };
        write!(f, "{}", s)
    }
}

/// Verification axis of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    #[default]
    NotSubmitted,
    Submitted,
    Approved,
    Rejected,
}

/// Remote CI check axis of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RepoCheckStatus {
    #[default]
    Idle,
    Pending,
    Passed,
    Failed,
}

/// Status of a single checklist item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckState {
    #[default]
    Pending,
    Passed,
    Failed,
}

/// One user-visible checklist entry, mirroring one expectation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChecklistItem {
    /// Stable key, derived from the expectation key.
    pub key: String,
    pub text: String,
    #[serde(default)]
    pub status: CheckState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Link between a task and its branch on the external repository.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RepoLink {
    #[serde(default)]
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default)]
    pub check: RepoCheckStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run_at: Option<String>,
}

/// External repository linked to a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkedRepo {
    /// `owner/name`
    pub full_name: String,
    pub url: String,
}

/// A work item inside a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    #[serde(default)]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub acceptance_criteria: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(default)]
    pub column: Column,
    #[serde(default)]
    pub verification: VerificationStatus,
    #[serde(default)]
    pub repo: RepoLink,
    #[serde(default)]
    pub checklist: Vec<ChecklistItem>,
}

/// Mint a fresh task identifier (`t-` + 8 hex chars).
pub fn mint_task_id() -> String {
    let simple = Uuid::new_v4().simple().to_string();
    format!("t-{}", &simple[..8])
}

/// Whether a task identifier is well-formed.
pub fn is_valid_task_id(id: &str) -> bool {
    match id.strip_prefix("t-") {
        Some(rest) => {
            rest.len() == 8
                && rest
                    .chars()
                    .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
        }
        None => false,
    }
}

impl Task {
    /// Create a fresh task in the backlog.
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: mint_task_id(),
            title: title.into(),
            description: description.into(),
            acceptance_criteria: String::new(),
            assignee: None,
            column: Column::Todo,
            verification: VerificationStatus::NotSubmitted,
            repo: RepoLink {
                provider: "github".to_string(),
                ..RepoLink::default()
            },
            checklist: Vec::new(),
        }
    }

    /// The branch this task uses, derived from its stable identifier.
    pub fn branch_name(&self) -> String {
        format!("task/{}", self.id)
    }

    /// Regenerate the checklist from a spec's expectations.
    ///
    /// One item per expectation; statuses carry over by key unless
    /// `force_pending` resets everything (resubmission).
    pub fn sync_checklist(&mut self, expectations: &[Expectation], force_pending: bool) {
        let previous: std::collections::HashMap<String, (CheckState, Option<String>)> = self
            .checklist
            .iter()
            .map(|item| (item.key.clone(), (item.status, item.details.clone())))
            .collect();
        self.checklist = expectations
            .iter()
            .map(|exp| {
                let (status, details) = if force_pending {
                    (CheckState::Pending, None)
                } else {
                    previous
                        .get(&exp.key)
                        .cloned()
                        .unwrap_or((CheckState::Pending, None))
                };
                ChecklistItem {
                    key: exp.key.clone(),
                    text: exp.title.clone(),
                    status,
                    details,
                }
            })
            .collect();
    }

    /// Set every checklist item to one state (uniform CI outcome).
    pub fn set_checklist_uniform(&mut self, state: CheckState) {
        for item in &mut self.checklist {
            item.status = state;
            item.details = None;
        }
    }

    /// Whether every checklist item passed (vacuously false when empty).
    pub fn checklist_all_passed(&self) -> bool {
        !self.checklist.is_empty()
            && self.checklist.iter().all(|i| i.status == CheckState::Passed)
    }
}

/// Aggregate root: a published project and its tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Provider login of the project owner.
    pub owner: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo: Option<LinkedRepo>,
    /// Declared technology stack, if any; adapters normalize the rest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<ProjectStack>,
    #[serde(default)]
    pub tasks: Vec<Task>,
    pub created_at: String,
    pub updated_at: String,
}

impl Project {
    /// Create a project at publish time.
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        owner: impl Into<String>,
        repo: Option<LinkedRepo>,
    ) -> Self {
        let now = now_string();
        let simple = Uuid::new_v4().simple().to_string();
        Self {
            id: format!("p-{}", &simple[..8]),
            title: title.into(),
            description: description.into(),
            owner: owner.into(),
            repo,
            stack: None,
            tasks: Vec::new(),
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Normalize legacy/unnormalized task data in place.
    ///
    /// Missing, malformed, or colliding task identifiers are replaced with
    /// freshly minted ones and defaults are populated. Idempotent: a second
    /// call returns `false`. Callers persist immediately when `true`.
    pub fn normalize(&mut self) -> bool {
        let mut changed = false;
        let mut seen = std::collections::HashSet::new();
        for task in &mut self.tasks {
            if !is_valid_task_id(&task.id) || !seen.insert(task.id.clone()) {
                let mut fresh = mint_task_id();
                while !seen.insert(fresh.clone()) {
                    fresh = mint_task_id();
                }
                task.id = fresh;
                changed = true;
            }
            if task.repo.provider.is_empty() {
                task.repo.provider = "github".to_string();
                changed = true;
            }
        }
        if changed {
            self.updated_at = now_string();
        }
        changed
    }

    pub fn find_task(&self, task_id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == task_id)
    }

    pub fn find_task_mut(&mut self, task_id: &str) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == task_id)
    }

    /// How many tasks `login` currently has in the `doing` column.
    pub fn doing_count_for(&self, login: &str) -> usize {
        self.tasks
            .iter()
            .filter(|t| t.column == Column::Doing && t.assignee.as_deref() == Some(login))
            .count()
    }

    /// Find a task by its branch name (webhook correlation fallback).
    pub fn find_task_by_branch(&self, branch: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| {
            t.repo.branch.as_deref() == Some(branch) || t.branch_name() == branch
        })
    }
}
