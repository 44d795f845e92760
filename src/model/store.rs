//! Project storage with pluggable backends.
//!
//! Supports:
//! - `memory`: In-memory storage (non-persistent, for testing)
//! - `file`: JSON snapshot on disk (tmp-file + rename)

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::{Mutex, RwLock};

use super::Project;

/// Project store trait - implemented by all storage backends.
#[async_trait]
pub trait ProjectStore: Send + Sync {
    /// Whether this store persists data across restarts.
    fn is_persistent(&self) -> bool;

    /// List projects, newest first.
    async fn list(&self) -> Result<Vec<Project>, String>;

    /// Get a single project by ID.
    async fn get(&self, id: &str) -> Result<Option<Project>, String>;

    /// Insert or replace a project document.
    async fn save(&self, project: &Project) -> Result<(), String>;

    /// Delete a project. Returns whether it existed.
    async fn delete(&self, id: &str) -> Result<bool, String>;
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct StoreSnapshot {
    projects: HashMap<String, Project>,
}

/// JSON file-backed project store.
#[derive(Clone)]
pub struct FileProjectStore {
    path: PathBuf,
    projects: Arc<RwLock<HashMap<String, Project>>>,
    persist_lock: Arc<Mutex<()>>,
}

impl FileProjectStore {
    pub async fn new(base_dir: PathBuf) -> Result<Self, String> {
        fs::create_dir_all(&base_dir)
            .await
            .map_err(|e| format!("Failed to create project store dir: {}", e))?;
        let path = base_dir.join("projects.json");
        let snapshot = match fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<StoreSnapshot>(&bytes) {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    tracing::warn!("Failed to parse project store {}: {}", path.display(), e);
                    StoreSnapshot::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => StoreSnapshot::default(),
            Err(err) => {
                tracing::warn!("Failed to read project store {}: {}", path.display(), err);
                StoreSnapshot::default()
            }
        };

        Ok(Self {
            path,
            projects: Arc::new(RwLock::new(snapshot.projects)),
            persist_lock: Arc::new(Mutex::new(())),
        })
    }

    async fn persist(&self) -> Result<(), String> {
        let _guard = self.persist_lock.lock().await;
        let snapshot = StoreSnapshot {
            projects: self.projects.read().await.clone(),
        };
        let data = serde_json::to_vec_pretty(&snapshot)
            .map_err(|e| format!("Failed to serialize project store: {}", e))?;
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, data)
            .await
            .map_err(|e| format!("Failed to write project store: {}", e))?;
        fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| format!("Failed to finalize project store: {}", e))?;
        Ok(())
    }
}

#[async_trait]
impl ProjectStore for FileProjectStore {
    fn is_persistent(&self) -> bool {
        true
    }

    async fn list(&self) -> Result<Vec<Project>, String> {
        let mut projects: Vec<Project> = self.projects.read().await.values().cloned().collect();
        projects.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(projects)
    }

    async fn get(&self, id: &str) -> Result<Option<Project>, String> {
        Ok(self.projects.read().await.get(id).cloned())
    }

    async fn save(&self, project: &Project) -> Result<(), String> {
        self.projects
            .write()
            .await
            .insert(project.id.clone(), project.clone());
        self.persist().await
    }

    async fn delete(&self, id: &str) -> Result<bool, String> {
        let removed = self.projects.write().await.remove(id).is_some();
        self.persist().await?;
        Ok(removed)
    }
}

/// In-memory project store.
#[derive(Default)]
pub struct InMemoryProjectStore {
    projects: RwLock<HashMap<String, Project>>,
}

impl InMemoryProjectStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProjectStore for InMemoryProjectStore {
    fn is_persistent(&self) -> bool {
        false
    }

    async fn list(&self) -> Result<Vec<Project>, String> {
        let mut projects: Vec<Project> = self.projects.read().await.values().cloned().collect();
        projects.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(projects)
    }

    async fn get(&self, id: &str) -> Result<Option<Project>, String> {
        Ok(self.projects.read().await.get(id).cloned())
    }

    async fn save(&self, project: &Project) -> Result<(), String> {
        self.projects
            .write()
            .await
            .insert(project.id.clone(), project.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool, String> {
        Ok(self.projects.write().await.remove(id).is_some())
    }
}
