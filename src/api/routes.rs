//! HTTP route handlers.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::github::{GitHubClient, RepoProvider};
use crate::lifecycle::LifecycleController;
use crate::model::store::FileProjectStore;
use crate::model::{LinkedRepo, Project, Task};

use super::types::*;
use super::webhook;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub engine: LifecycleController,
}

/// Start the HTTP server.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let provider = Arc::new(GitHubClient::new(
        config.github_api_url.clone(),
        config.github_token.clone(),
        config.provider_timeout_secs,
    ));
    match provider.authenticated_login().await {
        Ok(login) => tracing::info!("provider token authenticated as {}", login),
        Err(e) => tracing::warn!("provider identity check failed: {}", e),
    }
    let store = Arc::new(
        FileProjectStore::new(config.data_dir.clone())
            .await
            .map_err(|e| anyhow::anyhow!(e))?,
    );
    let engine = LifecycleController::new(
        store,
        provider,
        config.max_doing_tasks,
        Duration::from_secs(config.poll_delay_secs),
        config.membership_ttl_secs,
    );

    let state = Arc::new(AppState {
        config: config.clone(),
        engine,
    });

    let app = router(state);
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

/// Build the application router over shared state.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/projects", post(create_project))
        .route("/api/projects", get(list_projects))
        .route("/api/projects/:id", get(get_project))
        .route("/api/projects/:id/tasks/:task_id", get(get_task))
        .route("/api/projects/:id/tasks/:task_id/assign", post(assign_task))
        .route(
            "/api/projects/:id/tasks/:task_id/unassign",
            post(unassign_task),
        )
        .route("/api/projects/:id/tasks/:task_id/submit", post(submit_task))
        .route("/api/projects/:id/tasks/:task_id/verify", post(verify_task))
        .route("/api/webhook/github", post(webhook::receive))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<serde_json::Value>)>;

/// Health check endpoint.
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        webhook_configured: state.config.webhook_secret.is_some(),
    })
}

/// Publish a new project with its backlog.
async fn create_project(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateProjectRequest>,
) -> ApiResult<Project> {
    let repo = req.repo.as_ref().map(|full_name| LinkedRepo {
        full_name: full_name.clone(),
        url: format!("https://github.com/{}", full_name),
    });
    let mut project = Project::new(req.title, req.description, req.owner, repo);
    project.stack = req.stack;
    for task_req in req.tasks {
        let mut task = Task::new(task_req.title, task_req.description);
        task.acceptance_criteria = task_req.acceptance_criteria;
        project.tasks.push(task);
    }
    state
        .engine
        .create_project(project)
        .await
        .map(Json)
        .map_err(reject)
}

/// List all projects.
async fn list_projects(State(state): State<Arc<AppState>>) -> ApiResult<Vec<Project>> {
    state.engine.list_projects().await.map(Json).map_err(reject)
}

/// Get a project (normalizing legacy task data on first read).
async fn get_project(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Project> {
    state.engine.load_project(&id).await.map(Json).map_err(reject)
}

/// Get a single task.
async fn get_task(
    State(state): State<Arc<AppState>>,
    Path((id, task_id)): Path<(String, String)>,
) -> ApiResult<Task> {
    let project = state.engine.load_project(&id).await.map_err(reject)?;
    project
        .find_task(&task_id)
        .cloned()
        .map(Json)
        .ok_or_else(|| reject(crate::error::EngineError::TaskNotFound(task_id)))
}

async fn assign_task(
    State(state): State<Arc<AppState>>,
    Path((id, task_id)): Path<(String, String)>,
    Json(req): Json<ActionRequest>,
) -> ApiResult<Task> {
    state
        .engine
        .assign(&id, &task_id, &req.actor)
        .await
        .map(Json)
        .map_err(reject)
}

async fn unassign_task(
    State(state): State<Arc<AppState>>,
    Path((id, task_id)): Path<(String, String)>,
    Json(req): Json<ActionRequest>,
) -> ApiResult<Task> {
    state
        .engine
        .unassign(&id, &task_id, &req.actor)
        .await
        .map(Json)
        .map_err(reject)
}

async fn submit_task(
    State(state): State<Arc<AppState>>,
    Path((id, task_id)): Path<(String, String)>,
    Json(req): Json<ActionRequest>,
) -> ApiResult<Task> {
    state
        .engine
        .submit(&id, &task_id, &req.actor)
        .await
        .map(Json)
        .map_err(reject)
}

async fn verify_task(
    State(state): State<Arc<AppState>>,
    Path((id, task_id)): Path<(String, String)>,
    Json(req): Json<ActionRequest>,
) -> ApiResult<Task> {
    state
        .engine
        .run_verify(&id, &task_id, &req.actor)
        .await
        .map(Json)
        .map_err(reject)
}
