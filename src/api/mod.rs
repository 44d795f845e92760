//! HTTP API for the verification engine.
//!
//! ## Endpoints
//!
//! - `GET /api/health` - Health check
//! - `POST /api/projects` - Publish a project with its backlog
//! - `GET /api/projects` - List projects
//! - `GET /api/projects/{id}` - Get a project
//! - `GET /api/projects/{id}/tasks/{task_id}` - Get a task
//! - `POST /api/projects/{id}/tasks/{task_id}/assign` - Take a task
//! - `POST /api/projects/{id}/tasks/{task_id}/unassign` - Release a task
//! - `POST /api/projects/{id}/tasks/{task_id}/submit` - Submit for review
//! - `POST /api/projects/{id}/tasks/{task_id}/verify` - Run verification
//! - `POST /api/webhook/github` - Signed CI result callback

mod routes;
pub mod types;
pub mod webhook;

pub use routes::{router, serve, AppState};
pub use types::*;
