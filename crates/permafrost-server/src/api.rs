//! HTTP surface.
//!
//! Thin transport over the engine: path normalization and email validation
//! happen here, coordination and transfers happen behind the state. Status
//! queries never 404 — an unknown or expired id reports the same shape as a
//! task that has not become observable yet.

use crate::email::validate_email;
use crate::runner::TaskRunner;
use axum::{
    extract::{Path as AxumPath, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use permafrost_core::{
    path, BackendRegistry, CoreError, Coordinator, Ledger, ListOptions, RootRegistry,
    SubmitRequest, TaskKind,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Everything the handlers need, shared by clone.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<RootRegistry>,
    pub ledger: Arc<dyn Ledger>,
    pub backends: Arc<BackendRegistry>,
    pub coordinator: Arc<Coordinator>,
    pub runner: TaskRunner,
}

/// Builds the service router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(home_handler))
        .route("/pull", post(pull_handler))
        .route("/freeze", post(freeze_handler))
        .route("/get_files", post(get_files_handler))
        .route("/status/{task_id}", get(status_handler))
        .route("/zombie", get(zombie_handler))
        .with_state(state)
}

fn client_error(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(serde_json::json!({ "error": message.into() })),
    )
        .into_response()
}

fn submit_error(err: CoreError) -> Response {
    match err {
        CoreError::RootNotFound(_) => client_error(StatusCode::NOT_FOUND, err.to_string()),
        CoreError::InvalidPath(_) => client_error(StatusCode::BAD_REQUEST, err.to_string()),
        other => {
            tracing::error!("Request failed: {}", other);
            client_error(StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
        }
    }
}

/// Liveness check used by CLI clients.
async fn home_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "msg": "Hello world" }))
}

/// Submission is synchronous sqlite behind a mutex; keep it off the async
/// workers.
async fn submit_off_thread(coordinator: Arc<Coordinator>, request: SubmitRequest) -> Response {
    match tokio::task::spawn_blocking(move || coordinator.submit(request)).await {
        Ok(Ok(task_id)) => Json(serde_json::json!({ "task": task_id })).into_response(),
        Ok(Err(e)) => submit_error(e),
        Err(e) => {
            tracing::error!("Task submission aborted: {}", e);
            client_error(StatusCode::INTERNAL_SERVER_ERROR, "task submission failed")
        }
    }
}

#[derive(Debug, Deserialize)]
struct PullBody {
    path: Option<String>,
    email: Option<String>,
}

async fn pull_handler(State(state): State<AppState>, Json(body): Json<PullBody>) -> Response {
    tracing::debug!("API call: pulling {:?}", body);

    let Some(raw_path) = body.path else {
        return client_error(StatusCode::BAD_REQUEST, "Missing \"path\"");
    };
    let asked_path = match path::normalize_absolute(&raw_path) {
        Ok(p) => p,
        Err(e) => return client_error(StatusCode::BAD_REQUEST, e.to_string()),
    };

    let email = match body.email.as_deref().map(validate_email).transpose() {
        Ok(email) => email,
        Err(message) => return client_error(StatusCode::BAD_REQUEST, message),
    };

    if let Err(e) = state.registry.resolve(&asked_path) {
        return submit_error(e);
    }

    let request = SubmitRequest {
        path: asked_path,
        kind: TaskKind::Pull,
        email,
        force: false,
        dry_run: false,
    };
    submit_off_thread(state.coordinator.clone(), request).await
}

#[derive(Debug, Deserialize)]
struct FreezeBody {
    path: Option<String>,
    #[serde(default)]
    force: bool,
    #[serde(default)]
    dry_run: bool,
}

async fn freeze_handler(State(state): State<AppState>, Json(body): Json<FreezeBody>) -> Response {
    tracing::debug!("API call: freezing {:?}", body);

    let Some(raw_path) = body.path else {
        return client_error(StatusCode::BAD_REQUEST, "Missing \"path\"");
    };
    let asked_path = match path::normalize_absolute(&raw_path) {
        Ok(p) => p,
        Err(e) => return client_error(StatusCode::BAD_REQUEST, e.to_string()),
    };

    if let Err(e) = state.registry.resolve(&asked_path) {
        return submit_error(e);
    }

    submit_off_thread(
        state.coordinator.clone(),
        SubmitRequest::freeze(&asked_path, body.force, body.dry_run),
    )
    .await
}

#[derive(Debug, Deserialize)]
struct GetFilesBody {
    path: Option<String>,
    /// Accepts booleans and their string forms, the way clients send them.
    compare: Option<serde_json::Value>,
    max_depth: Option<u32>,
}

fn truthy(value: &Option<serde_json::Value>) -> bool {
    match value {
        Some(serde_json::Value::Bool(b)) => *b,
        Some(serde_json::Value::String(s)) => s.to_lowercase() == "true",
        _ => false,
    }
}

async fn get_files_handler(
    State(state): State<AppState>,
    Json(body): Json<GetFilesBody>,
) -> Response {
    tracing::debug!("API call: listing {:?}", body);

    let Some(raw_path) = body.path else {
        return client_error(StatusCode::BAD_REQUEST, "Missing \"path\"");
    };
    let asked_path = match path::normalize_absolute(&raw_path) {
        Ok(p) => p,
        Err(e) => return client_error(StatusCode::BAD_REQUEST, e.to_string()),
    };

    let root = match state.registry.resolve(&asked_path) {
        Ok(root) => root,
        Err(e) => return submit_error(e),
    };
    let backend = match state.backends.for_root(root) {
        Ok(backend) => backend,
        Err(e) => return submit_error(e.into()),
    };

    let opts = ListOptions {
        missing_only: truthy(&body.compare),
        max_depth: body.max_depth.unwrap_or(1),
        from_root: false,
    };
    match backend.list(root, &asked_path, opts).await {
        Ok(files) => Json(files).into_response(),
        Err(e) => submit_error(e.into()),
    }
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    finished: bool,
    error: bool,
    info: Option<String>,
}

/// Reports ledger state for a task id. A made-up or expired id is
/// indistinguishable from a task that has not started reporting yet.
async fn status_handler(
    State(state): State<AppState>,
    AxumPath(task_id): AxumPath<String>,
) -> Response {
    tracing::debug!("API call: status of task {}", task_id);

    let record = match task_id.parse() {
        Ok(id) => state.ledger.get(id).ok().flatten(),
        Err(_) => None,
    };

    let response = match record {
        Some(record) => StatusResponse {
            finished: !record.is_unfinished(),
            error: record.error.is_some(),
            info: record.error,
        },
        None => StatusResponse {
            finished: false,
            error: false,
            info: None,
        },
    };
    Json(response).into_response()
}

async fn zombie_handler(State(state): State<AppState>) -> Response {
    tracing::info!("API call: reaping zombie tasks");
    let task_id = state.runner.spawn_zombie_sweep();
    Json(serde_json::json!({ "task": task_id })).into_response()
}
