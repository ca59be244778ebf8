use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::backup::{BackupError, BackupManager, BackupMetadata, CleanupReport, DATABASE_BREAKER};
use crate::resilience::{CircuitBreakerError, CircuitBreakerRegistry, CircuitBreakerStats};

/// Shared state behind every admin handler.
#[derive(Clone)]
pub struct AdminState {
    pub registry: Arc<CircuitBreakerRegistry>,
    pub manager: Arc<BackupManager>,
    pub api_key: Arc<str>,
    pub started_at: DateTime<Utc>,
}

impl AdminState {
    pub fn new(registry: Arc<CircuitBreakerRegistry>, manager: Arc<BackupManager>, api_key: &str) -> Self {
        Self {
            registry,
            manager,
            api_key: Arc::from(api_key),
            started_at: Utc::now(),
        }
    }
}

/// Handler error mapped onto an HTTP status and a JSON body.
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    CircuitOpen { name: String, retry_after: Duration },
    Backup(BackupError),
}

impl From<BackupError> for ApiError {
    fn from(e: BackupError) -> Self {
        ApiError::Backup(e)
    }
}

impl From<CircuitBreakerError<BackupError>> for ApiError {
    fn from(e: CircuitBreakerError<BackupError>) -> Self {
        match e {
            CircuitBreakerError::Open { name, retry_after } => ApiError::CircuitOpen { name, retry_after },
            CircuitBreakerError::Inner(e) => ApiError::Backup(e),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::NotFound(what) => error_body(StatusCode::NOT_FOUND, what),
            ApiError::CircuitOpen { name, retry_after } => {
                let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
                let mut response = error_body(
                    StatusCode::SERVICE_UNAVAILABLE,
                    format!("circuit breaker '{}' is open", name),
                );
                response.headers_mut().insert(header::RETRY_AFTER, secs.into());
                response
            }
            ApiError::Backup(e) => {
                let status = match &e {
                    BackupError::MetadataNotFound(_) => StatusCode::NOT_FOUND,
                    e if e.is_corruption() => StatusCode::UNPROCESSABLE_ENTITY,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                if status.is_server_error() {
                    tracing::error!(error = %e, "Admin request failed");
                }
                error_body(status, e.to_string())
            }
        }
    }
}

fn error_body(status: StatusCode, message: String) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub started_at: DateTime<Utc>,
    pub backup_path: String,
    pub breakers: Vec<CircuitBreakerStats>,
}

#[derive(Serialize)]
pub struct BreakerAction {
    pub name: String,
    pub action: &'static str,
    pub stats: CircuitBreakerStats,
}

pub async fn health() -> &'static str {
    "OK"
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: crate::VERSION,
        status: "operational",
        started_at: state.started_at,
        backup_path: state.manager.backup_dir().display().to_string(),
        breakers: state.registry.all_stats(),
    })
}

pub async fn list_breakers(State(state): State<AdminState>) -> Json<Vec<CircuitBreakerStats>> {
    Json(state.registry.all_stats())
}

pub async fn reset_all_breakers(State(state): State<AdminState>) -> Json<Vec<CircuitBreakerStats>> {
    state.registry.reset_all();
    tracing::info!(count = state.registry.len(), "All circuit breakers reset via admin API");
    Json(state.registry.all_stats())
}

pub async fn reset_breaker(State(state): State<AdminState>, Path(name): Path<String>) -> ApiResult<BreakerAction> {
    if !state.registry.reset(&name) {
        return Err(ApiError::NotFound(format!("circuit breaker not found: {}", name)));
    }
    breaker_action(&state, name, "reset")
}

pub async fn open_breaker(State(state): State<AdminState>, Path(name): Path<String>) -> ApiResult<BreakerAction> {
    let breaker = state
        .registry
        .get(&name)
        .ok_or_else(|| ApiError::NotFound(format!("circuit breaker not found: {}", name)))?;
    breaker.force_open();
    breaker_action(&state, name, "open")
}

pub async fn close_breaker(State(state): State<AdminState>, Path(name): Path<String>) -> ApiResult<BreakerAction> {
    let breaker = state
        .registry
        .get(&name)
        .ok_or_else(|| ApiError::NotFound(format!("circuit breaker not found: {}", name)))?;
    breaker.force_close();
    breaker_action(&state, name, "close")
}

fn breaker_action(state: &AdminState, name: String, action: &'static str) -> ApiResult<BreakerAction> {
    let stats = state
        .registry
        .get(&name)
        .map(|b| b.stats())
        .ok_or_else(|| ApiError::NotFound(format!("circuit breaker not found: {}", name)))?;
    tracing::info!(breaker = %name, action, "Circuit breaker changed via admin API");
    Ok(Json(BreakerAction { name, action, stats }))
}

pub async fn list_backups(State(state): State<AdminState>) -> ApiResult<Vec<BackupMetadata>> {
    Ok(Json(state.manager.list_backups().await?))
}

pub async fn create_backup(State(state): State<AdminState>) -> Result<(StatusCode, Json<BackupMetadata>), ApiError> {
    let breaker = state.registry.get_or_create(DATABASE_BREAKER);
    let metadata = breaker.execute(|| state.manager.create_backup()).await?;
    Ok((StatusCode::CREATED, Json(metadata)))
}

pub async fn verify_backup(State(state): State<AdminState>, Path(id): Path<String>) -> ApiResult<BackupMetadata> {
    Ok(Json(state.manager.verify_backup(&id).await?))
}

pub async fn restore_backup(State(state): State<AdminState>, Path(id): Path<String>) -> ApiResult<BackupMetadata> {
    // A damaged artifact is a local fault; it must not count against the database.
    state.manager.verify_backup(&id).await?;
    let breaker = state.registry.get_or_create(DATABASE_BREAKER);
    let metadata = breaker.execute(|| state.manager.restore_backup(&id)).await?;
    Ok(Json(metadata))
}

pub async fn delete_backup(State(state): State<AdminState>, Path(id): Path<String>) -> Result<StatusCode, ApiError> {
    state.manager.delete_backup(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn cleanup_backups(State(state): State<AdminState>) -> ApiResult<CleanupReport> {
    Ok(Json(state.manager.cleanup_old_backups().await?))
}
