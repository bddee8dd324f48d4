//! HTTP query API and admin sync trigger.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/api/cves` | Filtered, sorted, paginated list |
//! | `GET`  | `/api/cves/{id}` | One record by CVE id |
//! | `POST` | `/api/cves/admin/sync?mode=full` | Run a synchronization (shared-secret gated) |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "record not found: CVE-2099-0001" } }
//! ```
//!
//! Error codes: `bad_request` (400), `unauthorized` (401), `not_found` (404),
//! `sync_failed` (500), `internal` (500).
//!
//! # Authentication
//!
//! The trigger endpoint requires the configured `server.admin_token` in the
//! `x-admin-token` header or the `token` query parameter.

use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::error::SyncError;
use crate::feed::{FeedSource, NvdFeed};
use crate::models::SyncRun;
use crate::progress::NoProgress;
use crate::query::{get_record, list_records, CvePage, CveQuery, ListParams};
use crate::sqlite_store::SqliteStore;
use crate::sync::{trigger_sync_with_feed, SyncMode};

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    /// Read-side store handle, opened once at startup.
    store: Arc<SqliteStore>,
    /// Feed used by the trigger endpoint.
    feed: Arc<dyn FeedSource>,
}

impl AppState {
    pub fn new(config: Config, store: SqliteStore, feed: Arc<dyn FeedSource>) -> Self {
        Self {
            config: Arc::new(config),
            store: Arc::new(store),
            feed,
        }
    }
}

/// Starts the HTTP server.
///
/// The store is opened and migrated before binding; if that fails the
/// server never starts. Runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let store = SqliteStore::open(config).await?;
    let feed: Arc<dyn FeedSource> = Arc::new(NvdFeed::new(&config.feed)?);
    let bind_addr = config.server.bind.clone();

    let app = build_router(AppState::new(config.clone(), store, feed));

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    log::info!("Listening on http://{}", listener.local_addr()?);
    println!("nvd-sync API listening on http://{}", bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}

/// Build the router with all routes and CORS applied.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_root))
        .route("/health", get(handle_health))
        .route("/api/cves", get(handle_list))
        .route("/api/cves/admin/sync", post(handle_trigger_sync))
        .route("/api/cves/{id}", get(handle_get))
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
    /// Counts written before a failed sync aborted.
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<SyncRun>,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
    summary: Option<SyncRun>,
}

impl AppError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            summary: None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
            summary: self.summary,
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::BAD_REQUEST, "bad_request", message)
}

fn internal(err: anyhow::Error) -> AppError {
    log::error!("request failed: {:#}", err);
    AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", "server_error")
}

fn sync_failed(err: SyncError) -> AppError {
    if let SyncError::UnsupportedMode(_) = err {
        return bad_request(err.to_string());
    }
    log::error!("sync failed: {}", err);
    AppError {
        summary: err.partial_run(),
        ..AppError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "sync_failed",
            err.to_string(),
        )
    }
}

// ============ GET / and /health ============

async fn handle_root() -> &'static str {
    "NVD CVE API"
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /api/cves ============

async fn handle_list(
    State(state): State<AppState>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<CvePage>, AppError> {
    let Query(params) = params.map_err(|e| bad_request(e.body_text()))?;
    let query = CveQuery::from(params);

    let page = list_records(state.store.as_ref(), &query)
        .await
        .map_err(internal)?;
    Ok(Json(page))
}

// ============ GET /api/cves/{id} ============

async fn handle_get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    match get_record(state.store.as_ref(), &id).await.map_err(internal)? {
        Some(entity) => Ok(Json(entity).into_response()),
        None => Err(AppError::new(
            StatusCode::NOT_FOUND,
            "not_found",
            format!("record not found: {}", id),
        )),
    }
}

// ============ POST /api/cves/admin/sync ============

#[derive(Debug, Deserialize)]
struct TriggerParams {
    mode: Option<String>,
    token: Option<String>,
}

#[derive(Serialize)]
struct TriggerResponse {
    status: &'static str,
    mode: &'static str,
    summary: SyncRun,
}

async fn handle_trigger_sync(
    State(state): State<AppState>,
    headers: HeaderMap,
    params: Result<Query<TriggerParams>, QueryRejection>,
) -> Result<Json<TriggerResponse>, AppError> {
    let Query(params) = params.map_err(|e| bad_request(e.body_text()))?;

    let supplied = headers
        .get("x-admin-token")
        .and_then(|v| v.to_str().ok())
        .or(params.token.as_deref());

    let authorized = supplied
        .map(|token| constant_time_eq(token.as_bytes(), state.config.server.admin_token.as_bytes()))
        .unwrap_or(false);
    if !authorized {
        return Err(AppError::new(
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            "missing or invalid admin token",
        ));
    }

    let mode: SyncMode = params
        .mode
        .as_deref()
        .unwrap_or("full")
        .parse()
        .map_err(sync_failed)?;

    let summary = trigger_sync_with_feed(&state.config, mode, state.feed.as_ref(), &NoProgress)
        .await
        .map_err(sync_failed)?;

    Ok(Json(TriggerResponse {
        status: "completed",
        mode: mode.as_str(),
        summary,
    }))
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_comparison() {
        assert!(constant_time_eq(b"changeme", b"changeme"));
        assert!(!constant_time_eq(b"changeme", b"changemf"));
        assert!(!constant_time_eq(b"short", b"longer"));
    }
}
