//! Read-only HTTP viewer for the archive.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/status` | Snapshot counts per document |
//! | `GET`  | `/documents/{id}` | Latest snapshot of a document |
//! | `GET`  | `/documents/{id}/at/{date}` | Snapshot in force on a date |
//! | `GET`  | `/documents/{id}/versions` | All publication dates |
//!
//! Dates in paths may be `YYYY-MM-DD` or `DD-MM-YYYY`.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "document not found: BWBR0001840" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `internal` (500).

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::db;
use crate::get::{find_snapshot, publication_dates, SnapshotView};
use crate::models::parse_user_date;
use crate::status::{archive_stats, ArchiveStats};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    pool: SqlitePool,
}

/// Starts the viewer on `[server].bind` and serves until the process exits.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    let bind_addr = config.server.bind.clone();

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "viewer listening");
    println!("Viewer listening on http://{}", bind_addr);

    axum::serve(listener, router(pool)).await?;
    Ok(())
}

/// Build the viewer routes over an open pool.
pub fn router(pool: SqlitePool) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/status", get(handle_status))
        .route("/documents/{id}", get(handle_latest))
        .route("/documents/{id}/at/{date}", get(handle_at))
        .route("/documents/{id}/versions", get(handle_versions))
        .layer(cors)
        .with_state(AppState { pool })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!(error = %err, "viewer query failed");
        AppError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "internal".to_string(),
            message: err.to_string(),
        }
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

// ============ Handlers ============

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

async fn handle_status(State(state): State<AppState>) -> Result<Json<ArchiveStats>, AppError> {
    Ok(Json(archive_stats(&state.pool).await?))
}

/// A snapshot together with the document's full version list.
#[derive(Serialize)]
struct SnapshotResponse {
    #[serde(flatten)]
    snapshot: SnapshotView,
    versions: Vec<String>,
}

async fn snapshot_response(
    pool: &SqlitePool,
    id: &str,
    as_of: Option<chrono::NaiveDate>,
) -> Result<Json<SnapshotResponse>, AppError> {
    let snapshot = find_snapshot(pool, id, as_of).await?.ok_or_else(|| match as_of {
        Some(date) => not_found(format!("no snapshot of {} on or before {}", id, date)),
        None => not_found(format!("document not found: {}", id)),
    })?;
    let versions = publication_dates(pool, id)
        .await?
        .iter()
        .map(|d| d.to_string())
        .collect();
    Ok(Json(SnapshotResponse { snapshot, versions }))
}

async fn handle_latest(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SnapshotResponse>, AppError> {
    snapshot_response(&state.pool, &id, None).await
}

async fn handle_at(
    State(state): State<AppState>,
    Path((id, date)): Path<(String, String)>,
) -> Result<Json<SnapshotResponse>, AppError> {
    let as_of = parse_user_date(&date)
        .ok_or_else(|| bad_request(format!("invalid date: {}", date)))?;
    snapshot_response(&state.pool, &id, Some(as_of)).await
}

#[derive(Serialize)]
struct VersionsResponse {
    id: String,
    versions: Vec<String>,
}

async fn handle_versions(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<VersionsResponse>, AppError> {
    let versions = publication_dates(&state.pool, &id)
        .await?
        .iter()
        .map(|d| d.to_string())
        .collect();
    Ok(Json(VersionsResponse { id, versions }))
}
