//! Read-only HTTP query surface.
//!
//! A thin axum layer over the core read operations: leads, snapshots,
//! deltas, run history, and a composite health check covering both the
//! primary store and the secondary index. All writes go through the CLI
//! batch commands; this server never mutates state.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Composite health: primary store + index |
//! | `GET`  | `/leads` | Ranked leads (`min_score`, `source`, `exclude_source`, `limit`) |
//! | `GET`  | `/snapshots` | Recent snapshots |
//! | `GET`  | `/snapshots/{id}` | One snapshot with its ranked items |
//! | `GET`  | `/deltas/{from}/{to}` | Classified diff of two snapshots |
//! | `GET`  | `/runs` | Run ledger history (`kind=ingest\|analysis`) |

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::config::Config;
use crate::db;
use crate::delta::compute_delta;
use crate::error::LeadscopeError;
use crate::index_sync::{index_cursor, index_document_count};
use crate::leads::{compute_leads, LeadFilters};
use crate::models::{Lead, LeadSnapshot, LeadSnapshotItem};
use crate::runs::{list_analysis_runs, list_ingest_runs};
use crate::scoring::ScoringVersion;
use crate::snapshot::{get_snapshot, list_snapshots, snapshot_items};

#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    primary: SqlitePool,
    index: SqlitePool,
}

pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let state = AppState {
        config: Arc::new(config.clone()),
        primary: db::connect(config).await?,
        index: db::connect_index(config).await?,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(handle_health))
        .route("/leads", get(handle_leads))
        .route("/snapshots", get(handle_snapshots))
        .route("/snapshots/{id}", get(handle_snapshot_show))
        .route("/deltas/{from}/{to}", get(handle_delta))
        .route("/runs", get(handle_runs))
        .layer(cors)
        .with_state(state);

    info!("query server listening on http://{}", bind_addr);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
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

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

/// Map core errors onto the HTTP contract. Validation problems are the
/// caller's to fix; "not found" phrasing maps to 404.
fn classify(err: LeadscopeError) -> AppError {
    match &err {
        LeadscopeError::Validation(msg) if msg.contains("not found") => not_found(msg.clone()),
        LeadscopeError::Validation(msg) => bad_request(msg.clone()),
        _ => internal(err.to_string()),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct StoreHealth {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    records: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    documents: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cursor: Option<i64>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    primary: StoreHealth,
    index: StoreHealth,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    let primary = match sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM records")
        .fetch_one(&state.primary)
        .await
    {
        Ok(count) => StoreHealth {
            ok: true,
            records: Some(count),
            documents: None,
            cursor: None,
        },
        Err(_) => StoreHealth {
            ok: false,
            records: None,
            documents: None,
            cursor: None,
        },
    };

    let index = match index_document_count(&state.index).await {
        Ok(documents) => StoreHealth {
            ok: true,
            records: None,
            documents: Some(documents),
            cursor: index_cursor(&state.index).await.ok().flatten(),
        },
        Err(_) => StoreHealth {
            ok: false,
            records: None,
            documents: None,
            cursor: None,
        },
    };

    let status = if primary.ok && index.ok { "ok" } else { "degraded" };
    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        primary,
        index,
    })
}

// ============ GET /leads ============

#[derive(Deserialize)]
struct LeadsQuery {
    min_score: Option<f64>,
    source: Option<String>,
    exclude_source: Option<String>,
    limit: Option<i64>,
    scoring: Option<String>,
}

#[derive(Serialize)]
struct LeadsResponse {
    scanned: i64,
    leads: Vec<Lead>,
}

async fn handle_leads(
    State(state): State<AppState>,
    Query(query): Query<LeadsQuery>,
) -> Result<Json<LeadsResponse>, AppError> {
    let scoring_version = match &query.scoring {
        None => ScoringVersion::parse(&state.config.scoring.version).unwrap_or(ScoringVersion::V1),
        Some(s) => ScoringVersion::parse(s)
            .ok_or_else(|| bad_request(format!("unknown scoring version: '{}'", s)))?,
    };

    let filters = LeadFilters {
        min_score: query.min_score.unwrap_or(state.config.scoring.min_score),
        source: query.source,
        exclude_source: query.exclude_source,
        limit: query.limit.unwrap_or(state.config.scoring.limit),
        scan_limit: state.config.scoring.scan_limit,
        scoring_version,
    };

    let (leads, scanned) = compute_leads(&state.primary, &filters)
        .await
        .map_err(classify)?;
    Ok(Json(LeadsResponse { scanned, leads }))
}

// ============ GET /snapshots, /snapshots/{id} ============

#[derive(Deserialize)]
struct LimitQuery {
    limit: Option<i64>,
}

async fn handle_snapshots(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<LeadSnapshot>>, AppError> {
    let snapshots = list_snapshots(&state.primary, query.limit.unwrap_or(50))
        .await
        .map_err(classify)?;
    Ok(Json(snapshots))
}

#[derive(Serialize)]
struct SnapshotResponse {
    #[serde(flatten)]
    snapshot: LeadSnapshot,
    items: Vec<LeadSnapshotItem>,
}

async fn handle_snapshot_show(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<SnapshotResponse>, AppError> {
    let snapshot = get_snapshot(&state.primary, id)
        .await
        .map_err(classify)?
        .ok_or_else(|| not_found(format!("snapshot {} not found", id)))?;
    let items = snapshot_items(&state.primary, id).await.map_err(classify)?;
    Ok(Json(SnapshotResponse { snapshot, items }))
}

// ============ GET /deltas/{from}/{to} ============

async fn handle_delta(
    State(state): State<AppState>,
    Path((from, to)): Path<(i64, i64)>,
) -> Result<Json<crate::delta::SnapshotDelta>, AppError> {
    let delta = compute_delta(&state.primary, from, to)
        .await
        .map_err(classify)?;
    Ok(Json(delta))
}

// ============ GET /runs ============

#[derive(Deserialize)]
struct RunsQuery {
    kind: Option<String>,
    limit: Option<i64>,
}

async fn handle_runs(
    State(state): State<AppState>,
    Query(query): Query<RunsQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let limit = query.limit.unwrap_or(20);
    match query.kind.as_deref().unwrap_or("analysis") {
        "ingest" => {
            let runs = list_ingest_runs(&state.primary, limit)
                .await
                .map_err(classify)?;
            Ok(Json(serde_json::json!({ "kind": "ingest", "runs": runs })))
        }
        "analysis" => {
            let runs = list_analysis_runs(&state.primary, limit)
                .await
                .map_err(classify)?;
            Ok(Json(serde_json::json!({ "kind": "analysis", "runs": runs })))
        }
        other => Err(bad_request(format!(
            "unknown run kind: '{}'. Use ingest or analysis.",
            other
        ))),
    }
}
