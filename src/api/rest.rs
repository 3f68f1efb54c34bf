// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// All endpoints live under `/api/v1/`. The screener serves public market
// data only, so there is no authentication layer.
//
// CORS is configured permissively for development; tighten `allowed_origins`
// in production.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::config::CONFIG_PATH;
use crate::error::FetchError;
use crate::ranking::{SortDirection, SortField, SortState};
use crate::scanner::ScanEngine;
use crate::signal_detector::detect_signals;
use crate::types::Interval;
use crate::volume_profile::calculate_volume_profile;

type ApiError = (StatusCode, Json<serde_json::Value>);

fn bad_request(message: String) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "error": message })),
    )
}

// =============================================================================
// Router construction
// =============================================================================

/// Build the full REST API router with CORS middleware and shared state.
pub fn router(engine: Arc<ScanEngine>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // ── Health ──────────────────────────────────────────────────
        .route("/api/v1/health", get(health))
        // ── Ranking table ───────────────────────────────────────────
        .route("/api/v1/metrics", get(get_metrics))
        .route("/api/v1/metrics/sort", post(toggle_sort))
        // ── Per-symbol series ───────────────────────────────────────
        .route("/api/v1/symbols/:symbol/series", get(symbol_series))
        // ── Scan control ────────────────────────────────────────────
        .route("/api/v1/refresh", post(trigger_refresh))
        // ── Configuration ───────────────────────────────────────────
        .route("/api/v1/config", get(get_config).put(update_config))
        // ── Middleware & State ──────────────────────────────────────
        .layer(cors)
        .with_state(engine)
}

// =============================================================================
// Health
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    cycle_running: bool,
    tracked_symbols: usize,
    server_time: i64,
}

async fn health(State(engine): State<Arc<ScanEngine>>) -> impl IntoResponse {
    let state = engine.state();
    let resp = HealthResponse {
        status: "ok",
        uptime_secs: state.uptime_secs(),
        cycle_running: state.is_cycle_running(),
        tracked_symbols: state.board.len(),
        server_time: chrono::Utc::now().timestamp_millis(),
    };
    Json(resp)
}

// =============================================================================
// Ranking table
// =============================================================================

#[derive(Deserialize)]
struct MetricsQuery {
    #[serde(default)]
    sort: Option<String>,
    #[serde(default)]
    dir: Option<String>,
}

/// Full ranked table. `?sort=` / `?dir=` override the stored ordering for
/// this response only; the stored sort state is left untouched.
async fn get_metrics(
    State(engine): State<Arc<ScanEngine>>,
    Query(query): Query<MetricsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let board = &engine.state().board;

    let (rows, applied) = if query.sort.is_none() && query.dir.is_none() {
        board.sorted_rows_current()
    } else {
        let stored = board.sort_state();
        let field = match query.sort.as_deref() {
            Some(raw) => SortField::parse(raw)
                .ok_or_else(|| bad_request(format!("unknown sort field '{raw}'")))?,
            None => stored.field,
        };
        let direction = match query.dir.as_deref() {
            Some(raw) => SortDirection::parse(raw)
                .ok_or_else(|| bad_request(format!("unknown sort direction '{raw}'")))?,
            None => stored.direction,
        };
        let applied = SortState { field, direction };
        (board.sorted_rows(field, direction), applied)
    };

    let last_cycle = engine.state().last_report.read().clone();

    Ok(Json(serde_json::json!({
        "sort": applied,
        "last_cycle": last_cycle,
        "rows": rows,
    })))
}

#[derive(Deserialize)]
struct SortToggleRequest {
    field: String,
}

/// Toggle the stored sort: the active column flips direction, a new column
/// resets to descending.
async fn toggle_sort(
    State(engine): State<Arc<ScanEngine>>,
    Json(req): Json<SortToggleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let field = SortField::parse(&req.field)
        .ok_or_else(|| bad_request(format!("unknown sort field '{}'", req.field)))?;

    let board = &engine.state().board;
    let sort = board.toggle_sort(field);
    let rows = board.sorted_rows(sort.field, sort.direction);

    info!(field = %sort.field, direction = ?sort.direction, "Table sort toggled via API");

    Ok(Json(serde_json::json!({ "sort": sort, "rows": rows })))
}

// =============================================================================
// Per-symbol series
// =============================================================================

/// Fetch a fresh candle window for one symbol and compute its pressure
/// series plus signal markers on demand. Unlike the table, this always hits
/// the exchange so a chart never shows stale data.
async fn symbol_series(
    State(engine): State<Arc<ScanEngine>>,
    Path(symbol): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let symbol = symbol.to_uppercase();
    let (interval, range_days, smoothing) = {
        let config = engine.state().config_snapshot();
        (config.interval, config.range_days, config.smoothing)
    };

    let candles = engine
        .fetcher()
        .fetch(&symbol, interval, range_days)
        .await
        .map_err(|err| match err {
            FetchError::EmptyResult => (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({ "error": format!("no candle data for {symbol}") })),
            ),
            other => (
                StatusCode::BAD_GATEWAY,
                Json(serde_json::json!({ "error": other.to_string() })),
            ),
        })?;

    let series = calculate_volume_profile(&candles, smoothing);
    let signals = detect_signals(&candles, &series);

    Ok(Json(serde_json::json!({
        "symbol": symbol,
        "interval": interval,
        "smoothing": smoothing,
        "candles": candles,
        "series": series,
        "signals": signals,
    })))
}

// =============================================================================
// Scan control
// =============================================================================

/// Kick off a background scan cycle. Returns immediately; `started` is
/// false when a cycle is already in flight.
async fn trigger_refresh(State(engine): State<Arc<ScanEngine>>) -> impl IntoResponse {
    let started = engine.spawn_cycle();
    if started {
        info!("Refresh cycle started via API");
    } else {
        info!("Refresh request ignored, cycle already running");
    }
    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "started": started })),
    )
}

// =============================================================================
// Configuration
// =============================================================================

async fn get_config(State(engine): State<Arc<ScanEngine>>) -> impl IntoResponse {
    Json(engine.state().config_snapshot())
}

/// Partial config update. Absent fields are left unchanged.
#[derive(Deserialize)]
struct ConfigUpdate {
    #[serde(default)]
    interval: Option<String>,
    #[serde(default)]
    range_days: Option<u32>,
    #[serde(default)]
    smoothing: Option<bool>,
    #[serde(default)]
    batch_size: Option<usize>,
    #[serde(default)]
    batch_pause_ms: Option<u64>,
    #[serde(default)]
    auto_refresh: Option<bool>,
    #[serde(default)]
    refresh_cooldown_secs: Option<u64>,
}

async fn update_config(
    State(engine): State<Arc<ScanEngine>>,
    Json(update): Json<ConfigUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    // Validate before touching the live config.
    let interval = match update.interval.as_deref() {
        Some(raw) => Some(
            Interval::parse(raw).ok_or_else(|| bad_request(format!("unknown interval '{raw}'")))?,
        ),
        None => None,
    };
    if update.range_days == Some(0) {
        return Err(bad_request("range_days must be at least 1".to_string()));
    }
    if update.batch_size == Some(0) {
        return Err(bad_request("batch_size must be at least 1".to_string()));
    }

    let mut config = engine.state().config.write();
    let mut changes: Vec<String> = Vec::new();

    macro_rules! apply_field {
        ($field:ident, $value:expr) => {
            if let Some(val) = $value {
                if config.$field != val {
                    changes.push(format!(
                        "{}: {} -> {}",
                        stringify!($field),
                        config.$field,
                        val
                    ));
                    config.$field = val;
                }
            }
        };
    }

    apply_field!(interval, interval);
    apply_field!(range_days, update.range_days);
    apply_field!(smoothing, update.smoothing);
    apply_field!(batch_size, update.batch_size);
    apply_field!(batch_pause_ms, update.batch_pause_ms);
    apply_field!(auto_refresh, update.auto_refresh);
    apply_field!(refresh_cooldown_secs, update.refresh_cooldown_secs);

    // Clone config and drop the write lock before saving.
    let updated = config.clone();
    drop(config);

    if !changes.is_empty() {
        info!(changes = ?changes, "Screener config updated via API");

        // Save to disk (best-effort); the live config is already applied.
        if let Err(e) = updated.save(CONFIG_PATH) {
            warn!(error = %e, "Failed to save screener config to disk");
        }
    }

    Ok(Json(serde_json::json!({ "config": updated, "changes": changes })))
}
