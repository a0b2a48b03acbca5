//! REST endpoints for the fleet dashboard.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::api::ws::ws_handler;
use crate::error::PayoutError;
use crate::fleet::FleetManager;
use crate::payout::PayoutService;
use crate::store::FleetImport;
use crate::worker::{PerformanceMode, WorkerId, lookup};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub fleet: Arc<FleetManager>,
    /// `None` when no settlement endpoint is configured.
    pub payouts: Option<Arc<PayoutService>>,
}

/// Build the router with every REST route and the WebSocket feed.
pub fn fleet_routes(fleet: Arc<FleetManager>, payouts: Option<Arc<PayoutService>>) -> Router {
    let state = AppState { fleet, payouts };

    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .route("/api/workers", get(list_workers).post(create_workers))
        .route("/api/workers/{id}", get(get_worker).delete(delete_worker))
        .route("/api/workers/{id}/start", post(start_worker))
        .route("/api/workers/{id}/pause", post(pause_worker))
        .route("/api/workers/{id}/stop", post(stop_worker))
        .route("/api/workers/{id}/fault", post(inject_fault))
        .route("/api/workers/{id}/payout", post(pay_worker))
        .route("/api/fleet/start", post(start_all))
        .route("/api/fleet/stop", post(stop_all))
        .route("/api/stats", get(stats))
        .route("/api/series", get(series))
        .route("/api/activity", get(activity).delete(clear_activity))
        .route("/api/export", get(export))
        .route("/api/import", post(import))
        .route("/api/payouts", get(payout_history))
        .layer(ServiceBuilder::new().layer(cors_layer()))
        .with_state(state)
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(Any)
}

fn error_response(status: StatusCode, message: impl ToString) -> Response {
    (
        status,
        Json(serde_json::json!({"error": message.to_string()})),
    )
        .into_response()
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "workfleet"
    }))
}

// ── Workers ─────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ListQuery {
    q: Option<String>,
}

async fn list_workers(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> impl IntoResponse {
    let views = state
        .fleet
        .read(|f| match query.q.as_deref() {
            Some(q) => f.search(q),
            None => f.views(),
        })
        .await;
    Json(views)
}

#[derive(Deserialize)]
struct CreateRequest {
    count: usize,
    #[serde(rename = "type")]
    worker_type: String,
    #[serde(default)]
    mode: Option<String>,
}

async fn create_workers(
    State(state): State<AppState>,
    body: Result<Json<CreateRequest>, JsonRejection>,
) -> Response {
    let body = match body {
        Ok(Json(body)) => body,
        Err(rejection) => return error_response(StatusCode::BAD_REQUEST, rejection.body_text()),
    };
    let worker_type = match lookup(&body.worker_type) {
        Ok((worker_type, _)) => worker_type,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
    };
    let mode = match body.mode.as_deref().map(str::parse::<PerformanceMode>) {
        None => PerformanceMode::default(),
        Some(Ok(mode)) => mode,
        Some(Err(e)) => return error_response(StatusCode::BAD_REQUEST, e),
    };

    match state
        .fleet
        .create_workers(body.count, worker_type, mode)
        .await
    {
        Ok(created) => (
            StatusCode::CREATED,
            Json(serde_json::json!({"created": created})),
        )
            .into_response(),
        Err(e) if e.is_validation() => error_response(StatusCode::BAD_REQUEST, e),
        Err(e) => error_response(StatusCode::UNPROCESSABLE_ENTITY, e),
    }
}

async fn get_worker(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let id = WorkerId::new(id);
    match state.fleet.read(|f| f.view(&id)).await {
        Some(view) => Json(view).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "Worker not found"),
    }
}

async fn delete_worker(State(state): State<AppState>, Path(id): Path<String>) -> StatusCode {
    let id = WorkerId::new(id);
    state.fleet.write(|f| f.delete_worker(&id)).await;
    StatusCode::NO_CONTENT
}

async fn start_worker(State(state): State<AppState>, Path(id): Path<String>) -> StatusCode {
    let id = WorkerId::new(id);
    state.fleet.write(|f| f.start_worker(&id)).await;
    StatusCode::NO_CONTENT
}

async fn pause_worker(State(state): State<AppState>, Path(id): Path<String>) -> StatusCode {
    let id = WorkerId::new(id);
    state.fleet.write(|f| f.pause_worker(&id)).await;
    StatusCode::NO_CONTENT
}

async fn stop_worker(State(state): State<AppState>, Path(id): Path<String>) -> StatusCode {
    let id = WorkerId::new(id);
    state.fleet.write(|f| f.stop_worker(&id)).await;
    StatusCode::NO_CONTENT
}

#[derive(Deserialize)]
struct FaultRequest {
    #[serde(default)]
    message: Option<String>,
}

async fn inject_fault(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<FaultRequest>, JsonRejection>,
) -> StatusCode {
    let id = WorkerId::new(id);
    let message = body
        .ok()
        .and_then(|Json(b)| b.message)
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| "Injected fault".to_string());
    state.fleet.write(|f| f.inject_fault(&id, message)).await;
    StatusCode::NO_CONTENT
}

async fn pay_worker(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let Some(payouts) = state.payouts else {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "Payouts are not configured");
    };
    let id = WorkerId::new(id);
    match payouts.pay_worker(&id).await {
        Ok(record) => Json(record).into_response(),
        Err(e @ PayoutError::WorkerNotFound { .. }) => error_response(StatusCode::NOT_FOUND, e),
        Err(e @ PayoutError::BelowMinimum { .. }) => error_response(StatusCode::BAD_REQUEST, e),
        Err(e @ PayoutError::InFlight { .. }) => error_response(StatusCode::CONFLICT, e),
        Err(e) => {
            warn!(worker_id = %id, error = %e, "Manual payout failed");
            error_response(StatusCode::BAD_GATEWAY, e)
        }
    }
}

// ── Fleet ───────────────────────────────────────────────────────────────

async fn start_all(State(state): State<AppState>) -> impl IntoResponse {
    let affected = state.fleet.write(|f| f.start_all()).await;
    info!(affected, "Fleet start requested");
    Json(serde_json::json!({"affected": affected}))
}

async fn stop_all(State(state): State<AppState>) -> impl IntoResponse {
    let affected = state.fleet.write(|f| f.stop_all()).await;
    info!(affected, "Fleet stop requested");
    Json(serde_json::json!({"affected": affected}))
}

async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.fleet.read(|f| f.stats()).await)
}

async fn series(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.fleet.read(|f| f.series()).await)
}

#[derive(Deserialize)]
struct ActivityQuery {
    #[serde(default = "default_activity_limit")]
    limit: usize,
}

fn default_activity_limit() -> usize {
    100
}

async fn activity(
    State(state): State<AppState>,
    Query(query): Query<ActivityQuery>,
) -> impl IntoResponse {
    Json(state.fleet.read(|f| f.activity(query.limit)).await)
}

async fn clear_activity(State(state): State<AppState>) -> StatusCode {
    state.fleet.write(|f| f.clear_activity()).await;
    StatusCode::NO_CONTENT
}

// ── Export / import / payouts ───────────────────────────────────────────

async fn export(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.fleet.read(|f| f.export()).await)
}

async fn import(
    State(state): State<AppState>,
    Json(body): Json<FleetImport>,
) -> impl IntoResponse {
    Json(state.fleet.write(|f| f.import(&body)).await)
}

async fn payout_history(State(state): State<AppState>) -> impl IntoResponse {
    let history = match &state.payouts {
        Some(service) => service.history().await,
        None => Vec::new(),
    };
    Json(history)
}
