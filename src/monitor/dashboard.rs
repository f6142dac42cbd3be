//! Forecast dashboard API
//!
//! JSON endpoints over the forecast service. Handlers never fail: upstream
//! problems show up as neutral forecasts, empty histories or missing venue
//! context, always with a 200.

use crate::data::{AssetContext, PredictedFunding};
use crate::ml::{ClassificationForecast, ForecastResponse, RegressionForecast};
use crate::service::ForecastService;
use crate::tracker::{AccuracySummary, HistoryView, LastComparison};
use axum::{extract::State, response::Json, routing::get, Router};
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

/// Days of funding history returned by `/api/history`
const HISTORY_DAYS: i64 = 3;

/// Dashboard state shared across handlers
pub struct DashboardState {
    pub service: ForecastService,
}

impl DashboardState {
    pub fn new(service: ForecastService) -> Self {
        Self { service }
    }
}

/// Venue context next to our direction forecast
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub hl_current: Option<AssetContext>,
    pub hl_pred: Option<PredictedFunding>,
    pub prediction: ForecastResponse<ClassificationForecast>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryResponse {
    pub predicted_funding_rate: ForecastResponse<RegressionForecast>,
    pub predicted_direction: ForecastResponse<ClassificationForecast>,
    pub live_funding: Option<AssetContext>,
    pub next_funding_time: i64,
    pub last_comparison: LastComparison,
    pub accuracy: AccuracySummary,
    pub coin: String,
    pub server_time: i64,
    pub funding_interval_seconds: i64,
}

// ============ HTTP API Handlers ============

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn get_status(State(state): State<Arc<DashboardState>>) -> Json<StatusResponse> {
    let service = &state.service;
    let now = Utc::now();
    let (hl_current, hl_pred, prediction) = tokio::join!(
        service.live_context(),
        service.venue_prediction(),
        service.predict_classification(now),
    );
    Json(StatusResponse {
        hl_current,
        hl_pred,
        prediction,
    })
}

async fn get_summary(State(state): State<Arc<DashboardState>>) -> Json<SummaryResponse> {
    let service = &state.service;
    let now = Utc::now();
    let (live_funding, venue_pred, regression, direction, last_comparison, accuracy) = tokio::join!(
        service.live_context(),
        service.venue_prediction(),
        service.predict_regression(now),
        service.predict_classification(now),
        service.last_comparison(now),
        service.accuracy(now),
    );

    Json(SummaryResponse {
        predicted_funding_rate: regression,
        predicted_direction: direction,
        live_funding,
        next_funding_time: service.next_funding_time(venue_pred.as_ref(), now),
        last_comparison,
        accuracy,
        coin: service.coin().to_string(),
        server_time: now.timestamp_millis(),
        funding_interval_seconds: service.config().schedule.interval_ms / 1000,
    })
}

async fn get_history(State(state): State<Arc<DashboardState>>) -> Json<HistoryView> {
    Json(state.service.history(HISTORY_DAYS, Utc::now()).await)
}

/// Create dashboard router
pub fn create_router(state: Arc<DashboardState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/status", get(get_status))
        .route("/api/summary", get(get_summary))
        .route("/api/history", get(get_history))
        .with_state(state)
}

/// Start dashboard server
pub async fn start_dashboard(
    state: Arc<DashboardState>,
    host: &str,
    port: u16,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let app = create_router(state);

    let addr = format!("{}:{}", host, port);
    tracing::info!("Dashboard server starting on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
