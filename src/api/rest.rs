use axum::{
    Router,
    routing::{get, post},
    extract::{Query, State, Json},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use crate::analytics::indicators::IndicatorSnapshot;
use crate::analytics::statistics::PriceStatistics;
use crate::api::websocket::price_stream;
use crate::error::{Error, ErrorKind};
use crate::history::store::{HistoryQuery, SortOrder};
use crate::monitor::{PriceMonitor, TrackerInfo};
use crate::observability::metrics::gather_text;
use crate::scheduler::{Scheduler, SchedulerState};
use crate::types::price::PricePoint;

pub const MAX_HISTORY_LIMIT: usize = 1000;
const DEFAULT_STATISTICS_HOURS: u32 = 24;

pub struct ApiState {
    pub monitor: Arc<PriceMonitor>,
    pub scheduler: Arc<Scheduler>,
}

pub fn create_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .route("/api/v1/prices/current", get(current_price))
        .route("/api/v1/prices/history", get(price_history))
        .route("/api/v1/prices/statistics", get(price_statistics))
        .route("/api/v1/prices/technical-indicators", get(technical_indicators))
        .route("/api/v1/prices/summary", get(price_summary))
        .route("/api/v1/prices/force-update", post(force_update))
        .route("/api/v1/ws/price-stream", get(price_stream))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Error body: `{ "error": ..., "kind": ... }`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    kind: ErrorKind,
}

impl ApiError {
    fn no_data(message: &str) -> Self {
        ApiError {
            status: StatusCode::NOT_FOUND,
            message: message.to_string(),
            kind: ErrorKind::NotFound,
        }
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        let kind = e.kind();
        let status = match kind {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Transport => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError { status, message: e.to_string(), kind }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    kind: ErrorKind,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody { error: self.message, kind: self.kind };
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    scheduler: SchedulerState,
    timestamp: DateTime<Utc>,
}

async fn health_check(State(state): State<Arc<ApiState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        scheduler: state.scheduler.state().await,
        timestamp: Utc::now(),
    })
}

async fn metrics() -> Response {
    match gather_text() {
        Ok(text) => ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], text).into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

async fn current_price(State(state): State<Arc<ApiState>>) -> ApiResult<PricePoint> {
    state.monitor.current_price().await
        .map(Json)
        .ok_or_else(|| ApiError::no_data("No price data available"))
}

#[derive(Deserialize)]
struct HistoryParams {
    start_date: Option<DateTime<Utc>>,
    end_date: Option<DateTime<Utc>>,
    limit: Option<usize>,
    offset: Option<usize>,
}

#[derive(Serialize)]
struct HistoryResponse {
    prices: Vec<PricePoint>,
    count: usize,
    has_more: bool,
    limit: usize,
    offset: usize,
}

async fn price_history(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<HistoryParams>,
) -> ApiResult<HistoryResponse> {
    let limit = params.limit.unwrap_or(100);
    if !(1..=MAX_HISTORY_LIMIT).contains(&limit) {
        return Err(Error::Validation(format!("limit must be between 1 and {}", MAX_HISTORY_LIMIT)).into());
    }
    let offset = params.offset.unwrap_or(0);

    let query = HistoryQuery {
        start: params.start_date,
        end: params.end_date,
        limit,
        offset,
        order: SortOrder::NewestFirst,
    };
    let page = state.monitor.history(&query).await;

    Ok(Json(HistoryResponse {
        count: page.points.len(),
        prices: page.points,
        has_more: page.has_more,
        limit,
        offset,
    }))
}

#[derive(Deserialize)]
struct StatisticsParams {
    hours: Option<u32>,
}

async fn price_statistics(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<StatisticsParams>,
) -> ApiResult<PriceStatistics> {
    let hours = params.hours.unwrap_or(DEFAULT_STATISTICS_HOURS);
    state.monitor.statistics(hours).await?
        .map(Json)
        .ok_or_else(|| ApiError::no_data("No price data available for statistics"))
}

async fn technical_indicators(State(state): State<Arc<ApiState>>) -> ApiResult<IndicatorSnapshot> {
    state.monitor.indicators().await
        .map(Json)
        .ok_or_else(|| ApiError::no_data("Not enough price data for technical indicators"))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
enum Trend {
    Up,
    Down,
    Stable,
}

#[derive(Serialize)]
struct SummaryResponse {
    current_price: PricePoint,
    statistics_24h: Option<PriceStatistics>,
    trend: Option<Trend>,
    recent_prices: Vec<PricePoint>,
    tracker_info: TrackerInfo,
    data_sources: Vec<String>,
}

async fn price_summary(State(state): State<Arc<ApiState>>) -> ApiResult<SummaryResponse> {
    let current = state.monitor.current_price().await
        .ok_or_else(|| ApiError::no_data("No price data available"))?;

    let statistics = state.monitor.statistics(DEFAULT_STATISTICS_HOURS).await?;
    let recent = state.monitor.history(&HistoryQuery { limit: 5, ..Default::default() }).await.points;

    // recent is newest first
    let trend = match recent.as_slice() {
        [newest, previous, ..] if newest.value() > previous.value() => Some(Trend::Up),
        [newest, previous, ..] if newest.value() < previous.value() => Some(Trend::Down),
        [_, _, ..] => Some(Trend::Stable),
        _ => None,
    };

    let scheduler_state = state.scheduler.state().await;
    Ok(Json(SummaryResponse {
        current_price: current,
        statistics_24h: statistics,
        trend,
        recent_prices: recent,
        tracker_info: state.monitor.tracker_info(scheduler_state).await,
        data_sources: state.monitor.source_priority(),
    }))
}

#[derive(Serialize)]
struct ForceUpdateResponse {
    message: &'static str,
    price: PricePoint,
}

async fn force_update(State(state): State<Arc<ApiState>>) -> ApiResult<ForceUpdateResponse> {
    let price = state.monitor.force_update().await?;
    Ok(Json(ForceUpdateResponse { message: "Price updated", price }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;
    use crate::config::MonitorConfig;
    use crate::monitor::testing::seeded_monitor;

    fn state() -> Arc<ApiState> {
        let monitor = Arc::new(seeded_monitor(MonitorConfig { min_indicator_points: 3, ..Default::default() }, None));
        let scheduler = Arc::new(Scheduler::new(monitor.clone()));
        Arc::new(ApiState { monitor, scheduler })
    }

    async fn call(state: &Arc<ApiState>, method: &str, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri).body(Body::empty()).unwrap();
        let response = create_router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn health_reports_scheduler_state() {
        let state = state();
        let (status, body) = call(&state, "GET", "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["scheduler"], "idle");
    }

    #[tokio::test]
    async fn no_data_is_404_with_kind() {
        let state = state();
        for uri in [
            "/api/v1/prices/current",
            "/api/v1/prices/statistics",
            "/api/v1/prices/technical-indicators",
            "/api/v1/prices/summary",
        ] {
            let (status, body) = call(&state, "GET", uri).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{}", uri);
            assert_eq!(body["kind"], "not_found");
            assert!(body["error"].is_string());
        }
    }

    #[tokio::test]
    async fn force_update_then_current() {
        let state = state();
        let (status, body) = call(&state, "POST", "/api/v1/prices/force-update").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["price"]["value"], 0.095);

        let (status, body) = call(&state, "GET", "/api/v1/prices/current").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["value"], 0.095);
        assert_eq!(body["source_tier"], "fallback");
    }

    #[tokio::test]
    async fn history_paginates() {
        let state = state();
        for _ in 0..4 {
            state.monitor.force_update().await.unwrap();
        }

        let (status, body) = call(&state, "GET", "/api/v1/prices/history?limit=3").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 3);
        assert_eq!(body["has_more"], true);
        assert_eq!(body["prices"][0]["value"], 0.093);

        let (status, body) = call(&state, "GET", "/api/v1/prices/history?limit=0").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "validation");
    }

    #[tokio::test]
    async fn statistics_hours_are_bounded() {
        let state = state();
        state.monitor.force_update().await.unwrap();

        let (status, _) = call(&state, "GET", "/api/v1/prices/statistics?hours=200").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(&state, "GET", "/api/v1/prices/statistics?hours=1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["sample_count"], 1);
        assert_eq!(body["percent_change"], 0.0);
    }

    #[tokio::test]
    async fn summary_includes_trend_and_sources() {
        let state = state();
        for _ in 0..3 {
            state.monitor.force_update().await.unwrap();
        }

        let (status, body) = call(&state, "GET", "/api/v1/prices/summary").await;
        assert_eq!(status, StatusCode::OK);
        // 0.096 -> 0.094
        assert_eq!(body["trend"], "down");
        assert_eq!(body["recent_prices"].as_array().unwrap().len(), 3);
        assert_eq!(body["data_sources"], serde_json::json!(["hardcoded"]));
        assert_eq!(body["tracker_info"]["retained_points"], 3);

        let (status, body) = call(&state, "GET", "/api/v1/prices/technical-indicators").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["volatility"].is_number());
        assert!(body["sma_10"].is_null());
    }

    #[tokio::test]
    async fn metrics_are_exposed() {
        crate::observability::metrics::register_metrics().unwrap();
        let state = state();
        state.monitor.force_update().await.unwrap();

        let request = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
        let response = create_router(state).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&bytes).contains("price_cycles_total"));
    }
}
