use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use shuttle_axum::axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::cycle::TriggerOutcome;
use crate::dead_letter::{DeadLetterQuery, DeadLetterView};
use crate::envelope::CycleToken;
use crate::error::ControlError;
use crate::history::HistoryEntry;
use crate::model::TrendLevel;
use crate::notify::Channel;
use crate::pipeline::{NewsPipeline, PipelineStatus, SubscriptionChange, DirectDelivery};
use crate::stages::collector::ToggleState;

const DEFAULT_SUMMARY_LIMIT: usize = 10;
const MAX_SUMMARY_LIMIT: usize = 100;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<NewsPipeline>,
}

impl AppState {
    pub fn new(pipeline: Arc<NewsPipeline>) -> Self {
        Self { pipeline }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/collect", post(collect))
        .route("/collect/cancel", post(cancel))
        .route("/summary", get(summary))
        .route("/subscriptions", post(subscribe).delete(unsubscribe))
        .route("/status", get(status))
        .route("/test/{channel}", post(send_test))
        .route("/digest/{channel}", post(send_digest))
        .route("/sources", post(configure_sources))
        .route("/dead-letters", get(dead_letters))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// JSON error body with a status code.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<ControlError> for ApiError {
    fn from(err: ControlError) -> Self {
        let status = match &err {
            ControlError::EmptyTarget => StatusCode::BAD_REQUEST,
            ControlError::ChannelUnavailable(_) => StatusCode::CONFLICT,
            ControlError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
            ControlError::Registry(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
struct CollectReq {
    #[serde(default)]
    force: bool,
}

async fn collect(
    State(state): State<AppState>,
    body: Option<Json<CollectReq>>,
) -> Result<Json<TriggerOutcome>, ApiError> {
    // an empty body means an unforced trigger
    let force = body.is_some_and(|Json(req)| req.force);
    Ok(Json(state.pipeline.start_collection(force).await?))
}

#[derive(Serialize)]
struct CancelResp {
    cancelled: Option<CycleToken>,
}

async fn cancel(State(state): State<AppState>) -> Json<CancelResp> {
    Json(CancelResp {
        cancelled: state.pipeline.cancel_cycle(),
    })
}

#[derive(Debug, Deserialize)]
struct SummaryParams {
    limit: Option<usize>,
    category: Option<String>,
    trend_level: Option<String>,
}

async fn summary(
    State(state): State<AppState>,
    Query(p): Query<SummaryParams>,
) -> Result<Json<Vec<HistoryEntry>>, ApiError> {
    let trend = match p.trend_level.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(s) => Some(s.parse::<TrendLevel>().map_err(ApiError::bad_request)?),
    };
    let limit = p.limit.unwrap_or(DEFAULT_SUMMARY_LIMIT).min(MAX_SUMMARY_LIMIT);
    Ok(Json(state.pipeline.get_summary(limit, p.category.as_deref(), trend)))
}

#[derive(Debug, Deserialize)]
struct SubscriptionReq {
    channel: String,
    target: String,
}

fn parse_channel(s: &str) -> Result<Channel, ApiError> {
    s.parse::<Channel>().map_err(ApiError::bad_request)
}

async fn subscribe(
    State(state): State<AppState>,
    Json(req): Json<SubscriptionReq>,
) -> Result<Json<SubscriptionChange>, ApiError> {
    let channel = parse_channel(&req.channel)?;
    Ok(Json(state.pipeline.subscribe(channel, &req.target).await?))
}

async fn unsubscribe(
    State(state): State<AppState>,
    Json(req): Json<SubscriptionReq>,
) -> Result<Json<SubscriptionChange>, ApiError> {
    let channel = parse_channel(&req.channel)?;
    Ok(Json(state.pipeline.unsubscribe(channel, &req.target).await?))
}

async fn status(State(state): State<AppState>) -> Json<PipelineStatus> {
    Json(state.pipeline.get_status())
}

async fn send_test(
    State(state): State<AppState>,
    Path(channel): Path<String>,
) -> Result<Json<Vec<DirectDelivery>>, ApiError> {
    let channel = parse_channel(&channel)?;
    Ok(Json(state.pipeline.send_test(channel).await?))
}

#[derive(Debug, Deserialize)]
struct DigestParams {
    limit: Option<usize>,
}

async fn send_digest(
    State(state): State<AppState>,
    Path(channel): Path<String>,
    Query(p): Query<DigestParams>,
) -> Result<Json<Vec<DirectDelivery>>, ApiError> {
    let channel = parse_channel(&channel)?;
    let limit = p.limit.unwrap_or(DEFAULT_SUMMARY_LIMIT).min(MAX_SUMMARY_LIMIT);
    Ok(Json(state.pipeline.send_digest(channel, limit).await?))
}

#[derive(Debug, Deserialize)]
struct SourcesReq {
    domestic: Option<bool>,
    international: Option<bool>,
}

async fn configure_sources(
    State(state): State<AppState>,
    Json(req): Json<SourcesReq>,
) -> Json<ToggleState> {
    Json(state.pipeline.configure_sources(req.domestic, req.international))
}

#[derive(Debug, Deserialize)]
struct DeadLetterParams {
    stage: Option<String>,
    since: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
}

async fn dead_letters(
    State(state): State<AppState>,
    Query(p): Query<DeadLetterParams>,
) -> Json<Vec<DeadLetterView>> {
    Json(state.pipeline.dead_letters(&DeadLetterQuery {
        stage: p.stage,
        since: p.since,
        until: p.until,
    }))
}
