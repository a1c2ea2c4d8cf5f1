use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use std::sync::Arc;

use crate::auth::extract_credential;
use crate::error::{ApiError, SummarizerError};
use crate::health::{HealthAggregator, HealthState};
use crate::middleware::RequestId;
use crate::pipeline::Orchestrator;
use crate::response::SummarizeResponse;
use crate::validation::{RequestValidator, SummarizeBody};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub health: Arc<HealthAggregator>,
}

/// Summarize text for an authenticated caller
pub async fn summarize(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    headers: HeaderMap,
    payload: Result<Json<SummarizeBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let fail = |err: SummarizerError| ApiError::new(err, request_id.as_str());

    let Json(body) = payload
        .map_err(|rejection| fail(SummarizerError::Validation(rejection.body_text())))?;
    let request = RequestValidator::validate(body).map_err(fail)?;

    let credential = extract_credential(&headers);
    let output = state
        .orchestrator
        .summarize(credential.as_deref(), request)
        .await
        .map_err(fail)?;

    let mut response = Json(SummarizeResponse::from(output.result)).into_response();
    if let Some(quota) = output.quota {
        let headers = response.headers_mut();
        headers.insert("x-ratelimit-limit", HeaderValue::from(quota.limit));
        headers.insert("x-ratelimit-remaining", HeaderValue::from(quota.remaining));
    }
    Ok(response)
}

/// Aggregate dependency health; 503 only when a critical dependency is down
pub async fn healthz(State(state): State<AppState>) -> impl IntoResponse {
    let health = state.health.check().await;
    let status = match health.status {
        HealthState::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        HealthState::Healthy | HealthState::Degraded => StatusCode::OK,
    };
    (status, Json(health))
}

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.orchestrator.metrics().snapshot())
}
