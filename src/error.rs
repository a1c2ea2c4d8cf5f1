use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::evaluation::EvaluationError;
use crate::store::StoreError;

/// Failure taxonomy of the summarization pipeline.
///
/// Only the first four variants reach a caller during normal operation.
/// Store and evaluation failures are absorbed by the pipeline and surface
/// here only from the components themselves.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SummarizerError {
    #[error("missing or invalid API key")]
    Unauthorized,

    #[error("rate limit of {limit} requests per {window_secs}s exceeded, retry after {retry_after_secs}s")]
    RateLimited {
        limit: u64,
        window_secs: u64,
        retry_after_secs: u64,
    },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("summarization provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("dependency degraded: {0}")]
    DependencyDegraded(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, SummarizerError>;

impl From<StoreError> for SummarizerError {
    fn from(err: StoreError) -> Self {
        SummarizerError::DependencyDegraded(format!("counter store: {}", err))
    }
}

impl From<EvaluationError> for SummarizerError {
    fn from(err: EvaluationError) -> Self {
        SummarizerError::DependencyDegraded(format!("evaluator: {}", err))
    }
}

/// Stable, machine-readable failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Unauthorized,
    RateLimited,
    ValidationFailed,
    ProviderUnavailable,
    DependencyDegraded,
    Unrecoverable,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Unauthorized => "unauthorized",
            ErrorCategory::RateLimited => "rate_limited",
            ErrorCategory::ValidationFailed => "validation_failed",
            ErrorCategory::ProviderUnavailable => "provider_unavailable",
            ErrorCategory::DependencyDegraded => "dependency_degraded",
            ErrorCategory::Unrecoverable => "unrecoverable",
        }
    }
}

impl SummarizerError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            SummarizerError::Unauthorized => ErrorCategory::Unauthorized,
            SummarizerError::RateLimited { .. } => ErrorCategory::RateLimited,
            SummarizerError::Validation(_) => ErrorCategory::ValidationFailed,
            SummarizerError::ProviderUnavailable(_) => ErrorCategory::ProviderUnavailable,
            SummarizerError::DependencyDegraded(_) => ErrorCategory::DependencyDegraded,
            SummarizerError::Configuration(_) | SummarizerError::Internal(_) => {
                ErrorCategory::Unrecoverable
            }
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self.category() {
            ErrorCategory::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCategory::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorCategory::ValidationFailed => StatusCode::BAD_REQUEST,
            ErrorCategory::ProviderUnavailable | ErrorCategory::DependencyDegraded => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ErrorCategory::Unrecoverable => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Caller-facing message in English and Spanish.
    ///
    /// Internal details (store errors, configuration problems) are not
    /// echoed back; they are logged where they happen.
    pub fn message(&self) -> String {
        match self {
            SummarizerError::Unauthorized => {
                "Invalid or missing API key / Clave API inválida o ausente".to_string()
            }
            SummarizerError::RateLimited {
                limit, window_secs, ..
            } => format!(
                "Rate limit exceeded ({limit} requests per {window_secs}s) / \
                 Límite de velocidad excedido ({limit} solicitudes por {window_secs}s)"
            ),
            SummarizerError::Validation(detail) => {
                format!("Invalid request: {detail} / Solicitud inválida: {detail}")
            }
            SummarizerError::ProviderUnavailable(_) => {
                "Summarization service temporarily unavailable / \
                 Servicio de resumen temporalmente no disponible"
                    .to_string()
            }
            SummarizerError::DependencyDegraded(_) => {
                "A dependency is temporarily degraded / \
                 Una dependencia está temporalmente degradada"
                    .to_string()
            }
            SummarizerError::Configuration(_) | SummarizerError::Internal(_) => {
                "Internal server error / Error interno del servidor".to_string()
            }
        }
    }

    pub fn retry_after(&self) -> Option<u64> {
        match self {
            SummarizerError::RateLimited {
                retry_after_secs, ..
            } => Some(*retry_after_secs),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub code: u16,
    pub correlation_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl ErrorResponse {
    pub fn from_error(err: &SummarizerError, correlation_id: &str) -> Self {
        Self {
            error: err.category().as_str().to_string(),
            message: err.message(),
            code: err.status_code().as_u16(),
            correlation_id: correlation_id.to_string(),
            retry_after: err.retry_after(),
        }
    }
}

/// A pipeline error bound to the request that produced it.
#[derive(Debug)]
pub struct ApiError {
    pub error: SummarizerError,
    pub correlation_id: String,
}

impl ApiError {
    pub fn new(error: SummarizerError, correlation_id: impl Into<String>) -> Self {
        Self {
            error,
            correlation_id: correlation_id.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse::from_error(&self.error, &self.correlation_id);
        let mut resp = (self.error.status_code(), Json(body)).into_response();

        if let Ok(value) = HeaderValue::from_str(&self.correlation_id) {
            resp.headers_mut().insert("x-request-id", value);
        }
        match &self.error {
            SummarizerError::RateLimited {
                limit,
                retry_after_secs,
                ..
            } => {
                let headers = resp.headers_mut();
                headers.insert(header::RETRY_AFTER, HeaderValue::from(*retry_after_secs));
                headers.insert("x-ratelimit-limit", HeaderValue::from(*limit));
                headers.insert("x-ratelimit-remaining", HeaderValue::from(0u64));
            }
            SummarizerError::Unauthorized => {
                resp.headers_mut().insert(
                    header::WWW_AUTHENTICATE,
                    HeaderValue::from_static("Bearer"),
                );
            }
            _ => {}
        }
        resp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories_map_to_status_codes() {
        assert_eq!(
            SummarizerError::Unauthorized.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            SummarizerError::Validation("bad".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            SummarizerError::Internal("boom".into()).category(),
            ErrorCategory::Unrecoverable
        );
    }

    #[test]
    fn test_internal_details_are_not_exposed() {
        let err = SummarizerError::Internal("secret connection string".into());
        let body = ErrorResponse::from_error(&err, "req-1");
        assert!(!body.message.contains("secret"));
        assert_eq!(body.error, "unrecoverable");
        assert_eq!(body.correlation_id, "req-1");
    }

    #[test]
    fn test_rate_limited_response_carries_retry_after() {
        let err = SummarizerError::RateLimited {
            limit: 5,
            window_secs: 60,
            retry_after_secs: 42,
        };
        let resp = ApiError::new(err, "req-2").into_response();
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(resp.headers()[header::RETRY_AFTER], "42");
        assert_eq!(resp.headers()["x-request-id"], "req-2");
    }

    #[test]
    fn test_absorbed_failures_are_dependency_degraded() {
        let err = SummarizerError::from(StoreError::Timeout(250));
        assert_eq!(err.category(), ErrorCategory::DependencyDegraded);
        assert!(err.to_string().contains("250ms"));

        let err = SummarizerError::from(EvaluationError::Embedding("refused".into()));
        assert_eq!(err.category().as_str(), "dependency_degraded");
    }

    #[test]
    fn test_message_is_bilingual() {
        let msg = SummarizerError::Unauthorized.message();
        assert!(msg.contains(" / "));
    }
}
