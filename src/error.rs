use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};

use crate::models::common::{ErrorBody, ErrorInfo};

/// The gateway's error taxonomy. Every fallible operation on the request path
/// returns one of these instead of reaching for `anyhow` or `unwrap`.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("{0}")]
    AuthFailure(String),

    #[error("{0}")]
    CorsViolation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{message}")]
    RateLimited { message: String, retry_after_secs: u64 },

    #[error("{0}")]
    EngineLoad(String),

    #[error("{0}")]
    EngineRuntime(String),

    #[error("{0}")]
    DownloadFailure(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    fn status(&self) -> StatusCode {
        match self {
            GatewayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::AuthFailure(_) => StatusCode::UNAUTHORIZED,
            GatewayError::CorsViolation(_) => StatusCode::FORBIDDEN,
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::Conflict(_) => StatusCode::CONFLICT,
            GatewayError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::EngineLoad(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::EngineRuntime(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::DownloadFailure(_) => StatusCode::BAD_REQUEST,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_type(&self) -> &'static str {
        match self {
            GatewayError::InvalidRequest(_) => "invalid_request_error",
            GatewayError::AuthFailure(_) => "authentication_error",
            GatewayError::CorsViolation(_) => "cors_error",
            GatewayError::NotFound(_) => "not_found_error",
            GatewayError::Conflict(_) => "conflict_error",
            GatewayError::RateLimited { .. } => "rate_limit_error",
            GatewayError::EngineLoad(_) => "engine_unavailable_error",
            GatewayError::EngineRuntime(_) => "engine_runtime_error",
            GatewayError::DownloadFailure(_) => "download_error",
            GatewayError::Internal(_) => "server_error",
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        tracing::warn!(error = %self, status = status.as_u16(), "request failed");

        let body = ErrorBody {
            error: ErrorInfo {
                message: self.to_string(),
                error_type: self.error_type().to_string(),
                param: None,
                code: None,
            },
        };

        let mut response = (status, Json(body)).into_response();

        if let GatewayError::RateLimited {
            retry_after_secs, ..
        } = &self
        {
            if let Ok(v) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, v);
            }
        }

        response
    }
}
