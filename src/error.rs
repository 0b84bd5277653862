use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Failures of a single completion call, either returned directly (non-streaming)
/// or yielded as the terminal item of a text stream.
#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("{message}")]
    Upstream { status: StatusCode, message: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("upstream timed out: {0}")]
    Timeout(String),
    #[error("invalid upstream response: {0}")]
    InvalidResponse(String),
    #[error("malformed stream event: {0}")]
    MalformedEvent(String),
    #[error("http client init failed: {0}")]
    ClientInit(String),
}

impl CompletionError {
    pub fn upstream_status(status: StatusCode) -> Self {
        let text = status.canonical_reason().unwrap_or(status.as_str());
        Self::Upstream {
            status,
            message: format!("OpenAI API: {}", text),
        }
    }
}

impl From<reqwest::Error> for CompletionError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
    pub error_type: String,
}

impl AppError {
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
            error_type: "invalid_request_error".to_string(),
        }
    }

    pub fn with_type(mut self, error_type: impl Into<String>) -> Self {
        self.error_type = error_type.into();
        self
    }
}

impl From<CompletionError> for AppError {
    fn from(err: CompletionError) -> Self {
        let message = err.to_string();
        let (status, code) = match &err {
            CompletionError::Upstream { .. } => (StatusCode::BAD_GATEWAY, "upstream_error"),
            CompletionError::Transport(_) => (StatusCode::BAD_GATEWAY, "upstream_unreachable"),
            CompletionError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "upstream_timeout"),
            CompletionError::InvalidResponse(_) | CompletionError::MalformedEvent(_) => {
                (StatusCode::BAD_GATEWAY, "upstream_malformed")
            }
            CompletionError::ClientInit(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "http_client_init_failed")
            }
        };
        AppError::new(status, code, message).with_type("upstream_error")
    }
}

#[derive(Debug, Serialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    message: String,
    #[serde(rename = "type")]
    error_type: String,
    code: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorEnvelope {
            error: ErrorBody {
                message: self.message,
                error_type: self.error_type,
                code: self.code,
            },
        };
        (self.status, axum::Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
