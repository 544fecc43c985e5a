// HTTP API Error Types
use axum::{http::StatusCode, response::IntoResponse};
use serde_json::Value;

use crate::dispatch::response::{Envelope, Reply};
use crate::dispatch::ResolveError;

/// HTTP API error with appropriate status codes and client-friendly messages
#[derive(Debug, Clone, PartialEq)]
pub enum ApiError {
    // 400 Bad Request
    BadRequest(Value),

    // 401 Unauthorized
    Unauthorized(String),

    // 403 Forbidden
    Forbidden(String),

    // 404 Not Found
    NotFound(String),

    // 429 Too Many Requests
    TooManyRequests(String),

    // 500 Internal Server Error
    InternalServerError(String),
}

impl ApiError {
    /// Get HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Content of the `errors` field of the envelope.
    /// Business errors keep whatever shape the handler produced (string or list).
    pub fn errors(&self) -> Value {
        match self {
            ApiError::BadRequest(errors) => errors.clone(),
            ApiError::Unauthorized(msg)
            | ApiError::Forbidden(msg)
            | ApiError::NotFound(msg)
            | ApiError::TooManyRequests(msg)
            | ApiError::InternalServerError(msg) => Value::String(msg.clone()),
        }
    }

    pub fn into_reply(self) -> Reply {
        Reply::new(self.status_code(), Envelope::failure(self.errors()))
    }
}

// Static constructor methods
impl ApiError {
    pub fn bad_request(errors: impl Into<Value>) -> Self {
        ApiError::BadRequest(errors.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn too_many_requests(message: impl Into<String>) -> Self {
        ApiError::TooManyRequests(message.into())
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        ApiError::InternalServerError(message.into())
    }
}

// Every route resolution failure is a terminal 404
impl From<ResolveError> for ApiError {
    fn from(err: ResolveError) -> Self {
        ApiError::not_found(err.to_string())
    }
}

impl From<ApiError> for Reply {
    fn from(err: ApiError) -> Self {
        err.into_reply()
    }
}

// Standard error trait implementations
impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.errors() {
            Value::String(msg) => write!(f, "{}", msg),
            other => write!(f, "{}", other),
        }
    }
}

impl std::error::Error for ApiError {}

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        self.into_reply().into_response()
    }
}
