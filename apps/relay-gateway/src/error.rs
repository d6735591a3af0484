use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Failures surfaced by the gateway core.
///
/// None of these cross a socket callback boundary: the lifecycle callbacks
/// translate every failure into a disconnect of the offending handle.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Credential missing or rejected; the upgrade is denied.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// A connect event arrived without a pending authentication.
    #[error("no pending handshake for this connection")]
    HandshakeNotFound,

    /// The target identity has no live connection.
    #[error("target offline: {0}")]
    TargetOffline(String),

    /// The referenced identity is unknown.
    #[error("not found: {0}")]
    NotFound(String),

    /// The registry or a lifecycle hook refused the connection.
    #[error("rejected: {0}")]
    Rejected(String),

    /// Writing to or closing the underlying socket failed.
    #[error("transport error: {0}")]
    Transport(String),
}

pub type Result<T> = std::result::Result<T, GatewayError>;

/// Structured API error returned to HTTP clients.
#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
}

/// Application-level error type that converts into an HTTP response.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "BAD_REQUEST".to_string(),
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            code: "NOT_FOUND".to_string(),
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            code: "UNAUTHORIZED".to_string(),
            message: message.into(),
        }
    }

    pub fn target_offline(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            code: "TARGET_OFFLINE".to_string(),
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "INTERNAL_ERROR".to_string(),
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            error: ApiErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::TargetOffline(identity) => {
                Self::target_offline(format!("Client {identity} is offline"))
            }
            GatewayError::NotFound(identity) => Self::not_found(format!("Client {identity} not found")),
            GatewayError::AuthenticationFailed(_) => Self::unauthorized("Authentication failed"),
            GatewayError::Rejected(reason) => Self::bad_request(reason),
            GatewayError::HandshakeNotFound | GatewayError::Transport(_) => {
                tracing::error!(?err, "gateway error");
                Self::internal("An internal error occurred")
            }
        }
    }
}
