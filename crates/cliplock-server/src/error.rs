//! API error type with HTTP status code mapping.
//!
//! [`ApiError`] is the unified error type for all endpoints. It implements
//! `axum::response::IntoResponse`, producing the flat JSON envelope
//! `{"error": <code>, "message": <human string>}` with stable machine
//! codes. Core errors convert via `From`, so handlers propagate with `?`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use cliplock_core::{LockError, RegistryError};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Malformed or incomplete request body / query (400).
    #[error("{0}")]
    InvalidRequest(String),

    /// Tool id is already registered and online (409).
    #[error("tool is already registered and online")]
    ToolAlreadyRegistered,

    /// Tool was never registered (404).
    #[error("tool is not registered")]
    ToolNotFound,

    /// Tool is known but offline; it must re-register first (400).
    #[error("tool is not online; register or heartbeat first")]
    ToolOffline,

    /// Ticket does not exist or has been reaped (404).
    #[error("ticket does not exist or has been removed")]
    TicketNotFound,

    /// Ticket is not the current lock holder (400).
    #[error("ticket is not the current lock holder")]
    NotLockHolder,

    /// Lock extension is disabled by configuration (400).
    #[error("lock extend is not enabled in config")]
    ExtendDisabled,

    /// The extend cap has been reached (400).
    #[error("maximum extend count reached")]
    MaxExtendReached,

    /// Config update failed validation (400).
    #[error("{0}")]
    InvalidConfig(String),

    /// Unexpected server-side failure (500).
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    /// Stable wire code for the error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidRequest(_) => "invalid_request",
            ApiError::ToolAlreadyRegistered => "tool_already_registered",
            ApiError::ToolNotFound => "tool_not_found",
            ApiError::ToolOffline => "tool_offline",
            ApiError::TicketNotFound => "ticket_not_found",
            ApiError::NotLockHolder => "not_lock_holder",
            ApiError::ExtendDisabled => "extend_disabled",
            ApiError::MaxExtendReached => "max_extend_reached",
            ApiError::InvalidConfig(_) => "invalid_config",
            ApiError::Internal(_) => "internal_error",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidRequest(_)
            | ApiError::ToolOffline
            | ApiError::NotLockHolder
            | ApiError::ExtendDisabled
            | ApiError::MaxExtendReached
            | ApiError::InvalidConfig(_) => StatusCode::BAD_REQUEST,
            ApiError::ToolAlreadyRegistered => StatusCode::CONFLICT,
            ApiError::ToolNotFound | ApiError::TicketNotFound => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.code(),
            "message": self.to_string(),
        });
        (self.status(), axum::Json(body)).into_response()
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::AlreadyRegistered => ApiError::ToolAlreadyRegistered,
            RegistryError::NotFound => ApiError::ToolNotFound,
        }
    }
}

impl From<LockError> for ApiError {
    fn from(err: LockError) -> Self {
        match err {
            LockError::TicketNotFound => ApiError::TicketNotFound,
            LockError::NotHolder => ApiError::NotLockHolder,
            LockError::ToolOffline => ApiError::ToolOffline,
            LockError::ExtendDisabled => ApiError::ExtendDisabled,
            LockError::MaxExtendReached => ApiError::MaxExtendReached,
        }
    }
}
