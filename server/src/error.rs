//! Error taxonomy shared by the marketplace engine and the HTTP layer

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Every failure a marketplace operation can surface to a caller.
#[derive(Debug, thiserror::Error)]
pub enum MarketError {
    #[error("authentication required")]
    Unauthorized,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("item has already been decided")]
    AlreadyDecided,

    #[error("seller deposit of {required} points required, {current} held")]
    DepositRequired { required: i64, current: i64 },

    #[error("insufficient balance: {required} points required, {available} available")]
    InsufficientBalance { required: i64, available: i64 },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("payment error: {0}")]
    Payment(String),

    #[error("{0}")]
    Unavailable(&'static str),

    #[error("concurrent update on {0}, retry the request")]
    Conflict(String),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

impl MarketError {
    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self::Forbidden(reason.into())
    }

    pub fn invalid_state(reason: impl Into<String>) -> Self {
        Self::InvalidState(reason.into())
    }

    /// Stable machine-readable code returned next to the message.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::InvalidState(_) => "invalid_state",
            Self::AlreadyDecided => "already_decided",
            Self::DepositRequired { .. } => "deposit_required",
            Self::InsufficientBalance { .. } => "insufficient_balance",
            Self::Validation(_) => "validation",
            Self::Payment(_) => "payment",
            Self::Unavailable(_) => "unavailable",
            Self::Conflict(_) => "conflict",
            Self::Storage(_) => "storage",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidState(_) | Self::AlreadyDecided | Self::Conflict(_) => StatusCode::CONFLICT,
            Self::DepositRequired { .. } => StatusCode::BAD_REQUEST,
            Self::InsufficientBalance { .. } => StatusCode::PAYMENT_REQUIRED,
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Payment(_) => StatusCode::BAD_GATEWAY,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<validator::ValidationErrors> for MarketError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation(errors.to_string())
    }
}

impl IntoResponse for MarketError {
    fn into_response(self) -> Response {
        let message = match &self {
            Self::Storage(e) => {
                tracing::error!(error = %e, "storage failure");
                "internal storage error".to_string()
            }
            other => other.to_string(),
        };

        (
            self.status(),
            Json(json!({ "message": message, "code": self.code() })),
        )
            .into_response()
    }
}

pub type MarketResult<T> = Result<T, MarketError>;
