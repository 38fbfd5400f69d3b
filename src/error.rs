//! Error types for lnvoucher
//!
//! A single `thiserror` hierarchy shared by the lifecycle, the redemption
//! protocol and the HTTP handlers. The same error maps to two different wire
//! conventions: the admin API turns it into a structured HTTP status, while
//! the LNURL endpoints always answer `200 OK` with an
//! `{"status": "ERROR", "reason": ...}` body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// The main error type for lnvoucher operations
#[derive(Error, Debug)]
pub enum Error {
    /// Bad create/update input (min > max, uses out of range, invalid JSON)
    #[error("Invalid input: {0}")]
    Validation(String),

    /// Unknown voucher id or claim token
    #[error("Withdraw link does not exist.")]
    NotFound,

    /// Caller does not own the voucher
    #[error("Not your withdraw link.")]
    Forbidden,

    /// No remaining redeemable units
    #[error("Withdraw is spent.")]
    Spent,

    /// Cooldown not elapsed; carries the remaining wait in seconds
    #[error("wait link open_time {0} seconds.")]
    NotYetActive(u64),

    /// Token does not match any known secret
    #[error("Invalid k1.")]
    InvalidToken,

    /// A callback for the same token is already in flight
    #[error("Withdraw is already being processed.")]
    DuplicateProcessing,

    /// The payment gateway declined or timed out
    #[error("Payment error: {0}")]
    PaymentFailed(String),

    /// Operation not valid for the voucher's current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Unexpected storage-layer fault; the only variant that surfaces as 500
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Result type alias for lnvoucher operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a validation error from a string
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Error::Validation(msg.into())
    }

    /// Create a storage error from a string
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        Error::Storage(msg.into())
    }

    /// The HTTP status this error carries on the admin surface.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Validation(_) | Error::InvalidState(_) => StatusCode::BAD_REQUEST,
            Error::NotFound => StatusCode::NOT_FOUND,
            Error::Forbidden => StatusCode::FORBIDDEN,
            Error::Spent
            | Error::NotYetActive(_)
            | Error::InvalidToken
            | Error::DuplicateProcessing
            | Error::PaymentFailed(_) => StatusCode::BAD_REQUEST,
            Error::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Admin-surface response shape: `{"detail": <reason>}` with a real status code.
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}
