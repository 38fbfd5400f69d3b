//! LNURL-withdraw protocol endpoints.
//!
//! Per the protocol convention, application errors are not HTTP errors: every
//! reply is `200 OK` and failures are signalled with
//! `{"status": "ERROR", "reason": ...}` in the body, so wallets can surface
//! the reason to the bearer.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use super::AppState;
use crate::model::LnurlResponse;

/// Query parameters of the callback step.
#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    /// The claim token being redeemed
    pub k1: String,
    /// The bearer's payment request
    pub pr: String,
}

/// `GET /api/v1/lnurl/{id_or_k1}` - the challenge step.
///
/// Static vouchers are addressed by their public id, per-unit vouchers by a
/// claim token. Read-only; may be called repeatedly without consequence.
pub async fn challenge(
    State(state): State<AppState>,
    Path(id_or_k1): Path<String>,
) -> Json<serde_json::Value> {
    let response = match state.protocol.challenge(&id_or_k1).await {
        Ok(challenge) => LnurlResponse::Withdraw(challenge),
        Err(e) => LnurlResponse::Error(e.to_string()),
    };
    Json(response.to_json())
}

/// `GET /api/v1/lnurl/cb?k1=..&pr=..` - the callback step.
///
/// Claims the secret and pays the invoice; answers `{"status": "OK"}` on
/// success.
pub async fn callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> Json<serde_json::Value> {
    let response = match state.protocol.callback(&params.k1, &params.pr).await {
        Ok(()) => LnurlResponse::Success,
        Err(e) => LnurlResponse::Error(e.to_string()),
    };
    Json(response.to_json())
}
