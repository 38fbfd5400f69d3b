//! Administrative CRUD endpoints for vouchers.
//!
//! Authentication itself lives in front of this service; the verified caller
//! identity arrives as a trusted `X-Wallet-Id` header (and, for the
//! `all_wallets` expansion, an `X-User-Wallets` list). Ownership is enforced
//! here: touching someone else's voucher is a 403.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::error::{Error, Result};
use crate::model::{CreateVoucherData, PaginatedVouchers, Voucher};

/// Query parameters for the listing endpoint.
#[derive(Debug, Deserialize)]
pub struct ListParams {
    /// Expand the listing to every wallet owned by the caller
    #[serde(default)]
    pub all_wallets: bool,
    /// Page size; 0 disables pagination
    #[serde(default)]
    pub limit: usize,
    /// Page start
    #[serde(default)]
    pub offset: usize,
}

/// Simple success acknowledgement.
#[derive(Debug, Serialize)]
pub struct SimpleStatus {
    /// Whether the operation succeeded
    pub success: bool,
    /// Human-readable outcome
    pub message: String,
}

fn caller_wallet(headers: &HeaderMap) -> Result<String> {
    headers
        .get("x-wallet-id")
        .and_then(|v| v.to_str().ok())
        .map(String::from)
        .ok_or_else(|| Error::validation("missing `X-Wallet-Id` header"))
}

fn caller_wallets(headers: &HeaderMap, fallback: &str) -> Vec<String> {
    headers
        .get("x-user-wallets")
        .and_then(|v| v.to_str().ok())
        .map(|raw| {
            raw.split(',')
                .map(|w| w.trim().to_string())
                .filter(|w| !w.is_empty())
                .collect()
        })
        .unwrap_or_else(|| vec![fallback.to_string()])
}

/// Fetch a voucher and verify the caller owns it.
async fn owned_voucher(state: &AppState, link_id: &str, wallet: &str) -> Result<Voucher> {
    let voucher = state.lifecycle.get(link_id).await?.ok_or(Error::NotFound)?;
    if voucher.wallet != wallet {
        return Err(Error::Forbidden);
    }
    Ok(voucher)
}

/// `GET /api/v1/links` - paginated listing, optionally across all of the
/// caller's wallets.
pub async fn list_links(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
) -> Result<Json<PaginatedVouchers>> {
    let wallet = caller_wallet(&headers)?;
    let wallets = if params.all_wallets {
        caller_wallets(&headers, &wallet)
    } else {
        vec![wallet]
    };

    let (data, total) = state
        .lifecycle
        .list(&wallets, params.limit, params.offset)
        .await?;
    Ok(Json(PaginatedVouchers { data, total }))
}

/// `GET /api/v1/links/{link_id}`
pub async fn retrieve_link(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(link_id): Path<String>,
) -> Result<Json<Voucher>> {
    let wallet = caller_wallet(&headers)?;
    let voucher = owned_voucher(&state, &link_id, &wallet).await?;
    Ok(Json(voucher))
}

/// `POST /api/v1/links` - create a voucher, answers 201.
pub async fn create_link(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(data): Json<CreateVoucherData>,
) -> Result<(StatusCode, Json<Voucher>)> {
    let wallet = caller_wallet(&headers)?;
    let voucher = state.lifecycle.create(data, &wallet).await?;
    Ok((StatusCode::CREATED, Json(voucher)))
}

/// `PUT /api/v1/links/{link_id}` - replace mutable fields; a changed `uses`
/// resizes the secret list.
pub async fn update_link(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(link_id): Path<String>,
    Json(data): Json<CreateVoucherData>,
) -> Result<Json<Voucher>> {
    let wallet = caller_wallet(&headers)?;
    owned_voucher(&state, &link_id, &wallet).await?;
    let voucher = state.lifecycle.update(&link_id, data).await?;
    Ok(Json(voucher))
}

/// `DELETE /api/v1/links/{link_id}`
pub async fn delete_link(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(link_id): Path<String>,
) -> Result<Json<SimpleStatus>> {
    let wallet = caller_wallet(&headers)?;
    owned_voucher(&state, &link_id, &wallet).await?;
    state.lifecycle.delete(&link_id).await?;
    Ok(Json(SimpleStatus {
        success: true,
        message: "Withdraw link deleted.".to_string(),
    }))
}
