//! Domain model: vouchers, per-unit secrets and the LNURL wire types.
//!
//! A [`Voucher`] is a pre-funded claim ticket with `uses` redeemable units.
//! Each unit is a [`Secret`] carrying the `k1` claim token that proves the
//! right to redeem exactly that unit. Static vouchers expose one shared link
//! that serves units in ascending index order; per-unit vouchers expose a
//! distinct token per unit from creation.

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One redeemable unit within a voucher.
///
/// `used` is set exactly once by exactly one successful claim and never
/// reverts, even when the downstream payment fails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Secret {
    /// Unit position within the voucher; strictly increasing, never renumbered
    pub index: u32,
    /// The claim token (LNURL `k1`) proving the right to redeem this unit
    pub k1: String,
    /// Payable amount for this unit in sats; defaults to the voucher max
    pub amount: u64,
    /// Whether this unit has been claimed
    pub used: bool,
    /// When the unit was claimed
    pub used_at: Option<DateTime<Utc>>,
    /// Earliest claim time for this unit (per-unit cooldown scope)
    pub available_at: i64,
}

/// A withdraw voucher: pre-funded claim ticket for one or more payment units.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Voucher {
    /// Opaque unique identifier, generated at creation, immutable
    pub id: String,
    /// Funding wallet; immutable after creation, never custodied here
    pub wallet: String,
    /// Display title shown in the withdraw challenge
    pub title: String,
    /// Minimum withdrawable amount in sats
    pub min_withdrawable: u64,
    /// Maximum withdrawable amount in sats
    pub max_withdrawable: u64,
    /// Configured total number of redeemable units (1..=250)
    pub uses: u16,
    /// Cooldown in seconds between successive claims
    pub wait_time: u64,
    /// Per-unit mode: a distinct claim link per unit instead of one shared link
    pub is_unique: bool,
    /// Public share identifier, distinct from the admin `id`
    pub unique_hash: String,
    /// Salt mixed into derived claim tokens
    pub salt: String,
    /// UNIX timestamp before which no claim may succeed
    pub open_time: i64,
    /// Number of units already redeemed
    pub used: u16,
    /// Ordered redeemable units
    pub secrets: Vec<Secret>,
    /// Optional outbound notification URL fired after each successful claim
    pub webhook_url: Option<String>,
    /// Optional JSON object of headers for the webhook request
    pub webhook_headers: Option<String>,
    /// Optional JSON payload forwarded in the webhook body
    pub webhook_body: Option<String>,
    /// Optional alternate presentation URL
    pub custom_url: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Voucher {
    /// Whether every unit has been redeemed. A spent voucher rejects all
    /// further claims.
    pub fn is_spent(&self) -> bool {
        self.used >= self.uses
    }

    /// The next unused secret in ascending index order, if any.
    pub fn next_secret(&self) -> Option<&Secret> {
        self.secrets.iter().filter(|s| !s.used).min_by_key(|s| s.index)
    }

    /// Look up a secret by its claim token.
    pub fn secret_by_k1(&self, k1: &str) -> Option<&Secret> {
        self.secrets.iter().find(|s| s.k1 == k1)
    }

    /// Mutable lookup by claim token.
    pub fn secret_by_k1_mut(&mut self, k1: &str) -> Option<&mut Secret> {
        self.secrets.iter_mut().find(|s| s.k1 == k1)
    }
}

/// Input for voucher creation and update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateVoucherData {
    /// Display title
    pub title: String,
    /// Minimum withdrawable amount in sats, >= 1
    pub min_withdrawable: u64,
    /// Maximum withdrawable amount in sats, >= min
    pub max_withdrawable: u64,
    /// Number of redeemable units, 1..=250
    pub uses: u16,
    /// Cooldown in seconds between successive claims
    #[serde(default)]
    pub wait_time: u64,
    /// Per-unit mode flag
    #[serde(default)]
    pub is_unique: bool,
    /// Optional webhook URL
    #[serde(default)]
    pub webhook_url: Option<String>,
    /// Optional webhook headers (must parse as a JSON object)
    #[serde(default)]
    pub webhook_headers: Option<String>,
    /// Optional webhook body (must parse as JSON)
    #[serde(default)]
    pub webhook_body: Option<String>,
    /// Optional alternate presentation URL
    #[serde(default)]
    pub custom_url: Option<String>,
}

/// Paginated admin listing.
#[derive(Debug, Serialize, Deserialize)]
pub struct PaginatedVouchers {
    /// One page of vouchers
    pub data: Vec<Voucher>,
    /// Total matching vouchers across all pages
    pub total: usize,
}

// ============================================================================
// Claim token derivation
// ============================================================================

/// Strategy for producing per-unit claim tokens.
///
/// Tokens are materialized into [`Secret`]s at creation/resize time, so both
/// strategies sit behind the same secret interface. `derive` must be
/// collision-resistant within a voucher.
pub trait TokenDeriver: Send + Sync {
    /// Produce the claim token for unit `index` of the given voucher.
    fn derive(&self, voucher_id: &str, salt: &str, index: u32) -> String;
}

/// Independent random tokens, stored on the secret. The default.
pub struct RandomTokens;

impl TokenDeriver for RandomTokens {
    fn derive(&self, _voucher_id: &str, _salt: &str, _index: u32) -> String {
        random_hash()
    }
}

/// Deterministic tokens: sha256 over voucher id, salt and unit index.
///
/// Stable across calls, so a token can be re-derived instead of stored.
pub struct DerivedTokens;

impl TokenDeriver for DerivedTokens {
    fn derive(&self, voucher_id: &str, salt: &str, index: u32) -> String {
        let mut hasher = Sha256::new();
        hasher.update(voucher_id.as_bytes());
        hasher.update(salt.as_bytes());
        hasher.update(index.to_be_bytes());
        hex::encode(hasher.finalize())
    }
}

/// A 32-character random hex identifier, used for voucher ids, share hashes
/// and stored claim tokens.
pub fn random_hash() -> String {
    let mut bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

// ============================================================================
// LNURL wire types
// ============================================================================

/// The withdraw challenge, exactly in LNURL-withdraw wire shape.
///
/// Amounts are in millisats on the wire; the voucher stores sats.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawChallenge {
    /// Always `"withdrawRequest"`
    pub tag: String,
    /// Where the wallet submits the payment request
    pub callback: String,
    /// The claim token for the unit being served
    pub k1: String,
    /// Minimum withdrawable in millisats
    #[serde(rename = "minWithdrawable")]
    pub min_withdrawable: u64,
    /// Maximum withdrawable in millisats
    #[serde(rename = "maxWithdrawable")]
    pub max_withdrawable: u64,
    /// Voucher title
    #[serde(rename = "defaultDescription")]
    pub default_description: String,
}

impl WithdrawChallenge {
    /// Build the challenge for one unit of a voucher.
    pub fn new(voucher: &Voucher, secret: &Secret, callback: String) -> Self {
        Self {
            tag: "withdrawRequest".to_string(),
            callback,
            k1: secret.k1.clone(),
            min_withdrawable: voucher.min_withdrawable * 1000,
            max_withdrawable: voucher.max_withdrawable * 1000,
            default_description: voucher.title.clone(),
        }
    }
}

/// Every reply the LNURL endpoints can produce, handled exhaustively at the
/// serialization boundary.
#[derive(Debug)]
pub enum LnurlResponse {
    /// The withdraw challenge object
    Withdraw(WithdrawChallenge),
    /// `{"status": "OK"}`
    Success,
    /// `{"status": "ERROR", "reason": ...}`, always with HTTP 200
    Error(String),
}

impl LnurlResponse {
    /// Serialize to the protocol's JSON body.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            LnurlResponse::Withdraw(challenge) => {
                serde_json::to_value(challenge).unwrap_or_else(
                    |_| serde_json::json!({ "status": "ERROR", "reason": "Serialization failed." }),
                )
            }
            LnurlResponse::Success => serde_json::json!({ "status": "OK" }),
            LnurlResponse::Error(reason) => {
                serde_json::json!({ "status": "ERROR", "reason": reason })
            }
        }
    }
}
