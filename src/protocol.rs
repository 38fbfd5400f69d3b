//! The LNURL-withdraw redemption protocol.
//!
//! Two steps per unit: a read-only challenge describing how to redeem, and a
//! callback that actually claims the secret and pays the bearer's invoice.
//!
//! # State machine
//!
//! ```text
//! AVAILABLE ──challenge──▶ AVAILABLE ──callback──▶ PROCESSING ──pay ok──▶ PAID
//!                                                      │
//!                                                      └──pay fails──▶ marker
//!                                                          released, secret
//!                                                          stays consumed
//! ```
//!
//! The callback commits the secret as used *before* invoking the payment
//! gateway. A slow gateway call therefore cannot be double-submitted: any
//! concurrent claim of the same token is stopped first by the processing
//! marker and then by the committed `used` flag.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::config::{CooldownScope, ServiceConfig};
use crate::error::{Error, Result};
use crate::model::{random_hash, Secret, Voucher, WithdrawChallenge};
use crate::store::{ProcessingGuard, VoucherStore};
use crate::webhook::WebhookDispatcher;

/// Receipt returned by the payment gateway.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaymentRecord {
    /// Hash of the paid invoice
    pub payment_hash: String,
    /// Free-form metadata; webhook outcome is recorded here
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// The external payment engine, reduced to one call: attempt to pay an
/// invoice up to a cap, funded by the given wallet.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Pay `payment_request` from `wallet`, spending at most `max_sat`.
    async fn pay_invoice(
        &self,
        wallet: &str,
        payment_request: &str,
        max_sat: u64,
    ) -> Result<PaymentRecord>;

    /// Persist updated payment metadata (webhook outcome).
    async fn update_payment(&self, payment: &PaymentRecord) -> Result<()>;
}

/// Gateway that logs the would-be payment and reports success.
///
/// For demos and development without a wallet backend. Never wire this into a
/// deployment that holds real funds.
pub struct DryRunGateway;

#[async_trait]
impl PaymentGateway for DryRunGateway {
    async fn pay_invoice(
        &self,
        wallet: &str,
        payment_request: &str,
        max_sat: u64,
    ) -> Result<PaymentRecord> {
        tracing::warn!(
            wallet,
            max_sat,
            pr = %payment_request,
            "Dry-run gateway: pretending the invoice was paid"
        );
        Ok(PaymentRecord {
            payment_hash: random_hash(),
            extra: serde_json::Map::new(),
        })
    }

    async fn update_payment(&self, payment: &PaymentRecord) -> Result<()> {
        tracing::debug!(payment_hash = %payment.payment_hash, "Dry-run gateway: payment updated");
        Ok(())
    }
}

/// The challenge/callback state machine.
pub struct RedemptionProtocol {
    store: Arc<dyn VoucherStore>,
    guard: Arc<dyn ProcessingGuard>,
    gateway: Arc<dyn PaymentGateway>,
    webhooks: WebhookDispatcher,
    config: ServiceConfig,
}

impl RedemptionProtocol {
    /// Assemble the protocol from its collaborators.
    pub fn new(
        store: Arc<dyn VoucherStore>,
        guard: Arc<dyn ProcessingGuard>,
        gateway: Arc<dyn PaymentGateway>,
        webhooks: WebhookDispatcher,
        config: ServiceConfig,
    ) -> Self {
        Self {
            store,
            guard,
            gateway,
            webhooks,
            config,
        }
    }

    /// Earliest timestamp at which the given unit may be claimed.
    fn window_start(&self, voucher: &Voucher, secret: &Secret) -> i64 {
        match self.config.cooldown {
            CooldownScope::PerVoucher => voucher.open_time,
            CooldownScope::PerUnit => secret.available_at,
        }
    }

    /// The challenge step. Read-only and idempotent: calling it repeatedly
    /// with no intervening callback serves the same unit each time.
    ///
    /// Static vouchers are addressed by their public id and serve the lowest
    /// unused unit; per-unit vouchers are addressed by a claim token and
    /// resolve to that token's own secret.
    pub async fn challenge(&self, id_or_k1: &str) -> Result<WithdrawChallenge> {
        let now = Utc::now().timestamp();

        if let Some(voucher) = self.store.get_by_unique_hash(id_or_k1).await? {
            if voucher.is_unique {
                return Err(Error::validation(
                    "Withdraw link is not static. Only use 'id' for static links.",
                ));
            }
            let secret = voucher.next_secret().ok_or(Error::Spent)?;
            let opens = self.window_start(&voucher, secret);
            if now < opens {
                return Err(Error::NotYetActive((opens - now) as u64));
            }
            return Ok(WithdrawChallenge::new(
                &voucher,
                secret,
                self.config.callback_url(),
            ));
        }

        let voucher = self
            .store
            .get_by_k1(id_or_k1)
            .await?
            .ok_or(Error::NotFound)?;
        let secret = voucher.secret_by_k1(id_or_k1).ok_or(Error::InvalidToken)?;
        if secret.used {
            return Err(Error::Spent);
        }
        let opens = self.window_start(&voucher, secret);
        if now < opens {
            return Err(Error::NotYetActive((opens - now) as u64));
        }
        Ok(WithdrawChallenge::new(
            &voucher,
            secret,
            self.config.callback_url(),
        ))
    }

    /// The callback step: claim the secret and pay the invoice.
    ///
    /// Ordering is deliberate: guard first, then commit the secret as used,
    /// then pay. On payment failure the marker is released so a retry with a
    /// fresh payment request is possible in principle, but the secret stays
    /// consumed.
    pub async fn callback(&self, k1: &str, payment_request: &str) -> Result<()> {
        let voucher = self.store.get_by_k1(k1).await?.ok_or(Error::NotFound)?;
        let secret = voucher
            .secret_by_k1(k1)
            .ok_or(Error::InvalidToken)?
            .clone();
        if secret.used {
            return Err(Error::Spent);
        }

        let now = Utc::now().timestamp();
        let opens = self.window_start(&voucher, &secret);
        if now < opens {
            return Err(Error::NotYetActive((opens - now) as u64));
        }

        if !self.guard.acquire(k1).await? {
            return Err(Error::DuplicateProcessing);
        }

        // Commit the claim before paying so concurrent requests can't reuse
        // the secret while the gateway call is in flight.
        let scope = self.config.cooldown;
        let token = k1.to_string();
        let updated = match self
            .store
            .update_with(
                &voucher.id,
                Box::new(move |v| {
                    let now = Utc::now().timestamp();
                    let wait = v.wait_time as i64;
                    let s = v.secret_by_k1_mut(&token).ok_or(Error::InvalidToken)?;
                    if s.used {
                        return Err(Error::Spent);
                    }
                    s.used = true;
                    s.used_at = Some(Utc::now());
                    if scope == CooldownScope::PerUnit {
                        s.available_at = now + wait;
                    }
                    v.used += 1;
                    if scope == CooldownScope::PerVoucher {
                        v.open_time = now + wait;
                    }
                    Ok(())
                }),
            )
            .await
        {
            Ok(v) => v,
            Err(e) => {
                self.release_marker(k1).await;
                return Err(e);
            }
        };

        match self
            .gateway
            .pay_invoice(&voucher.wallet, payment_request, secret.amount)
            .await
        {
            Ok(payment) => {
                self.release_marker(k1).await;
                tracing::info!(
                    voucher_id = %voucher.id,
                    unit = secret.index,
                    payment_hash = %payment.payment_hash,
                    "Withdraw paid"
                );
                if updated.webhook_url.is_some() {
                    self.webhooks
                        .dispatch_detached(updated, payment, payment_request.to_string());
                }
                Ok(())
            }
            Err(e) => {
                self.release_marker(k1).await;
                tracing::warn!(
                    voucher_id = %voucher.id,
                    unit = secret.index,
                    error = %e,
                    "Payment failed; secret stays consumed"
                );
                match e {
                    Error::PaymentFailed(_) => Err(e),
                    other => Err(Error::PaymentFailed(other.to_string())),
                }
            }
        }
    }

    async fn release_marker(&self, k1: &str) {
        if let Err(e) = self.guard.release(k1).await {
            tracing::error!(error = %e, "Failed to release processing marker");
        }
    }
}
