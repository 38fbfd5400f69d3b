//! lnvoucher - LNURL-withdraw voucher service
//!
//! Issues and redeems single- or multi-use withdraw vouchers: pre-funded
//! claim tickets that let the bearer of a link pull funds from a custodial
//! wallet, exactly once per voucher unit, via the LNURL-withdraw
//! challenge/callback protocol.
//!
//! # Architecture
//!
//! ```text
//! admin ──▶ VoucherLifecycle ──▶ VoucherStore
//!                                    ▲
//! bearer ─▶ RedemptionProtocol ──────┤
//!               │        │           │
//!               ▼        ▼           ▼
//!      ProcessingGuard  PaymentGateway ──▶ WebhookDispatcher
//! ```
//!
//! The redemption callback is the hard core: it acquires a per-token
//! processing marker, commits the secret as used *before* paying, and only
//! then invokes the payment gateway, so two concurrent claims of the same
//! token can never both be paid.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use lnvoucher::{
//!     CreateVoucherData, MemoryGuard, MemoryStore, RedemptionProtocol,
//!     ServiceConfig, VoucherLifecycle, WebhookDispatcher,
//! };
//! use lnvoucher::protocol::{DryRunGateway, PaymentGateway};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServiceConfig::default();
//!     let store = Arc::new(MemoryStore::new());
//!     let gateway: Arc<dyn PaymentGateway> = Arc::new(DryRunGateway);
//!
//!     let lifecycle = VoucherLifecycle::new(store.clone(), config.tokens);
//!     let protocol = RedemptionProtocol::new(
//!         store,
//!         Arc::new(MemoryGuard::new()),
//!         gateway.clone(),
//!         WebhookDispatcher::new(gateway),
//!         config,
//!     );
//!
//!     let voucher = lifecycle
//!         .create(
//!             CreateVoucherData {
//!                 title: "demo".into(),
//!                 min_withdrawable: 10,
//!                 max_withdrawable: 100,
//!                 uses: 5,
//!                 wait_time: 0,
//!                 is_unique: false,
//!                 webhook_url: None,
//!                 webhook_headers: None,
//!                 webhook_body: None,
//!                 custom_url: None,
//!             },
//!             "wallet-1",
//!         )
//!         .await?;
//!
//!     let challenge = protocol.challenge(&voucher.unique_hash).await?;
//!     protocol.callback(&challenge.k1, "lnbc...").await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod config;
pub mod error;
pub mod handlers;
pub mod lifecycle;
pub mod model;
pub mod protocol;
pub mod store;
pub mod webhook;

// Re-exports for convenience
pub use config::{CooldownScope, ServiceConfig, TokenStrategy};
pub use error::{Error, Result};
pub use lifecycle::VoucherLifecycle;
pub use model::{CreateVoucherData, Secret, TokenDeriver, Voucher, WithdrawChallenge};
pub use protocol::{PaymentGateway, PaymentRecord, RedemptionProtocol};
pub use store::{MemoryGuard, MemoryStore, ProcessingGuard, VoucherStore};
pub use webhook::WebhookDispatcher;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
