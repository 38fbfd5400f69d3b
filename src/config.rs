//! Service configuration.
//!
//! A single [`ServiceConfig`] is built at process start (from CLI flags in the
//! binary, or literally in tests) and handed to every component constructor.
//! There are no ambient singletons.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Which scope the claim cooldown applies to.
///
/// Historical revisions of this protocol disagreed, so it is an explicit
/// configuration choice rather than an inherited ambiguity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum CooldownScope {
    /// A successful claim locks the whole voucher for `wait_time` seconds.
    #[default]
    PerVoucher,
    /// Each unit carries its own availability; claiming one unit never
    /// delays another.
    PerUnit,
}

/// How per-unit claim tokens are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum TokenStrategy {
    /// Independent random tokens stored on each secret.
    #[default]
    Random,
    /// Tokens derived as sha256(voucher id, salt, unit index).
    Derived,
}

/// Top-level service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Public base URL used to build challenge callback URLs
    pub public_url: String,
    /// Cooldown scope for successful claims
    pub cooldown: CooldownScope,
    /// Claim token strategy
    pub tokens: TokenStrategy,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3100,
            public_url: "http://127.0.0.1:3100".to_string(),
            cooldown: CooldownScope::default(),
            tokens: TokenStrategy::default(),
        }
    }
}

impl ServiceConfig {
    /// The absolute callback URL advertised in every withdraw challenge.
    pub fn callback_url(&self) -> String {
        format!(
            "{}/api/v1/lnurl/cb",
            self.public_url.trim_end_matches('/')
        )
    }

    /// Socket address string for the listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
