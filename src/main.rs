//! lnvoucher server
//!
//! LNURL-withdraw voucher issuance and redemption service.

use std::sync::Arc;

use clap::Parser;

use lnvoucher::handlers::{self, AppState};
use lnvoucher::protocol::DryRunGateway;
use lnvoucher::{
    CooldownScope, MemoryGuard, MemoryStore, PaymentGateway, RedemptionProtocol, ServiceConfig,
    TokenStrategy, VoucherLifecycle, WebhookDispatcher,
};

/// lnvoucher server
#[derive(Parser, Debug)]
#[command(name = "lnvoucherd")]
#[command(version)]
#[command(about = "LNURL-withdraw voucher issuance and redemption service")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "3100")]
    port: u16,

    /// Host to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Public base URL advertised in withdraw challenges (defaults to the
    /// bind address)
    #[arg(long)]
    public_url: Option<String>,

    /// Cooldown scope for successful claims
    #[arg(long, value_enum, default_value = "per-voucher")]
    cooldown: CooldownScope,

    /// Claim token strategy
    #[arg(long, value_enum, default_value = "random")]
    tokens: TokenStrategy,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let filter = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = ServiceConfig {
        public_url: args
            .public_url
            .unwrap_or_else(|| format!("http://{}:{}", args.host, args.port)),
        host: args.host,
        port: args.port,
        cooldown: args.cooldown,
        tokens: args.tokens,
    };

    let store = Arc::new(MemoryStore::new());
    let guard = Arc::new(MemoryGuard::new());
    let gateway: Arc<dyn PaymentGateway> = Arc::new(DryRunGateway);
    tracing::warn!("No payment backend wired in; running with the dry-run gateway");

    let lifecycle = Arc::new(VoucherLifecycle::new(store.clone(), config.tokens));
    let protocol = Arc::new(RedemptionProtocol::new(
        store,
        guard,
        gateway.clone(),
        WebhookDispatcher::new(gateway),
        config.clone(),
    ));

    let app = handlers::router(AppState {
        lifecycle,
        protocol,
    });

    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    tracing::info!(
        "lnvoucher listening on {} (public URL {})",
        config.bind_addr(),
        config.public_url
    );
    axum::serve(listener, app).await?;
    Ok(())
}
