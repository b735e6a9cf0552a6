use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use servispro_backend::rest;
use servispro_backend::state::BackendState;
use servispro_gateway_mock::{GatewayConfig, GatewayLimits};
use servispro_types::MIN_PHONE_DIGITS;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "servispro-backend", about = "ServisPro payment backend")]
struct Cli {
    /// HTTP/REST listen address.
    #[arg(long, default_value = "127.0.0.1:8000")]
    listen: SocketAddr,

    /// Lifetime of a texted one-time code, in seconds.
    #[arg(long, default_value = "300")]
    otp_ttl_secs: u64,

    /// Minimum gap between two codes for the same payment, in seconds.
    #[arg(long, default_value = "60")]
    otp_resend_secs: u64,

    /// Wrong guesses allowed per code.
    #[arg(long, default_value = "5")]
    max_otp_attempts: u32,

    /// Maximum payment records retained in memory.
    #[arg(long, default_value = "10000")]
    max_payments: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();
    if cli.max_payments == 0 {
        return Err("--max-payments must be at least 1".into());
    }

    let config = GatewayConfig {
        min_phone_digits: MIN_PHONE_DIGITS,
        otp_ttl_ms: cli.otp_ttl_secs * 1000,
        otp_resend_cooldown_ms: cli.otp_resend_secs * 1000,
        max_otp_attempts: cli.max_otp_attempts,
    };
    let limits = GatewayLimits {
        max_payments: cli.max_payments,
    };
    let state = Arc::new(BackendState::new(config, limits));

    info!(
        http = %cli.listen,
        otp_ttl_secs = cli.otp_ttl_secs,
        otp_resend_secs = cli.otp_resend_secs,
        max_payments = cli.max_payments,
        "starting ServisPro payment backend"
    );

    let listener = tokio::net::TcpListener::bind(cli.listen).await?;
    info!(addr = %cli.listen, "HTTP/REST server listening");
    axum::serve(listener, rest::router(state)).await?;
    Ok(())
}
