//! Return-endpoint service for the hosted payment gateway.

use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use reclaim_client::{HttpBackend, HttpGateway};
use reclaim_returns::ledger::{self, ReconciliationLedger};
use reclaim_returns::AppState;

#[derive(Parser)]
#[command(name = "reclaim-returns", about = "Payment gateway success/cancel endpoints")]
struct Cli {
    /// HTTP port to listen on.
    #[arg(long, env = "RECLAIM_RETURNS_PORT", default_value_t = 3080)]
    port: u16,

    /// Address to bind.
    #[arg(long, env = "RECLAIM_RETURNS_BIND", default_value = "0.0.0.0")]
    bind: String,

    /// Marketplace API base URL. When set, first verified success arrivals
    /// are confirmed with `POST /payments/{id}/confirm`. Needs --verify-sessions.
    #[arg(long, env = "RECLAIM_BACKEND_URL")]
    backend_url: Option<String>,

    /// Bearer token for the marketplace API.
    #[arg(long, env = "RECLAIM_BACKEND_TOKEN", hide_env_values = true)]
    backend_token: Option<String>,

    /// Payment gateway API base URL (needed for --verify-sessions).
    #[arg(long, env = "RECLAIM_GATEWAY_URL")]
    gateway_url: Option<String>,

    /// Payment gateway secret key.
    #[arg(long, env = "RECLAIM_GATEWAY_KEY", hide_env_values = true)]
    gateway_key: Option<String>,

    /// Look the session up at the gateway before marking a purchase successful.
    #[arg(long, env = "RECLAIM_VERIFY_SESSIONS")]
    verify_sessions: bool,

    /// Hours a settled payment id is remembered. Keep it at least as long as
    /// a gateway session lives.
    #[arg(long, env = "RECLAIM_LEDGER_RETENTION_HOURS", default_value_t = ledger::DEFAULT_RETENTION_HOURS)]
    ledger_retention_hours: i64,

    /// Most payment ids remembered at once.
    #[arg(long, env = "RECLAIM_LEDGER_CAPACITY", default_value_t = ledger::DEFAULT_CAPACITY)]
    ledger_capacity: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    if cli.backend_url.is_some() && !cli.verify_sessions {
        bail!("--backend-url requires --verify-sessions; orders are only confirmed for verified sessions");
    }
    if cli.ledger_retention_hours < 1 {
        bail!("--ledger-retention-hours must be at least 1");
    }

    let retention = chrono::Duration::try_hours(cli.ledger_retention_hours)
        .context("--ledger-retention-hours is out of range")?;
    let ledger = ReconciliationLedger::new()
        .with_retention(retention)
        .with_capacity(cli.ledger_capacity);
    let mut state = AppState::new().with_ledger(ledger);
    if let Some(url) = &cli.backend_url {
        let mut backend = HttpBackend::new(url);
        if let Some(token) = &cli.backend_token {
            backend = backend.with_token(token);
        }
        info!(backend = %url, "confirming payments with backend");
        state = state.with_backend(backend);
    }
    if cli.verify_sessions {
        let (Some(url), Some(key)) = (&cli.gateway_url, &cli.gateway_key) else {
            bail!("--verify-sessions requires --gateway-url and --gateway-key");
        };
        info!(gateway = %url, "verifying sessions before marking success");
        state = state.with_session_verification(HttpGateway::new(url, key));
    }

    let addr = format!("{}:{}", cli.bind, cli.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(address = %addr, "listening");

    reclaim_returns::serve(listener, Arc::new(state)).await?;
    Ok(())
}
