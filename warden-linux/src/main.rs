// LineWarden daemon: modem caller-ID monitor with remote call screening.

mod client;
mod config;
mod modem;
mod monitor;

use anyhow::Context;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use warden_core::{DeviceIdentity, PayloadCodec, WardenCore};

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() -> anyhow::Result<()> {
    for arg in std::env::args().skip(1) {
        if arg == "--version" || arg == "-V" {
            println!("warden-linux {VERSION}");
            return Ok(());
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cfg = config::load().context("configuration error")?;

    // Single cooperative control flow: one thread owns both the modem handle
    // and the HTTP session for the process lifetime.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run(cfg))
}

async fn run(cfg: config::Config) -> anyhow::Result<()> {
    let identity = DeviceIdentity::new(cfg.device.id.clone(), cfg.device.auth_token.clone());
    let codec = PayloadCodec::new(&identity);
    let client = client::ScreeningClient::new(
        cfg.server.url.clone(),
        identity.device_id(),
        identity.auth_secret(),
        codec,
    )
    .context("failed to build HTTP client")?;

    let mut modem = modem::ModemSession::new(cfg.modem.clone());
    modem
        .open()
        .await
        .context("failed to open modem port at startup")?;
    tracing::info!(device = %cfg.modem.device, baud = cfg.modem.baud, "modem ready");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("shutdown signal received, stopping");
        let _ = shutdown_tx.send(true);
    });

    let mut core = WardenCore::new();
    monitor::run(&mut core, &mut modem, &client, shutdown_rx).await;
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM (Unix).
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
