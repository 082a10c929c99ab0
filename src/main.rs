//! Entry point: CLI parsing, bring-up ordering, and graceful shutdown.
//!
//! Grounded on the original's `cmd/`/`setup.go` bring-up order (config →
//! logger → CA → proxy → browser → HTTP server) and the teacher's
//! `clap`-derived CLI shape.

mod adapters;
mod browser;
mod cert;
mod config;
mod error;
mod gateway;
mod logging;
mod message;
mod orchestrator;
mod proxy;
mod tokenizer;
mod util;

use browser::Browser;
use cert::Authority;
use clap::{Parser, Subcommand};
use config::Config;
use orchestrator::Orchestrator;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::info;

#[derive(Parser)]
#[command(name = "aichat-proxy", version, about = "OpenAI-compatible chat-completions proxy backed by real browser sessions against consumer AI chat websites.")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Runs the MITM proxy, browser supervisor, and HTTP gateway.
    Serve,
    /// Certificate authority maintenance.
    Cert {
        #[command(subcommand)]
        action: CertAction,
    },
}

#[derive(Subcommand)]
enum CertAction {
    /// Prints the CA certificate in PEM form, generating one first if needed.
    Export,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load()?;
    logging::init(&config);

    match cli.command {
        Command::Serve => serve(config).await,
        Command::Cert { action: CertAction::Export } => cert_export(&config),
    }
}

fn cert_export(config: &Config) -> anyhow::Result<()> {
    let authority = Authority::load_or_create(&config.certs_dir)?;
    print!("{}", authority.cert_pem);
    Ok(())
}

async fn serve(config: Config) -> anyhow::Result<()> {
    info!(proxy_addr = %config.proxy_addr, server_addr = %config.server_addr, "starting aichat-proxy");

    let authority = Authority::load_or_create(&config.certs_dir)?;

    let (proxy_channels, receivers) = proxy::ProxyChannels::build();
    let browser = Arc::new(Browser::connect(&config.webdriver_url).await?);
    let orchestrator = Arc::new(Orchestrator::new(browser.clone(), receivers));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let proxy_addr: SocketAddr = config.proxy_addr.parse()?;
    let proxy_shutdown = shutdown_rx.clone();
    let proxy_task = tokio::spawn(async move {
        if let Err(e) = proxy::serve(&authority, proxy_addr, proxy_channels, proxy_shutdown).await {
            tracing::error!("mitm proxy exited: {e}");
        }
    });

    let state = gateway::AppState { orchestrator, api_keys: Arc::new(config.api_keys.clone()) };
    let app = gateway::router(state);
    let server_addr: SocketAddr = config.server_addr.parse()?;
    let listener = tokio::net::TcpListener::bind(server_addr).await?;

    info!("gateway listening on {server_addr}");
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(wait_for_shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    let _ = proxy_task.await;
    Ok(())
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
