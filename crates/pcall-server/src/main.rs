//! pcall-server binary: the demo procedures and chat room over HTTP and
//! WebSocket.

use anyhow::Result;
use clap::Parser;
use pcall_config::PcallConfig;
use pcall_server::demo::{self, DemoContext};
use pcall_server::RpcServer;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "pcall-server", version, about = "Serve pcall procedures and socket events")]
struct Cli {
    /// Config file (TOML or JSON). Defaults to the user config dir.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the bind host
    #[arg(long)]
    host: Option<String>,

    /// Override the bind port
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    let cli = Cli::parse();

    let mut config = PcallConfig::load_or_default(cli.config.as_deref())?;
    config.apply_env_overrides()?;
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    config.server.validate()?;

    let router = demo::router().flatten()?;
    info!(procedures = ?router.paths(), "Router ready");

    let server = RpcServer::new(config.server, router, DemoContext::from_headers)
        .on_error(|err| tracing::debug!(status = %err.status(), message = %err.message(), "RPC error"));
    demo::install_chat(server.io());

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl-C, shutting down");
                signal.cancel();
            }
            Err(e) => error!(error = %e, "Failed to listen for Ctrl-C"),
        }
    });

    server.serve(shutdown.cancelled_owned()).await?;
    Ok(())
}
