// LanChat: LAN chat server and client with multicast discovery.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use lanchat::{config, console, shutdown, transport, Config, SessionEnd};
use tokio::io::BufReader;
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};

/// Chat on the local network. The server announces itself over multicast;
/// clients find it, connect, and exchange lines of text.
#[derive(Parser, Debug)]
#[command(name = "lanchat", author, version, about, long_about = None)]
struct Cli {
    /// Config file (default: ~/.config/lanchat/config.toml, then /etc/lanchat/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Sender name shown to the other side (max 16 bytes)
    #[arg(short, long, global = true)]
    name: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Accept clients and announce on the multicast group
    Server,
    /// Discover the server and chat with it
    Client {
        /// Skip discovery and connect to this address
        #[arg(long)]
        connect: Option<SocketAddr>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(format!(
                    "lanchat={level},lanchat_core={level}"
                ))
            }),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let mut cfg = config::load(cli.config.as_deref());
    if let Some(name) = cli.name {
        cfg.name = Some(name);
    }

    let rt = tokio::runtime::Runtime::new().context("failed to start runtime")?;
    let result = rt.block_on(run(cli.command, cfg));
    // Stdin reads block a runtime thread; don't wait for them.
    rt.shutdown_timeout(Duration::from_millis(100));
    result
}

async fn run(command: Command, cfg: Config) -> anyhow::Result<()> {
    let (shutdown_tx, shutdown_rx) = shutdown::channel();
    tokio::spawn(async move {
        match shutdown::signal().await {
            Ok(()) => {
                info!("shutdown requested");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for signals");
                // Keep the sender alive so sessions are not torn down.
                std::future::pending::<()>().await;
            }
        }
    });

    let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
    tokio::spawn(console::display_loop(inbox_rx, true));

    match command {
        Command::Server => {
            let (lines_tx, _) = broadcast::channel(transport::LINE_QUEUE);
            let console_tx = lines_tx.clone();
            tokio::spawn(async move {
                if let Err(e) =
                    console::broadcast_lines(BufReader::new(tokio::io::stdin()), console_tx, true)
                        .await
                {
                    warn!(error = %e, "console input failed");
                }
            });
            transport::run_server(Arc::new(cfg), lines_tx, inbox_tx, shutdown_rx)
                .await
                .context("server failed")?;
        }
        Command::Client { connect } => {
            let (lines_tx, lines_rx) = mpsc::channel(transport::LINE_QUEUE);
            tokio::spawn(async move {
                if let Err(e) =
                    console::forward_lines(BufReader::new(tokio::io::stdin()), lines_tx, true).await
                {
                    warn!(error = %e, "console input failed");
                }
            });
            let end = transport::run_client(&cfg, connect, lines_rx, inbox_tx, shutdown_rx)
                .await
                .context("client failed")?;
            if end == SessionEnd::PeerClosed {
                println!("\x1b[2K\rServer closed the connection.");
            }
        }
    }
    Ok(())
}
