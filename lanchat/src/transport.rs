//! TCP transport: server accept loop (one session task per connection) and client connect.

use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use lanchat_core::{SenderId, SessionError};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::Config;
use crate::discovery;
use crate::error::{ChatError, Result};
use crate::session::{run_session, Incoming, SessionConfig, SessionEnd};
use crate::shutdown::{self, ShutdownRx};

/// Lines queued per session before the console blocks.
pub const LINE_QUEUE: usize = 64;

const SERVER_NAME: &str = "server";
const CLIENT_NAME: &str = "client";
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Bind the server port, start announcing, and serve until shutdown. Bind failure is fatal.
pub async fn run_server(
    config: Arc<Config>,
    lines: broadcast::Sender<String>,
    inbox: mpsc::UnboundedSender<Incoming>,
    shutdown: ShutdownRx,
) -> Result<()> {
    let session = Arc::new(SessionConfig::from_config(
        &config,
        local_identity(&config, SERVER_NAME)?,
    ));
    let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, config.server_port)).await?;
    info!(port = config.server_port, "server listening");

    let announcer_config = config.clone();
    let announcer_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = discovery::run_announcer(&announcer_config, announcer_shutdown).await {
            error!(error = %e, "announcer stopped");
        }
    });

    serve(listener, session, lines, inbox, shutdown).await
}

/// Accept connections and spawn an independent session for each. Every session
/// gets its own copy of each console line.
pub async fn serve(
    listener: TcpListener,
    session: Arc<SessionConfig>,
    lines: broadcast::Sender<String>,
    inbox: mpsc::UnboundedSender<Incoming>,
    mut shutdown: ShutdownRx,
) -> Result<()> {
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => spawn_session(
                    stream,
                    peer,
                    session.clone(),
                    lines.subscribe(),
                    inbox.clone(),
                    shutdown.clone(),
                ),
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },
            _ = shutdown::requested(&mut shutdown) => {
                info!("server stopping");
                return Ok(());
            }
        }
    }
}

fn spawn_session(
    stream: TcpStream,
    peer: SocketAddr,
    session: Arc<SessionConfig>,
    console: broadcast::Receiver<String>,
    inbox: mpsc::UnboundedSender<Incoming>,
    shutdown: ShutdownRx,
) {
    let span = info_span!("session", id = %Uuid::new_v4(), %peer);
    tokio::spawn(
        async move {
            let (tx, rx) = mpsc::channel(LINE_QUEUE);
            let forward = tokio::spawn(forward_console(console, tx));
            match run_session(stream, &session, rx, inbox, shutdown).await {
                Ok(end) => info!(?end, "session ended"),
                Err(e) => warn!(error = %e, "session failed"),
            }
            forward.abort();
        }
        .instrument(span),
    );
}

async fn forward_console(mut console: broadcast::Receiver<String>, tx: mpsc::Sender<String>) {
    loop {
        match console.recv().await {
            Ok(line) => {
                if tx.send(line).await.is_err() {
                    return;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "session fell behind console input")
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}

/// Discover the server (unless `server` is given), connect, and run one session.
pub async fn run_client(
    config: &Config,
    server: Option<SocketAddr>,
    lines: mpsc::Receiver<String>,
    inbox: mpsc::UnboundedSender<Incoming>,
    shutdown: ShutdownRx,
) -> Result<SessionEnd> {
    let session = SessionConfig::from_config(config, local_identity(config, &default_client_name())?);
    let addr = match server {
        Some(addr) => addr,
        None => discovery::discover_server(config, shutdown.clone()).await?,
    };
    let stream = connect(addr, config.connect_timeout()).await?;
    let span = info_span!("session", id = %Uuid::new_v4(), peer = %addr);
    run_session(stream, &session, lines, inbox, shutdown)
        .instrument(span)
        .await
}

/// TCP connect bounded by `timeout`.
pub async fn connect(addr: SocketAddr, timeout: Duration) -> Result<TcpStream> {
    let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| {
            io::Error::new(
                io::ErrorKind::TimedOut,
                format!("connect to {addr} timed out after {timeout:?}"),
            )
        })??;
    debug!(%addr, "tcp connected");
    Ok(stream)
}

/// Configured name, or `fallback`.
pub fn local_identity(config: &Config, fallback: &str) -> Result<SenderId> {
    let name = config.name.as_deref().unwrap_or(fallback);
    SenderId::new(name).map_err(|e| ChatError::Session(SessionError::Encode(e)))
}

/// $USER if it fits the sender field, else "client".
fn default_client_name() -> String {
    std::env::var("USER")
        .ok()
        .filter(|u| !u.is_empty() && SenderId::new(u).is_ok())
        .unwrap_or_else(|| CLIENT_NAME.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_falls_back() {
        let config = Config::default();
        assert_eq!(local_identity(&config, "server").unwrap().name(), "server");
        let named = Config {
            name: Some("alice".into()),
            ..Config::default()
        };
        assert_eq!(local_identity(&named, "server").unwrap().name(), "alice");
    }

    #[test]
    fn identity_too_long_is_an_error() {
        let config = Config {
            name: Some("a-name-that-is-far-too-long".into()),
            ..Config::default()
        };
        assert!(matches!(
            local_identity(&config, "server"),
            Err(ChatError::Session(SessionError::Encode(_)))
        ));
    }

    #[tokio::test]
    async fn connect_refused_is_socket_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let err = connect(addr, Duration::from_secs(2)).await.unwrap_err();
        assert!(matches!(err, ChatError::Socket(_)));
    }

    #[tokio::test]
    async fn server_stops_on_shutdown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let session = Arc::new(SessionConfig::new(SenderId::new("server").unwrap()));
        let (lines, _) = broadcast::channel(4);
        let (inbox, _inbox_rx) = mpsc::unbounded_channel();
        let (stop, shutdown) = shutdown::channel();
        let task = tokio::spawn(serve(listener, session, lines, inbox, shutdown));
        stop.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}
