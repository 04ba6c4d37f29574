//! Chat session over one TCP connection: a spawned receive task plus the send loop.
//!
//! Each connection owns its `SessionCore`, so connection state is never shared
//! between sessions. Decoded messages go to an mpsc inbox; the display sink
//! lives elsewhere.

use std::io;
use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};

use lanchat_core::{ChatMessage, Credentials, LineAction, SenderId, SessionCore, PDU_SIZE};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{ChatError, Result};
use crate::shutdown::{self, ShutdownRx};

/// Per-session settings shared by every connection of a process.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub identity: SenderId,
    pub credentials: Credentials,
    pub verify_checksum: bool,
    pub max_recv_retries: u32,
}

impl SessionConfig {
    pub fn new(identity: SenderId) -> Self {
        Self {
            identity,
            credentials: Credentials::default(),
            verify_checksum: true,
            max_recv_retries: 3,
        }
    }

    pub fn from_config(config: &Config, identity: SenderId) -> Self {
        Self {
            identity,
            credentials: config.credentials(),
            verify_checksum: config.verify_checksum,
            max_recv_retries: config.max_recv_retries,
        }
    }
}

/// A chat message received on one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Incoming {
    pub peer: SocketAddr,
    pub message: ChatMessage,
}

/// Why a session ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Local `exit` line.
    LocalExit,
    /// Peer closed or reset the connection.
    PeerClosed,
    Shutdown,
}

enum RecvOutcome {
    PeerClosed,
    Cancelled,
    Failed(io::Error),
}

/// Run one session to completion: authenticate, exchange lines until exit, peer close or shutdown.
///
/// When `lines` closes the session keeps receiving.
pub async fn run_session(
    stream: TcpStream,
    config: &SessionConfig,
    mut lines: mpsc::Receiver<String>,
    inbox: mpsc::UnboundedSender<Incoming>,
    mut shutdown: ShutdownRx,
) -> Result<SessionEnd> {
    let peer = stream.peer_addr()?;
    let mut core =
        SessionCore::new(config.identity).with_checksum_verification(config.verify_checksum);
    establish(&mut core, &config.credentials, peer)?;

    let (reader, mut writer) = stream.into_split();
    let (cancel_tx, cancel_rx) = shutdown::channel();
    let mut receiver = tokio::spawn(receive_loop(
        reader,
        peer,
        config.verify_checksum,
        config.max_recv_retries,
        inbox,
        cancel_rx,
    ));
    let mut receiver_finished = false;
    let mut input_open = true;

    let end = loop {
        tokio::select! {
            line = lines.recv(), if input_open => match line {
                Some(line) => match core.on_line(&line, unix_now()) {
                    Ok(LineAction::Exit) => break Ok(SessionEnd::LocalExit),
                    Ok(LineAction::Send(frame)) => {
                        if let Err(e) = writer.write_all(frame.as_slice()).await {
                            warn!(%peer, error = %e, "send failed");
                            break Ok(SessionEnd::PeerClosed);
                        }
                        debug!(%peer, text = %line, "message sent");
                    }
                    Err(e) => warn!(%peer, error = %e, "message not sent"),
                },
                None => {
                    debug!(%peer, "input closed, receiving only");
                    input_open = false;
                }
            },
            outcome = &mut receiver => {
                receiver_finished = true;
                break match outcome {
                    Ok(RecvOutcome::PeerClosed) => Ok(SessionEnd::PeerClosed),
                    Ok(RecvOutcome::Cancelled) => Ok(SessionEnd::Shutdown),
                    Ok(RecvOutcome::Failed(e)) => Err(ChatError::RecvFailed(e)),
                    Err(e) => Err(ChatError::RecvFailed(io::Error::new(
                        io::ErrorKind::Other,
                        e.to_string(),
                    ))),
                };
            }
            _ = shutdown::requested(&mut shutdown) => break Ok(SessionEnd::Shutdown),
        }
    };

    let _ = cancel_tx.send(true);
    if !receiver_finished {
        let _ = receiver.await;
    }
    let _ = writer.shutdown().await;
    let last = core.disconnect();
    info!(%peer, from = %last, "disconnected");
    end
}

fn establish(core: &mut SessionCore, credentials: &Credentials, peer: SocketAddr) -> Result<()> {
    core.on_connected()?;
    info!(%peer, state = %core.state(), "connected");
    if let Err(e) = core.authenticate(credentials) {
        warn!(%peer, error = %e, state = %core.state(), "closing connection");
        return Err(e.into());
    }
    info!(%peer, state = %core.state(), "authentication successful");
    core.start_chat()?;
    debug!(%peer, state = %core.state(), "chat started");
    Ok(())
}

async fn receive_loop(
    mut reader: OwnedReadHalf,
    peer: SocketAddr,
    verify_checksum: bool,
    max_retries: u32,
    inbox: mpsc::UnboundedSender<Incoming>,
    mut cancel: ShutdownRx,
) -> RecvOutcome {
    let mut frame = [0u8; PDU_SIZE];
    let mut failures = 0u32;
    loop {
        let read = tokio::select! {
            r = reader.read_exact(&mut frame) => r,
            _ = shutdown::requested(&mut cancel) => return RecvOutcome::Cancelled,
        };
        match read {
            Ok(_) => {
                failures = 0;
                match ChatMessage::from_frame(&frame, verify_checksum) {
                    Ok(message) if message.is_chat() => {
                        let _ = inbox.send(Incoming { peer, message });
                    }
                    Ok(message) => {
                        debug!(%peer, message_type = message.message_type, "skipping non-chat PDU")
                    }
                    Err(e) => warn!(%peer, error = %e, "dropping frame"),
                }
            }
            Err(e) if is_closed(&e) => {
                debug!(%peer, "peer closed connection");
                return RecvOutcome::PeerClosed;
            }
            Err(e) => {
                failures += 1;
                warn!(%peer, error = %e, attempt = failures, "receive failed");
                if failures >= max_retries.max(1) {
                    return RecvOutcome::Failed(e);
                }
            }
        }
    }
}

fn is_closed(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::NotConnected
    )
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
