//! Error types for the LanChat host.

use std::time::Duration;

use lanchat_core::SessionError;

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// Bind, listen, accept, connect, send or join failures.
    #[error("socket error: {0}")]
    Socket(#[from] std::io::Error),

    /// Authentication, state or framing failure reported by the session core.
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("no server announcement within {0:?}")]
    DiscoveryTimeout(Duration),

    /// The receive path gave up after repeated read errors.
    #[error("receive failed: {0}")]
    RecvFailed(#[source] std::io::Error),

    #[error("cancelled by shutdown")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, ChatError>;
