//! LanChat host: multicast discovery, TCP transport, chat sessions, console.
//! Protocol logic lives in `lanchat-core`; everything here does I/O.

pub mod config;
pub mod console;
pub mod discovery;
pub mod error;
pub mod session;
pub mod shutdown;
pub mod transport;

pub use config::Config;
pub use error::{ChatError, Result};
pub use session::{run_session, Incoming, SessionConfig, SessionEnd};
