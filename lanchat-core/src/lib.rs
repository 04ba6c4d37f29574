//! LanChat protocol core.
//! Host-driven: no I/O; the host owns sockets and console, passes events in and acts on results.

pub mod identity;
pub mod integrity;
pub mod protocol;
pub mod session;
pub mod state;
pub mod wire;

pub use identity::{authenticate, AuthError, Credentials, SenderId};
pub use protocol::{
    is_announcement, ANNOUNCEMENT, ANNOUNCE_INTERVAL, EXIT_SENTINEL, MSG_TYPE_CHAT,
    MULTICAST_GROUP, MULTICAST_PORT, SERVER_PORT,
};
pub use session::{ChatMessage, LineAction, SessionCore, SessionError};
pub use state::{ConnectionState, StateMachine, TransitionError};
pub use wire::{decode, encode, Pdu, PduDecodeError, PduEncodeError, PDU_SIZE};
