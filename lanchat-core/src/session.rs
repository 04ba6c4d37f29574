//! Host-driven API: SessionCore receives events for one connection, returns actions.
//!
//! The host owns the socket. It tells the core when the connection is up, feeds
//! it local input lines and received frames, and acts on what comes back.

use crate::identity::{self, AuthError, Credentials, SenderId};
use crate::protocol::EXIT_SENTINEL;
use crate::state::{ConnectionState, StateMachine, TransitionError};
use crate::wire::{self, Pdu, PduDecodeError, PduEncodeError, PDU_SIZE};

/// Per-connection context: lifecycle state plus local identity.
#[derive(Debug)]
pub struct SessionCore {
    identity: SenderId,
    state: StateMachine,
    verify_checksum: bool,
}

impl SessionCore {
    pub fn new(identity: SenderId) -> Self {
        Self {
            identity,
            state: StateMachine::new(),
            verify_checksum: true,
        }
    }

    /// Accept frames with a bad checksum instead of rejecting them.
    pub fn with_checksum_verification(mut self, verify: bool) -> Self {
        self.verify_checksum = verify;
        self
    }

    pub fn identity(&self) -> &SenderId {
        &self.identity
    }

    pub fn state(&self) -> ConnectionState {
        self.state.current()
    }

    pub fn verifies_checksum(&self) -> bool {
        self.verify_checksum
    }

    /// Transport is up.
    pub fn on_connected(&mut self) -> Result<(), SessionError> {
        self.state.transition(ConnectionState::Connected)?;
        Ok(())
    }

    /// Single attempt. On failure the connection falls back to `Disconnected`.
    pub fn authenticate(&mut self, credentials: &Credentials) -> Result<(), SessionError> {
        match identity::authenticate(credentials) {
            Ok(()) => {
                self.state.transition(ConnectionState::Authenticated)?;
                Ok(())
            }
            Err(e) => {
                self.state.transition(ConnectionState::Disconnected)?;
                Err(e.into())
            }
        }
    }

    pub fn start_chat(&mut self) -> Result<(), SessionError> {
        self.state.transition(ConnectionState::Chatting)?;
        Ok(())
    }

    /// One line of local input. Trailing newline is trimmed; the exit sentinel produces no frame.
    pub fn on_line(&mut self, line: &str, timestamp: u64) -> Result<LineAction, SessionError> {
        self.require_chatting()?;
        let line = line
            .strip_suffix('\n')
            .map(|l| l.strip_suffix('\r').unwrap_or(l))
            .unwrap_or(line);
        if line == EXIT_SENTINEL {
            return Ok(LineAction::Exit);
        }
        let pdu = Pdu::chat(&self.identity, line, timestamp)?;
        Ok(LineAction::Send(Box::new(wire::encode(&pdu))))
    }

    /// One frame read from the peer.
    pub fn on_frame(&self, bytes: &[u8]) -> Result<ChatMessage, SessionError> {
        self.require_chatting()?;
        Ok(ChatMessage::from_frame(bytes, self.verify_checksum)?)
    }

    /// Connection closed, by either side.
    pub fn disconnect(&mut self) -> ConnectionState {
        let previous = self.state.current();
        // The failure edge is always allowed.
        let _ = self.state.transition(ConnectionState::Disconnected);
        previous
    }

    fn require_chatting(&self) -> Result<(), SessionError> {
        match self.state.current() {
            ConnectionState::Chatting => Ok(()),
            state => Err(SessionError::NotChatting { state }),
        }
    }
}

/// What the host should do with a line of input.
#[derive(Debug, PartialEq, Eq)]
pub enum LineAction {
    /// Write this frame to the socket.
    Send(Box<[u8; PDU_SIZE]>),
    /// Stop the send loop and disconnect.
    Exit,
}

/// A decoded incoming PDU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub message_type: u8,
    pub sender: String,
    pub text: String,
    pub timestamp: u64,
}

impl ChatMessage {
    pub fn from_frame(bytes: &[u8], verify_checksum: bool) -> Result<Self, PduDecodeError> {
        let pdu = if verify_checksum {
            wire::decode(bytes)?
        } else {
            wire::decode_unverified(bytes)?
        };
        Ok(Self::from(&pdu))
    }

    pub fn is_chat(&self) -> bool {
        self.message_type == crate::protocol::MSG_TYPE_CHAT
    }
}

impl From<&Pdu> for ChatMessage {
    fn from(pdu: &Pdu) -> Self {
        Self {
            message_type: pdu.message_type,
            sender: pdu.sender_name(),
            text: pdu.text(),
            timestamp: pdu.timestamp,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SessionError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error(transparent)]
    Encode(#[from] PduEncodeError),
    #[error(transparent)]
    Decode(#[from] PduDecodeError),
    #[error("connection is {state}, not chatting")]
    NotChatting { state: ConnectionState },
}
