//! Local identity and authentication: sender name, credential check.

use std::fmt;

use crate::wire::{pad_field, PduEncodeError, SENDER_ID_LEN};

/// Only accepted username.
pub const EXPECTED_USERNAME: &str = "user";
/// Only accepted password.
pub const EXPECTED_PASSWORD: &str = "pass";

/// Sender name as carried in the PDU: 16 bytes, NUL-padded.
#[derive(Clone, Copy, Eq, PartialEq, Hash)]
pub struct SenderId([u8; SENDER_ID_LEN]);

impl SenderId {
    /// Names longer than 16 bytes are rejected rather than truncated.
    pub fn new(name: &str) -> Result<Self, PduEncodeError> {
        pad_field("sender_id", name).map(SenderId)
    }

    pub fn as_bytes(&self) -> &[u8; SENDER_ID_LEN] {
        &self.0
    }

    pub fn name(&self) -> String {
        let end = self.0.iter().position(|&b| b == 0).unwrap_or(SENDER_ID_LEN);
        String::from_utf8_lossy(&self.0[..end]).into_owned()
    }
}

impl fmt::Debug for SenderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SenderId").field(&self.name()).finish()
    }
}

impl fmt::Display for SenderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Username/password pair checked once per connection.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl Default for Credentials {
    fn default() -> Self {
        Self::new(EXPECTED_USERNAME, EXPECTED_PASSWORD)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Literal comparison against the fixed pair. Not a security boundary.
pub fn authenticate(credentials: &Credentials) -> Result<(), AuthError> {
    if credentials.username == EXPECTED_USERNAME && credentials.password == EXPECTED_PASSWORD {
        Ok(())
    } else {
        Err(AuthError::AuthenticationFailed {
            username: credentials.username.clone(),
        })
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("authentication failed for user {username:?}")]
    AuthenticationFailed { username: String },
}
