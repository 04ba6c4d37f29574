//! Connection lifecycle: DISCONNECTED -> CONNECTED -> AUTHENTICATED -> CHATTING.

use std::fmt;

/// Lifecycle of one connection. Ordered: a later variant is further along.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connected,
    Authenticated,
    Chatting,
}

impl ConnectionState {
    pub fn name(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "DISCONNECTED",
            ConnectionState::Connected => "CONNECTED",
            ConnectionState::Authenticated => "AUTHENTICATED",
            ConnectionState::Chatting => "CHATTING",
        }
    }

    /// The next state on the forward path, if any.
    pub fn successor(self) -> Option<ConnectionState> {
        match self {
            ConnectionState::Disconnected => Some(ConnectionState::Connected),
            ConnectionState::Connected => Some(ConnectionState::Authenticated),
            ConnectionState::Authenticated => Some(ConnectionState::Chatting),
            ConnectionState::Chatting => None,
        }
    }

    /// Only single forward steps and the failure edge to `Disconnected` are allowed.
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        next == ConnectionState::Disconnected || self.successor() == Some(next)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// State owned by exactly one connection.
#[derive(Debug, Default)]
pub struct StateMachine {
    current: ConnectionState,
}

impl StateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> ConnectionState {
        self.current
    }

    /// Move to `next`. Returns the previous state.
    pub fn transition(&mut self, next: ConnectionState) -> Result<ConnectionState, TransitionError> {
        if !self.current.can_transition_to(next) {
            return Err(TransitionError {
                from: self.current,
                to: next,
            });
        }
        Ok(std::mem::replace(&mut self.current, next))
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("invalid transition {from} -> {to}")]
pub struct TransitionError {
    pub from: ConnectionState,
    pub to: ConnectionState,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ConnectionState::*;

    #[test]
    fn forward_path_reaches_chatting() {
        let mut sm = StateMachine::new();
        assert_eq!(sm.current(), Disconnected);
        assert_eq!(sm.transition(Connected), Ok(Disconnected));
        assert_eq!(sm.transition(Authenticated), Ok(Connected));
        assert_eq!(sm.transition(Chatting), Ok(Authenticated));
        assert_eq!(sm.current(), Chatting);
    }

    #[test]
    fn failure_edge_from_any_state() {
        for start in [Disconnected, Connected, Authenticated, Chatting] {
            let mut sm = StateMachine { current: start };
            assert_eq!(sm.transition(Disconnected), Ok(start));
            assert_eq!(sm.current(), Disconnected);
        }
    }

    #[test]
    fn backward_transitions_rejected() {
        let mut sm = StateMachine { current: Chatting };
        assert_eq!(
            sm.transition(Authenticated),
            Err(TransitionError {
                from: Chatting,
                to: Authenticated
            })
        );
        assert_eq!(sm.current(), Chatting);
        assert!(!Authenticated.can_transition_to(Connected));
    }

    #[test]
    fn skipping_states_rejected() {
        let mut sm = StateMachine::new();
        assert!(sm.transition(Authenticated).is_err());
        assert!(sm.transition(Chatting).is_err());
        sm.transition(Connected).unwrap();
        assert!(sm.transition(Chatting).is_err());
        assert!(sm.transition(Connected).is_err());
    }

    #[test]
    fn states_are_ordered() {
        assert!(Disconnected < Connected);
        assert!(Connected < Authenticated);
        assert!(Authenticated < Chatting);
    }

    #[test]
    fn display_names() {
        assert_eq!(Authenticated.to_string(), "AUTHENTICATED");
        assert_eq!(
            TransitionError {
                from: Chatting,
                to: Connected
            }
            .to_string(),
            "invalid transition CHATTING -> CONNECTED"
        );
    }
}
