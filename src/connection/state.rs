//! Connection state machine

use crate::{Error, Result};

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Socket open, handshake not sent
    Initial,

    /// Handshake sent, awaiting accept/reject byte
    Handshaking,

    /// Idle (ready for a request)
    Idle,

    /// Request sent, awaiting its response
    AwaitingResponse,

    /// Schema received, reading result batches
    ReadingResults,

    /// Closed
    Closed,
}

impl ConnectionState {
    /// Check if transition is valid
    pub fn can_transition_to(&self, next: ConnectionState) -> bool {
        use ConnectionState::*;

        matches!(
            (self, next),
            (Initial, Handshaking)
                | (Handshaking, Idle)
                | (Idle, AwaitingResponse)
                | (AwaitingResponse, Idle)
                | (AwaitingResponse, ReadingResults)
                | (ReadingResults, Idle)
                | (_, Closed)
        )
    }

    /// Transition to new state
    pub fn transition(&mut self, next: ConnectionState) -> Result<()> {
        if !self.can_transition_to(next) {
            return Err(Error::InvalidState {
                expected: format!("valid transition from {:?}", self),
                actual: format!("{:?}", next),
            });
        }
        *self = next;
        Ok(())
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initial => write!(f, "initial"),
            Self::Handshaking => write!(f, "handshaking"),
            Self::Idle => write!(f, "idle"),
            Self::AwaitingResponse => write!(f, "awaiting_response"),
            Self::ReadingResults => write!(f, "reading_results"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        let mut state = ConnectionState::Initial;
        assert!(state.transition(ConnectionState::Handshaking).is_ok());
        assert!(state.transition(ConnectionState::Idle).is_ok());
        assert!(state.transition(ConnectionState::AwaitingResponse).is_ok());
        assert!(state.transition(ConnectionState::ReadingResults).is_ok());
        assert!(state.transition(ConnectionState::Idle).is_ok());
    }

    #[test]
    fn test_invalid_transition() {
        let mut state = ConnectionState::Initial;
        assert!(state.transition(ConnectionState::Idle).is_err());
    }

    #[test]
    fn test_close_from_any_state() {
        let mut state = ConnectionState::ReadingResults;
        assert!(state.transition(ConnectionState::Closed).is_ok());
    }

    #[test]
    fn test_closed_is_terminal() {
        let mut state = ConnectionState::Closed;
        assert!(state.transition(ConnectionState::Idle).is_err());
        assert!(state.transition(ConnectionState::AwaitingResponse).is_err());
    }

    #[test]
    fn test_cannot_read_results_without_request() {
        let mut state = ConnectionState::Idle;
        assert!(state.transition(ConnectionState::ReadingResults).is_err());
    }
}
