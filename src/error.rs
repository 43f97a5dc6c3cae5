//! Error types

use arrow_schema::ArrowError;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// mapd-connector error
#[derive(Debug, Error)]
pub enum Error {
    /// Opening or closing the physical transport failed
    #[error("connection error: {0}")]
    Connection(String),

    /// The server rejected the credentials
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Operation attempted in the wrong state (e.g. querying a closed session)
    #[error("invalid state: expected {expected}, got {actual}")]
    InvalidState {
        /// State the operation requires
        expected: String,
        /// State the object was actually in
        actual: String,
    },

    /// The server failed to execute a query
    #[error("query error: {0}")]
    Query(String),

    /// Malformed or unexpected wire message
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Invalid configuration or connection string
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Underlying I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Building, encoding or rendering Arrow data failed
    #[error("arrow error: {0}")]
    Arrow(#[from] ArrowError),

    /// The physical connection is no longer available
    #[error("connection closed")]
    ConnectionClosed,

    /// An RPC did not complete within the session timeout
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),
}

impl Error {
    /// Stable, low-cardinality label for metrics and logs
    pub fn category(&self) -> &'static str {
        match self {
            Error::Connection(_) => "connection",
            Error::Auth(_) => "auth",
            Error::InvalidState { .. } => "invalid_state",
            Error::Query(_) => "query",
            Error::Protocol(_) => "protocol",
            Error::Config(_) => "config",
            Error::Io(_) => "io",
            Error::Arrow(_) => "arrow",
            Error::ConnectionClosed => "connection_closed",
            Error::Timeout(_) => "timeout",
        }
    }

    /// Re-label a failure that happened while opening a transport.
    ///
    /// Opening surfaces I/O, TLS and handshake errors; callers of
    /// `acquire` see all of them as `Connection`.
    pub(crate) fn into_connection_error(self) -> Error {
        match self {
            Error::Connection(_) | Error::Timeout(_) => self,
            other => Error::Connection(other.to_string()),
        }
    }

    /// Whether the error leaves the underlying connection unusable
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Io(_) | Error::ConnectionClosed | Error::Protocol(_) | Error::Timeout(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_labels() {
        assert_eq!(Error::Auth("bad".into()).category(), "auth");
        assert_eq!(Error::ConnectionClosed.category(), "connection_closed");
        assert_eq!(
            Error::InvalidState {
                expected: "open".into(),
                actual: "closed".into()
            }
            .category(),
            "invalid_state"
        );
    }

    #[test]
    fn test_into_connection_error_wraps_io() {
        let err = Error::Io(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"));
        match err.into_connection_error() {
            Error::Connection(msg) => assert!(msg.contains("refused")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_query_errors_are_not_fatal() {
        assert!(!Error::Query("syntax".into()).is_fatal());
        assert!(Error::ConnectionClosed.is_fatal());
        assert!(!Error::Arrow(ArrowError::ComputeError("overflow".into())).is_fatal());
    }
}
