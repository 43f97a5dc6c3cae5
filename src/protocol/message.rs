//! Protocol message types

use crate::stream::{RecordBatch, SchemaRef};

/// Request (client → server)
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// Open a server session
    Connect {
        /// Username
        user: String,
        /// Password
        password: String,
        /// Database name
        database: String,
    },

    /// Close a server session
    Disconnect {
        /// Session token
        session: String,
    },

    /// Execute SQL within a session
    Execute {
        /// Session token
        session: String,
        /// SQL text
        sql: String,
        /// Row limit, or `NO_ROW_LIMIT`
        first_n: i64,
    },

    /// Close the connection
    Terminate,
}

/// Response (server → client)
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Session token issued by `Connect`
    Session(String),

    /// Result schema, first response to `Execute`
    Schema(SchemaRef),

    /// One batch of result rows
    Batch(RecordBatch),

    /// End of a result
    Complete {
        /// Total rows sent
        rows: i64,
        /// Server-side execution time
        execution_ms: i64,
    },

    /// Acknowledgement of `Disconnect`
    Ok,

    /// Request failed
    Error(ServerError),
}

/// Error reported by the server
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerError {
    /// Error code (see `constants::error_codes`)
    pub code: i32,
    /// Human-readable message
    pub message: String,
}

impl ServerError {
    /// Create a server error
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}
