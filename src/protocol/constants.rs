//! Wire protocol constants

/// Handshake magic sent first on every new connection
pub const MAGIC: [u8; 4] = *b"MAPD";

/// Wire protocol version
pub const PROTOCOL_VERSION: u16 = 1;

/// Handshake length: magic + version (u16) + encoding (u8) + reserved (u8)
pub const HANDSHAKE_LEN: usize = 8;

/// Server accepted the handshake
pub const HANDSHAKE_ACCEPT: u8 = b'Y';

/// Server rejected the handshake (unsupported version or encoding)
pub const HANDSHAKE_REJECT: u8 = b'N';

/// Maximum frame body length (256 MiB)
///
/// Frames whose length field exceeds this are rejected before allocation.
pub const MAX_FRAME_LENGTH: usize = 256 * 1024 * 1024;

/// `first_n` value meaning "no row limit"
pub const NO_ROW_LIMIT: i64 = -1;

/// Encoding identifiers carried in the handshake
pub mod encoding {
    /// Fixed-width big-endian integers
    pub const BINARY: u8 = 0;

    /// Zig-zag varint integers
    pub const COMPACT: u8 = 1;
}

/// Message type tags
pub mod tags {
    /// Open a server session (client)
    pub const CONNECT: u8 = b'C';

    /// Close a server session (client)
    pub const DISCONNECT: u8 = b'D';

    /// Execute SQL (client)
    pub const EXECUTE: u8 = b'Q';

    /// Close the connection (client)
    pub const TERMINATE: u8 = b'X';

    /// Session token (server)
    pub const SESSION: u8 = b'S';

    /// Result schema as an Arrow IPC stream with no batches (server)
    pub const SCHEMA: u8 = b'T';

    /// Record batch as a one-batch Arrow IPC stream (server)
    pub const BATCH: u8 = b'B';

    /// Query complete (server)
    pub const COMPLETE: u8 = b'Z';

    /// Generic acknowledgement (server)
    pub const OK: u8 = b'K';

    /// Error (server)
    pub const ERROR: u8 = b'E';
}

/// Server error codes
pub mod error_codes {
    /// Credentials rejected
    pub const AUTH_FAILED: i32 = 1;

    /// Unknown or expired session token
    pub const INVALID_SESSION: i32 = 2;

    /// SQL failed to parse or execute
    pub const SQL_ERROR: i32 = 3;
}
