//! Client-facing configuration helpers

pub mod connection_string;

pub use connection_string::{ConnectionInfo, DEFAULT_DATABASE};
