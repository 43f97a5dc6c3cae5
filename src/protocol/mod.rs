//! Wire protocol implementation
//!
//! Framed request/response messages over a byte stream. Every frame is a tag
//! byte, a body length and a body; integer layout depends on the negotiated
//! [`Protocol`] encoding.

mod codec;
pub mod constants;
pub mod decode;
pub mod encode;
pub mod message;

pub use decode::{decode_handshake, decode_request, decode_response};
pub use encode::{encode_handshake, encode_request, encode_response};
pub use message::{Request, Response, ServerError};

use crate::Error;
use serde::{Deserialize, Serialize};

/// Wire encoding negotiated during the handshake
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Fixed-width big-endian integers
    #[default]
    Binary,
    /// Zig-zag varint integers
    Compact,
}

impl Protocol {
    /// Identifier sent in the handshake
    pub fn encoding_id(self) -> u8 {
        match self {
            Protocol::Binary => constants::encoding::BINARY,
            Protocol::Compact => constants::encoding::COMPACT,
        }
    }

    /// Resolve a handshake identifier
    pub fn from_encoding_id(id: u8) -> Option<Self> {
        match id {
            constants::encoding::BINARY => Some(Protocol::Binary),
            constants::encoding::COMPACT => Some(Protocol::Compact),
            _ => None,
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Binary => write!(f, "binary"),
            Self::Compact => write!(f, "compact"),
        }
    }
}

impl std::str::FromStr for Protocol {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "binary" => Ok(Self::Binary),
            "compact" => Ok(Self::Compact),
            _ => Err(Error::Config(format!(
                "invalid protocol '{}': expected binary or compact",
                s
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_from_str() {
        assert_eq!("binary".parse::<Protocol>().unwrap(), Protocol::Binary);
        assert_eq!("compact".parse::<Protocol>().unwrap(), Protocol::Compact);
        assert!("json".parse::<Protocol>().is_err());
    }

    #[test]
    fn test_protocol_default() {
        assert_eq!(Protocol::default(), Protocol::Binary);
    }

    #[test]
    fn test_encoding_id_is_reversible() {
        for p in [Protocol::Binary, Protocol::Compact] {
            assert_eq!(Protocol::from_encoding_id(p.encoding_id()), Some(p));
        }
        assert_eq!(Protocol::from_encoding_id(9), None);
    }
}
