//! Connection management
//!
//! This module handles:
//! * Static connection parameters (`ConnectionConfig`)
//! * Transport abstraction (TCP, TLS, Unix socket)
//! * Connection lifecycle (handshake, requests, close)
//! * State machine enforcement
//! * The `Connector` / `RpcConnection` seam used by sessions

mod config;
mod conn;
mod connector;
mod state;
mod tls;
mod transport;

pub use config::{ConnectionConfig, ConnectionConfigBuilder, TransportType, DEFAULT_PORT};
pub use conn::Connection;
pub use connector::{Connector, RpcConnection, SessionToken, WireConnector};
pub use state::ConnectionState;
pub use tls::{parse_server_name, RootSource, TlsConfig, TlsConfigBuilder};
pub use transport::Transport;
