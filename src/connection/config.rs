//! Connection configuration

use crate::protocol::Protocol;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Default server port
pub const DEFAULT_PORT: u16 = 9091;

/// Socket kind used to reach the server
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportType {
    /// TCP socket (optionally TLS-encrypted)
    #[default]
    Tcp,
    /// Unix domain socket; `host` holds the socket path
    Unix,
}

impl std::fmt::Display for TransportType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tcp => write!(f, "tcp"),
            Self::Unix => write!(f, "unix"),
        }
    }
}

impl std::str::FromStr for TransportType {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "tcp" => Ok(Self::Tcp),
            "unix" => Ok(Self::Unix),
            _ => Err(Error::Config(format!(
                "invalid transport '{}': expected tcp or unix",
                s
            ))),
        }
    }
}

/// Static parameters of a physical connection.
///
/// Immutable once bound to a client. Two configs that compare equal share a
/// physical transport within one registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Host name, or socket path for Unix transports
    pub host: String,
    /// TCP port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Wrap TCP in TLS
    #[serde(default)]
    pub encrypted: bool,
    /// Wire encoding
    #[serde(default)]
    pub protocol: Protocol,
    /// Socket kind
    #[serde(default)]
    pub transport: TransportType,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl ConnectionConfig {
    /// Plain TCP configuration with the binary encoding
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            encrypted: false,
            protocol: Protocol::default(),
            transport: TransportType::default(),
        }
    }

    /// Create a builder
    ///
    /// # Examples
    ///
    /// ```
    /// use mapd_connector::connection::ConnectionConfig;
    /// use mapd_connector::protocol::Protocol;
    ///
    /// let config = ConnectionConfig::builder("localhost", 9091)
    ///     .protocol(Protocol::Compact)
    ///     .build()
    ///     .unwrap();
    /// assert!(!config.encrypted);
    /// ```
    pub fn builder(host: impl Into<String>, port: u16) -> ConnectionConfigBuilder {
        ConnectionConfigBuilder {
            config: Self::new(host, port),
        }
    }

    /// Check field combinations that can never connect
    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(Error::Config("host must not be empty".into()));
        }
        match self.transport {
            TransportType::Tcp if self.port == 0 => {
                Err(Error::Config("TCP transport requires a non-zero port".into()))
            }
            TransportType::Unix if self.encrypted => Err(Error::Config(
                "TLS is only supported for TCP connections".into(),
            )),
            _ => Ok(()),
        }
    }
}

impl std::fmt::Display for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.transport {
            TransportType::Tcp => write!(f, "{}:{}", self.host, self.port)?,
            TransportType::Unix => write!(f, "unix:{}", self.host)?,
        }
        write!(f, " ({}", self.protocol)?;
        if self.encrypted {
            write!(f, ", tls")?;
        }
        write!(f, ")")
    }
}

/// Builder for `ConnectionConfig`
#[derive(Debug, Clone)]
pub struct ConnectionConfigBuilder {
    config: ConnectionConfig,
}

impl ConnectionConfigBuilder {
    /// Enable or disable TLS
    pub fn encrypted(mut self, encrypted: bool) -> Self {
        self.config.encrypted = encrypted;
        self
    }

    /// Set the wire encoding
    pub fn protocol(mut self, protocol: Protocol) -> Self {
        self.config.protocol = protocol;
        self
    }

    /// Set the socket kind
    pub fn transport(mut self, transport: TransportType) -> Self {
        self.config.transport = transport;
        self
    }

    /// Validate and build
    pub fn build(self) -> Result<ConnectionConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
