//! RPC seam between sessions and the physical connection
//!
//! The session layer only talks to [`Connector`] and [`RpcConnection`]; the
//! wire implementation is [`WireConnector`]. Tests and embedders can plug in
//! their own.

use super::config::ConnectionConfig;
use super::conn::Connection;
use super::tls::TlsConfig;
use super::transport::Transport;
use crate::stream::{RecordBatch, SchemaRef};
use crate::{Error, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::Instrument;

/// Server-issued session token
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SessionToken(String);

impl SessionToken {
    /// Wrap a raw token
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Raw token, as sent on the wire
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionToken(<redacted>)")
    }
}

/// One open physical RPC connection.
///
/// Calls are strictly sequential: after `execute` succeeds, `next_batch` must
/// be called until it returns `None` before any other request is made.
#[async_trait]
pub trait RpcConnection: Send {
    /// Open a server session
    async fn authenticate(
        &mut self,
        database: &str,
        user: &str,
        password: &str,
    ) -> Result<SessionToken>;

    /// Start a query; returns the result schema
    async fn execute(
        &mut self,
        session: &SessionToken,
        sql: &str,
        first_n: Option<u64>,
    ) -> Result<SchemaRef>;

    /// Next batch of the running query, `None` once it is complete
    async fn next_batch(&mut self) -> Result<Option<RecordBatch>>;

    /// Close a server session
    async fn logout(&mut self, session: &SessionToken) -> Result<()>;

    /// Close the physical connection
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Opens physical connections
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a connection for `config`
    async fn open(&self, config: &ConnectionConfig) -> Result<Box<dyn RpcConnection>>;
}

/// Connector speaking the framed wire protocol over TCP, TLS or Unix sockets
#[derive(Debug, Clone, Default)]
pub struct WireConnector {
    tls: Option<TlsConfig>,
    connect_timeout: Option<Duration>,
}

impl WireConnector {
    /// Connector using native roots for encrypted configs
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `tls` for encrypted configs
    pub fn with_tls(mut self, tls: TlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Bound the time spent dialing and handshaking
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    async fn dial(&self, config: &ConnectionConfig) -> Result<Connection> {
        let default_tls;
        let tls = match &self.tls {
            Some(tls) => Some(tls),
            None if config.encrypted => {
                default_tls = TlsConfig::builder().build()?;
                Some(&default_tls)
            }
            None => None,
        };
        let transport = Transport::connect(config, tls).await?;
        let mut conn = Connection::new(transport, config.protocol);
        conn.handshake().await?;
        Ok(conn)
    }
}

#[async_trait]
impl Connector for WireConnector {
    async fn open(&self, config: &ConnectionConfig) -> Result<Box<dyn RpcConnection>> {
        async {
            let conn = match self.connect_timeout {
                Some(timeout) => tokio::time::timeout(timeout, self.dial(config))
                    .await
                    .map_err(|_| Error::Timeout(timeout))??,
                None => self.dial(config).await?,
            };
            tracing::debug!("connection ready");
            Ok(Box::new(conn) as Box<dyn RpcConnection>)
        }
        .instrument(tracing::debug_span!("open", peer = %config))
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_token_debug_is_redacted() {
        let token = SessionToken::new("secret-token");
        assert!(!format!("{:?}", token).contains("secret"));
        assert_eq!(token.as_str(), "secret-token");
    }

    #[tokio::test]
    async fn test_open_refused() {
        let connector = WireConnector::new().connect_timeout(Duration::from_secs(5));
        let result = connector.open(&ConnectionConfig::new("localhost", 1)).await;
        assert!(result.is_err());
    }
}
