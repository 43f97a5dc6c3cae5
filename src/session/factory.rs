//! Session factory: binds connection parameters, hands out sessions

use super::options::ConnectOptions;
use super::registry::{InFlight, TransportRegistry};
use super::session::Session;
use super::with_timeout;
use crate::client::ConnectionInfo;
use crate::connection::{ConnectionConfig, Connector, TlsConfig, WireConnector};
use crate::metrics::{counters, histograms};
use crate::Result;
use futures::Stream;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Instrument;

/// Entry point for building clients
pub struct SessionFactory;

impl SessionFactory {
    /// Bind `config`. No I/O happens until a session is subscribed.
    pub fn open(config: ConnectionConfig) -> BoundClient {
        BoundClient::new(config)
    }

    /// Bind a TCP config with the default (binary) protocol
    pub fn open_tcp(host: impl Into<String>, port: u16, encrypted: bool) -> Result<BoundClient> {
        let config = ConnectionConfig::builder(host, port)
            .encrypted(encrypted)
            .build()?;
        Ok(Self::open(config))
    }

    /// Bind the connection part of a `mapd://` URL
    pub fn open_url(url: &str) -> Result<BoundClient> {
        let info = ConnectionInfo::parse(url)?;
        Self::bind(&info)
    }

    /// Bind a `mapd://` URL including its credentials
    pub fn connect_url(url: &str) -> Result<SessionSource> {
        let info = ConnectionInfo::parse(url)?;
        Ok(Self::bind(&info)?.connect_with(info.connect_options()))
    }

    fn bind(info: &ConnectionInfo) -> Result<BoundClient> {
        let client = Self::open(info.to_config()?);
        Ok(match info.to_tls_config()? {
            Some(tls) => client.with_tls(tls),
            None => client,
        })
    }
}

/// Connection parameters bound to a transport registry.
///
/// Clones share the registry, so sessions from any clone share transports.
/// `with_tls` and `with_connector` start a fresh registry; call
/// `with_registry` last when combining them.
#[derive(Clone, Debug)]
pub struct BoundClient {
    config: ConnectionConfig,
    registry: Arc<TransportRegistry>,
}

impl BoundClient {
    fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            registry: TransportRegistry::new(Arc::new(WireConnector::new())),
        }
    }

    /// Use `tls` for encrypted connections
    pub fn with_tls(self, tls: TlsConfig) -> Self {
        self.with_connector(Arc::new(WireConnector::new().with_tls(tls)))
    }

    /// Open connections with `connector` instead of the wire protocol
    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.registry = TransportRegistry::new(connector);
        self
    }

    /// Share `registry` (and its transports) with other clients
    pub fn with_registry(mut self, registry: Arc<TransportRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Bound connection config
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Registry this client acquires transports from
    pub fn registry(&self) -> &Arc<TransportRegistry> {
        &self.registry
    }

    /// Bind credentials. Returns a lazy source; nothing is opened until
    /// [`SessionSource::subscribe`].
    pub fn connect(
        &self,
        database: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
        timeout: Duration,
    ) -> SessionSource {
        self.connect_with(
            ConnectOptions::new(database, user)
                .password(password)
                .timeout(timeout),
        )
    }

    /// Bind credentials given as [`ConnectOptions`]
    pub fn connect_with(&self, options: ConnectOptions) -> SessionSource {
        SessionSource {
            client: self.clone(),
            options: Arc::new(options),
        }
    }
}

/// Lazy producer of sessions. Every subscription is independent.
#[derive(Clone, Debug)]
pub struct SessionSource {
    client: BoundClient,
    options: Arc<ConnectOptions>,
}

impl SessionSource {
    /// Credentials this source authenticates with
    pub fn options(&self) -> &ConnectOptions {
        &self.options
    }

    /// Bound client
    pub fn client(&self) -> &BoundClient {
        &self.client
    }

    /// Acquire a transport and authenticate a new session.
    ///
    /// # Errors
    ///
    /// * `Error::Connection` if the transport cannot be opened
    /// * `Error::Auth` if the server rejects the credentials; the transport
    ///   reference taken for this attempt is released first
    pub async fn subscribe(&self) -> Result<Session> {
        let options = &self.options;
        async {
            let lease = self.client.registry.acquire(&self.client.config).await?;

            let started = Instant::now();
            let auth = {
                let mut slot = lease.handle().lock().await;
                let mut rpc = InFlight::new(lease.handle(), &mut slot);
                let result = match rpc.connection() {
                    Ok(conn) => {
                        with_timeout(
                            options.timeout,
                            conn.authenticate(&options.database, &options.user, &options.password),
                        )
                        .await
                    }
                    Err(e) => Err(e),
                };
                rpc.finish(result)
            };

            match auth {
                Ok(token) => {
                    histograms::auth_duration(started.elapsed().as_millis() as u64);
                    Ok(Session::new(token, lease, options))
                }
                Err(e) => {
                    counters::auth_failed(e.category());
                    tracing::warn!(error = %e, "authentication failed");
                    if let Err(release_err) = lease.release().await {
                        tracing::warn!(error = %release_err, "release after failed auth");
                    }
                    Err(e)
                }
            }
        }
        .instrument(tracing::info_span!(
            "subscribe",
            peer = %self.client.config,
            database = %options.database,
            user = %options.user,
        ))
        .await
    }

    /// Cold stream that subscribes when first polled and yields one session
    pub fn sessions(&self) -> impl Stream<Item = Result<Session>> + Send + 'static {
        let source = self.clone();
        futures::stream::once(async move { source.subscribe().await })
    }

    /// Subscribe, run `f`, and disconnect on every exit path.
    ///
    /// The error from `f` takes precedence over a disconnect error.
    pub async fn with_session<F, Fut, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(Session) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let session = self.subscribe().await?;
        let result = f(session.clone()).await;
        let closed = session.disconnect().await;
        let value = result?;
        closed?;
        Ok(value)
    }
}
