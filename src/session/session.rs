//! Authenticated logical sessions

use super::options::ConnectOptions;
use super::registry::{InFlight, TransportHandle, TransportLease};
use super::with_timeout;
use crate::connection::SessionToken;
use crate::metrics::{counters, gauges};
use crate::stream::{BatchReader, ResultStream};
use crate::{Error, Result};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::Instrument;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Session lifecycle. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Authenticated, accepting queries
    Open,
    /// Disconnected; a new session must be obtained from the source
    Closed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// One authenticated client context on a shared transport.
///
/// Clones refer to the same logical session; disconnecting any of them
/// closes it for all. When the last clone is dropped without `disconnect`,
/// the session is logged out and its transport released in the background.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    id: u64,
    token: SessionToken,
    database: String,
    user: String,
    timeout: Option<Duration>,
    handle: Arc<TransportHandle>,
    lease: Mutex<Option<TransportLease>>,
    open: AtomicBool,
}

impl Session {
    pub(crate) fn new(token: SessionToken, lease: TransportLease, options: &ConnectOptions) -> Self {
        let inner = SessionInner {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            token,
            database: options.database.clone(),
            user: options.user.clone(),
            timeout: options.timeout,
            handle: lease.handle().clone(),
            lease: Mutex::new(Some(lease)),
            open: AtomicBool::new(true),
        };
        counters::session_opened();
        gauges::session_live();
        tracing::info!(
            session = inner.id,
            transport = inner.handle.id(),
            "session opened"
        );
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Process-unique id, for logs
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Database this session is bound to
    pub fn database(&self) -> &str {
        &self.inner.database
    }

    /// Authenticated user
    pub fn user(&self) -> &str {
        &self.inner.user
    }

    /// Per-RPC timeout
    pub fn timeout(&self) -> Option<Duration> {
        self.inner.timeout
    }

    /// Shared transport this session runs on
    pub fn transport(&self) -> &Arc<TransportHandle> {
        &self.inner.handle
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        if self.is_open() {
            SessionState::Open
        } else {
            SessionState::Closed
        }
    }

    /// True until the session is disconnected
    pub fn is_open(&self) -> bool {
        self.inner.open.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(Error::InvalidState {
                expected: SessionState::Open.to_string(),
                actual: SessionState::Closed.to_string(),
            })
        }
    }

    /// Execute `sql` and stream its result.
    ///
    /// # Errors
    ///
    /// * `Error::InvalidState` if the session is closed
    /// * `Error::Query` if the server rejects the query; the session stays open
    pub async fn query(&self, sql: &str) -> Result<ResultStream> {
        self.execute(sql, None).await
    }

    /// Execute `sql`, asking the server for at most `first_n` rows
    pub async fn query_with_limit(&self, sql: &str, first_n: u64) -> Result<ResultStream> {
        self.execute(sql, Some(first_n)).await
    }

    /// Execute `sql` and wrap the result in a [`BatchReader`]
    pub async fn query_reader(&self, sql: &str) -> Result<BatchReader> {
        Ok(BatchReader::new(self.query(sql).await?))
    }

    async fn execute(&self, sql: &str, first_n: Option<u64>) -> Result<ResultStream> {
        self.ensure_open()?;
        let inner = &self.inner;

        async {
            let started = Instant::now();
            let mut slot = inner.handle.lock().await;
            // A disconnect may have completed while waiting for the connection
            self.ensure_open()?;

            let mut rpc = InFlight::new(&inner.handle, &mut slot);
            let result = match rpc.connection() {
                Ok(conn) => {
                    with_timeout(inner.timeout, conn.execute(&inner.token, sql, first_n)).await
                }
                Err(e) => Err(e),
            };

            match rpc.finish(result) {
                Ok(schema) => {
                    tracing::debug!(columns = schema.fields().len(), "query started");
                    Ok(ResultStream::spawn(
                        schema,
                        inner.handle.clone(),
                        slot,
                        inner.timeout,
                        started,
                    ))
                }
                Err(e) => {
                    counters::query_error(e.category());
                    counters::query_completed(crate::metrics::labels::STATUS_ERROR);
                    Err(e)
                }
            }
        }
        .instrument(tracing::info_span!("query", session = inner.id, sql = %sql))
        .await
    }

    /// Log out and release the transport.
    ///
    /// Idempotent: only the first call does any work; later calls return
    /// `Ok(())` immediately. A failed logout is logged, not returned.
    pub async fn disconnect(&self) -> Result<()> {
        if !self.inner.open.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        // Before the first await, so a cancelled disconnect is still counted
        counters::session_closed();
        gauges::session_gone();
        let inner = &self.inner;

        async {
            logout(&inner.handle, &inner.token, inner.timeout).await;

            let lease = inner
                .lease
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .take();
            tracing::info!("session closed");

            match lease {
                Some(lease) => lease.release().await,
                None => Ok(()),
            }
        }
        .instrument(tracing::debug_span!("disconnect", session = inner.id))
        .await
    }
}

async fn logout(handle: &TransportHandle, token: &SessionToken, timeout: Option<Duration>) {
    let mut slot = handle.lock().await;
    if slot.is_none() {
        return;
    }
    let mut rpc = InFlight::new(handle, &mut slot);
    let result = match rpc.connection() {
        Ok(conn) => with_timeout(timeout, conn.logout(token)).await,
        Err(e) => Err(e),
    };
    if let Err(e) = rpc.finish(result) {
        tracing::warn!(error = %e, "logout failed");
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("database", &self.inner.database)
            .field("user", &self.inner.user)
            .field("state", &self.state())
            .field("transport", &self.inner.handle.id())
            .finish()
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        if !self.open.swap(false, Ordering::SeqCst) {
            return;
        }
        counters::session_closed();
        gauges::session_gone();

        let lease = self
            .lease
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        let Some(lease) = lease else {
            return;
        };

        // Without a runtime the lease's own drop reports the leak
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let handle = self.handle.clone();
            let token = self.token.clone();
            let timeout = self.timeout;
            let id = self.id;
            tracing::debug!(session = id, "session dropped while open, tearing down");
            runtime.spawn(async move {
                logout(&handle, &token, timeout).await;
                if let Err(e) = lease.release().await {
                    tracing::warn!(session = id, error = %e, "release after drop failed");
                }
            });
        }
    }
}
