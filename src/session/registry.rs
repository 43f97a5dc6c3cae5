//! Ref-counted physical transports
//!
//! A [`TransportRegistry`] maps structurally-equal [`ConnectionConfig`]s to one
//! shared [`TransportHandle`]. `acquire` and `release` run inside the registry's
//! single critical section, which is held across the open so concurrent
//! acquires of one config never dial twice. RPCs never take the registry lock;
//! they serialize on the handle's own connection lock.
//!
//! Every RPC runs under an [`InFlight`] guard. If the caller's future is
//! dropped mid-exchange the guard discards the connection, and the next
//! `acquire` for that config replaces the discarded handle with a fresh one.

use crate::connection::{ConnectionConfig, Connector, RpcConnection};
use crate::metrics::{counters, gauges, histograms};
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::Instrument;

static NEXT_TRANSPORT_ID: AtomicU64 = AtomicU64::new(1);

/// Slot holding a handle's physical connection
pub(crate) type ConnectionSlot = Option<Box<dyn RpcConnection>>;

/// One physical RPC connection shared by every session that acquired it
pub struct TransportHandle {
    id: u64,
    config: ConnectionConfig,
    /// Only mutated under the registry lock
    ref_count: AtomicUsize,
    /// Set once the connection was dropped mid-RPC; never cleared
    discarded: AtomicBool,
    connection: Arc<Mutex<ConnectionSlot>>,
}

impl TransportHandle {
    fn new(config: ConnectionConfig, connection: Box<dyn RpcConnection>) -> Self {
        Self {
            id: NEXT_TRANSPORT_ID.fetch_add(1, Ordering::Relaxed),
            config,
            ref_count: AtomicUsize::new(1),
            discarded: AtomicBool::new(false),
            connection: Arc::new(Mutex::new(Some(connection))),
        }
    }

    /// Process-unique id, for logs
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Config this transport was opened for
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Outstanding acquires
    pub fn ref_count(&self) -> usize {
        self.ref_count.load(Ordering::SeqCst)
    }

    /// Whether the physical connection is still held.
    ///
    /// Waits for any in-flight RPC to finish.
    pub async fn is_connected(&self) -> bool {
        self.connection.lock().await.is_some()
    }

    /// Exclusive access to the connection for one RPC (or one whole result)
    pub(crate) async fn lock(&self) -> OwnedMutexGuard<ConnectionSlot> {
        self.connection.clone().lock_owned().await
    }

    /// Whether the connection was discarded after a failed or abandoned RPC.
    ///
    /// Sessions already on a discarded handle fail with `ConnectionClosed`;
    /// new subscribers get a fresh transport.
    pub fn is_discarded(&self) -> bool {
        self.discarded.load(Ordering::SeqCst)
    }

    /// Drop a connection whose stream position is unknown. `slot` must be
    /// this handle's, held through [`TransportHandle::lock`].
    pub(crate) fn discard(&self, slot: &mut ConnectionSlot) {
        self.discarded.store(true, Ordering::SeqCst);
        let Some(conn) = slot.take() else {
            return;
        };
        tracing::warn!(transport = self.id, "discarding connection");
        counters::transport_closed();
        // Cancelled futures can be dropped while the runtime shuts down
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move {
                let _ = conn.close().await;
            });
        }
    }

    async fn close(&self) -> Result<()> {
        let conn = self.connection.lock().await.take();
        match conn {
            Some(conn) => {
                counters::transport_closed();
                let result = conn.close().await;
                tracing::info!(transport = self.id, peer = %self.config, "transport closed");
                result.map_err(|e| e.into_connection_error())
            }
            None => Ok(()),
        }
    }
}

/// One RPC in progress on a locked connection slot.
///
/// Dropped before [`InFlight::finish`], the RPC was cancelled somewhere
/// between request and response and the connection is discarded. `finish`
/// discards it too when the RPC failed fatally.
pub(crate) struct InFlight<'a> {
    handle: &'a TransportHandle,
    slot: &'a mut ConnectionSlot,
    finished: bool,
}

impl<'a> InFlight<'a> {
    pub(crate) fn new(handle: &'a TransportHandle, slot: &'a mut ConnectionSlot) -> Self {
        Self {
            handle,
            slot,
            finished: false,
        }
    }

    /// The live connection, or `ConnectionClosed` once it was discarded
    pub(crate) fn connection(&mut self) -> Result<&mut Box<dyn RpcConnection>> {
        self.slot.as_mut().ok_or(Error::ConnectionClosed)
    }

    /// Settle the RPC with its result
    pub(crate) fn finish<T>(mut self, result: Result<T>) -> Result<T> {
        self.finished = true;
        if let Err(e) = &result {
            if e.is_fatal() {
                self.handle.discard(&mut *self.slot);
            }
        }
        result
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.finished {
            tracing::debug!(transport = self.handle.id, "RPC cancelled in flight");
            self.handle.discard(&mut *self.slot);
        }
    }
}

impl std::fmt::Debug for TransportHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportHandle")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("ref_count", &self.ref_count())
            .field("discarded", &self.is_discarded())
            .finish()
    }
}

/// Registry of shared transports, keyed by config
pub struct TransportRegistry {
    connector: Arc<dyn Connector>,
    handles: Mutex<HashMap<ConnectionConfig, Arc<TransportHandle>>>,
}

impl TransportRegistry {
    /// Create an empty registry that opens connections with `connector`
    pub fn new(connector: Arc<dyn Connector>) -> Arc<Self> {
        Arc::new(Self {
            connector,
            handles: Mutex::new(HashMap::new()),
        })
    }

    /// Acquire the transport for `config`, opening it if none is live.
    ///
    /// # Errors
    ///
    /// `Error::Connection` (or `Error::Timeout`) if the open fails; nothing is
    /// registered in that case.
    pub async fn acquire(self: &Arc<Self>, config: &ConnectionConfig) -> Result<TransportLease> {
        async {
            let mut handles = self.handles.lock().await;

            if let Some(handle) = handles.get(config) {
                if !handle.is_discarded() {
                    let refs = handle.ref_count.fetch_add(1, Ordering::SeqCst) + 1;
                    tracing::debug!(transport = handle.id, refs, "reusing transport");
                    return Ok(TransportLease::new(self.clone(), handle.clone()));
                }
            }
            // Leases on a discarded handle still release it; `release` only
            // unregisters the handle it was given.
            if let Some(stale) = handles.remove(config) {
                tracing::debug!(transport = stale.id, "replacing discarded transport");
                gauges::live_transports(handles.len());
            }

            let start = Instant::now();
            let conn = match self.connector.open(config).await {
                Ok(conn) => conn,
                Err(e) => {
                    counters::transport_open_failed(e.category());
                    tracing::debug!(error = %e, "transport open failed");
                    return Err(e.into_connection_error());
                }
            };
            histograms::transport_open_duration(start.elapsed().as_millis() as u64);
            counters::transport_opened();

            let handle = Arc::new(TransportHandle::new(config.clone(), conn));
            handles.insert(config.clone(), handle.clone());
            gauges::live_transports(handles.len());
            tracing::info!(transport = handle.id, "transport opened");

            Ok(TransportLease::new(self.clone(), handle))
        }
        .instrument(tracing::debug_span!("acquire", peer = %config))
        .await
    }

    /// Give back one reference; the last one closes the connection
    async fn release(&self, handle: &Arc<TransportHandle>) -> Result<()> {
        {
            let mut handles = self.handles.lock().await;

            let prev = handle.ref_count.load(Ordering::SeqCst);
            if prev == 0 {
                // Registry was shut down underneath this lease
                return Ok(());
            }
            handle.ref_count.store(prev - 1, Ordering::SeqCst);
            if prev > 1 {
                tracing::debug!(transport = handle.id, refs = prev - 1, "transport released");
                return Ok(());
            }

            if handles
                .get(&handle.config)
                .is_some_and(|h| Arc::ptr_eq(h, handle))
            {
                handles.remove(&handle.config);
            }
            gauges::live_transports(handles.len());
        }

        // Closing waits for in-flight RPCs, so it happens outside the registry lock
        handle.close().await
    }

    /// Number of live physical transports
    pub async fn live_transports(&self) -> usize {
        self.handles.lock().await.len()
    }

    /// Live handle for `config`, if any
    pub async fn handle(&self, config: &ConnectionConfig) -> Option<Arc<TransportHandle>> {
        self.handles.lock().await.get(config).cloned()
    }

    /// Close every live transport.
    ///
    /// Outstanding leases become no-ops; their sessions fail later RPCs with
    /// `ConnectionClosed`. Returns the first close error, after attempting all.
    pub async fn shutdown(&self) -> Result<()> {
        let drained = {
            let mut handles = self.handles.lock().await;
            let drained: Vec<Arc<TransportHandle>> = handles.drain().map(|(_, h)| h).collect();
            for handle in &drained {
                handle.ref_count.store(0, Ordering::SeqCst);
            }
            gauges::live_transports(0);
            drained
        };

        tracing::info!(count = drained.len(), "shutting down transports");
        let mut first_err = None;
        for handle in drained {
            if let Err(e) = handle.close().await {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

impl std::fmt::Debug for TransportRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportRegistry").finish_non_exhaustive()
    }
}

/// One acquired reference to a transport.
///
/// Release it with [`TransportLease::release`]; a lease dropped without being
/// released schedules its release on the current tokio runtime.
pub struct TransportLease {
    registry: Arc<TransportRegistry>,
    handle: Arc<TransportHandle>,
    released: bool,
}

impl TransportLease {
    fn new(registry: Arc<TransportRegistry>, handle: Arc<TransportHandle>) -> Self {
        Self {
            registry,
            handle,
            released: false,
        }
    }

    /// The shared transport
    pub fn handle(&self) -> &Arc<TransportHandle> {
        &self.handle
    }

    /// Release this reference
    pub async fn release(mut self) -> Result<()> {
        self.released = true;
        self.registry.release(&self.handle).await
    }
}

impl Drop for TransportLease {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let registry = self.registry.clone();
                let handle = self.handle.clone();
                runtime.spawn(async move {
                    if let Err(e) = registry.release(&handle).await {
                        tracing::warn!(transport = handle.id, error = %e, "deferred release failed");
                    }
                });
            }
            Err(_) => {
                tracing::warn!(
                    transport = self.handle.id,
                    "transport lease dropped outside a runtime; connection not released"
                );
            }
        }
    }
}

impl std::fmt::Debug for TransportLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportLease")
            .field("transport", &self.handle.id)
            .field("released", &self.released)
            .finish()
    }
}
