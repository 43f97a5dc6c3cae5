//! Ref-counted transports and the sessions multiplexed over them
//!
//! A [`SessionSource`] acquires a [`TransportHandle`] from its
//! [`TransportRegistry`] per subscription. Sessions with equal connection
//! configs share one physical connection, which is closed when the last of
//! them disconnects.

mod factory;
mod options;
pub(crate) mod registry;
mod session;

pub use factory::{BoundClient, SessionFactory, SessionSource};
pub use options::ConnectOptions;
pub use registry::{TransportHandle, TransportLease, TransportRegistry};
pub use session::{Session, SessionState};

use crate::{Error, Result};
use std::future::Future;
use std::time::Duration;

/// Run one RPC under the session timeout
pub(crate) async fn with_timeout<T>(
    timeout: Option<Duration>,
    rpc: impl Future<Output = Result<T>>,
) -> Result<T> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, rpc)
            .await
            .map_err(|_| Error::Timeout(limit))?,
        None => rpc.await,
    }
}
