//! mapd-connector: ref-counted sessions over a shared RPC transport
//!
//! A client binds static connection parameters once, then hands out one
//! authenticated [`Session`] per subscriber. Sessions with equal connection
//! configs share a physical transport; the transport is opened on first use
//! and closed when the last session disconnects.
//!
//! # Examples
//!
//! ```no_run
//! # async fn example() -> mapd_connector::Result<()> {
//! use mapd_connector::{format_table, SessionFactory};
//! use std::time::Duration;
//!
//! let client = SessionFactory::open_tcp("localhost", 9091, false)?;
//! let sessions = client.connect("mapd", "mapd", "", Duration::from_secs(5));
//!
//! let table = sessions
//!     .with_session(|session| async move {
//!         let result = session
//!             .query("SELECT count(*) AS row_count FROM flights_2008_10k")
//!             .await?;
//!         format_table(result).await
//!     })
//!     .await?;
//! println!("{}", table);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod connection;
pub mod error;
pub mod format;
pub mod metrics;
pub mod protocol;
pub mod session;
pub mod stream;

pub use client::ConnectionInfo;
pub use connection::{ConnectionConfig, Connector, RpcConnection, TlsConfig, TransportType};
pub use error::{Error, Result};
pub use format::{format_table, ResultFormatter};
pub use protocol::Protocol;
pub use session::{
    BoundClient, ConnectOptions, Session, SessionFactory, SessionSource, SessionState,
    TransportHandle, TransportRegistry,
};
pub use stream::{ArrayRef, BatchReader, RecordBatch, ResultStream, Schema, SchemaRef};
