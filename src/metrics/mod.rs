//! Metrics emitted through the `metrics` facade
//!
//! No recorder is installed by this crate; without one every call is a no-op.
//!
//! * `mapd_transports_opened_total`, `mapd_transports_closed_total`,
//!   `mapd_transport_open_failures_total{reason}`
//! * `mapd_sessions_opened_total`, `mapd_sessions_closed_total`,
//!   `mapd_auth_failures_total{reason}`
//! * `mapd_queries_total{status}`, `mapd_query_errors_total{category}`,
//!   `mapd_batches_received_total`, `mapd_rows_received_total`
//! * gauges `mapd_live_transports`, `mapd_live_sessions`
//! * histograms `mapd_transport_open_duration_ms`, `mapd_auth_duration_ms`,
//!   `mapd_query_duration_ms`

pub mod counters;
pub mod gauges;
pub mod histograms;
pub mod labels;
