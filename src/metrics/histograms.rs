//! Histogram metrics (milliseconds)

/// Time to dial and handshake a transport
pub fn transport_open_duration(ms: u64) {
    metrics::histogram!("mapd_transport_open_duration_ms").record(ms as f64);
}

/// Time to authenticate a session
pub fn auth_duration(ms: u64) {
    metrics::histogram!("mapd_auth_duration_ms").record(ms as f64);
}

/// Time from sending a query to reading its last batch
pub fn query_duration(ms: u64) {
    metrics::histogram!("mapd_query_duration_ms").record(ms as f64);
}
