//! Counter metrics

/// A physical transport was opened
pub fn transport_opened() {
    metrics::counter!("mapd_transports_opened_total").increment(1);
}

/// Opening a physical transport failed
pub fn transport_open_failed(reason: &'static str) {
    metrics::counter!("mapd_transport_open_failures_total", "reason" => reason).increment(1);
}

/// A physical transport was closed
pub fn transport_closed() {
    metrics::counter!("mapd_transports_closed_total").increment(1);
}

/// A session authenticated
pub fn session_opened() {
    metrics::counter!("mapd_sessions_opened_total").increment(1);
}

/// A session was disconnected or torn down
pub fn session_closed() {
    metrics::counter!("mapd_sessions_closed_total").increment(1);
}

/// Authentication failed
pub fn auth_failed(reason: &'static str) {
    metrics::counter!("mapd_auth_failures_total", "reason" => reason).increment(1);
}

/// A query finished with `status` (see `labels`)
pub fn query_completed(status: &'static str) {
    metrics::counter!("mapd_queries_total", "status" => status).increment(1);
}

/// A query failed with an error of `category`
pub fn query_error(category: &'static str) {
    metrics::counter!("mapd_query_errors_total", "category" => category).increment(1);
}

/// One batch of `rows` rows was received
pub fn batch_received(rows: u64) {
    metrics::counter!("mapd_batches_received_total").increment(1);
    metrics::counter!("mapd_rows_received_total").increment(rows);
}
