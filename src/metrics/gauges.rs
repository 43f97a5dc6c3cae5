//! Gauge metrics

/// Number of open physical transports in a registry
pub fn live_transports(count: usize) {
    metrics::gauge!("mapd_live_transports").set(count as f64);
}

/// A session became live
pub fn session_live() {
    metrics::gauge!("mapd_live_sessions").increment(1.0);
}

/// A session stopped being live
pub fn session_gone() {
    metrics::gauge!("mapd_live_sessions").decrement(1.0);
}
