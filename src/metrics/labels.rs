//! Label values

/// Query finished normally
pub const STATUS_OK: &str = "ok";

/// Query failed
pub const STATUS_ERROR: &str = "error";

/// Consumer dropped the result before it was complete
pub const STATUS_CANCELLED: &str = "cancelled";
