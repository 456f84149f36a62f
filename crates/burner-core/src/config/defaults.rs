/// Default room coordinator endpoint
pub const DEFAULT_SERVER_URL: &str = "ws://127.0.0.1:3001/ws";

/// Number of reconnection attempts before giving up
pub const DEFAULT_RECONNECT_ATTEMPTS: u32 = 10;

/// Delay before the first reconnection attempt (milliseconds)
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 1000;

/// Upper bound for the backoff delay (milliseconds)
pub const DEFAULT_RECONNECT_DELAY_MAX_MS: u64 = 5000;

/// Randomization applied to each backoff delay (0.0 = none)
pub const DEFAULT_RECONNECT_JITTER: f64 = 0.5;

/// Connection attempt timeout (milliseconds), generous for cold starts
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 20_000;

/// How long a graceful disconnect may take before the driver is aborted
pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 1000;
