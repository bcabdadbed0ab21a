//! Default values shared by the configuration sections
//!
//! Kept as plain constants so services and tests can refer to the same
//! numbers the loader falls back to.

/// Market data engine defaults
pub mod market_data {
    /// Closed bars retained per (symbol, timeframe)
    pub const SERIES_CAPACITY: usize = 2000;

    /// Historical bars fetched per (symbol, timeframe) at startup
    pub const BOOTSTRAP_CAP: usize = 2000;

    /// Largest page the history endpoint is asked for
    pub const PAGE_SIZE: usize = 1000;

    /// Concurrent history requests across all symbols
    pub const BOOTSTRAP_PERMITS: usize = 4;

    /// Pause held by each request before releasing its permit (milliseconds)
    pub const BOOTSTRAP_DELAY_MS: u64 = 250;

    /// Delay before reconnecting a failed stream (milliseconds)
    pub const RECONNECT_DELAY_MS: u64 = 5_000;

    /// Websocket connect timeout (milliseconds)
    pub const CONNECT_TIMEOUT_MS: u64 = 10_000;

    pub const BINANCE_WS_URL: &str = "wss://stream.binance.com:9443/ws";
    pub const BINANCE_REST_URL: &str = "https://api.binance.com";
}

/// Task subscription defaults
pub mod subscriptions {
    /// Queue capacity for subscriptions that do not specify one
    pub const DEFAULT_CAPACITY: usize = 1024;

    pub const OVERFLOW_POLICY: &str = "drop_oldest";

    /// Fill percentage that triggers a pressure warning
    pub const WARN_THRESHOLD_PERCENT: u8 = 80;

    /// Minimum spacing between pressure warnings (milliseconds)
    pub const WARN_INTERVAL_MS: u64 = 5_000;
}

/// Strategy ownership defaults
pub mod ownership {
    pub const REDIS_URL: &str = "redis://127.0.0.1:6379";
    pub const KEY_PREFIX: &str = "strategy_lease";
    pub const LEASE_TTL_SECS: u64 = 30;
    pub const RENEW_INTERVAL_SECS: u64 = 10;
    pub const RECONCILE_INTERVAL_SECS: u64 = 30;
}
