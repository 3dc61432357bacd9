//! Global Constants
//!
//! Centralized constants for configuration and tuning.
//! All magic numbers should be defined here with documentation.

/// Retry/backoff constants
pub mod retry {
    /// Default maximum retries per model call (attempts = retries + 1)
    pub const DEFAULT_MAX_RETRIES: u32 = 3;

    /// Base delay for exponential backoff (milliseconds)
    pub const BASE_DELAY_MS: u64 = 1000;

    /// Maximum computed backoff delay (seconds)
    pub const MAX_DELAY_SECS: u64 = 60;

    /// Upper bound on a delay the provider asked for in its error message (seconds)
    pub const MAX_EXPLICIT_DELAY_SECS: u64 = 300;
}

/// Pipeline constants
pub mod pipeline {
    /// Default heartbeat interval (seconds)
    pub const HEARTBEAT_INTERVAL_SECS: u64 = 15;

    /// Default context cache time-to-live (seconds)
    pub const CACHE_TTL_SECS: u64 = 3600;

    /// Progress watermarks (percent)
    pub mod progress {
        /// Emitted when the run starts
        pub const STARTED: u8 = 0;
        /// Context cache registered
        pub const CACHE_DONE: u8 = 10;
        /// Planning request issued
        pub const PLANNING_STARTED: u8 = 12;
        /// Plan parsed and scheduled
        pub const PLAN_DONE: u8 = 20;
        /// Generation interpolates from here...
        pub const GENERATION_START: u8 = 20;
        /// ...to here
        pub const GENERATION_END: u8 = 95;
        /// Only ever emitted right before `complete`
        pub const COMPLETE: u8 = 100;
    }
}

/// HTTP/Network constants
pub mod network {
    /// Default request timeout (seconds)
    pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

    /// Connection timeout (seconds)
    pub const CONNECTION_TIMEOUT_SECS: u64 = 30;
}
