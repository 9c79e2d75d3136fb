//! Time-Related Constants
//!
//! Intervals used by the control loop scheduler and the session lease.

// ===== TIME UNIT CONVERSIONS =====

/// Milliseconds per second.
pub const MS_PER_SECOND: u64 = 1000;

/// Milliseconds per minute.
pub const MS_PER_MINUTE: u64 = MS_PER_SECOND * 60;

/// Milliseconds per hour.
pub const MS_PER_HOUR: u64 = MS_PER_MINUTE * 60;

// ===== SCHEDULING INTERVALS =====

/// Moisture sampling and reading report interval (milliseconds).
///
/// Soil moisture changes over minutes, not seconds. One reading a minute
/// keeps the backend history useful without flooding the readings table.
pub const DEFAULT_SAMPLE_INTERVAL_MS: u64 = MS_PER_MINUTE;

/// Command poll interval (milliseconds).
///
/// Bounds the latency between a user pressing "pump on" and the relay moving.
pub const DEFAULT_COMMAND_POLL_INTERVAL_MS: u64 = 5 * MS_PER_SECOND;

/// Periodic status report interval (milliseconds).
pub const DEFAULT_STATUS_INTERVAL_MS: u64 = MS_PER_MINUTE;

/// Heartbeat interval (milliseconds).
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 5 * MS_PER_MINUTE;

/// Sleep between control loop ticks (milliseconds).
pub const DEFAULT_IDLE_SLEEP_MS: u32 = 50;

// ===== CREDENTIALS =====

/// Lifetime assigned to a freshly issued credential (milliseconds).
///
/// Matches the 24 h token lifetime of the device authentication function.
pub const DEFAULT_CREDENTIAL_LEASE_MS: u64 = 24 * MS_PER_HOUR;
