//! Constants for IriQ Core
//!
//! Default values for every tunable in [`DeviceConfig`](crate::config::DeviceConfig).
//! Field deployments override most of these through the config file; the
//! numbers here are what a freshly flashed board runs with.
//!
//! ## Organization
//!
//! - **Time**: scheduling intervals and credential lease
//! - **Sensors**: moisture probe calibration and sampling
//! - **Network**: backend timeouts, endpoints and table names
//! - **Actuation**: relay verification and LED timing, automatic-mode bounds

/// Scheduling intervals, unit conversions and credential lifetime.
pub mod time;

/// Moisture probe calibration and oversampling.
pub mod sensors;

/// Backend endpoints, table names and transport limits.
pub mod network;

/// Relay verification, LED patterns and automatic-mode limits.
pub mod actuation;

pub use time::{
    MS_PER_SECOND, MS_PER_MINUTE, MS_PER_HOUR,
    DEFAULT_SAMPLE_INTERVAL_MS, DEFAULT_COMMAND_POLL_INTERVAL_MS,
    DEFAULT_STATUS_INTERVAL_MS, DEFAULT_HEARTBEAT_INTERVAL_MS,
    DEFAULT_CREDENTIAL_LEASE_MS, DEFAULT_IDLE_SLEEP_MS,
};

pub use sensors::{
    MOISTURE_RAW_DRY, MOISTURE_RAW_WET, MOISTURE_THRESHOLD_PCT,
    MOISTURE_OVERSAMPLE_COUNT, MOISTURE_OVERSAMPLE_GAP_MS,
};

pub use actuation::{
    RELAY_SETTLE_MS, RELAY_MAX_ATTEMPTS, RELAY_MAX_SETTLE_MS,
    EXECUTED_LEDGER_CAPACITY,
};
