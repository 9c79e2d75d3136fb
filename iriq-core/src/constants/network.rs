//! Backend Constants
//!
//! Paths and table names of the PostgREST backend and the device
//! authentication function.

/// Per-request timeout (seconds).
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;

/// Device authentication function, relative to the base URL.
pub const AUTH_FUNCTION_PATH: &str = "/functions/v1/authenticate-device";

/// Device type reported to the authentication function and audit log.
pub const DEFAULT_DEVICE_TYPE: &str = "ESP32";

/// REST prefix for table endpoints.
pub const REST_PREFIX: &str = "/rest/v1";

/// Moisture readings table.
pub const TABLE_SENSOR_READINGS: &str = "sensor_readings";

/// One row per device holding its replicated state.
pub const TABLE_DEVICE_STATUS: &str = "device_status";

/// Pending and executed pump commands.
pub const TABLE_CONTROL_COMMANDS: &str = "control_commands";

/// Liveness pings.
pub const TABLE_DEVICE_HEARTBEATS: &str = "device_heartbeats";

/// Authentication audit trail.
pub const TABLE_DEVICE_AUTH_LOGS: &str = "device_auth_logs";
