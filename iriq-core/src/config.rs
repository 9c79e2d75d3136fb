//! Device configuration
//!
//! Everything except `device_id` and the backend location has a default, so
//! a minimal config file is:
//!
//! ```json
//! {
//!   "device_id": "garden-01",
//!   "backend": { "base_url": "https://example.supabase.co", "api_key": "<anon key>" }
//! }
//! ```
//!
//! Parsing and validation live here; reading the file and applying
//! environment overrides is left to the binary.

use alloc::string::{String, ToString};

use serde::{Deserialize, Serialize};

use crate::actuator::{ActuatorConfig, RelayPolarity};
use crate::automatic::AutomaticPolicy;
use crate::backend::{is_query_safe, UpsertOrder};
use crate::constants::actuation::{
    AUTO_COOLDOWN_MS, AUTO_HYSTERESIS_PCT, AUTO_MAX_RUN_MS, LED_BLINK_OFF_MS, LED_BLINK_ON_MS,
};
use crate::constants::network::{DEFAULT_DEVICE_TYPE, DEFAULT_HTTP_TIMEOUT_SECS};
use crate::constants::{
    DEFAULT_COMMAND_POLL_INTERVAL_MS, DEFAULT_CREDENTIAL_LEASE_MS, DEFAULT_HEARTBEAT_INTERVAL_MS,
    DEFAULT_IDLE_SLEEP_MS, DEFAULT_SAMPLE_INTERVAL_MS, DEFAULT_STATUS_INTERVAL_MS,
    MOISTURE_OVERSAMPLE_COUNT, MOISTURE_OVERSAMPLE_GAP_MS, MOISTURE_RAW_DRY, MOISTURE_RAW_WET,
    MOISTURE_THRESHOLD_PCT, RELAY_MAX_ATTEMPTS, RELAY_MAX_SETTLE_MS, RELAY_SETTLE_MS,
};
use crate::errors::ConfigError;
use crate::moisture::{Calibration, MoistureSampler};
use crate::retry::RetryPolicy;

/// Complete device configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Identifier of this device in every backend table
    pub device_id: String,
    /// Backend location and behaviour
    pub backend: BackendConfig,
    /// How the device obtains its credential
    #[serde(default)]
    pub auth: AuthConfig,
    /// Pins, calibration and relay verification
    #[serde(default)]
    pub hardware: HardwareConfig,
    /// Automatic irrigation
    #[serde(default)]
    pub automatic: AutomaticConfig,
    /// Step intervals
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

/// Backend location and behaviour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Project URL, `https://...`
    pub base_url: String,
    /// Pre-shared API key sent as `apikey` on every request
    #[serde(default)]
    pub api_key: String,
    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Which half of the status upsert goes first
    #[serde(default)]
    pub upsert_order: UpsertOrder,
    /// Owner written into the status row
    #[serde(default)]
    pub owner_id: Option<String>,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_HTTP_TIMEOUT_SECS
}

/// Credential source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthStrategy {
    /// Short-lived token from the device authentication function
    #[default]
    EdgeFunction,
    /// The API key itself as bearer; degraded
    StaticKey,
}

/// How the device obtains its credential
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Credential source
    #[serde(default)]
    pub strategy: AuthStrategy,
    /// Lifetime given to new credentials (ms)
    #[serde(default = "default_lease_ms")]
    pub lease_ms: u64,
    /// Device type announced to the issuer
    #[serde(default = "default_device_type")]
    pub device_type: String,
    /// Write each attempt to the authentication audit log
    #[serde(default)]
    pub audit_log: bool,
    /// Directory for the persisted credential record
    #[serde(default = "default_state_dir")]
    pub state_dir: String,
}

fn default_lease_ms() -> u64 {
    DEFAULT_CREDENTIAL_LEASE_MS
}

fn default_device_type() -> String {
    DEFAULT_DEVICE_TYPE.into()
}

fn default_state_dir() -> String {
    "/var/lib/iriq".into()
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            strategy: AuthStrategy::default(),
            lease_ms: default_lease_ms(),
            device_type: default_device_type(),
            audit_log: false,
            state_dir: default_state_dir(),
        }
    }
}

/// Pins, calibration and relay verification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareConfig {
    /// GPIO line driving the pump relay
    pub relay_pin: u64,
    /// GPIO line driving the status LED
    pub led_pin: u64,
    /// IIO device holding the moisture channel
    pub adc_device: u32,
    /// IIO channel of the moisture probe
    pub adc_channel: u32,
    /// Relay input polarity
    pub relay_polarity: RelayPolarity,
    /// First settle wait (ms)
    pub relay_settle_ms: u32,
    /// Drive attempts before giving up
    pub relay_max_attempts: u8,
    /// Settle wait ceiling (ms)
    pub relay_max_settle_ms: u32,
    /// LED on time per blink (ms)
    pub led_on_ms: u32,
    /// LED off time between blinks (ms)
    pub led_off_ms: u32,
    /// Raw count in dry air
    pub moisture_dry_raw: u16,
    /// Raw count in water
    pub moisture_wet_raw: u16,
    /// Dryness threshold (%)
    pub moisture_threshold_pct: u8,
    /// Reads averaged per sample
    pub oversample_count: u8,
    /// Gap between reads (ms)
    pub oversample_gap_ms: u32,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            relay_pin: 26,
            led_pin: 2,
            adc_device: 0,
            adc_channel: 0,
            relay_polarity: RelayPolarity::default(),
            relay_settle_ms: RELAY_SETTLE_MS,
            relay_max_attempts: RELAY_MAX_ATTEMPTS,
            relay_max_settle_ms: RELAY_MAX_SETTLE_MS,
            led_on_ms: LED_BLINK_ON_MS,
            led_off_ms: LED_BLINK_OFF_MS,
            moisture_dry_raw: MOISTURE_RAW_DRY,
            moisture_wet_raw: MOISTURE_RAW_WET,
            moisture_threshold_pct: MOISTURE_THRESHOLD_PCT,
            oversample_count: MOISTURE_OVERSAMPLE_COUNT,
            oversample_gap_ms: MOISTURE_OVERSAMPLE_GAP_MS,
        }
    }
}

impl HardwareConfig {
    /// Relay and LED settings for the [`Actuator`](crate::actuator::Actuator)
    pub fn actuator(&self) -> ActuatorConfig {
        ActuatorConfig {
            polarity: self.relay_polarity,
            policy: RetryPolicy::new(self.relay_max_attempts, self.relay_settle_ms)
                .max_delay_ms(self.relay_max_settle_ms),
            led_on_ms: self.led_on_ms,
            led_off_ms: self.led_off_ms,
        }
    }

    /// Sampler built from the calibration settings
    pub fn sampler(&self) -> MoistureSampler {
        MoistureSampler::new(
            Calibration {
                dry_raw: self.moisture_dry_raw,
                wet_raw: self.moisture_wet_raw,
            },
            self.moisture_threshold_pct,
        )
        .with_oversampling(self.oversample_count, self.oversample_gap_ms)
    }
}

/// Automatic irrigation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomaticConfig {
    /// Automatic mode at boot, until a command changes it
    pub enabled_at_boot: bool,
    /// Points above threshold at which watering stops
    pub hysteresis_pct: u8,
    /// Longest automatic run (ms)
    pub max_run_ms: u64,
    /// Hold-off after an automatic stop (ms)
    pub cooldown_ms: u64,
}

impl Default for AutomaticConfig {
    fn default() -> Self {
        Self {
            enabled_at_boot: false,
            hysteresis_pct: AUTO_HYSTERESIS_PCT,
            max_run_ms: AUTO_MAX_RUN_MS,
            cooldown_ms: AUTO_COOLDOWN_MS,
        }
    }
}

/// Step intervals (ms)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Moisture sampling and reading report
    pub sample_interval_ms: u64,
    /// Command poll
    pub command_poll_interval_ms: u64,
    /// Periodic status report
    pub status_interval_ms: u64,
    /// Heartbeat
    pub heartbeat_interval_ms: u64,
    /// Sleep between ticks
    pub idle_sleep_ms: u32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: DEFAULT_SAMPLE_INTERVAL_MS,
            command_poll_interval_ms: DEFAULT_COMMAND_POLL_INTERVAL_MS,
            status_interval_ms: DEFAULT_STATUS_INTERVAL_MS,
            heartbeat_interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MS,
            idle_sleep_ms: DEFAULT_IDLE_SLEEP_MS,
        }
    }
}

impl DeviceConfig {
    /// Parse JSON without validating, so overrides can be applied first
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|e| ConfigError::Malformed(e.to_string()))
    }

    /// Parse JSON and validate
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config = Self::parse(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Automatic policy built from the config
    pub fn automatic_policy(&self) -> AutomaticPolicy {
        AutomaticPolicy::new(
            self.hardware.moisture_threshold_pct,
            self.automatic.hysteresis_pct,
            self.automatic.max_run_ms,
            self.automatic.cooldown_ms,
        )
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device_id.is_empty() {
            return Err(ConfigError::Missing("device_id"));
        }
        if !is_query_safe(&self.device_id) {
            return Err(ConfigError::Invalid {
                field: "device_id",
                reason: "only letters, digits, '-', '_' and '.' are allowed",
            });
        }
        if self.backend.base_url.is_empty() {
            return Err(ConfigError::Missing("backend.base_url"));
        }
        let url = &self.backend.base_url;
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ConfigError::Invalid {
                field: "backend.base_url",
                reason: "must start with http:// or https://",
            });
        }
        if self.backend.api_key.is_empty() {
            return Err(ConfigError::Missing("backend.api_key"));
        }
        if self.backend.timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "backend.timeout_secs",
                reason: "must be positive",
            });
        }
        if self.auth.lease_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "auth.lease_ms",
                reason: "must be positive",
            });
        }
        if self.hardware.moisture_dry_raw <= self.hardware.moisture_wet_raw {
            return Err(ConfigError::Invalid {
                field: "hardware.moisture_dry_raw",
                reason: "must be greater than moisture_wet_raw",
            });
        }
        if self.hardware.moisture_threshold_pct > 100 {
            return Err(ConfigError::Invalid {
                field: "hardware.moisture_threshold_pct",
                reason: "must be at most 100",
            });
        }
        if self.hardware.relay_max_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "hardware.relay_max_attempts",
                reason: "must be at least 1",
            });
        }
        if self.schedule.command_poll_interval_ms == 0 || self.schedule.sample_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "schedule",
                reason: "intervals must be positive",
            });
        }
        Ok(())
    }
}
