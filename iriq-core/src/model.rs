//! Domain model shared by every component

use alloc::string::String;
use core::fmt;

use serde::{Deserialize, Serialize};

use crate::time::Timestamp;

/// Bearer credential with an absolute expiry
///
/// Serialized as `{"token": ..., "expiry": ...}`, the record layout kept by
/// credential stores. `Debug` redacts the token so credentials can be logged
/// safely.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Opaque bearer value
    pub token: String,
    /// Expiry instant in the time base of the issuing clock (ms)
    #[serde(rename = "expiry")]
    pub expires_at: Timestamp,
}

impl Credential {
    /// Credential valid until `expires_at`
    pub fn new(token: impl Into<String>, expires_at: Timestamp) -> Self {
        Self { token: token.into(), expires_at }
    }

    /// Valid strictly before the expiry instant
    pub fn is_valid_at(&self, now: Timestamp) -> bool {
        now < self.expires_at
    }

    /// Milliseconds left at `now`, zero once expired
    pub fn remaining_ms(&self, now: Timestamp) -> u64 {
        self.expires_at.saturating_sub(now)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Pending pump command from the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Backend-assigned identifier
    pub id: String,
    /// Requested pump state
    pub pump_on: bool,
    /// Requested automatic-mode state, when the command changes it
    pub automatic_mode: Option<bool>,
}

/// What the device currently is, as the device itself observed it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceState {
    /// Relay as last read back
    pub pump_on: bool,
    /// Local automatic irrigation enabled
    pub automatic_mode: bool,
    /// Smoothed moisture, absent until the first successful sample
    pub moisture_pct: Option<u8>,
}

/// One smoothed moisture sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoistureReading {
    /// 0 (bone dry) to 100 (saturated)
    pub percentage: u8,
    /// Below the configured dryness threshold
    pub below_threshold: bool,
}

impl MoistureReading {
    /// Reading with the threshold flag derived from `threshold_pct`
    pub fn new(percentage: u8, threshold_pct: u8) -> Self {
        let percentage = percentage.min(100);
        Self {
            percentage,
            below_threshold: percentage < threshold_pct,
        }
    }
}
