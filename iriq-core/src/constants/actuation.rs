//! Actuation Constants
//!
//! Relay verification, LED signalling and automatic irrigation bounds.

// ===== RELAY =====

/// Initial wait between driving the relay and reading it back (milliseconds).
pub const RELAY_SETTLE_MS: u32 = 100;

/// Drive attempts before giving up on a relay that will not latch.
pub const RELAY_MAX_ATTEMPTS: u8 = 3;

/// Upper bound on the settle wait as it grows between attempts (milliseconds).
pub const RELAY_MAX_SETTLE_MS: u32 = 800;

// ===== LED =====

/// LED on time per blink (milliseconds).
pub const LED_BLINK_ON_MS: u32 = 100;

/// LED off time between blinks (milliseconds).
pub const LED_BLINK_OFF_MS: u32 = 100;

// ===== AUTOMATIC MODE =====

/// Percentage points above the threshold at which automatic watering stops.
pub const AUTO_HYSTERESIS_PCT: u8 = 10;

/// Longest continuous automatic run (milliseconds).
pub const AUTO_MAX_RUN_MS: u64 = 120_000;

/// Pause after an automatic stop before another automatic start (milliseconds).
pub const AUTO_COOLDOWN_MS: u64 = 300_000;

// ===== COMMANDS =====

/// Command identifiers remembered since boot.
pub const EXECUTED_LEDGER_CAPACITY: usize = 16;
