//! Moisture Probe Constants
//!
//! Calibration for a capacitive soil probe on a 12-bit ADC. The probe reads
//! high when dry and low when wet.

/// Raw reading in dry air. At or above this the soil is reported as 0 %.
pub const MOISTURE_RAW_DRY: u16 = 4095;

/// Raw reading submerged in water. At or below this the soil is reported as 100 %.
pub const MOISTURE_RAW_WET: u16 = 1500;

/// Below this percentage the soil counts as dry.
pub const MOISTURE_THRESHOLD_PCT: u8 = 30;

/// Samples averaged per reading.
pub const MOISTURE_OVERSAMPLE_COUNT: u8 = 5;

/// Gap between oversamples (milliseconds).
pub const MOISTURE_OVERSAMPLE_GAP_MS: u32 = 20;

/// Weight of the new sample in the running average, out of 10.
pub const SMOOTHING_NEW_WEIGHT: u32 = 7;

/// Weight of the previous smoothed value, out of 10.
pub const SMOOTHING_PREVIOUS_WEIGHT: u32 = 3;
