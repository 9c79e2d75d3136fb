//! Soil Moisture Sampling
//!
//! ## Pipeline
//!
//! ```text
//! probe ──► oversample (N reads, gap between) ──► average
//!       ──► map raw count to 0..=100 % ──► smooth against previous ──► reading
//! ```
//!
//! ## Mapping
//!
//! Capacitive probes read *high* when dry. Two calibration points fix the
//! line: `dry_raw` (probe in air) maps to 0 % and `wet_raw` (probe in water)
//! maps to 100 %. Counts outside the calibrated span clamp to the nearest
//! end. Inside it the mapping is integer linear interpolation truncated
//! toward zero, so the percentage only moves when the count moves enough.
//!
//! ## Smoothing
//!
//! `smoothed = (current * 7 + previous * 3) / 10`, integer arithmetic. The
//! first reading after boot has no history and is taken as is. A failed
//! sample leaves the running value untouched.

use alloc::string::{String, ToString};
use embedded_hal::delay::DelayNs;

use crate::constants::sensors::{SMOOTHING_NEW_WEIGHT, SMOOTHING_PREVIOUS_WEIGHT};
use crate::constants::{
    MOISTURE_OVERSAMPLE_COUNT, MOISTURE_OVERSAMPLE_GAP_MS, MOISTURE_RAW_DRY, MOISTURE_RAW_WET,
    MOISTURE_THRESHOLD_PCT,
};
use crate::errors::{SyncError, SyncResult};
use crate::model::MoistureReading;
use crate::traits::MoistureProbe;

/// Two-point probe calibration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calibration {
    /// Raw count in dry air (0 %)
    pub dry_raw: u16,
    /// Raw count in water (100 %)
    pub wet_raw: u16,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            dry_raw: MOISTURE_RAW_DRY,
            wet_raw: MOISTURE_RAW_WET,
        }
    }
}

impl Calibration {
    /// Map a raw count to a percentage
    pub fn to_percent(&self, raw: u16) -> u8 {
        if raw >= self.dry_raw {
            return 0;
        }
        if raw <= self.wet_raw {
            return 100;
        }
        // dry_raw > raw > wet_raw here, so both factors are positive
        let span = (self.dry_raw - self.wet_raw) as u32;
        let offset = (self.dry_raw - raw) as u32;
        (offset * 100 / span) as u8
    }
}

/// Weighted running average of two percentages
pub fn smooth(current: u8, previous: u8) -> u8 {
    let weighted =
        current as u32 * SMOOTHING_NEW_WEIGHT + previous as u32 * SMOOTHING_PREVIOUS_WEIGHT;
    (weighted / (SMOOTHING_NEW_WEIGHT + SMOOTHING_PREVIOUS_WEIGHT)) as u8
}

/// Stateful sampler owning the smoothed running value
#[derive(Debug, Clone)]
pub struct MoistureSampler {
    calibration: Calibration,
    threshold_pct: u8,
    oversample_count: u8,
    oversample_gap_ms: u32,
    smoothed: Option<u8>,
}

impl Default for MoistureSampler {
    fn default() -> Self {
        Self::new(Calibration::default(), MOISTURE_THRESHOLD_PCT)
    }
}

impl MoistureSampler {
    /// Sampler with default oversampling
    pub fn new(calibration: Calibration, threshold_pct: u8) -> Self {
        Self {
            calibration,
            threshold_pct,
            oversample_count: MOISTURE_OVERSAMPLE_COUNT,
            oversample_gap_ms: MOISTURE_OVERSAMPLE_GAP_MS,
            smoothed: None,
        }
    }

    /// Override oversampling; a count of zero is treated as one
    pub fn with_oversampling(mut self, count: u8, gap_ms: u32) -> Self {
        self.oversample_count = count.max(1);
        self.oversample_gap_ms = gap_ms;
        self
    }

    /// Dryness threshold in percent
    pub fn threshold_pct(&self) -> u8 {
        self.threshold_pct
    }

    /// Current smoothed value, if any sample has succeeded
    pub fn smoothed(&self) -> Option<u8> {
        self.smoothed
    }

    /// Take one oversampled, mapped and smoothed reading
    ///
    /// Individual failed reads are skipped. Fails with
    /// [`SyncError::Sensor`] only when every read in the burst failed.
    pub fn sample<P, D>(&mut self, probe: &mut P, delay: &mut D) -> SyncResult<MoistureReading>
    where
        P: MoistureProbe + ?Sized,
        D: DelayNs + ?Sized,
    {
        let mut sum: u32 = 0;
        let mut good: u32 = 0;
        let mut last_error: Option<String> = None;

        for i in 0..self.oversample_count {
            if i > 0 {
                delay.delay_ms(self.oversample_gap_ms);
            }
            match probe.read_raw() {
                Ok(raw) => {
                    sum += raw as u32;
                    good += 1;
                }
                Err(e) => last_error = Some(e.to_string()),
            }
        }

        if good == 0 {
            return Err(SyncError::Sensor(
                last_error.unwrap_or_else(|| "no samples taken".to_string()),
            ));
        }

        let average = (sum / good) as u16;
        let current = self.calibration.to_percent(average);
        let value = match self.smoothed {
            Some(previous) => smooth(current, previous),
            None => current,
        };
        self.smoothed = Some(value);
        log_debug!("moisture raw={} mapped={}% smoothed={}%", average, current, value);

        Ok(MoistureReading::new(value, self.threshold_pct))
    }
}
