//! Pump Relay and Status LED
//!
//! ## Closed-Loop Actuation
//!
//! A relay command is not trusted until the pin reads back the requested
//! level. Each attempt drives the pin, waits a settle time and reads it back.
//! On disagreement the drive is re-asserted with a longer settle time, up to
//! a fixed number of attempts:
//!
//! ```text
//! attempt 0: drive ─ 100 ms ─ read back ── match? ─► done
//! attempt 1: drive ─ 200 ms ─ read back ── match? ─► done
//! attempt 2: drive ─ 400 ms ─ read back ── match? ─► done
//!                                          └─ no ──► ActuationMismatch { observed }
//! ```
//!
//! When every attempt disagrees, whatever the pin last read is taken as the
//! truth. The actuator records it as the pump state so the device reports
//! what physically happened, not what was asked for.
//!
//! ## Polarity
//!
//! Most relay boards pull the coil in when the input is driven low.
//! [`RelayPolarity::ActiveLow`] (the default) maps "pump on" to a low level.
//!
//! ## LED
//!
//! The LED blinks a short pattern after each change so a person standing at
//! the device can tell what just happened. LED failures are logged and
//! otherwise ignored.

use alloc::format;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{OutputPin, StatefulOutputPin};
use serde::{Deserialize, Serialize};

use crate::constants::actuation::{LED_BLINK_OFF_MS, LED_BLINK_ON_MS};
use crate::errors::{SyncError, SyncResult};
use crate::retry::{retry, RetryPolicy};

/// Which pin level energises the relay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayPolarity {
    /// Low level switches the pump on
    #[default]
    ActiveLow,
    /// High level switches the pump on
    ActiveHigh,
}

impl RelayPolarity {
    fn level_for(&self, on: bool) -> bool {
        match self {
            RelayPolarity::ActiveLow => !on,
            RelayPolarity::ActiveHigh => on,
        }
    }

    fn is_on(&self, level_high: bool) -> bool {
        self.level_for(level_high)
    }
}

/// LED signal after a state change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlinkPattern {
    /// Pump switched on
    PumpOn,
    /// Pump switched off
    PumpOff,
    /// Automatic mode toggled
    ModeChanged,
}

impl BlinkPattern {
    /// Number of blinks
    pub fn count(&self) -> u8 {
        match self {
            BlinkPattern::PumpOn => 2,
            BlinkPattern::PumpOff => 1,
            BlinkPattern::ModeChanged => 3,
        }
    }
}

/// Relay verification and LED timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActuatorConfig {
    /// Relay input polarity
    pub polarity: RelayPolarity,
    /// Attempts and settle schedule
    pub policy: RetryPolicy,
    /// LED on time per blink (ms)
    pub led_on_ms: u32,
    /// LED off time between blinks (ms)
    pub led_off_ms: u32,
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            polarity: RelayPolarity::default(),
            policy: RetryPolicy::default(),
            led_on_ms: LED_BLINK_ON_MS,
            led_off_ms: LED_BLINK_OFF_MS,
        }
    }
}

fn hardware<E: core::fmt::Debug>(what: &str, err: E) -> SyncError {
    SyncError::Hardware(format!("{}: {:?}", what, err))
}

/// Pump relay with read-back verification, plus status LED
pub struct Actuator<R, L, D> {
    relay: R,
    led: L,
    delay: D,
    config: ActuatorConfig,
    pump_on: bool,
}

impl<R, L, D> Actuator<R, L, D>
where
    R: StatefulOutputPin,
    L: OutputPin,
    D: DelayNs,
{
    /// Wrap the pins; the pump is assumed off until driven
    pub fn new(relay: R, led: L, delay: D, config: ActuatorConfig) -> Self {
        Self {
            relay,
            led,
            delay,
            config,
            pump_on: false,
        }
    }

    /// Last verified (or observed) pump state
    pub fn pump_on(&self) -> bool {
        self.pump_on
    }

    /// Delay provider shared with the rest of the control loop
    pub fn delay_mut(&mut self) -> &mut D {
        &mut self.delay
    }

    /// Release the pins
    pub fn release(self) -> (R, L, D) {
        (self.relay, self.led, self.delay)
    }

    /// Put the relay in a known off state without signalling
    pub fn drive_off(&mut self) -> SyncResult<bool> {
        self.drive(false)
    }

    /// Drive the pump to `on` and verify it
    ///
    /// Returns the verified state. On
    /// [`SyncError::ActuationMismatch`] the observed state has already been
    /// recorded; on [`SyncError::Hardware`] the previous state is kept.
    pub fn set_pump(&mut self, on: bool) -> SyncResult<bool> {
        let observed = self.drive(on)?;
        self.blink(if observed { BlinkPattern::PumpOn } else { BlinkPattern::PumpOff });
        Ok(observed)
    }

    fn drive(&mut self, on: bool) -> SyncResult<bool> {
        let polarity = self.config.polarity;
        let relay = &mut self.relay;
        let delay = &mut self.delay;

        let result = retry(
            &self.config.policy,
            |attempt: u8, settle_ms: u32| -> SyncResult<bool> {
                if attempt > 0 {
                    log_warn!("relay did not reach {}, re-asserting (attempt {})", on, attempt + 1);
                }
                relay
                    .set_state(polarity.level_for(on).into())
                    .map_err(|e| hardware("relay write", e))?;
                delay.delay_ms(settle_ms);
                let level_high = relay.is_set_high().map_err(|e| hardware("relay read", e))?;
                let observed = polarity.is_on(level_high);
                if observed == on {
                    Ok(observed)
                } else {
                    Err(SyncError::ActuationMismatch { requested: on, observed })
                }
            },
            |e| matches!(e, SyncError::ActuationMismatch { .. }),
        );

        match &result {
            Ok(observed) => self.pump_on = *observed,
            Err(SyncError::ActuationMismatch { observed, .. }) => {
                log_warn!("relay stuck: requested {}, observed {}", on, observed);
                self.pump_on = *observed;
            }
            Err(e) => log_warn!("relay fault, keeping last known state: {}", e),
        }
        result
    }

    /// Blink `pattern` on the LED
    pub fn blink(&mut self, pattern: BlinkPattern) {
        for _ in 0..pattern.count() {
            if let Err(e) = self.led.set_high() {
                log_debug!("led write failed: {:?}", e);
                return;
            }
            self.delay.delay_ms(self.config.led_on_ms);
            if let Err(e) = self.led.set_low() {
                log_debug!("led write failed: {:?}", e);
                return;
            }
            self.delay.delay_ms(self.config.led_off_ms);
        }
    }
}
