//! Automatic irrigation policy
//!
//! Hysteresis controller for automatic mode. Watering starts when the soil
//! drops below the threshold and stops once it has risen `hysteresis` points
//! above it, so the pump does not chatter around a single value.
//!
//! Two safety bounds sit on top:
//! - a run never lasts longer than `max_run_ms`, whatever the probe says
//!   (a probe lying in dry air would otherwise run the pump forever);
//! - after an automatic stop, automatic starts are held off for
//!   `cooldown_ms` so water has time to soak in before it is measured again.
//!
//! The policy only decides. The control loop drives the actuator and reports
//! back with [`record_start`](AutomaticPolicy::record_start) and
//! [`record_stop`](AutomaticPolicy::record_stop).

use crate::constants::actuation::{AUTO_COOLDOWN_MS, AUTO_HYSTERESIS_PCT, AUTO_MAX_RUN_MS};
use crate::constants::MOISTURE_THRESHOLD_PCT;
use crate::model::DeviceState;
use crate::time::Timestamp;

/// Why an automatic run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Moisture recovered past threshold plus hysteresis
    Watered,
    /// Run hit the time cap
    MaxRun,
}

/// Policy verdict for one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoDecision {
    /// Leave the pump alone
    Hold,
    /// Switch the pump on
    Start,
    /// Switch the pump off
    Stop(StopReason),
}

/// Hysteresis controller with run cap and cooldown
#[derive(Debug, Clone)]
pub struct AutomaticPolicy {
    threshold_pct: u8,
    hysteresis_pct: u8,
    max_run_ms: u64,
    cooldown_ms: u64,
    run_started: Option<Timestamp>,
    cooldown_until: Option<Timestamp>,
}

impl Default for AutomaticPolicy {
    fn default() -> Self {
        Self::new(MOISTURE_THRESHOLD_PCT, AUTO_HYSTERESIS_PCT, AUTO_MAX_RUN_MS, AUTO_COOLDOWN_MS)
    }
}

impl AutomaticPolicy {
    /// Policy with explicit bounds
    pub fn new(threshold_pct: u8, hysteresis_pct: u8, max_run_ms: u64, cooldown_ms: u64) -> Self {
        Self {
            threshold_pct,
            hysteresis_pct,
            max_run_ms,
            cooldown_ms,
            run_started: None,
            cooldown_until: None,
        }
    }

    fn stop_level(&self) -> u8 {
        self.threshold_pct.saturating_add(self.hysteresis_pct).min(100)
    }

    /// Decide what the pump should do at `now`
    pub fn evaluate(&mut self, now: Timestamp, state: &DeviceState) -> AutoDecision {
        if !state.automatic_mode {
            self.run_started = None;
            return AutoDecision::Hold;
        }

        if state.pump_on {
            // a manual start while in automatic mode is still capped
            let started = *self.run_started.get_or_insert(now);
            if now.saturating_sub(started) >= self.max_run_ms {
                return AutoDecision::Stop(StopReason::MaxRun);
            }
            return match state.moisture_pct {
                Some(pct) if pct >= self.stop_level() => AutoDecision::Stop(StopReason::Watered),
                _ => AutoDecision::Hold,
            };
        }

        self.run_started = None;
        if self.cooldown_until.map_or(false, |until| now < until) {
            return AutoDecision::Hold;
        }
        match state.moisture_pct {
            Some(pct) if pct < self.threshold_pct => AutoDecision::Start,
            _ => AutoDecision::Hold,
        }
    }

    /// The pump was switched on at `now`
    pub fn record_start(&mut self, now: Timestamp) {
        self.run_started = Some(now);
    }

    /// The pump was switched off at `now`; start the cooldown
    pub fn record_stop(&mut self, now: Timestamp) {
        self.run_started = None;
        self.cooldown_until = Some(now.saturating_add(self.cooldown_ms));
    }

    /// Whether automatic starts are currently held off
    pub fn in_cooldown(&self, now: Timestamp) -> bool {
        self.cooldown_until.map_or(false, |until| now < until)
    }
}
