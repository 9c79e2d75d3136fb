//! Single-threaded control loop
//!
//! Owns every piece of device context: the backend client (and through it
//! the session), the actuator, the probe and the [`DeviceState`]. There are
//! no globals and no background tasks. Each [`tick`](ControlLoop::tick)
//! runs whichever steps are due, in a fixed order:
//!
//! 1. sample moisture and report the reading
//! 2. let the automatic policy start or stop the pump
//! 3. poll for a command and execute it
//! 4. report status (periodically, plus one immediate attempt after a local
//!    change)
//! 5. send a heartbeat
//!
//! Each step has its own [`IntervalTimer`]; all are due on the first tick.
//! A failing step is logged and retried when its timer next fires, so a dead
//! link leaves the device sampling and watering on its own while reports
//! silently fail. A failed status report is superseded by the next
//! scheduled one, which always carries the current state.

use alloc::boxed::Box;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{OutputPin, StatefulOutputPin};

use crate::actuator::Actuator;
use crate::automatic::{AutoDecision, AutomaticPolicy};
use crate::backend::BackendClient;
use crate::config::ScheduleConfig;
use crate::executor::{CommandExecutor, ExecutionOutcome};
use crate::model::{DeviceState, MoistureReading};
use crate::moisture::MoistureSampler;
use crate::time::IntervalTimer;
use crate::traits::{MoistureProbe, TimeSource, Transport};

/// What one tick did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Reading taken this tick
    pub reading: Option<MoistureReading>,
    /// Automatic policy verdict, when automatic mode acted
    pub automatic: Option<AutoDecision>,
    /// Command executed this tick
    pub command: Option<ExecutionOutcome>,
    /// Status row written this tick (outside command execution)
    pub status_reported: bool,
    /// Heartbeat delivered this tick
    pub heartbeat_sent: bool,
}

/// The device main loop
pub struct ControlLoop<T, R, L, D, P> {
    client: BackendClient<T>,
    actuator: Actuator<R, L, D>,
    probe: P,
    sampler: MoistureSampler,
    executor: CommandExecutor,
    policy: AutomaticPolicy,
    state: DeviceState,
    clock: Box<dyn TimeSource>,
    sample_timer: IntervalTimer,
    command_timer: IntervalTimer,
    status_timer: IntervalTimer,
    heartbeat_timer: IntervalTimer,
    idle_sleep_ms: u32,
    status_dirty: bool,
}

impl<T, R, L, D, P> ControlLoop<T, R, L, D, P>
where
    T: Transport,
    R: StatefulOutputPin,
    L: OutputPin,
    D: DelayNs,
    P: MoistureProbe,
{
    /// Assemble the loop; nothing touches hardware until [`start`](Self::start)
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client: BackendClient<T>,
        actuator: Actuator<R, L, D>,
        probe: P,
        sampler: MoistureSampler,
        policy: AutomaticPolicy,
        clock: Box<dyn TimeSource>,
        schedule: &ScheduleConfig,
        automatic_at_boot: bool,
    ) -> Self {
        Self {
            client,
            actuator,
            probe,
            sampler,
            executor: CommandExecutor::new(),
            policy,
            state: DeviceState {
                pump_on: false,
                automatic_mode: automatic_at_boot,
                moisture_pct: None,
            },
            clock,
            sample_timer: IntervalTimer::new(schedule.sample_interval_ms),
            command_timer: IntervalTimer::new(schedule.command_poll_interval_ms),
            status_timer: IntervalTimer::new(schedule.status_interval_ms),
            heartbeat_timer: IntervalTimer::new(schedule.heartbeat_interval_ms),
            idle_sleep_ms: schedule.idle_sleep_ms,
            status_dirty: false,
        }
    }

    /// Current device state
    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    /// Backend client
    pub fn client(&self) -> &BackendClient<T> {
        &self.client
    }

    /// Actuator
    pub fn actuator(&self) -> &Actuator<R, L, D> {
        &self.actuator
    }

    /// Command executor
    pub fn executor(&self) -> &CommandExecutor {
        &self.executor
    }

    /// Drive the relay to a known off state
    pub fn start(&mut self) {
        if let Err(e) = self.actuator.drive_off() {
            log_warn!("could not verify relay off at start-up: {}", e);
        }
        self.state.pump_on = self.actuator.pump_on();
        log_info!(
            "device {} starting: pump={} auto={}",
            self.client.device_id(),
            self.state.pump_on,
            self.state.automatic_mode
        );
    }

    /// Run every step that is due
    pub fn tick(&mut self) -> TickReport {
        let now = self.clock.now();
        let mut report = TickReport::default();

        if self.sample_timer.poll(now) {
            report.reading = self.sample();
        }

        report.automatic = self.apply_automatic(now);

        if self.command_timer.poll(now) {
            let was_on = self.state.pump_on;
            match self.executor.step(&mut self.client, &mut self.actuator, &mut self.state) {
                Ok(Some(outcome)) => {
                    self.follow_command(now, was_on, &outcome);
                    report.command = Some(outcome);
                }
                Ok(None) => {}
                Err(e) => log_warn!("command poll failed: {}", e),
            }
        }

        // one attempt per local change; a failure waits for the status timer
        if self.status_timer.poll(now) || self.status_dirty {
            self.status_dirty = false;
            match self.client.report_status(&self.state) {
                Ok(()) => report.status_reported = true,
                Err(e) => log_warn!("status report failed: {}", e),
            }
        }

        if self.heartbeat_timer.poll(now) {
            match self.client.send_heartbeat() {
                Ok(()) => report.heartbeat_sent = true,
                Err(e) => log_warn!("heartbeat failed: {}", e),
            }
        }

        report
    }

    fn sample(&mut self) -> Option<MoistureReading> {
        let reading = match self.sampler.sample(&mut self.probe, self.actuator.delay_mut()) {
            Ok(reading) => reading,
            Err(e) => {
                log_warn!("moisture sample failed: {}", e);
                return None;
            }
        };
        self.state.moisture_pct = Some(reading.percentage);
        if let Err(e) = self.client.report_reading(&reading) {
            log_warn!("reading report failed: {}", e);
        }
        Some(reading)
    }

    fn apply_automatic(&mut self, now: u64) -> Option<AutoDecision> {
        let decision = self.policy.evaluate(now, &self.state);
        let on = match decision {
            AutoDecision::Hold => return None,
            AutoDecision::Start => true,
            AutoDecision::Stop(_) => false,
        };

        log_info!("automatic mode: {:?} (moisture {:?}%)", decision, self.state.moisture_pct);
        if let Err(e) = self.actuator.set_pump(on) {
            log_warn!("automatic actuation failed: {}", e);
        }
        self.state.pump_on = self.actuator.pump_on();

        // a start that did not latch backs off like a stop
        if on && self.state.pump_on {
            self.policy.record_start(now);
        } else {
            self.policy.record_stop(now);
        }
        self.status_dirty = true;
        Some(decision)
    }

    /// Keep the automatic policy in step with a manual command
    ///
    /// A manual stop counts as a stop, cooldown included, so automatic mode
    /// does not switch the pump straight back on. A manual start opens a run
    /// that the max-run cap still applies to.
    fn follow_command(&mut self, now: u64, was_on: bool, outcome: &ExecutionOutcome) {
        if outcome.observed_pump {
            if !was_on {
                self.policy.record_start(now);
            }
        } else if was_on {
            self.policy.record_stop(now);
        }
    }

    /// Tick forever, sleeping between ticks
    pub fn run(&mut self) -> ! {
        self.start();
        loop {
            self.tick();
            let idle = self.idle_sleep_ms;
            self.actuator.delay_mut().delay_ms(idle);
        }
    }
}
