//! Command Poller & Executor
//!
//! ## State Machine
//!
//! ```text
//!            poll: new id
//!   ┌──────┐ ─────────────────► ┌───────────┐
//!   │ Idle │                    │ Executing │  mode ─► pump ─► report ─► ack
//!   └──────┘ ◄───────────────── └───────────┘
//!            done (ack or not)
//! ```
//!
//! One command per step. The poll returns at most the newest unexecuted
//! command; anything else waits for a later step.
//!
//! ## Exactly-Once Actuation
//!
//! Identifiers executed since boot are kept in a small ledger. The backend
//! keeps returning a command until its acknowledgement lands, so a command
//! whose ack failed shows up again on the next poll. The ledger turns that
//! into an ack retry instead of a second actuation.
//!
//! Acknowledgement always follows local actuation and the status report. A
//! relay that would not latch still gets its command acknowledged; the
//! status report carries the state the relay was observed in.

use alloc::string::String;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{OutputPin, StatefulOutputPin};
use heapless::Deque;

use crate::actuator::{Actuator, BlinkPattern};
use crate::backend::BackendClient;
use crate::constants::EXECUTED_LEDGER_CAPACITY;
use crate::errors::{SyncError, SyncResult};
use crate::model::{Command, DeviceState};
use crate::traits::Transport;

/// Executor phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutorState {
    /// Waiting for the next poll
    #[default]
    Idle,
    /// Applying a command
    Executing,
}

/// What happened to one executed command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutcome {
    /// Command identifier
    pub command_id: String,
    /// Pump state the command asked for
    pub requested_pump: bool,
    /// Pump state read back from the relay
    pub observed_pump: bool,
    /// Automatic mode after the command
    pub automatic_mode: bool,
    /// Whether the command toggled automatic mode
    pub mode_changed: bool,
    /// Relay failure, if the pump did not reach the requested state
    pub actuation_error: Option<SyncError>,
    /// Status row updated
    pub reported: bool,
    /// Command marked executed on the backend
    pub acknowledged: bool,
}

#[derive(Debug, Clone)]
struct LedgerEntry {
    id: String,
    acknowledged: bool,
}

/// Polls, executes and acknowledges commands
#[derive(Debug, Default)]
pub struct CommandExecutor {
    state: ExecutorState,
    ledger: Deque<LedgerEntry, EXECUTED_LEDGER_CAPACITY>,
}

impl CommandExecutor {
    /// Idle executor with an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Current phase
    pub fn state(&self) -> ExecutorState {
        self.state
    }

    /// Whether `id` was executed since boot
    pub fn has_executed(&self, id: &str) -> bool {
        self.ledger.iter().any(|e| e.id == id)
    }

    fn remember(&mut self, id: &str) {
        if self.ledger.is_full() {
            self.ledger.pop_front();
        }
        // cannot fail after the pop above
        let _ = self.ledger.push_back(LedgerEntry { id: id.into(), acknowledged: false });
    }

    fn mark_acknowledged(&mut self, id: &str) {
        if let Some(entry) = self.ledger.iter_mut().find(|e| e.id == id) {
            entry.acknowledged = true;
        }
    }

    /// Poll once and act on whatever came back
    ///
    /// `Ok(None)` means there was nothing new to execute. Poll failures other
    /// than unparseable payloads are returned; everything after actuation is
    /// captured in the [`ExecutionOutcome`].
    pub fn step<T, R, L, D>(
        &mut self,
        client: &mut BackendClient<T>,
        actuator: &mut Actuator<R, L, D>,
        device: &mut DeviceState,
    ) -> SyncResult<Option<ExecutionOutcome>>
    where
        T: Transport,
        R: StatefulOutputPin,
        L: OutputPin,
        D: DelayNs,
    {
        let command = match client.poll_command() {
            Ok(Some(command)) => command,
            Ok(None) => return Ok(None),
            Err(SyncError::Parse(msg)) => {
                log_warn!("ignoring malformed command: {}", msg);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let seen = self
            .ledger
            .iter()
            .find(|e| e.id == command.id)
            .map(|e| e.acknowledged);
        if let Some(acknowledged) = seen {
            if acknowledged {
                log_debug!("command {} already executed", command.id);
                return Ok(None);
            }
            log_info!("command {} already executed, retrying acknowledgement", command.id);
            client.acknowledge(&command.id)?;
            self.mark_acknowledged(&command.id);
            return Ok(None);
        }

        self.state = ExecutorState::Executing;
        let outcome = self.execute(command, client, actuator, device);
        self.state = ExecutorState::Idle;
        Ok(Some(outcome))
    }

    fn execute<T, R, L, D>(
        &mut self,
        command: Command,
        client: &mut BackendClient<T>,
        actuator: &mut Actuator<R, L, D>,
        device: &mut DeviceState,
    ) -> ExecutionOutcome
    where
        T: Transport,
        R: StatefulOutputPin,
        L: OutputPin,
        D: DelayNs,
    {
        log_info!(
            "executing command {}: pump={} auto={:?}",
            command.id,
            command.pump_on,
            command.automatic_mode
        );

        let mut mode_changed = false;
        if let Some(auto) = command.automatic_mode {
            if device.automatic_mode != auto {
                device.automatic_mode = auto;
                mode_changed = true;
                actuator.blink(BlinkPattern::ModeChanged);
            }
        }

        let actuation_error = match actuator.set_pump(command.pump_on) {
            Ok(_) => None,
            Err(e) => {
                log_warn!("command {} actuation failed: {}", command.id, e);
                Some(e)
            }
        };
        device.pump_on = actuator.pump_on();
        self.remember(&command.id);

        let reported = match client.report_status(device) {
            Ok(()) => true,
            Err(e) => {
                log_warn!("status report after command {} failed: {}", command.id, e);
                false
            }
        };

        let acknowledged = match client.acknowledge(&command.id) {
            Ok(()) => {
                self.mark_acknowledged(&command.id);
                true
            }
            Err(e) => {
                log_warn!("acknowledging command {} failed: {}", command.id, e);
                false
            }
        };

        ExecutionOutcome {
            command_id: command.id,
            requested_pump: command.pump_on,
            observed_pump: device.pump_on,
            automatic_mode: device.automatic_mode,
            mode_changed,
            actuation_error,
            reported,
            acknowledged,
        }
    }
}
