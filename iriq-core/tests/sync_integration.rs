//! End-to-end behaviour of the control loop against an in-process backend
//!
//! Covers:
//! - exactly-once command execution and acknowledgement retry
//! - status upsert fallback in both orders
//! - relay verification failures reaching the backend as observed state
//! - session loss and recovery
//! - local operation while the link is down
//! - manual commands in automatic mode
//! - step scheduling

mod common;

use std::sync::Arc;

use iriq_core::auth::StaticKeyAuthenticator;
use iriq_core::automatic::{AutoDecision, AutomaticPolicy, StopReason};
use iriq_core::config::ScheduleConfig;
use iriq_core::store::MemoryCredentialStore;
use iriq_core::time::MockTimeSource;
use iriq_core::{
    BackendClient, Credential, DeviceState, ExecutorState, SessionManager, SyncError, UpsertOrder,
};

use common::{
    client, FakeBackend, RigBuilder, API_KEY, DEVICE_ID, LEASE_MS, OWNER_ID, RAW_DAMP_SOIL,
    RAW_DRY_SOIL, T0,
};

const POLL_MS: u64 = 5_000;

fn manual_on() -> DeviceState {
    DeviceState { pump_on: true, automatic_mode: false, moisture_pct: Some(50) }
}

#[test]
fn test_command_executes_once() {
    let mut rig = RigBuilder::new().build();
    rig.control.start();
    rig.backend.push_command(1, true, None);

    let report = rig.control.tick();
    let outcome = report.command.expect("command executed");
    assert_eq!(outcome.command_id, "1");
    assert!(outcome.requested_pump);
    assert!(outcome.observed_pump);
    assert!(outcome.reported);
    assert!(outcome.acknowledged);
    assert_eq!(outcome.actuation_error, None);

    assert!(rig.relay_pump_on());
    assert!(rig.control.state().pump_on);
    assert_eq!(rig.control.executor().state(), ExecutorState::Idle);
    assert!(rig.control.executor().has_executed("1"));
    assert_eq!(rig.backend.ack_count("1"), 1);

    let row = rig.backend.status_row().expect("status row created");
    assert_eq!(row["device_id"], DEVICE_ID);
    assert_eq!(row["pump_status"], true);
    assert_eq!(row["user_id"], OWNER_ID);

    // the backend now reports nothing pending; the relay is not touched again
    let writes = rig.relay.writes.get();
    rig.clock.advance(POLL_MS);
    let report = rig.control.tick();
    assert!(report.command.is_none());
    assert_eq!(rig.relay.writes.get(), writes);
    assert_eq!(rig.backend.ack_count("1"), 1);
}

#[test]
fn test_failed_ack_is_retried_without_actuating() {
    let mut rig = RigBuilder::new().build();
    rig.control.start();
    rig.backend.state().fail_acks = true;
    rig.backend.push_command(7, true, None);

    let outcome = rig.control.tick().command.expect("command executed");
    assert!(outcome.observed_pump);
    assert!(!outcome.acknowledged);
    assert_eq!(rig.backend.ack_count("7"), 0);
    let writes = rig.relay.writes.get();
    let blinks = rig.led.blinks.get();

    // still outstanding on the backend: poll returns it again
    rig.backend.state().fail_acks = false;
    rig.clock.advance(POLL_MS);
    let report = rig.control.tick();
    assert!(report.command.is_none());
    assert_eq!(rig.backend.ack_count("7"), 1);
    assert_eq!(rig.relay.writes.get(), writes);
    assert_eq!(rig.led.blinks.get(), blinks);

    rig.clock.advance(POLL_MS);
    rig.control.tick();
    assert_eq!(rig.backend.ack_count("7"), 1);
}

#[test]
fn test_ack_retry_survives_repeated_failures() {
    let mut rig = RigBuilder::new().build();
    rig.control.start();
    rig.backend.state().fail_acks = true;
    rig.backend.push_command(3, true, None);
    rig.control.tick();
    let writes = rig.relay.writes.get();

    for _ in 0..3 {
        rig.clock.advance(POLL_MS);
        rig.control.tick();
    }
    assert_eq!(rig.relay.writes.get(), writes);
    assert_eq!(rig.backend.ack_count("3"), 0);

    rig.backend.state().fail_acks = false;
    rig.clock.advance(POLL_MS);
    rig.control.tick();
    assert_eq!(rig.backend.ack_count("3"), 1);
}

#[test]
fn test_newer_command_runs_after_older() {
    let mut rig = RigBuilder::new().build();
    rig.control.start();
    rig.backend.push_command(1, true, None);
    rig.control.tick();
    assert!(rig.relay_pump_on());

    rig.backend.push_command(2, false, None);
    rig.clock.advance(POLL_MS);
    let outcome = rig.control.tick().command.expect("second command");
    assert_eq!(outcome.command_id, "2");
    assert!(!rig.relay_pump_on());
    assert_eq!(rig.backend.status_row().unwrap()["pump_status"], false);
}

#[test]
fn test_mode_change_blinks_and_is_reported() {
    let mut rig = RigBuilder::new().build();
    rig.control.start();
    rig.backend.push_command(4, false, Some(true));
    let blinks = rig.led.blinks.get();

    let outcome = rig.control.tick().command.expect("command executed");
    assert!(outcome.mode_changed);
    assert!(outcome.automatic_mode);
    assert!(rig.control.state().automatic_mode);
    // three for the mode change, one for pump off
    assert_eq!(rig.led.blinks.get() - blinks, 4);
    assert_eq!(rig.backend.status_row().unwrap()["automatic_mode"], true);
}

#[test]
fn test_actuation_mismatch_reports_observed_state() {
    let mut rig = RigBuilder::new().build();
    rig.control.start();
    // stuck high on an active-low board: the pump cannot start
    rig.relay.stuck_at.set(Some(true));
    let writes = rig.relay.writes.get();
    rig.backend.push_command(9, true, None);

    let outcome = rig.control.tick().command.expect("command executed");
    assert_eq!(
        outcome.actuation_error,
        Some(SyncError::ActuationMismatch { requested: true, observed: false })
    );
    assert!(outcome.requested_pump);
    assert!(!outcome.observed_pump);
    assert!(outcome.acknowledged);
    assert_eq!(rig.relay.writes.get() - writes, 3);

    let waits = rig.delay.waits_ms.borrow().clone();
    let settle: Vec<u32> = waits.iter().copied().filter(|w| [100, 200, 400].contains(w)).collect();
    assert!(settle.ends_with(&[100, 200, 400]), "settle schedule was {:?}", waits);

    assert!(!rig.control.state().pump_on);
    assert_eq!(rig.backend.status_row().unwrap()["pump_status"], false);
    assert_eq!(rig.backend.ack_count("9"), 1);
}

#[test]
fn test_update_conflict_falls_back_to_create() {
    let backend = FakeBackend::new();
    let store = MemoryCredentialStore::new();
    let clock = MockTimeSource::new(T0);
    let mut client = client(&backend, &store, &clock);
    client.session_mut().get_valid_credential().unwrap();

    backend.force_status(409);
    client.report_status(&manual_on()).unwrap();

    assert_eq!(backend.requests_matching("PATCH /rest/v1/device_status"), 1);
    assert_eq!(backend.requests_matching("POST /rest/v1/device_status"), 1);
    let row = backend.status_row().unwrap();
    assert_eq!(row["pump_status"], true);
    assert_eq!(row["last_seen"], "2023-11-14T22:13:20.000Z");
}

#[test]
fn test_missing_row_is_created_then_updated() {
    let backend = FakeBackend::new();
    let clock = MockTimeSource::new(T0);
    let mut client = client(&backend, &MemoryCredentialStore::new(), &clock);

    client.report_status(&manual_on()).unwrap();
    assert_eq!(backend.requests_matching("POST /rest/v1/device_status"), 1);

    let off = DeviceState { pump_on: false, ..manual_on() };
    client.report_status(&off).unwrap();
    assert_eq!(backend.requests_matching("PATCH /rest/v1/device_status"), 2);
    assert_eq!(backend.requests_matching("POST /rest/v1/device_status"), 1);
    assert_eq!(backend.status_row().unwrap()["pump_status"], false);
}

#[test]
fn test_create_first_updates_on_conflict() {
    let backend = FakeBackend::new();
    let clock = MockTimeSource::new(T0);
    let mut client = client(&backend, &MemoryCredentialStore::new(), &clock)
        .upsert_order(UpsertOrder::CreateFirst);

    client.report_status(&manual_on()).unwrap();
    let off = DeviceState { pump_on: false, ..manual_on() };
    client.report_status(&off).unwrap();

    assert_eq!(backend.requests_matching("POST /rest/v1/device_status"), 2);
    assert_eq!(backend.requests_matching("PATCH /rest/v1/device_status"), 1);
    assert_eq!(backend.status_row().unwrap()["pump_status"], false);
}

#[test]
fn test_upsert_never_exceeds_two_calls() {
    let backend = FakeBackend::new();
    let clock = MockTimeSource::new(T0);
    let mut client = client(&backend, &MemoryCredentialStore::new(), &clock);
    client.session_mut().get_valid_credential().unwrap();

    backend.force_status(409);
    backend.force_status(409);
    assert_eq!(client.report_status(&manual_on()), Err(SyncError::Backend { status: 409 }));
    assert_eq!(backend.requests_matching("PATCH /rest/v1/device_status"), 1);
    assert_eq!(backend.requests_matching("POST /rest/v1/device_status"), 1);

    // other failures do not trigger the second half at all
    backend.force_status(500);
    assert_eq!(client.report_status(&manual_on()), Err(SyncError::Backend { status: 500 }));
    assert_eq!(backend.requests_matching("PATCH /rest/v1/device_status"), 2);
    assert_eq!(backend.requests_matching("POST /rest/v1/device_status"), 1);
}

#[test]
fn test_rejected_credential_is_dropped_and_renewed() {
    let mut rig = RigBuilder::new().build();
    rig.control.start();
    rig.control.tick();
    assert_eq!(rig.backend.state().tokens_issued, 1);
    assert!(rig.store.snapshot().is_some());

    rig.backend.revoke_tokens();
    rig.clock.advance(POLL_MS);
    rig.control.tick();
    assert!(!rig.control.client().session().is_authenticated());
    assert_eq!(rig.store.snapshot(), None);
    // no retry inside the failing cycle
    assert_eq!(rig.backend.state().tokens_issued, 1);

    rig.clock.advance(POLL_MS);
    rig.control.tick();
    assert_eq!(rig.backend.state().tokens_issued, 2);
    assert!(rig.control.client().session().is_authenticated());
    assert_eq!(rig.store.snapshot().map(|c| c.token), Some("tok-2".to_string()));
}

#[test]
fn test_offline_device_still_waters() {
    let mut rig = RigBuilder::new().automatic(true).raw(RAW_DRY_SOIL).build();
    rig.backend.set_offline(true);
    rig.control.start();

    let report = rig.control.tick();
    assert_eq!(report.reading.map(|r| r.percentage), Some(22));
    assert!(report.reading.unwrap().below_threshold);
    assert_eq!(report.automatic, Some(AutoDecision::Start));
    assert!(!report.status_reported);
    assert!(!report.heartbeat_sent);
    assert!(rig.relay_pump_on());

    // soil soaks up; next sample stops the run
    rig.probe.raw.set(1500);
    rig.clock.advance(60_000);
    let report = rig.control.tick();
    assert_eq!(report.automatic, Some(AutoDecision::Stop(StopReason::Watered)));
    assert!(!rig.relay_pump_on());

    // link returns: the failed report is not re-driven before its interval
    rig.backend.set_offline(false);
    rig.clock.advance(POLL_MS);
    let report = rig.control.tick();
    assert!(!report.status_reported);
    assert!(rig.backend.status_row().is_none());

    // the next scheduled report carries the current state
    rig.clock.advance(60_000 - POLL_MS);
    let report = rig.control.tick();
    assert!(report.status_reported);
    let row = rig.backend.status_row().unwrap();
    assert_eq!(row["pump_status"], false);
    assert_eq!(row["automatic_mode"], true);
    // readings taken while offline are not replayed; only this tick's arrives
    assert_eq!(rig.backend.state().readings.len(), 1);
}

#[test]
fn test_failing_status_report_waits_for_its_interval() {
    let mut rig = RigBuilder::new().automatic(true).raw(RAW_DRY_SOIL).build();
    rig.control.start();
    for _ in 0..2000 {
        rig.backend.force_status(500);
    }

    let report = rig.control.tick();
    assert_eq!(report.automatic, Some(AutoDecision::Start));
    assert!(!report.status_reported);
    assert_eq!(rig.backend.requests_matching("PATCH /rest/v1/device_status"), 1);

    for _ in 0..20 {
        rig.clock.advance(50);
        rig.control.tick();
    }
    assert_eq!(rig.backend.requests_matching("PATCH /rest/v1/device_status"), 1);

    rig.clock.advance(60_000 - 20 * 50);
    rig.control.tick();
    assert_eq!(rig.backend.requests_matching("PATCH /rest/v1/device_status"), 2);
    assert!(rig.relay_pump_on());
}

#[test]
fn test_manual_stop_holds_in_automatic_mode() {
    let mut rig = RigBuilder::new().automatic(true).raw(RAW_DRY_SOIL).build();
    rig.control.start();
    assert_eq!(rig.control.tick().automatic, Some(AutoDecision::Start));
    assert!(rig.relay_pump_on());

    rig.backend.push_command(1, false, None);
    rig.clock.advance(POLL_MS);
    let outcome = rig.control.tick().command.expect("stop command executed");
    assert!(!outcome.observed_pump);
    assert!(!rig.relay_pump_on());
    let stopped_at = T0 + POLL_MS;

    // soil is still dry, but the manual stop holds through the cooldown
    for _ in 0..10 {
        rig.clock.advance(50);
        let report = rig.control.tick();
        assert_eq!(report.automatic, None);
        assert!(!rig.relay_pump_on());
    }
    rig.clock.set(stopped_at + 300_000 - 1);
    assert_eq!(rig.control.tick().automatic, None);
    assert!(!rig.relay_pump_on());

    rig.clock.set(stopped_at + 300_000);
    assert_eq!(rig.control.tick().automatic, Some(AutoDecision::Start));
    assert!(rig.relay_pump_on());
}

#[test]
fn test_acknowledgement_is_idempotent() {
    let backend = FakeBackend::new();
    let clock = MockTimeSource::new(T0);
    let mut client = client(&backend, &MemoryCredentialStore::new(), &clock);
    backend.push_command(1, true, None);
    backend.push_command(2, false, None);

    client.acknowledge("1").unwrap();
    let executed: Vec<bool> = backend.state().commands.iter().map(|c| c.executed).collect();
    let pending = client.poll_command().unwrap();
    assert_eq!(executed, vec![true, false]);
    assert_eq!(pending.as_ref().map(|c| c.id.as_str()), Some("2"));

    client.acknowledge("1").unwrap();
    let again: Vec<bool> = backend.state().commands.iter().map(|c| c.executed).collect();
    assert_eq!(again, executed);
    assert_eq!(client.poll_command().unwrap(), pending);
    assert_eq!(backend.ack_count("1"), 2);
}

#[test]
fn test_refused_authentication_keeps_local_control() {
    let backend = FakeBackend::new();
    backend.state().auth_status = 403;
    let mut rig = RigBuilder::new().backend(backend).automatic(true).raw(RAW_DRY_SOIL).build();
    rig.control.start();

    let report = rig.control.tick();
    assert_eq!(report.automatic, Some(AutoDecision::Start));
    assert!(rig.relay_pump_on());
    assert_eq!(rig.backend.requests_matching("POST /rest/v1"), 0);
    assert!(!rig.control.client().session().is_authenticated());
}

#[test]
fn test_automatic_run_is_capped() {
    let policy = AutomaticPolicy::new(30, 10, 120_000, 300_000);
    let schedule = ScheduleConfig { sample_interval_ms: 30_000, ..ScheduleConfig::default() };
    let mut rig = RigBuilder::new()
        .automatic(true)
        .raw(RAW_DRY_SOIL)
        .policy(policy)
        .schedule(schedule)
        .build();
    rig.control.start();

    assert_eq!(rig.control.tick().automatic, Some(AutoDecision::Start));
    let mut stop = None;
    for _ in 0..30 {
        rig.clock.advance(POLL_MS);
        if let Some(decision) = rig.control.tick().automatic {
            stop = Some(decision);
            break;
        }
    }
    assert_eq!(stop, Some(AutoDecision::Stop(StopReason::MaxRun)));
    assert!(!rig.relay_pump_on());

    // cooldown: still dry, but no restart yet
    rig.clock.advance(POLL_MS);
    assert_eq!(rig.control.tick().automatic, None);
    assert!(!rig.relay_pump_on());
}

#[test]
fn test_step_schedule() {
    let mut rig = RigBuilder::new().build();
    rig.control.start();

    let first = rig.control.tick();
    assert!(first.reading.is_some());
    assert!(first.status_reported);
    assert!(first.heartbeat_sent);
    assert_eq!(
        rig.backend.state().heartbeats[0]["timestamp"],
        "2023-11-14T22:13:20.000Z"
    );

    // five minutes of five-second ticks
    for _ in 0..59 {
        rig.clock.advance(POLL_MS);
        rig.control.tick();
    }
    {
        let state = rig.backend.state();
        assert_eq!(state.heartbeats.len(), 1);
        assert_eq!(state.readings.len(), 5);
    }
    assert_eq!(rig.backend.requests_matching("GET /rest/v1/control_commands"), 60);

    rig.clock.advance(POLL_MS);
    let report = rig.control.tick();
    assert!(report.heartbeat_sent);
    assert_eq!(rig.backend.state().heartbeats.len(), 2);
    assert_eq!(rig.backend.state().readings.len(), 6);

    let state = rig.backend.state();
    let reading = &state.readings[0];
    assert_eq!(reading["device_id"], DEVICE_ID);
    assert_eq!(reading["moisture_percentage"], 61);
    assert_eq!(reading["moisture_digital"], false);
}

#[test]
fn test_stored_credential_is_reused_after_reboot() {
    let backend = FakeBackend::new();
    backend.state().valid_tokens.insert("tok-restored".into());
    let store =
        MemoryCredentialStore::with_credential(Credential::new("tok-restored", T0 + 3_600_000));

    let mut rig = RigBuilder::new().backend(backend).store(store).build();
    assert!(rig.control.client().session().is_authenticated());
    rig.control.start();
    rig.control.tick();
    assert_eq!(rig.backend.state().tokens_issued, 0);
}

#[test]
fn test_implausible_stored_expiry_is_ignored() {
    let backend = FakeBackend::new();
    // further out than any lease this device hands out
    let store =
        MemoryCredentialStore::with_credential(Credential::new("tok-old", T0 + 2 * LEASE_MS));

    let mut rig = RigBuilder::new().backend(backend).store(store).build();
    assert!(!rig.control.client().session().is_authenticated());
    rig.control.start();
    rig.control.tick();
    assert_eq!(rig.backend.state().tokens_issued, 1);
}

#[test]
fn test_monotonic_clock_does_not_restore() {
    let backend = FakeBackend::new();
    let store = MemoryCredentialStore::with_credential(Credential::new("tok-old", 60_000));
    let clock = MockTimeSource::monotonic(1_000);
    let session = common::session(&backend, &store, &clock);
    assert!(!session.is_authenticated());
}

#[test]
fn test_static_key_degraded_mode() {
    let backend = FakeBackend::new();
    backend.state().valid_tokens.insert(API_KEY.into());
    let clock = MockTimeSource::new(T0);
    let authenticator =
        StaticKeyAuthenticator::new(Arc::clone(&backend), DEVICE_ID, API_KEY).audit_log(true);
    let session = SessionManager::new(
        Box::new(MemoryCredentialStore::new()),
        Box::new(authenticator),
        Box::new(clock.clone()),
        LEASE_MS,
    );
    let mut client =
        BackendClient::new(Arc::clone(&backend), session, DEVICE_ID, API_KEY, Box::new(clock));

    assert!(client.session().is_degraded());
    backend.push_command(11, true, Some(false));
    let command = client.poll_command().unwrap().expect("pending command");
    assert_eq!(command.id, "11");
    assert_eq!(command.automatic_mode, Some(false));

    let state = backend.state();
    assert_eq!(state.tokens_issued, 0);
    assert_eq!(state.auth_logs.len(), 1);
    assert_eq!(state.auth_logs[0]["success"], true);
}

#[test]
fn test_sensor_failure_skips_reading_only() {
    let mut rig = RigBuilder::new().raw(RAW_DAMP_SOIL).build();
    rig.control.start();
    rig.probe.failing.set(true);
    rig.backend.push_command(5, true, None);

    let report = rig.control.tick();
    assert!(report.reading.is_none());
    assert!(report.command.is_some());
    assert!(report.status_reported);
    assert!(rig.backend.state().readings.is_empty());
}
