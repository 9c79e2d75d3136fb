//! Shared fixtures for the sync integration tests
//!
//! - [`FakeBackend`]: an in-process stand-in for the PostgREST tables and
//!   the authentication function, with switches for outages, forced status
//!   codes and token revocation
//! - mock relay, LED, delay and probe with shared handles, so a test can
//!   inspect or disturb the hardware while the control loop owns it
//! - [`Rig`]: a fully wired control loop over all of the above

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::{HashSet, VecDeque};
use std::convert::Infallible;
use std::rc::Rc;
use std::sync::{Arc, Mutex, MutexGuard};

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorType, OutputPin, StatefulOutputPin};
use serde_json::{json, Value};

use iriq_core::actuator::ActuatorConfig;
use iriq_core::auth::EdgeFunctionAuthenticator;
use iriq_core::automatic::AutomaticPolicy;
use iriq_core::config::ScheduleConfig;
use iriq_core::moisture::MoistureSampler;
use iriq_core::store::MemoryCredentialStore;
use iriq_core::time::MockTimeSource;
use iriq_core::traits::{Method, Request, Response};
use iriq_core::{
    Actuator, BackendClient, ControlLoop, MoistureProbe, SessionManager, SyncError, Transport,
    TransportError,
};

pub const DEVICE_ID: &str = "garden-01";
pub const API_KEY: &str = "test-anon-key";
pub const OWNER_ID: &str = "owner-1";
pub const LEASE_MS: u64 = 86_400_000;
/// 2023-11-14T22:13:20Z
pub const T0: u64 = 1_700_000_000_000;

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct FakeCommand {
    pub id: u64,
    pub pump_control: bool,
    pub automatic_mode: Option<bool>,
    pub executed: bool,
}

#[derive(Debug, Default)]
pub struct BackendState {
    pub commands: Vec<FakeCommand>,
    pub status_row: Option<Value>,
    pub readings: Vec<Value>,
    pub heartbeats: Vec<Value>,
    pub auth_logs: Vec<Value>,
    /// Acknowledgement PATCHes per command id, in arrival order
    pub acks: Vec<String>,
    /// Every request seen, as `"METHOD path"`
    pub requests: Vec<String>,
    /// Statuses returned for the next table requests, ahead of normal routing
    pub forced: VecDeque<u16>,
    pub offline: bool,
    /// Status the authentication function answers with
    pub auth_status: u16,
    pub tokens_issued: u32,
    pub valid_tokens: HashSet<String>,
    /// Drop acknowledgements on the floor (answer 503) while set
    pub fail_acks: bool,
}

/// In-memory PostgREST tables plus the authentication function
#[derive(Debug)]
pub struct FakeBackend {
    state: Mutex<BackendState>,
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self {
            state: Mutex::new(BackendState { auth_status: 200, ..Default::default() }),
        }
    }
}

fn query_value<'a>(path: &'a str, key: &str) -> Option<&'a str> {
    let query = path.split_once('?')?.1;
    query.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        if k == key {
            v.strip_prefix("eq.")
        } else {
            None
        }
    })
}

fn table(path: &str) -> &str {
    path.split('?').next().unwrap_or(path)
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn state(&self) -> MutexGuard<'_, BackendState> {
        self.state.lock().unwrap()
    }

    pub fn push_command(&self, id: u64, pump_control: bool, automatic_mode: Option<bool>) {
        let command = FakeCommand { id, pump_control, automatic_mode, executed: false };
        self.state().commands.push(command);
    }

    pub fn force_status(&self, status: u16) {
        self.state().forced.push_back(status);
    }

    pub fn set_offline(&self, offline: bool) {
        self.state().offline = offline;
    }

    /// Every token issued so far stops working
    pub fn revoke_tokens(&self) {
        self.state().valid_tokens.clear();
    }

    pub fn ack_count(&self, id: &str) -> usize {
        self.state().acks.iter().filter(|a| *a == id).count()
    }

    pub fn status_row(&self) -> Option<Value> {
        self.state().status_row.clone()
    }

    pub fn requests_matching(&self, prefix: &str) -> usize {
        self.state().requests.iter().filter(|r| r.starts_with(prefix)).count()
    }

    fn authenticate(state: &mut BackendState) -> Response {
        if state.auth_status != 200 {
            return Response::new(state.auth_status, r#"{"error":"device not linked"}"#);
        }
        state.tokens_issued += 1;
        let token = format!("tok-{}", state.tokens_issued);
        state.valid_tokens.insert(token.clone());
        let body = json!({ "token": token, "expires_in": 3600, "user_id": OWNER_ID });
        Response::new(200, body.to_string())
    }

    fn route(state: &mut BackendState, request: &Request, body: Value) -> Response {
        match (request.method, table(&request.path)) {
            (Method::Post, "/rest/v1/sensor_readings") => {
                state.readings.push(body);
                Response::new(201, "")
            }
            (Method::Patch, "/rest/v1/device_status") => {
                let wanted = query_value(&request.path, "device_id");
                match &state.status_row {
                    Some(row) if row["device_id"].as_str() == wanted => {
                        state.status_row = Some(body.clone());
                        Response::new(200, Value::Array(vec![body]).to_string())
                    }
                    _ => Response::new(200, "[]"),
                }
            }
            (Method::Post, "/rest/v1/device_status") => {
                if state.status_row.is_some() {
                    Response::new(409, r#"{"code":"23505"}"#)
                } else {
                    state.status_row = Some(body);
                    Response::new(201, "")
                }
            }
            (Method::Get, "/rest/v1/control_commands") => {
                let newest = state
                    .commands
                    .iter()
                    .filter(|c| !c.executed)
                    .max_by_key(|c| c.id)
                    .map(|c| {
                        json!({
                            "id": c.id,
                            "pump_control": c.pump_control,
                            "automatic_mode": c.automatic_mode,
                            "executed": false,
                        })
                    });
                Response::new(200, Value::Array(newest.into_iter().collect()).to_string())
            }
            (Method::Patch, "/rest/v1/control_commands") => {
                if state.fail_acks {
                    return Response::new(503, "");
                }
                let id = query_value(&request.path, "id").unwrap_or_default().to_string();
                if let Some(command) = state.commands.iter_mut().find(|c| c.id.to_string() == id) {
                    command.executed = body["executed"].as_bool().unwrap_or(false);
                }
                state.acks.push(id);
                Response::new(204, "")
            }
            (Method::Post, "/rest/v1/device_heartbeats") => {
                state.heartbeats.push(body);
                Response::new(201, "")
            }
            _ => Response::new(404, ""),
        }
    }
}

impl Transport for FakeBackend {
    fn execute(&self, request: &Request) -> Result<Response, TransportError> {
        let mut state = self.state();
        if state.offline {
            return Err(TransportError::Io("network unreachable".into()));
        }
        state.requests.push(format!("{} {}", request.method.as_str(), request.path));

        assert_eq!(request.header_value("apikey"), Some(API_KEY), "apikey header missing");

        if request.path == "/functions/v1/authenticate-device" {
            return Ok(Self::authenticate(&mut state));
        }

        let body: Value = request
            .body
            .as_deref()
            .map(|b| serde_json::from_str(b).expect("request body is JSON"))
            .unwrap_or(Value::Null);

        if table(&request.path) == "/rest/v1/device_auth_logs" {
            state.auth_logs.push(body);
            return Ok(Response::new(201, ""));
        }

        let bearer = request
            .header_value("Authorization")
            .and_then(|v| v.strip_prefix("Bearer "))
            .unwrap_or_default();
        if !state.valid_tokens.contains(bearer) {
            return Ok(Response::new(401, r#"{"message":"JWT expired"}"#));
        }

        if let Some(status) = state.forced.pop_front() {
            return Ok(Response::new(status, ""));
        }

        Ok(Self::route(&mut state, request, body))
    }
}

// ---------------------------------------------------------------------------
// Hardware
// ---------------------------------------------------------------------------

/// Relay pin; `stuck_at` pins the read-back to a level regardless of writes
#[derive(Clone, Default)]
pub struct MockRelay {
    pub level_high: Rc<Cell<bool>>,
    pub stuck_at: Rc<Cell<Option<bool>>>,
    pub writes: Rc<Cell<u32>>,
}

impl MockRelay {
    /// Active-low board, idle (high)
    pub fn new() -> Self {
        let relay = Self::default();
        relay.level_high.set(true);
        relay
    }
}

impl ErrorType for MockRelay {
    type Error = Infallible;
}

impl OutputPin for MockRelay {
    fn set_low(&mut self) -> Result<(), Infallible> {
        self.writes.set(self.writes.get() + 1);
        self.level_high.set(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.writes.set(self.writes.get() + 1);
        self.level_high.set(true);
        Ok(())
    }
}

impl StatefulOutputPin for MockRelay {
    fn is_set_high(&mut self) -> Result<bool, Infallible> {
        Ok(self.stuck_at.get().unwrap_or(self.level_high.get()))
    }

    fn is_set_low(&mut self) -> Result<bool, Infallible> {
        self.is_set_high().map(|high| !high)
    }
}

/// LED pin counting rising edges
#[derive(Clone, Default)]
pub struct MockLed {
    pub blinks: Rc<Cell<u32>>,
}

impl ErrorType for MockLed {
    type Error = Infallible;
}

impl OutputPin for MockLed {
    fn set_low(&mut self) -> Result<(), Infallible> {
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.blinks.set(self.blinks.get() + 1);
        Ok(())
    }
}

/// Delay that records requested waits instead of sleeping
#[derive(Clone, Default)]
pub struct MockDelay {
    pub waits_ms: Rc<RefCell<Vec<u32>>>,
}

impl DelayNs for MockDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.waits_ms.borrow_mut().push(ns / 1_000_000);
    }
}

/// Probe returning a settable raw count, or failing while `failing` is set
#[derive(Clone)]
pub struct MockProbe {
    pub raw: Rc<Cell<u16>>,
    pub failing: Rc<Cell<bool>>,
}

impl MockProbe {
    pub fn new(raw: u16) -> Self {
        Self { raw: Rc::new(Cell::new(raw)), failing: Rc::new(Cell::new(false)) }
    }
}

impl MoistureProbe for MockProbe {
    fn read_raw(&mut self) -> Result<u16, SyncError> {
        if self.failing.get() {
            Err(SyncError::Sensor("probe disconnected".into()))
        } else {
            Ok(self.raw.get())
        }
    }
}

/// Raw counts for the default 4095/1500 calibration
pub const RAW_DRY_SOIL: u16 = 3500; // 22 %
pub const RAW_DAMP_SOIL: u16 = 2500; // 61 %

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

pub type TestClient = BackendClient<Arc<FakeBackend>>;
pub type TestActuator = Actuator<MockRelay, MockLed, MockDelay>;
pub type TestLoop = ControlLoop<Arc<FakeBackend>, MockRelay, MockLed, MockDelay, MockProbe>;

pub fn session(
    backend: &Arc<FakeBackend>,
    store: &MemoryCredentialStore,
    clock: &MockTimeSource,
) -> SessionManager {
    let authenticator = EdgeFunctionAuthenticator::new(Arc::clone(backend), DEVICE_ID, API_KEY);
    SessionManager::new(
        Box::new(store.clone()),
        Box::new(authenticator),
        Box::new(clock.clone()),
        LEASE_MS,
    )
}

pub fn client(
    backend: &Arc<FakeBackend>,
    store: &MemoryCredentialStore,
    clock: &MockTimeSource,
) -> TestClient {
    BackendClient::new(
        Arc::clone(backend),
        session(backend, store, clock),
        DEVICE_ID,
        API_KEY,
        Box::new(clock.clone()),
    )
    .owner_id(Some(OWNER_ID.to_string()))
}

/// Everything a test needs to drive and observe a control loop
pub struct Rig {
    pub backend: Arc<FakeBackend>,
    pub clock: MockTimeSource,
    pub store: MemoryCredentialStore,
    pub relay: MockRelay,
    pub led: MockLed,
    pub delay: MockDelay,
    pub probe: MockProbe,
    pub control: TestLoop,
}

pub struct RigBuilder {
    backend: Arc<FakeBackend>,
    store: MemoryCredentialStore,
    schedule: ScheduleConfig,
    policy: AutomaticPolicy,
    automatic_at_boot: bool,
    raw: u16,
}

impl RigBuilder {
    pub fn new() -> Self {
        Self {
            backend: FakeBackend::new(),
            store: MemoryCredentialStore::new(),
            schedule: ScheduleConfig::default(),
            policy: AutomaticPolicy::default(),
            automatic_at_boot: false,
            raw: RAW_DAMP_SOIL,
        }
    }

    pub fn backend(mut self, backend: Arc<FakeBackend>) -> Self {
        self.backend = backend;
        self
    }

    pub fn store(mut self, store: MemoryCredentialStore) -> Self {
        self.store = store;
        self
    }

    pub fn schedule(mut self, schedule: ScheduleConfig) -> Self {
        self.schedule = schedule;
        self
    }

    pub fn policy(mut self, policy: AutomaticPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn automatic(mut self, enabled: bool) -> Self {
        self.automatic_at_boot = enabled;
        self
    }

    pub fn raw(mut self, raw: u16) -> Self {
        self.raw = raw;
        self
    }

    pub fn build(self) -> Rig {
        let clock = MockTimeSource::new(T0);
        let relay = MockRelay::new();
        let led = MockLed::default();
        let delay = MockDelay::default();
        let probe = MockProbe::new(self.raw);

        let actuator = Actuator::new(
            relay.clone(),
            led.clone(),
            delay.clone(),
            ActuatorConfig::default(),
        );
        let control = ControlLoop::new(
            client(&self.backend, &self.store, &clock),
            actuator,
            probe.clone(),
            MoistureSampler::default(),
            self.policy,
            Box::new(clock.clone()),
            &self.schedule,
            self.automatic_at_boot,
        );

        Rig {
            backend: self.backend,
            clock,
            store: self.store,
            relay,
            led,
            delay,
            probe,
            control,
        }
    }
}

impl Rig {
    /// Pump state as the relay pin shows it (active-low)
    pub fn relay_pump_on(&self) -> bool {
        !self.relay.level_high.get()
    }
}
