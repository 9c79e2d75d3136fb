//! Backend Client for the PostgREST Surface
//!
//! ## Overview
//!
//! Five operations against the device tables, each preceded by a request for
//! a valid credential from the [`SessionManager`]:
//!
//! | Operation | HTTP | Table |
//! |-----------|------|-------|
//! | [`report_reading`](BackendClient::report_reading) | `POST` | `sensor_readings` |
//! | [`report_status`](BackendClient::report_status) | `PATCH`, then `POST` (or reverse) | `device_status` |
//! | [`poll_command`](BackendClient::poll_command) | `GET` | `control_commands` |
//! | [`acknowledge`](BackendClient::acknowledge) | `PATCH` | `control_commands` |
//! | [`send_heartbeat`](BackendClient::send_heartbeat) | `POST` | `device_heartbeats` |
//!
//! ## Status Upsert
//!
//! The status row is keyed by device identifier. Neither call alone is
//! enough: an update of a row that does not exist matches nothing, and a
//! create of a row that does exist conflicts. The client issues one, and on
//! "not found" (HTTP 404, or an update that returned zero rows) or
//! "conflict" (HTTP 409) issues the other. Never more than two calls.
//!
//! ## Authorization Failures
//!
//! A 401 or 403 from any operation invalidates the session on the spot and
//! fails the call. Nothing is retried within the cycle; the next scheduled
//! operation re-authenticates.
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! let mut client = BackendClient::new(transport, session, "garden-01", api_key, Box::new(SystemTime));
//! client.report_status(&DeviceState { pump_on: true, automatic_mode: false, moisture_pct: Some(42) })?;
//! if let Some(command) = client.poll_command()? {
//!     // actuate, then
//!     client.acknowledge(&command.id)?;
//! }
//! ```

use alloc::boxed::Box;
use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use serde::{Deserialize, Serialize};

use crate::constants::network::{
    REST_PREFIX, TABLE_CONTROL_COMMANDS, TABLE_DEVICE_HEARTBEATS, TABLE_DEVICE_STATUS,
    TABLE_SENSOR_READINGS,
};
use crate::errors::{SyncError, SyncResult};
use crate::model::{Command, DeviceState, MoistureReading};
use crate::retry::with_fallback;
use crate::session::SessionManager;
use crate::time::to_rfc3339;
use crate::traits::{Method, Request, Response, TimeSource, Transport};

/// Which half of the status upsert goes first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOrder {
    /// `PATCH` the existing row, create it if missing
    #[default]
    UpdateFirst,
    /// `POST` a new row, update it on conflict
    CreateFirst,
}

/// Attach the headers every backend request carries
pub(crate) fn authorize(request: Request, api_key: &str, bearer: &str) -> Request {
    request
        .header("apikey", api_key)
        .header("Authorization", format!("Bearer {}", bearer))
        .header("Content-Type", "application/json")
}

/// Characters allowed in identifiers spliced into a query string
pub(crate) fn is_query_safe(value: &str) -> bool {
    !value.is_empty()
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b'.')
}

#[derive(Serialize)]
struct ReadingRow<'a> {
    device_id: &'a str,
    moisture_percentage: u8,
    moisture_digital: bool,
}

#[derive(Serialize)]
struct StatusRow<'a> {
    device_id: &'a str,
    pump_status: bool,
    automatic_mode: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_seen: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<&'a str>,
}

#[derive(Serialize)]
struct AckRow {
    executed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    executed_at: Option<String>,
}

#[derive(Serialize)]
struct HeartbeatRow<'a> {
    device_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<String>,
}

/// Command identifiers arrive as integers or UUID strings depending on the schema
#[derive(Deserialize)]
#[serde(untagged)]
enum RowId {
    Number(u64),
    Text(String),
}

#[derive(Deserialize)]
struct CommandRow {
    id: RowId,
    pump_control: bool,
    #[serde(default)]
    automatic_mode: Option<bool>,
    #[serde(default)]
    executed: Option<bool>,
}

impl CommandRow {
    fn into_command(self) -> SyncResult<Command> {
        let id = match self.id {
            RowId::Number(n) => n.to_string(),
            RowId::Text(s) => s,
        };
        if !is_query_safe(&id) {
            return Err(SyncError::Parse(format!("unusable command id {:?}", id)));
        }
        Ok(Command {
            id,
            pump_on: self.pump_control,
            automatic_mode: self.automatic_mode,
        })
    }
}

/// Client for the device tables
pub struct BackendClient<T> {
    transport: T,
    session: SessionManager,
    device_id: String,
    api_key: String,
    owner_id: Option<String>,
    upsert_order: UpsertOrder,
    clock: Box<dyn TimeSource>,
}

impl<T: Transport> BackendClient<T> {
    /// Client for `device_id`
    pub fn new(
        transport: T,
        session: SessionManager,
        device_id: impl Into<String>,
        api_key: impl Into<String>,
        clock: Box<dyn TimeSource>,
    ) -> Self {
        Self {
            transport,
            session,
            device_id: device_id.into(),
            api_key: api_key.into(),
            owner_id: None,
            upsert_order: UpsertOrder::default(),
            clock,
        }
    }

    /// Choose which half of the status upsert goes first
    pub fn upsert_order(mut self, order: UpsertOrder) -> Self {
        self.upsert_order = order;
        self
    }

    /// Owner written into the status row
    pub fn owner_id(mut self, owner_id: Option<String>) -> Self {
        self.owner_id = owner_id;
        self
    }

    /// Device identifier used in every row
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Session backing this client
    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    /// Mutable session access, for forcing authentication at start-up
    pub fn session_mut(&mut self) -> &mut SessionManager {
        &mut self.session
    }

    fn wall_time(&self) -> Option<String> {
        if self.clock.is_wall_clock() {
            to_rfc3339(self.clock.now())
        } else {
            None
        }
    }

    fn table_path(table: &str) -> String {
        format!("{}/{}", REST_PREFIX, table)
    }

    fn encode<B: Serialize>(body: &B) -> SyncResult<String> {
        serde_json::to_string(body).map_err(|e| SyncError::Parse(e.to_string()))
    }

    /// Authorize and send; classify the status
    fn send(&mut self, request: Request) -> SyncResult<Response> {
        let credential = self.session.get_valid_credential()?;
        let request = authorize(request, &self.api_key, &credential.token);
        let response = self.transport.execute(&request)?;

        let status = response.status;
        match status {
            401 | 403 => {
                log_warn!(
                    "{} {} rejected with HTTP {}, dropping session",
                    request.method.as_str(),
                    request.path,
                    status
                );
                self.session.invalidate();
                Err(SyncError::Auth { status })
            }
            200..=299 => Ok(response),
            _ => Err(SyncError::Backend { status }),
        }
    }

    /// Record one moisture sample
    pub fn report_reading(&mut self, reading: &MoistureReading) -> SyncResult<()> {
        let body = Self::encode(&ReadingRow {
            device_id: &self.device_id,
            moisture_percentage: reading.percentage,
            moisture_digital: reading.below_threshold,
        })?;
        let request = Request::new(Method::Post, Self::table_path(TABLE_SENSOR_READINGS))
            .header("Prefer", "return=minimal")
            .body(body);
        self.send(request).map(|_| ())
    }

    fn status_body(&self, state: &DeviceState) -> SyncResult<String> {
        Self::encode(&StatusRow {
            device_id: &self.device_id,
            pump_status: state.pump_on,
            automatic_mode: state.automatic_mode,
            last_seen: self.wall_time(),
            user_id: self.owner_id.as_deref(),
        })
    }

    fn update_status(&mut self, body: String) -> SyncResult<()> {
        let path = format!(
            "{}?device_id=eq.{}",
            Self::table_path(TABLE_DEVICE_STATUS),
            self.device_id
        );
        let request = Request::new(Method::Patch, path)
            .header("Prefer", "return=representation")
            .body(body);
        let response = self.send(request)?;

        // PostgREST answers a PATCH that matched nothing with 200 and `[]`
        let body = response.body.trim();
        if body == "[]" {
            return Err(SyncError::Backend { status: 404 });
        }
        Ok(())
    }

    fn create_status(&mut self, body: String) -> SyncResult<()> {
        let request = Request::new(Method::Post, Self::table_path(TABLE_DEVICE_STATUS))
            .header("Prefer", "return=minimal")
            .body(body);
        self.send(request).map(|_| ())
    }

    /// Replicate `state` into the status row
    pub fn report_status(&mut self, state: &DeviceState) -> SyncResult<()> {
        let body = self.status_body(state)?;
        let fallback_body = body.clone();
        let needs_other_half = |e: &SyncError| {
            matches!(e, SyncError::Backend { status: 404 } | SyncError::Backend { status: 409 })
        };

        match self.upsert_order {
            UpsertOrder::UpdateFirst => with_fallback(
                self,
                |client| client.update_status(body),
                |client| {
                    log_debug!("status row missing, creating it");
                    client.create_status(fallback_body)
                },
                needs_other_half,
            ),
            UpsertOrder::CreateFirst => with_fallback(
                self,
                |client| client.create_status(body),
                |client| {
                    log_debug!("status row exists, updating it");
                    client.update_status(fallback_body)
                },
                needs_other_half,
            ),
        }
    }

    /// Fetch the most recent unexecuted command, if any
    pub fn poll_command(&mut self) -> SyncResult<Option<Command>> {
        let path = format!(
            "{}?device_id=eq.{}&executed=eq.false&order=created_at.desc&limit=1",
            Self::table_path(TABLE_CONTROL_COMMANDS),
            self.device_id
        );
        let response = self.send(Request::new(Method::Get, path))?;

        let rows: Vec<CommandRow> = serde_json::from_str(&response.body)
            .map_err(|e| SyncError::Parse(e.to_string()))?;
        match rows.into_iter().next() {
            Some(row) if row.executed == Some(true) => Ok(None),
            Some(row) => row.into_command().map(Some),
            None => Ok(None),
        }
    }

    /// Mark `command_id` executed; repeating it is harmless
    pub fn acknowledge(&mut self, command_id: &str) -> SyncResult<()> {
        if !is_query_safe(command_id) {
            return Err(SyncError::Parse(format!("unusable command id {:?}", command_id)));
        }
        let body = Self::encode(&AckRow {
            executed: true,
            executed_at: self.wall_time(),
        })?;
        let path = format!("{}?id=eq.{}", Self::table_path(TABLE_CONTROL_COMMANDS), command_id);
        let request = Request::new(Method::Patch, path)
            .header("Prefer", "return=minimal")
            .body(body);
        self.send(request).map(|_| ())
    }

    /// Tell the backend the device is alive
    pub fn send_heartbeat(&mut self) -> SyncResult<()> {
        let body = Self::encode(&HeartbeatRow {
            device_id: &self.device_id,
            timestamp: self.wall_time(),
        })?;
        let request = Request::new(Method::Post, Self::table_path(TABLE_DEVICE_HEARTBEATS))
            .header("Prefer", "resolution=merge-duplicates")
            .body(body);
        self.send(request).map(|_| ())
    }
}
