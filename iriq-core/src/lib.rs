//! Sync and actuation engine for IriQ irrigation field devices
//!
//! Keeps a soil-moisture node and its remote backend in agreement over an
//! unreliable link. The device measures moisture, drives a pump relay and
//! reports what it physically did. The backend hands out pump commands.
//!
//! Key constraints:
//! - Single-threaded, cooperative. Every network call blocks but is bounded.
//! - Nothing is fatal. A failed step is retried on its next scheduled tick.
//! - The device is the only writer of its own state.
//!
//! ```no_run
//! use iriq_core::{CommandExecutor, ExecutionOutcome};
//!
//! // The control loop polls, executes and acknowledges in one step:
//! // let outcome: Option<ExecutionOutcome> = executor.step(&mut client, &mut actuator, &mut state)?;
//! ```

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(unsafe_code)]
#![warn(missing_docs)]

extern crate alloc;

#[macro_use]
mod macros;

pub mod actuator;
pub mod auth;
pub mod automatic;
pub mod backend;
pub mod config;
pub mod constants;
pub mod control;
pub mod errors;
pub mod executor;
pub mod model;
pub mod moisture;
pub mod retry;
pub mod session;
pub mod store;
pub mod time;
pub mod traits;

// Public API
pub use actuator::{Actuator, BlinkPattern, RelayPolarity};
pub use backend::{BackendClient, UpsertOrder};
pub use config::DeviceConfig;
pub use control::ControlLoop;
pub use errors::{ConfigError, StoreError, SyncError, SyncResult, TransportError};
pub use executor::{CommandExecutor, ExecutionOutcome, ExecutorState};
pub use model::{Command, Credential, DeviceState, MoistureReading};
pub use session::SessionManager;
pub use traits::{Authenticator, CredentialStore, MoistureProbe, TimeSource, Transport};

/// Crate version, reported in the HTTP user agent
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
