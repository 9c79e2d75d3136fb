//! Error Types for Device-Cloud Synchronization
//!
//! ## Design Philosophy
//!
//! A field device on a flaky Wi-Fi link fails all the time, and none of it is
//! fatal. Every error here is something the control loop logs before moving on
//! to the next scheduled tick. The types therefore optimise for two things:
//!
//! 1. **Actionable classification**: the caller can tell a dead link from a
//!    revoked credential from a relay that will not latch, and react to each
//!    differently (retry later, drop the session, report observed state).
//!
//! 2. **Owned context**: unlike the validation errors of a hot sensor path,
//!    these are produced at most a few times per minute, so they carry owned
//!    `String` context copied out of the transport or parser.
//!
//! ## Error Categories
//!
//! ### Link and Backend
//! - `Connectivity`: no HTTP status was received (DNS, TLS, timeout, reset)
//! - `Auth`: the backend or issuer rejected the credential (401/403)
//! - `Backend`: any other non-success status
//! - `Parse`: a response body could not be understood
//!
//! ### Physical
//! - `ActuationMismatch`: the relay read back a different state than requested
//! - `Hardware`: a pin or bus operation itself failed
//! - `Sensor`: no usable moisture sample could be taken
//!
//! ### Local
//! - `Store`: the credential record could not be read or written
//!
//! ## Error Handling Strategy
//!
//! ```rust
//! use iriq_core::SyncError;
//!
//! fn on_status_report(result: Result<(), SyncError>) {
//!     match result {
//!         Ok(()) => {}
//!         Err(SyncError::Auth { .. }) => {
//!             // session already dropped; next call re-authenticates
//!         }
//!         Err(SyncError::Connectivity(_)) => {
//!             // link is down; keep running locally
//!         }
//!         Err(_) => {
//!             // log and wait for the next tick
//!         }
//!     }
//! }
//! ```

use alloc::string::String;
use thiserror_no_std::Error;

/// Result type for sync and actuation operations
pub type SyncResult<T> = Result<T, SyncError>;

/// Failures of the sync and actuation engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// The request never produced an HTTP status
    #[error("connectivity failure: {0}")]
    Connectivity(String),

    /// Authentication was refused, or the credential was rejected mid-session
    #[error("authentication rejected with HTTP {status}")]
    Auth {
        /// HTTP status returned (401 or 403 from the backend, anything from the issuer)
        status: u16,
    },

    /// The backend answered with a non-success status
    #[error("backend returned HTTP {status}")]
    Backend {
        /// HTTP status returned
        status: u16,
    },

    /// The relay did not reach the requested state within the retry bound
    #[error("actuation mismatch: requested {requested}, observed {observed}")]
    ActuationMismatch {
        /// Pump state that was asked for
        requested: bool,
        /// Pump state read back from the relay after the last attempt
        observed: bool,
    },

    /// A response body could not be decoded
    #[error("parse error: {0}")]
    Parse(String),

    /// The credential store failed
    #[error("credential store error: {0}")]
    Store(String),

    /// A pin operation failed
    #[error("hardware error: {0}")]
    Hardware(String),

    /// The moisture probe produced no usable sample
    #[error("sensor error: {0}")]
    Sensor(String),
}

/// Failures reported by a [`Transport`](crate::traits::Transport)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Network-level failure before any status was received
    #[error("transport failure: {0}")]
    Io(String),

    /// The request could not be built (bad URL, invalid header)
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl From<TransportError> for SyncError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Io(msg) | TransportError::InvalidRequest(msg) => {
                SyncError::Connectivity(msg)
            }
        }
    }
}

/// Failures reported by a [`CredentialStore`](crate::traits::CredentialStore)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Underlying storage could not be accessed
    #[error("storage I/O failed: {0}")]
    Io(String),

    /// A record exists but cannot be decoded
    #[error("stored record is corrupt: {0}")]
    Corrupt(String),
}

impl From<StoreError> for SyncError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Io(msg) | StoreError::Corrupt(msg) => SyncError::Store(msg),
        }
    }
}

/// Invalid device configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The document is not valid JSON or does not match the schema
    #[error("malformed configuration: {0}")]
    Malformed(String),

    /// A required field was left empty
    #[error("missing required setting `{0}`")]
    Missing(&'static str),

    /// A field holds a value outside its allowed range
    #[error("invalid setting `{field}`: {reason}")]
    Invalid {
        /// Dotted path of the offending field
        field: &'static str,
        /// What is wrong with it
        reason: &'static str,
    },
}
