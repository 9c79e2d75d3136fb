//! Host-side Implementations of the IriQ Engine Seams
//!
//! `iriq-core` runs the sync protocol against two traits it cannot implement
//! itself on a hosted target: a [`Transport`](iriq_core::Transport) that
//! performs HTTPS exchanges and a
//! [`CredentialStore`](iriq_core::CredentialStore) that survives a reboot.
//! This crate supplies both for Linux boards.
//!
//! | Seam | Implementation | Backing |
//! |------|----------------|---------|
//! | Transport | [`http::UreqTransport`] | blocking `ureq` agent with a hard timeout |
//! | Credential store | [`store::FileCredentialStore`] | one JSON file, replaced atomically |
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use iriq_connectors::http::{HttpConfig, UreqTransport};
//! use iriq_connectors::store::FileCredentialStore;
//!
//! let transport = UreqTransport::new(
//!     HttpConfig::new("https://example.invalid").timeout_secs(10),
//! )?;
//! let store = FileCredentialStore::new("/var/lib/iriq", "credential")?;
//! # Ok::<(), iriq_connectors::ConnectorError>(())
//! ```

#[cfg(feature = "http")]
pub mod http;

pub mod store;

#[cfg(feature = "http")]
pub use http::{HttpConfig, UreqTransport};
pub use store::FileCredentialStore;

use thiserror::Error;

/// Failures while setting up a connector
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// A setting is unusable
    #[error("Configuration error: {0}")]
    Config(String),

    /// The storage directory could not be prepared
    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),
}
