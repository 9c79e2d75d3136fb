//! Credential issuance

use alloc::string::String;

use crate::errors::SyncError;

/// Token returned by an [`Authenticator`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    /// Opaque bearer value
    pub token: String,
    /// Lifetime announced by the issuer, when it announces one
    pub expires_in_ms: Option<u64>,
}

/// Obtains a fresh bearer credential for this device
///
/// A single blocking attempt. Retrying is the caller's business; the session
/// manager deliberately does not, so a failed attempt costs one timeout.
pub trait Authenticator {
    /// Authenticate once
    fn authenticate(&mut self) -> Result<IssuedToken, SyncError>;

    /// Whether tokens from this authenticator are a degraded fallback
    fn is_degraded(&self) -> bool {
        false
    }
}
