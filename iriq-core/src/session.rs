//! Credential Lifecycle
//!
//! [`SessionManager`] is the only component that knows whether the device is
//! authenticated. Everything that talks to the backend asks it for a
//! credential first and tells it when the backend rejected one.
//!
//! ## Guarantees
//!
//! - [`get_valid_credential`](SessionManager::get_valid_credential) never
//!   hands out an expired credential. When none is valid it makes exactly one
//!   blocking authentication attempt, persists the result and returns it.
//! - After [`invalidate`](SessionManager::invalidate) the manager reports
//!   unauthenticated until a later authentication succeeds, and the stored
//!   record is gone.
//! - Failures are returned, never retried here and never fatal.
//!
//! ## Expiry Arithmetic
//!
//! A new credential expires at `now + min(lease, issuer lifetime)`. A
//! credential whose remaining lifetime exceeds the lease cannot have come
//! from this clock moving forward, so it is treated as expired. That covers
//! a wall clock stepped backwards by NTP and a record written under a
//! different time base. Persisted credentials are only restored when the
//! clock is a wall clock.

use alloc::boxed::Box;

use crate::errors::SyncResult;
use crate::model::Credential;
use crate::time::Timestamp;
use crate::traits::{Authenticator, CredentialStore, TimeSource};

/// Owner of the device's bearer credential
pub struct SessionManager {
    store: Box<dyn CredentialStore>,
    authenticator: Box<dyn Authenticator>,
    clock: Box<dyn TimeSource>,
    lease_ms: u64,
    current: Option<Credential>,
}

impl SessionManager {
    /// Build the manager and restore any persisted credential
    pub fn new(
        store: Box<dyn CredentialStore>,
        authenticator: Box<dyn Authenticator>,
        clock: Box<dyn TimeSource>,
        lease_ms: u64,
    ) -> Self {
        let mut manager = Self {
            store,
            authenticator,
            clock,
            lease_ms,
            current: None,
        };
        manager.restore();
        manager
    }

    fn restore(&mut self) {
        if !self.clock.is_wall_clock() {
            log_info!("clock is not wall time, ignoring stored credential");
            return;
        }
        match self.store.load() {
            Ok(Some(credential)) => {
                let now = self.clock.now();
                if self.is_trustworthy(&credential, now) {
                    log_info!(
                        "restored credential, {} s remaining",
                        credential.remaining_ms(now) / 1000
                    );
                    self.current = Some(credential);
                } else {
                    log_info!("stored credential expired, will re-authenticate");
                }
            }
            Ok(None) => {}
            Err(e) => log_warn!("could not read stored credential: {}", e),
        }
    }

    fn is_trustworthy(&self, credential: &Credential, now: Timestamp) -> bool {
        credential.is_valid_at(now) && credential.remaining_ms(now) <= self.lease_ms
    }

    /// Present and unexpired; never touches the network
    pub fn is_authenticated(&self) -> bool {
        let now = self.clock.now();
        self.current
            .as_ref()
            .map_or(false, |c| self.is_trustworthy(c, now))
    }

    /// Whether the authenticator in use is a degraded fallback
    pub fn is_degraded(&self) -> bool {
        self.authenticator.is_degraded()
    }

    /// Lease applied to new credentials (ms)
    pub fn lease_ms(&self) -> u64 {
        self.lease_ms
    }

    /// Return a credential that is valid right now, authenticating if needed
    pub fn get_valid_credential(&mut self) -> SyncResult<Credential> {
        let now = self.clock.now();
        if let Some(credential) = &self.current {
            if self.is_trustworthy(credential, now) {
                return Ok(credential.clone());
            }
            log_info!("credential expired, re-authenticating");
            self.current = None;
        }

        let issued = match self.authenticator.authenticate() {
            Ok(issued) => issued,
            Err(e) => {
                log_warn!("authentication failed: {}", e);
                return Err(e);
            }
        };

        let lifetime = issued
            .expires_in_ms
            .map_or(self.lease_ms, |ms| ms.min(self.lease_ms));
        let now = self.clock.now();
        let credential = Credential::new(issued.token, now.saturating_add(lifetime));

        if let Err(e) = self.store.save(&credential) {
            log_warn!("could not persist credential: {}", e);
        }
        log_info!("authenticated, credential valid for {} s", lifetime / 1000);

        self.current = Some(credential.clone());
        Ok(credential)
    }

    /// Drop the credential from memory and storage
    pub fn invalidate(&mut self) {
        self.current = None;
        if let Err(e) = self.store.clear() {
            log_warn!("could not clear stored credential: {}", e);
        }
    }
}
