//! Durable credential record

use crate::errors::StoreError;
use crate::model::Credential;

/// Persists a single credential across reboots
///
/// Implementations hold no validation logic; expiry checks belong to the
/// session manager. `load` returns `Ok(None)` for a device that has never
/// authenticated.
pub trait CredentialStore {
    /// Read the stored credential, if any
    fn load(&self) -> Result<Option<Credential>, StoreError>;

    /// Replace the stored credential
    fn save(&mut self, credential: &Credential) -> Result<(), StoreError>;

    /// Remove the stored credential
    fn clear(&mut self) -> Result<(), StoreError>;
}
