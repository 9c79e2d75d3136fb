//! RAM-backed credential store
//!
//! For boards without writable flash and for tests. Clones share one record,
//! so a test can hand a clone to the session manager and inspect the other.
//! Durable storage lives in `iriq-connectors`.

use alloc::rc::Rc;
use core::cell::{Cell, RefCell};

use crate::errors::StoreError;
use crate::model::Credential;
use crate::traits::CredentialStore;

/// Shared in-memory credential slot
#[derive(Debug, Clone, Default)]
pub struct MemoryCredentialStore {
    slot: Rc<RefCell<Option<Credential>>>,
    fail_writes: Rc<Cell<bool>>,
}

impl MemoryCredentialStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-loaded with `credential`, as after a reboot
    pub fn with_credential(credential: Credential) -> Self {
        let store = Self::new();
        *store.slot.borrow_mut() = Some(credential);
        store
    }

    /// Current record without going through the trait
    pub fn snapshot(&self) -> Option<Credential> {
        self.slot.borrow().clone()
    }

    /// Make every subsequent `save` and `clear` fail, simulating worn flash
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.set(fail);
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.get() {
            Err(StoreError::Io("write rejected".into()))
        } else {
            Ok(())
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<Option<Credential>, StoreError> {
        Ok(self.snapshot())
    }

    fn save(&mut self, credential: &Credential) -> Result<(), StoreError> {
        self.check_writable()?;
        *self.slot.borrow_mut() = Some(credential.clone());
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        self.check_writable()?;
        *self.slot.borrow_mut() = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_record() {
        let observer = MemoryCredentialStore::new();
        let mut writer = observer.clone();

        writer.save(&Credential::new("tok", 10)).unwrap();
        assert_eq!(observer.snapshot(), Some(Credential::new("tok", 10)));

        writer.clear().unwrap();
        assert_eq!(observer.load().unwrap(), None);
    }

    #[test]
    fn test_write_failure_injection() {
        let mut store = MemoryCredentialStore::new();
        store.set_fail_writes(true);
        assert!(store.save(&Credential::new("tok", 10)).is_err());
        assert_eq!(store.snapshot(), None);
    }
}
