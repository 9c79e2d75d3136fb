//! File-backed credential store
//!
//! One JSON record, `{"token": ..., "expiry": ...}`, at
//! `<dir>/<namespace>.json`. Writes go to a sibling temporary file which is
//! flushed to disk and then renamed over the record; the directory is
//! flushed after the rename so the new name itself survives a power cut.
//! A crash leaves either the old credential or the new one, never half of
//! each.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use iriq_core::{Credential, CredentialStore, StoreError};

use crate::ConnectorError;

/// Credential persisted in a single file
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
    scratch: PathBuf,
}

fn valid_namespace(namespace: &str) -> bool {
    !namespace.is_empty()
        && namespace
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

impl FileCredentialStore {
    /// Store under `dir`, creating the directory if needed
    pub fn new(dir: impl AsRef<Path>, namespace: &str) -> Result<Self, ConnectorError> {
        if !valid_namespace(namespace) {
            return Err(ConnectorError::Config(format!(
                "credential namespace {:?} must be alphanumeric",
                namespace
            )));
        }
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        Ok(Self {
            path: dir.join(format!("{}.json", namespace)),
            scratch: dir.join(format!(".{}.json.tmp", namespace)),
        })
    }

    /// Location of the record
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn create_scratch(&self) -> std::io::Result<File> {
        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        options.open(&self.scratch)
    }
}

/// Flush directory entries so a completed rename is durable
#[cfg(unix)]
fn sync_dir(dir: &Path) -> std::io::Result<()> {
    File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}

fn io_error(what: &str, err: std::io::Error) -> StoreError {
    StoreError::Io(format!("{}: {}", what, err))
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<Option<Credential>, StoreError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error("reading credential", e)),
        };
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| StoreError::Corrupt(e.to_string()))
    }

    fn save(&mut self, credential: &Credential) -> Result<(), StoreError> {
        let json = serde_json::to_vec(credential).map_err(|e| StoreError::Corrupt(e.to_string()))?;

        let mut file = self.create_scratch().map_err(|e| io_error("creating scratch file", e))?;
        file.write_all(&json).map_err(|e| io_error("writing credential", e))?;
        file.sync_all().map_err(|e| io_error("syncing credential", e))?;
        drop(file);

        fs::rename(&self.scratch, &self.path).map_err(|e| io_error("replacing credential", e))?;
        if let Some(dir) = self.path.parent() {
            sync_dir(dir).map_err(|e| io_error("syncing state directory", e))?;
        }
        log::debug!("credential written to {}", self.path.display());
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error("removing credential", e)),
        }
    }
}
