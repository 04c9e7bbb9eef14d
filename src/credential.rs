//! Credential store: the one access credential the client holds, mirrored to persistence.
//!
//! Every mutation bumps an epoch. Writers that started work under an older epoch
//! (a renewal that straddled a logout, for instance) use `replace_if_epoch` and lose.

use std::path::PathBuf;

use parking_lot::RwLock;
use tracing::{debug, warn};

/// Client-local storage for the opaque credential.
pub trait CredentialPersistence: Send + Sync {
    fn load(&self) -> Option<String>;
    fn save(&self, token: &str);
    fn clear(&self);
}

/// Keeps nothing across restarts.
#[derive(Default)]
pub struct MemoryPersistence {
    slot: RwLock<Option<String>>,
}

impl MemoryPersistence {
    pub fn with_token(token: &str) -> Self { Self { slot: RwLock::new(Some(token.to_string())) } }
}

impl CredentialPersistence for MemoryPersistence {
    fn load(&self) -> Option<String> { self.slot.read().clone() }
    fn save(&self, token: &str) { *self.slot.write() = Some(token.to_string()); }
    fn clear(&self) { *self.slot.write() = None; }
}

/// One file holding the raw token. IO failures are logged and otherwise ignored:
/// losing persistence only costs a login on next start.
pub struct FilePersistence {
    path: PathBuf,
}

impl FilePersistence {
    pub fn new(path: impl Into<PathBuf>) -> Self { Self { path: path.into() } }
}

impl CredentialPersistence for FilePersistence {
    fn load(&self) -> Option<String> {
        let raw = std::fs::read_to_string(&self.path).ok()?;
        let tok = raw.trim();
        if tok.is_empty() { None } else { Some(tok.to_string()) }
    }

    fn save(&self, token: &str) {
        if let Some(dir) = self.path.parent() {
            if let Err(e) = std::fs::create_dir_all(dir) {
                warn!(target: "credential", "cannot create {:?}: {}", dir, e);
                return;
            }
        }
        if let Err(e) = std::fs::write(&self.path, token) {
            warn!(target: "credential", "cannot persist credential to {:?}: {}", self.path, e);
        }
    }

    fn clear(&self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(target: "credential", "cannot remove {:?}: {}", self.path, e),
        }
    }
}

#[derive(Debug, Default)]
struct Slot {
    token: Option<String>,
    epoch: u64,
}

pub struct CredentialStore {
    slot: RwLock<Slot>,
    persistence: Box<dyn CredentialPersistence>,
}

impl CredentialStore {
    /// Starts empty; `restore_persisted` pulls the stored credential in at boot.
    pub fn new(persistence: Box<dyn CredentialPersistence>) -> Self {
        Self { slot: RwLock::new(Slot::default()), persistence }
    }

    pub fn in_memory() -> Self { Self::new(Box::new(MemoryPersistence::default())) }

    pub fn restore_persisted(&self) -> Option<String> {
        let tok = self.persistence.load()?;
        let mut s = self.slot.write();
        s.token = Some(tok.clone());
        s.epoch += 1;
        Some(tok)
    }

    pub fn token(&self) -> Option<String> { self.slot.read().token.clone() }

    /// Token and the epoch it belongs to, read atomically.
    pub fn snapshot(&self) -> (Option<String>, u64) {
        let s = self.slot.read();
        (s.token.clone(), s.epoch)
    }

    pub fn epoch(&self) -> u64 { self.slot.read().epoch }

    pub fn set(&self, token: &str) {
        {
            let mut s = self.slot.write();
            s.token = Some(token.to_string());
            s.epoch += 1;
        }
        self.persistence.save(token);
    }

    /// Store `token` only if nothing else touched the slot since `epoch` was read.
    pub fn replace_if_epoch(&self, epoch: u64, token: &str) -> bool {
        {
            let mut s = self.slot.write();
            if s.epoch != epoch {
                debug!(target: "credential", "discarding renewed credential: epoch {} superseded by {}", epoch, s.epoch);
                return false;
            }
            s.token = Some(token.to_string());
            s.epoch += 1;
        }
        self.persistence.save(token);
        true
    }

    pub fn clear(&self) {
        {
            let mut s = self.slot.write();
            s.token = None;
            s.epoch += 1;
        }
        self.persistence.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_epoch_loses() {
        let store = CredentialStore::in_memory();
        store.set("a");
        let (_, epoch) = store.snapshot();
        store.clear();
        assert!(!store.replace_if_epoch(epoch, "b"));
        assert_eq!(store.token(), None);

        let epoch = store.epoch();
        assert!(store.replace_if_epoch(epoch, "c"));
        assert_eq!(store.token().as_deref(), Some("c"));
    }

    #[test]
    fn file_persistence_survives_a_new_store() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("credential");
        let store = CredentialStore::new(Box::new(FilePersistence::new(&path)));
        assert_eq!(store.restore_persisted(), None);
        store.set("tok-1");

        let again = CredentialStore::new(Box::new(FilePersistence::new(&path)));
        assert_eq!(again.restore_persisted().as_deref(), Some("tok-1"));
        again.clear();
        assert!(!path.exists());
        // clearing twice is fine
        again.clear();
    }
}
