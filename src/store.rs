//! Stateful façade over the container engine.
//!
//! Owns the archive handle and the master password for the session's
//! lifetime. The password buffer is wrapped in `Zeroizing`, so it is wiped
//! on every exit path, including early returns and panics during unwind.

use crate::archive::Archive;
use crate::error::Error;
use std::path::Path;
use zeroize::Zeroizing;

/// What happened to the encryption step of a `set`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOutcome {
    /// Sealed under the session password.
    Sealed,
    /// The write is staged, but applying the session key failed; the entry
    /// keeps the archive's default seal.
    DefaultKey,
}

pub struct SecretStore {
    archive: Archive,
    password: Zeroizing<Vec<u8>>,
}

impl SecretStore {
    /// Open (or create) the archive at `path` with `password` and bind both
    /// to this session.
    pub fn open(path: &Path, password: Zeroizing<Vec<u8>>) -> Result<Self, Error> {
        let archive = Archive::open(path, &password)?;
        Ok(Self { archive, password })
    }

    pub fn get(&self, name: &str) -> Result<Zeroizing<Vec<u8>>, Error> {
        self.archive.get(name)
    }

    /// Stage an overwrite of `name` and key it with the session password.
    /// A failed key application is reported as an outcome, not an error:
    /// the write itself stands.
    pub fn set(&mut self, name: &str, payload: &[u8]) -> Result<SetOutcome, Error> {
        self.archive.stage(name, payload)?;
        match self.archive.apply_encryption(name, &self.password) {
            Ok(()) => Ok(SetOutcome::Sealed),
            Err(Error::Crypto) => Ok(SetOutcome::DefaultKey),
            Err(err) => Err(err),
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.archive.names()
    }

    pub fn discard(&mut self) {
        self.archive.discard();
    }

    /// Persist once and end the session. Consumes the store, so a second
    /// commit is unrepresentable; the password is zeroized on drop.
    pub fn commit_and_close(mut self) -> Result<(), Error> {
        self.archive.commit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::Archive;
    use crate::format::KdfParams;
    use crate::kdf;
    use tempfile::TempDir;

    fn fast_params() -> KdfParams {
        KdfParams {
            memory_kib: 8 * 1024,
            iterations: 1,
            ..kdf::default_params()
        }
    }

    fn fresh_store(dir: &TempDir) -> SecretStore {
        let path = dir.path().join("store.pwk");
        let archive = Archive::create(path, b"pw", fast_params()).unwrap();
        SecretStore {
            archive,
            password: Zeroizing::new(b"pw".to_vec()),
        }
    }

    #[test]
    fn set_then_get_roundtrips() {
        let dir = TempDir::new().unwrap();
        let mut store = fresh_store(&dir);
        assert_eq!(store.set("alpha", b"one two").unwrap(), SetOutcome::Sealed);
        assert_eq!(store.get("alpha").unwrap().as_slice(), b"one two");
    }

    #[test]
    fn set_overwrites_without_merging() {
        let dir = TempDir::new().unwrap();
        let mut store = fresh_store(&dir);
        store.set("alpha", b"first").unwrap();
        store.set("alpha", b"second").unwrap();
        assert_eq!(store.get("alpha").unwrap().as_slice(), b"second");
    }

    #[test]
    fn discard_without_writes_is_a_noop() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.pwk");
        let archive = Archive::create(path.clone(), b"pw", fast_params()).unwrap();
        let mut store = SecretStore {
            archive,
            password: Zeroizing::new(b"pw".to_vec()),
        };
        store.set("alpha", b"1").unwrap();
        store.commit_and_close().unwrap();

        let mut store = SecretStore::open(&path, Zeroizing::new(b"pw".to_vec())).unwrap();
        let before: Vec<String> = store.names().iter().map(|s| s.to_string()).collect();
        store.discard();
        let after: Vec<String> = store.names().iter().map(|s| s.to_string()).collect();
        assert_eq!(before, after);
        assert_eq!(after, ["alpha"]);
    }

    #[test]
    fn commit_and_close_persists_for_a_new_session() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.pwk");
        let archive = Archive::create(path.clone(), b"pw", fast_params()).unwrap();
        let mut store = SecretStore {
            archive,
            password: Zeroizing::new(b"pw".to_vec()),
        };
        store.set("alpha", b"value").unwrap();
        store.commit_and_close().unwrap();

        let store = SecretStore::open(&path, Zeroizing::new(b"pw".to_vec())).unwrap();
        assert_eq!(store.get("alpha").unwrap().as_slice(), b"value");
    }
}
