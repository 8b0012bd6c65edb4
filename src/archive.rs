//! The encrypted container engine.
//!
//! An archive is a single file: a header (salt, KDF cost, verification
//! token) followed by one AEAD-sealed record per section. A session keeps
//! the whole archive in memory; writes are staged in a pending map that
//! shadows the persisted baseline until `commit` serializes the merged view
//! to a temporary file and atomically renames it over the archive path.

use crate::aead;
use crate::error::Error;
use crate::format::{self, Header, HEADER_LEN, NAME_MAX, NONCE_LEN, PAYLOAD_MAX};
use crate::kdf;
use crate::securemem::MemoryLock;
use aes_gcm::Aes256Gcm;
use rand_core::{OsRng, RngCore};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

struct SealedEntry {
    nonce: [u8; NONCE_LEN],
    ciphertext: Vec<u8>,
}

struct PendingEntry {
    plaintext: Zeroizing<Vec<u8>>,
    sealed: SealedEntry,
}

pub struct Archive {
    path: PathBuf,
    header: Header,
    /// Session seal cipher, keyed from the open password.
    cipher: Aes256Gcm,
    master_key: MemoryLock<Zeroizing<[u8; 32]>>,
    /// Recognizer for the open password; see `kdf::password_tag`.
    password_tag: Zeroizing<[u8; 32]>,
    baseline: BTreeMap<String, SealedEntry>,
    pending: BTreeMap<String, PendingEntry>,
    created: bool,
    committed: bool,
}

impl Archive {
    /// Open an existing archive, or create a fresh one if the path does not
    /// exist yet (it is only written out on commit).
    pub fn open(path: &Path, password: &[u8]) -> Result<Self, Error> {
        match fs::read(path) {
            Ok(bytes) => Self::from_bytes(path.to_path_buf(), &bytes, password),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Self::create(path.to_path_buf(), password, kdf::default_params())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Create a fresh archive with explicit KDF cost. Exposed for tests and
    /// tooling that needs non-default parameters.
    pub fn create(
        path: PathBuf,
        password: &[u8],
        params: format::KdfParams,
    ) -> Result<Self, Error> {
        params.validate()?;
        let salt = kdf::random_salt();
        let master_key = MemoryLock::new(kdf::derive_master_key(password, &salt, params)?);
        let seal_key = MemoryLock::new(kdf::derive_seal_key(&**master_key)?);
        let cipher = aead::create_cipher(&**seal_key);
        let verify_nonce = aead::random_nonce();
        let verify_token = aead::seal_verification_token(&cipher, &verify_nonce, &**master_key)?;
        let password_tag = kdf::password_tag(&**master_key, password)?;
        Ok(Self {
            path,
            header: Header {
                salt,
                kdf: params,
                verify_nonce,
                verify_token,
            },
            cipher,
            master_key,
            password_tag,
            baseline: BTreeMap::new(),
            pending: BTreeMap::new(),
            created: true,
            committed: false,
        })
    }

    fn from_bytes(path: PathBuf, bytes: &[u8], password: &[u8]) -> Result<Self, Error> {
        if bytes.len() < HEADER_LEN {
            return Err(Error::Format("file too short for header"));
        }
        let header = Header::parse(&bytes[..HEADER_LEN])?;
        let master_key =
            MemoryLock::new(kdf::derive_master_key(password, &header.salt, header.kdf)?);
        let seal_key = MemoryLock::new(kdf::derive_seal_key(&**master_key)?);
        let cipher = aead::create_cipher(&**seal_key);
        aead::check_verification_token(
            &cipher,
            &header.verify_nonce,
            &**master_key,
            &header.verify_token,
        )?;

        let mut baseline = BTreeMap::new();
        for record in format::parse_records(&bytes[HEADER_LEN..])? {
            // Duplicate names: last record wins.
            baseline.insert(
                record.name,
                SealedEntry {
                    nonce: record.nonce,
                    ciphertext: record.ciphertext,
                },
            );
        }

        let password_tag = kdf::password_tag(&**master_key, password)?;
        Ok(Self {
            path,
            header,
            cipher,
            master_key,
            password_tag,
            baseline,
            pending: BTreeMap::new(),
            created: false,
            committed: false,
        })
    }

    /// Decrypted payload of a section. Pending writes shadow the baseline.
    pub fn get(&self, name: &str) -> Result<Zeroizing<Vec<u8>>, Error> {
        if let Some(pending) = self.pending.get(name) {
            return Ok(pending.plaintext.clone());
        }
        let entry = self.baseline.get(name).ok_or(Error::NotFound)?;
        aead::open(&self.cipher, &entry.nonce, name.as_bytes(), &entry.ciphertext)
    }

    /// Stage a write, replacing any previous value for the name. The entry is
    /// sealed under the session key immediately, so every pending entry is
    /// committable as-is.
    pub fn stage(&mut self, name: &str, payload: &[u8]) -> Result<(), Error> {
        validate_name(name)?;
        if payload.len() > PAYLOAD_MAX {
            return Err(Error::Staging("payload too large"));
        }
        let sealed = seal_entry(&self.cipher, name, payload)?;
        self.pending.insert(
            name.to_owned(),
            PendingEntry {
                plaintext: Zeroizing::new(payload.to_vec()),
                sealed,
            },
        );
        Ok(())
    }

    /// Re-seal a staged entry under the key for `password`.
    ///
    /// The session password is recognized in O(1) via its tag and leaves the
    /// existing seal in place; any other password costs a fresh KDF run and
    /// produces an entry the session key can no longer open. On failure the
    /// entry keeps its session-key seal.
    pub fn apply_encryption(&mut self, name: &str, password: &[u8]) -> Result<(), Error> {
        if !self.pending.contains_key(name) {
            return Err(Error::NotFound);
        }
        let candidate = kdf::password_tag(&**self.master_key, password)?;
        if candidate[..].ct_eq(&self.password_tag[..]).unwrap_u8() == 1 {
            return Ok(());
        }

        let master = kdf::derive_master_key(password, &self.header.salt, self.header.kdf)?;
        let seal_key = kdf::derive_seal_key(&master)?;
        let cipher = aead::create_cipher(&seal_key);
        let entry = self.pending.get_mut(name).ok_or(Error::NotFound)?;
        entry.sealed = seal_entry(&cipher, name, &entry.plaintext)?;
        Ok(())
    }

    /// Section names in the current view (pending included), sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: BTreeSet<&str> = self.baseline.keys().map(String::as_str).collect();
        names.extend(self.pending.keys().map(String::as_str));
        names.into_iter().collect()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Drop all uncommitted writes, restoring the persisted baseline view.
    pub fn discard(&mut self) {
        self.pending.clear();
    }

    /// Persist the merged view. At most one commit per archive handle; a
    /// clean handle over an existing file leaves the file untouched.
    pub fn commit(&mut self) -> Result<(), Error> {
        if self.committed {
            return Err(Error::Unusable("archive was already committed"));
        }
        self.committed = true;
        if self.pending.is_empty() && !self.created {
            return Ok(());
        }

        let mut records: BTreeMap<&str, &SealedEntry> = self
            .baseline
            .iter()
            .map(|(name, entry)| (name.as_str(), entry))
            .collect();
        for (name, entry) in &self.pending {
            records.insert(name.as_str(), &entry.sealed);
        }
        let image = format::encode_archive(
            &self.header,
            records
                .iter()
                .map(|(name, entry)| (*name, &entry.nonce, entry.ciphertext.as_slice())),
        )?;
        write_atomic(&self.path, &image)
    }
}

fn validate_name(name: &str) -> Result<(), Error> {
    if name.is_empty() {
        return Err(Error::Staging("section name is empty"));
    }
    if name.len() > NAME_MAX {
        return Err(Error::Staging("section name too long"));
    }
    if name.contains('\0') {
        return Err(Error::Staging("section name contains NUL"));
    }
    Ok(())
}

fn seal_entry(cipher: &Aes256Gcm, name: &str, payload: &[u8]) -> Result<SealedEntry, Error> {
    let nonce = aead::random_nonce();
    let ciphertext = aead::seal(cipher, &nonce, name.as_bytes(), payload)?;
    Ok(SealedEntry { nonce, ciphertext })
}

/// Write the image to a sibling temporary file, then rename over the target.
/// A failed write never clobbers the existing archive.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), Error> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let file_name = path
        .file_name()
        .ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "archive path has no file name",
            )
        })?
        .to_string_lossy()
        .into_owned();

    for _ in 0..32 {
        let mut rnd = [0u8; 8];
        OsRng.fill_bytes(&mut rnd);
        let candidate = parent.join(format!(".{}.{}.tmp", file_name, hex8(&rnd)));
        let mut file = match open_new_file(&candidate) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(err) => return Err(err.into()),
        };
        if let Err(err) = file.write_all(bytes).and_then(|()| file.sync_all()) {
            drop(file);
            let _ = fs::remove_file(&candidate);
            return Err(err.into());
        }
        drop(file);
        if let Err(err) = fs::rename(&candidate, path) {
            let _ = fs::remove_file(&candidate);
            return Err(err.into());
        }
        return Ok(());
    }
    Err(std::io::Error::new(
        std::io::ErrorKind::AlreadyExists,
        "could not create temporary archive file",
    )
    .into())
}

fn open_new_file(path: &Path) -> std::io::Result<File> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o600)
            .open(path)
    }
    #[cfg(not(unix))]
    {
        OpenOptions::new().write(true).create_new(true).open(path)
    }
}

fn hex8(bytes: &[u8; 8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = [0u8; 16];
    for (i, b) in bytes.iter().enumerate() {
        out[i * 2] = HEX[(b >> 4) as usize];
        out[i * 2 + 1] = HEX[(b & 0x0f) as usize];
    }
    String::from_utf8_lossy(&out).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fast_params() -> format::KdfParams {
        format::KdfParams {
            memory_kib: 8 * 1024,
            iterations: 1,
            ..kdf::default_params()
        }
    }

    fn fresh(dir: &TempDir, password: &[u8]) -> Archive {
        Archive::create(dir.path().join("store.pwk"), password, fast_params()).unwrap()
    }

    #[test]
    fn staged_write_is_visible_to_get() {
        let dir = TempDir::new().unwrap();
        let mut archive = fresh(&dir, b"pw");
        archive.stage("github", b"user hunter2").unwrap();
        assert_eq!(archive.get("github").unwrap().as_slice(), b"user hunter2");
    }

    #[test]
    fn restaging_overwrites_entirely() {
        let dir = TempDir::new().unwrap();
        let mut archive = fresh(&dir, b"pw");
        archive.stage("alpha", b"first").unwrap();
        archive.stage("alpha", b"second").unwrap();
        assert_eq!(archive.get("alpha").unwrap().as_slice(), b"second");
    }

    #[test]
    fn missing_section_is_not_found() {
        let dir = TempDir::new().unwrap();
        let archive = fresh(&dir, b"pw");
        assert!(matches!(archive.get("ghost"), Err(Error::NotFound)));
    }

    #[test]
    fn invalid_names_fail_staging() {
        let dir = TempDir::new().unwrap();
        let mut archive = fresh(&dir, b"pw");
        assert!(matches!(archive.stage("", b"x"), Err(Error::Staging(_))));
        assert!(matches!(
            archive.stage("a\0b", b"x"),
            Err(Error::Staging(_))
        ));
        let long = "n".repeat(NAME_MAX + 1);
        assert!(matches!(
            archive.stage(&long, b"x"),
            Err(Error::Staging(_))
        ));
        assert!(archive.names().is_empty());
    }

    #[test]
    fn discard_restores_the_baseline_view() {
        let dir = TempDir::new().unwrap();
        let mut archive = fresh(&dir, b"pw");
        archive.stage("alpha", b"v").unwrap();
        assert_eq!(archive.names(), ["alpha"]);
        archive.discard();
        assert!(archive.names().is_empty());
        assert!(!archive.has_pending());
    }

    #[test]
    fn names_are_the_sorted_union_of_baseline_and_pending() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.pwk");
        let mut archive = Archive::create(path.clone(), b"pw", fast_params()).unwrap();
        archive.stage("bravo", b"1").unwrap();
        archive.commit().unwrap();

        let mut archive = Archive::open(&path, b"pw").unwrap();
        archive.stage("alpha", b"2").unwrap();
        archive.stage("bravo", b"3").unwrap();
        assert_eq!(archive.names(), ["alpha", "bravo"]);
    }

    #[test]
    fn commit_then_reopen_roundtrips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.pwk");
        let mut archive = Archive::create(path.clone(), b"pw", fast_params()).unwrap();
        archive.stage("github", b"user hunter2").unwrap();
        archive.commit().unwrap();

        let archive = Archive::open(&path, b"pw").unwrap();
        assert_eq!(archive.get("github").unwrap().as_slice(), b"user hunter2");
    }

    #[test]
    fn wrong_password_is_rejected_at_open() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.pwk");
        let mut archive = Archive::create(path.clone(), b"pw", fast_params()).unwrap();
        archive.commit().unwrap();
        assert!(matches!(
            Archive::open(&path, b"wrong"),
            Err(Error::BadPassword)
        ));
    }

    #[test]
    fn garbage_file_is_a_format_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.pwk");
        fs::write(&path, b"definitely not an archive").unwrap();
        assert!(matches!(
            Archive::open(&path, b"pw"),
            Err(Error::Format(_))
        ));
    }

    #[test]
    fn tampered_record_fails_on_get() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.pwk");
        let mut archive = Archive::create(path.clone(), b"pw", fast_params()).unwrap();
        archive.stage("github", b"user hunter2").unwrap();
        archive.commit().unwrap();

        let mut bytes = fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff; // flip inside the record's ciphertext
        fs::write(&path, &bytes).unwrap();

        let archive = Archive::open(&path, b"pw").unwrap();
        assert!(matches!(archive.get("github"), Err(Error::BadPassword)));
    }

    #[test]
    fn session_password_reuses_the_existing_seal() {
        let dir = TempDir::new().unwrap();
        let mut archive = fresh(&dir, b"pw");
        archive.stage("github", b"v").unwrap();
        archive.apply_encryption("github", b"pw").unwrap();
        assert_eq!(archive.get("github").unwrap().as_slice(), b"v");
    }

    #[test]
    fn foreign_password_seals_away_from_the_session_key() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.pwk");
        let mut archive = Archive::create(path.clone(), b"pw", fast_params()).unwrap();
        archive.stage("github", b"v").unwrap();
        archive.apply_encryption("github", b"other").unwrap();
        archive.commit().unwrap();

        // The archive still opens with the session password, but the one
        // section sealed under the foreign password does not.
        let archive = Archive::open(&path, b"pw").unwrap();
        assert!(matches!(archive.get("github"), Err(Error::BadPassword)));
    }

    #[test]
    fn second_commit_is_refused() {
        let dir = TempDir::new().unwrap();
        let mut archive = fresh(&dir, b"pw");
        archive.commit().unwrap();
        assert!(matches!(archive.commit(), Err(Error::Unusable(_))));
    }

    #[test]
    fn clean_session_leaves_the_file_untouched() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.pwk");
        let mut archive = Archive::create(path.clone(), b"pw", fast_params()).unwrap();
        archive.stage("a", b"1").unwrap();
        archive.commit().unwrap();
        let before = fs::read(&path).unwrap();

        let mut archive = Archive::open(&path, b"pw").unwrap();
        archive.stage("b", b"2").unwrap();
        archive.discard();
        archive.commit().unwrap();
        assert_eq!(fs::read(&path).unwrap(), before);
    }
}
