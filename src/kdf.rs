use crate::error::Error;
use crate::format::KdfParams;
use argon2::{Algorithm, Argon2, Params, Version};
use hkdf::Hkdf;
use rand_core::{OsRng, RngCore};
use sha2::Sha256;
use zeroize::Zeroizing;

pub const SALT_LEN: usize = crate::format::SALT_LEN;

pub fn random_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Fixed interactive-session parameters: 19 MiB, t=2, p=1 (RFC 9106's
/// low-memory recommendation).
///
/// The REPL unlocks once per session and may re-run the KDF for per-section
/// passwords, so the cost targets sub-second unlock on desktop-class
/// machines. The chosen values are encoded into the header and validated
/// against the bounds in `format::KdfParams::validate` on every open.
pub fn default_params() -> KdfParams {
    KdfParams {
        kdf_domain_version: crate::format::KDF_DOMAIN_VERSION_V1,
        argon2_variant: crate::format::ARGON2_VARIANT_ID,
        argon2_version: crate::format::ARGON2_VERSION_13,
        _reserved: 0,
        memory_kib: 19 * 1024,
        iterations: 2,
        parallelism: 1,
    }
}

/// Derive the 32-byte master key from the password with Argon2id.
/// All other keys hang off this one.
pub fn derive_master_key(
    password: &[u8],
    salt: &[u8; SALT_LEN],
    params: KdfParams,
) -> Result<Zeroizing<[u8; 32]>, Error> {
    if params.argon2_variant != crate::format::ARGON2_VARIANT_ID {
        return Err(Error::Format("unsupported Argon2 variant"));
    }
    if params.argon2_version != crate::format::ARGON2_VERSION_13 {
        return Err(Error::Format("unsupported Argon2 version"));
    }

    let argon_params = Params::new(
        params.memory_kib,
        params.iterations,
        params.parallelism,
        Some(32),
    )
    .map_err(|_| Error::Crypto)?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params);

    let mut out = Zeroizing::new([0u8; 32]);
    argon2
        .hash_password_into(password, salt, out.as_mut())
        .map_err(|_| Error::Crypto)?;
    Ok(out)
}

/// Key derivation hierarchy:
///
/// master_key = Argon2id(password, salt, params)
///   ↓
/// seal_key     = HKDF(master_key, "pwkeep\0seal")   — section AEAD key
/// password_tag = HKDF(salt=master_key, ikm=password, "pwkeep\0pwtag")
///
/// The tag lets the engine recognize the session password in O(1) without
/// storing the password itself; any other password triggers a fresh Argon2id
/// derivation.
const SEAL_KEY_INFO: &[u8] = b"pwkeep\0seal";

pub fn derive_seal_key(master_key: &[u8; 32]) -> Result<Zeroizing<[u8; 32]>, Error> {
    let hk = Hkdf::<Sha256>::new(None, master_key);
    let mut okm = Zeroizing::new([0u8; 32]);
    hk.expand(SEAL_KEY_INFO, &mut *okm).map_err(|_| Error::Crypto)?;
    Ok(okm)
}

const PASSWORD_TAG_INFO: &[u8] = b"pwkeep\0pwtag";

pub fn password_tag(master_key: &[u8; 32], password: &[u8]) -> Result<Zeroizing<[u8; 32]>, Error> {
    let hk = Hkdf::<Sha256>::new(Some(master_key), password);
    let mut okm = Zeroizing::new([0u8; 32]);
    hk.expand(PASSWORD_TAG_INFO, &mut *okm)
        .map_err(|_| Error::Crypto)?;
    Ok(okm)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_params() -> KdfParams {
        // Keep unit tests quick; bounds are exercised in format tests.
        KdfParams {
            memory_kib: 8 * 1024,
            iterations: 1,
            ..default_params()
        }
    }

    #[test]
    fn master_key_is_deterministic_per_salt() {
        let salt = [1u8; SALT_LEN];
        let a = derive_master_key(b"hunter2", &salt, fast_params()).unwrap();
        let b = derive_master_key(b"hunter2", &salt, fast_params()).unwrap();
        assert_eq!(a.as_ref(), b.as_ref());

        let other_salt = [2u8; SALT_LEN];
        let c = derive_master_key(b"hunter2", &other_salt, fast_params()).unwrap();
        assert_ne!(a.as_ref(), c.as_ref());
    }

    #[test]
    fn subkeys_differ_from_master() {
        let salt = [1u8; SALT_LEN];
        let master = derive_master_key(b"hunter2", &salt, fast_params()).unwrap();
        let seal = derive_seal_key(&master).unwrap();
        assert_ne!(master.as_ref(), seal.as_ref());
    }

    #[test]
    fn password_tag_recognizes_only_its_password() {
        let salt = [1u8; SALT_LEN];
        let master = derive_master_key(b"hunter2", &salt, fast_params()).unwrap();
        let tag = password_tag(&master, b"hunter2").unwrap();
        let same = password_tag(&master, b"hunter2").unwrap();
        let other = password_tag(&master, b"hunter3").unwrap();
        assert_eq!(tag.as_ref(), same.as_ref());
        assert_ne!(tag.as_ref(), other.as_ref());
    }
}
