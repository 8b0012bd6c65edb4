use crate::error::Error;
use crate::format::{NONCE_LEN, VERIFY_CT_LEN, VERIFY_TOKEN_PLAINTEXT};
use aes_gcm::aead::{Aead, AeadInPlace, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use rand_core::{OsRng, RngCore};
use zeroize::Zeroizing;

/// Create an AES-256-GCM cipher from a 32-byte key.
pub fn create_cipher(key: &[u8; 32]) -> Aes256Gcm {
    Aes256Gcm::new(key.into())
}

pub fn random_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Encrypt a section payload. The section name rides along as AAD so a
/// ciphertext cannot be replayed under a different name.
pub fn seal(
    cipher: &Aes256Gcm,
    nonce: &[u8; NONCE_LEN],
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, Error> {
    let mut buffer = plaintext.to_vec();
    cipher
        .encrypt_in_place(Nonce::from_slice(nonce), aad, &mut buffer)
        .map_err(|_| Error::Crypto)?;
    Ok(buffer)
}

/// Decrypt a section payload. An authentication failure surfaces as
/// `BadPassword`: with AEAD there is no way to tell a wrong key from a
/// tampered record, and both mean "this key does not open this section".
pub fn open(
    cipher: &Aes256Gcm,
    nonce: &[u8; NONCE_LEN],
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<Zeroizing<Vec<u8>>, Error> {
    let mut buffer = ciphertext.to_vec();
    cipher
        .decrypt_in_place(Nonce::from_slice(nonce), aad, &mut buffer)
        .map_err(|_| Error::BadPassword)?;
    Ok(Zeroizing::new(buffer))
}

/// Encrypt the verification token with the archive key.
/// The master key is bound as AAD so the token only verifies under the exact
/// key hierarchy it was created for.
pub fn seal_verification_token(
    cipher: &Aes256Gcm,
    nonce: &[u8; NONCE_LEN],
    master_key: &[u8; 32],
) -> Result<[u8; VERIFY_CT_LEN], Error> {
    let ct = cipher
        .encrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: VERIFY_TOKEN_PLAINTEXT,
                aad: master_key,
            },
        )
        .map_err(|_| Error::Crypto)?;
    ct.try_into().map_err(|_| Error::Crypto)
}

/// Decrypt and check the verification token; rejects the password early,
/// before any section is touched.
pub fn check_verification_token(
    cipher: &Aes256Gcm,
    nonce: &[u8; NONCE_LEN],
    master_key: &[u8; 32],
    token: &[u8; VERIFY_CT_LEN],
) -> Result<(), Error> {
    let mut buffer = token.to_vec();
    cipher
        .decrypt_in_place(Nonce::from_slice(nonce), master_key, &mut buffer)
        .map_err(|_| Error::BadPassword)?;
    if buffer != VERIFY_TOKEN_PLAINTEXT {
        return Err(Error::BadPassword);
    }
    Ok(())
}
