use crate::error::Error;
use subtle::ConstantTimeEq;

pub const MAGIC: [u8; 8] = *b"PWKEEP\0\0";
pub const VERSION: u8 = 1;

pub const SALT_LEN: usize = 16;
pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

pub const KDF_PARAMS_LEN: usize = 16;

// Verification token for early password validation
pub const VERIFY_TOKEN_PLAINTEXT: &[u8] = b"PWKEEP_VERIFY\0\0";
pub const VERIFY_CT_LEN: usize = 15 + TAG_LEN;
pub const HEADER_LEN: usize = 8 + 1 + SALT_LEN + KDF_PARAMS_LEN + NONCE_LEN + VERIFY_CT_LEN;

/// Section names travel in a u16 length field; cap well below it.
pub const NAME_MAX: usize = 4096;
/// Sanity cap on a single section's plaintext.
pub const PAYLOAD_MAX: usize = 16 * 1024 * 1024;
pub const CIPHERTEXT_MAX: usize = PAYLOAD_MAX + TAG_LEN;

// Argon2 variant identifiers
pub const ARGON2_VARIANT_ID: u8 = 2;

// Argon2 version identifiers
pub const ARGON2_VERSION_13: u8 = 0x13; // v1.3

// KDF domain version (for future extensibility)
pub const KDF_DOMAIN_VERSION_V1: u8 = 1;

/// KdfParams encoding (16 bytes, little-endian):
///
/// Byte layout:
///   [0]     kdf_domain_version: u8 (currently 1)
///   [1]     argon2_variant: u8 (2 = Argon2id, the only accepted value)
///   [2]     argon2_version: u8 (0x13 = Argon2 v1.3)
///   [3]     reserved: u8 (must be 0)
///   [4-7]   memory_kib: u32 LE (memory cost in KiB, m_cost)
///   [8-11]  iterations: u32 LE (time cost, t_cost)
///   [12-15] parallelism: u32 LE (p_cost)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KdfParams {
    pub kdf_domain_version: u8,
    pub argon2_variant: u8,
    pub argon2_version: u8,
    /// Reserved byte, must be 0.
    pub _reserved: u8,
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl KdfParams {
    pub fn encode(self) -> [u8; KDF_PARAMS_LEN] {
        let mut out = [0u8; KDF_PARAMS_LEN];
        out[0] = self.kdf_domain_version;
        out[1] = self.argon2_variant;
        out[2] = self.argon2_version;
        out[3] = 0; // reserved
        out[4..8].copy_from_slice(&self.memory_kib.to_le_bytes());
        out[8..12].copy_from_slice(&self.iterations.to_le_bytes());
        out[12..16].copy_from_slice(&self.parallelism.to_le_bytes());
        out
    }

    pub fn decode(bytes: &[u8; KDF_PARAMS_LEN]) -> Self {
        Self {
            kdf_domain_version: bytes[0],
            argon2_variant: bytes[1],
            argon2_version: bytes[2],
            _reserved: bytes[3],
            memory_kib: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            iterations: u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
            parallelism: u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]),
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.kdf_domain_version != KDF_DOMAIN_VERSION_V1 {
            return Err(Error::Format("unsupported KDF domain version"));
        }
        if self.argon2_variant != ARGON2_VARIANT_ID {
            return Err(Error::Format("unsupported Argon2 variant (only Argon2id)"));
        }
        if self.argon2_version != ARGON2_VERSION_13 {
            return Err(Error::Format("unsupported Argon2 version (only v1.3)"));
        }
        if self._reserved != 0 {
            return Err(Error::Format("invalid reserved byte (must be 0)"));
        }

        // Bounds keep a hostile header from requesting absurd KDF work.
        const MIN_KIB: u32 = 8 * 1024; // 8 MiB
        const MAX_KIB: u32 = 2 * 1024 * 1024; // 2 GiB
        if self.memory_kib < MIN_KIB {
            return Err(Error::Format("argon2 memory too low (minimum 8 MiB)"));
        }
        if self.memory_kib > MAX_KIB {
            return Err(Error::Format("argon2 memory too high (maximum 2 GiB)"));
        }
        if !(1..=16).contains(&self.iterations) {
            return Err(Error::Format("unsupported argon2 iterations (must be 1-16)"));
        }
        if !(1..=4).contains(&self.parallelism) {
            return Err(Error::Format("unsupported argon2 parallelism (must be 1-4)"));
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct Header {
    pub salt: [u8; SALT_LEN],
    pub kdf: KdfParams,
    /// Nonce for the encrypted verification token.
    pub verify_nonce: [u8; NONCE_LEN],
    /// Encrypted verification token for early password validation.
    pub verify_token: [u8; VERIFY_CT_LEN],
}

impl Header {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN);
        out.extend_from_slice(&MAGIC);
        out.push(VERSION);
        out.extend_from_slice(&self.salt);
        out.extend_from_slice(&self.kdf.encode());
        out.extend_from_slice(&self.verify_nonce);
        out.extend_from_slice(&self.verify_token);
        out
    }

    pub fn parse(buf: &[u8]) -> Result<Self, Error> {
        if buf.len() != HEADER_LEN {
            return Err(Error::Format("malformed header length"));
        }
        let magic = &buf[0..8];
        if magic.ct_eq(&MAGIC).unwrap_u8() != 1 {
            return Err(Error::Format("bad magic bytes"));
        }
        if buf[8] != VERSION {
            return Err(Error::Format("unknown archive version"));
        }

        let mut salt = [0u8; SALT_LEN];
        salt.copy_from_slice(&buf[9..9 + SALT_LEN]);

        let mut params_bytes = [0u8; KDF_PARAMS_LEN];
        params_bytes.copy_from_slice(&buf[9 + SALT_LEN..9 + SALT_LEN + KDF_PARAMS_LEN]);
        let kdf = KdfParams::decode(&params_bytes);
        kdf.validate()?;

        let rest = &buf[9 + SALT_LEN + KDF_PARAMS_LEN..];
        let mut verify_nonce = [0u8; NONCE_LEN];
        verify_nonce.copy_from_slice(&rest[..NONCE_LEN]);
        let mut verify_token = [0u8; VERIFY_CT_LEN];
        verify_token.copy_from_slice(&rest[NONCE_LEN..NONCE_LEN + VERIFY_CT_LEN]);

        Ok(Self {
            salt,
            kdf,
            verify_nonce,
            verify_token,
        })
    }
}

/// One encrypted section as stored on disk:
/// `{name_len u16}{name}{nonce}{ct_len u32}{ciphertext+tag}`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    pub name: String,
    pub nonce: [u8; NONCE_LEN],
    pub ciphertext: Vec<u8>,
}

/// Parse the record region that follows the header: a u32 count, then that
/// many records. Trailing bytes are rejected.
pub fn parse_records(buf: &[u8]) -> Result<Vec<Record>, Error> {
    if buf.len() < 4 {
        return Err(Error::Format("missing record count"));
    }
    let count = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    let mut rest = &buf[4..];

    let mut records = Vec::new();
    for _ in 0..count {
        if rest.len() < 2 {
            return Err(Error::Format("truncated record header"));
        }
        let name_len = u16::from_le_bytes([rest[0], rest[1]]) as usize;
        rest = &rest[2..];
        if name_len == 0 || name_len > NAME_MAX {
            return Err(Error::Format("bad section name length"));
        }
        if rest.len() < name_len + NONCE_LEN + 4 {
            return Err(Error::Format("truncated record"));
        }
        let name = std::str::from_utf8(&rest[..name_len])
            .map_err(|_| Error::Format("section name is not UTF-8"))?
            .to_owned();
        rest = &rest[name_len..];

        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&rest[..NONCE_LEN]);
        rest = &rest[NONCE_LEN..];

        let ct_len = u32::from_le_bytes([rest[0], rest[1], rest[2], rest[3]]) as usize;
        rest = &rest[4..];
        if ct_len < TAG_LEN || ct_len > CIPHERTEXT_MAX {
            return Err(Error::Format("bad ciphertext length"));
        }
        if rest.len() < ct_len {
            return Err(Error::Format("truncated ciphertext"));
        }
        let ciphertext = rest[..ct_len].to_vec();
        rest = &rest[ct_len..];

        records.push(Record {
            name,
            nonce,
            ciphertext,
        });
    }

    if !rest.is_empty() {
        return Err(Error::Format("trailing data after records"));
    }
    Ok(records)
}

/// Serialize a full archive image: header, count, records.
pub fn encode_archive<'a, I>(header: &Header, records: I) -> Result<Vec<u8>, Error>
where
    I: ExactSizeIterator<Item = (&'a str, &'a [u8; NONCE_LEN], &'a [u8])>,
{
    let count: u32 = records
        .len()
        .try_into()
        .map_err(|_| Error::Format("too many sections"))?;

    let mut out = header.encode();
    out.extend_from_slice(&count.to_le_bytes());
    for (name, nonce, ciphertext) in records {
        if name.is_empty() || name.len() > NAME_MAX {
            return Err(Error::Format("bad section name length"));
        }
        if ciphertext.len() < TAG_LEN || ciphertext.len() > CIPHERTEXT_MAX {
            return Err(Error::Format("bad ciphertext length"));
        }
        out.extend_from_slice(&(name.len() as u16).to_le_bytes());
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(nonce);
        out.extend_from_slice(&(ciphertext.len() as u32).to_le_bytes());
        out.extend_from_slice(ciphertext);
    }
    Ok(out)
}
