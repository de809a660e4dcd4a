//! Optional password layer, Argon2id -> AES-256-GCM.
//!
//! The Argon2id cost and salt are written in front of the sealed bytes so a
//! recipient needs nothing but the password to open the layer:
//!
//! `[ m_cost u32 | t_cost u32 | p_cost u32 | salt 16 | nonce 12 | ciphertext + tag ]`

use argon2::{Algorithm, Argon2, Params, Version};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroizing;

use super::aead::{self, KEY_LEN};
use crate::error::{Error, Result};

pub const SALT_LEN: usize = 16;
const HEADER_LEN: usize = 12 + SALT_LEN;

// Ceilings applied when opening, so a crafted blob cannot demand an
// unbounded amount of work from the recipient.
const MAX_MEMORY_KIB: u32 = 256 * 1024;
const MAX_ITERATIONS: u32 = 16;
const MAX_PARALLELISM: u32 = 16;

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    /// Memory cost in KiB (default: 65 536 = 64 MiB).
    pub memory_kib: u32,
    /// Number of passes (default: 3).
    pub iterations: u32,
    /// Parallel lanes (default: 1).
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: 65_536,
            iterations: 3,
            parallelism: 1,
        }
    }
}

impl KdfParams {
    fn within_limits(&self) -> bool {
        self.memory_kib <= MAX_MEMORY_KIB
            && (1..=MAX_ITERATIONS).contains(&self.iterations)
            && (1..=MAX_PARALLELISM).contains(&self.parallelism)
    }
}

fn derive_key(password: &str, salt: &[u8], params: &KdfParams) -> Result<Zeroizing<[u8; KEY_LEN]>> {
    let params = Params::new(
        params.memory_kib,
        params.iterations,
        params.parallelism,
        Some(KEY_LEN),
    )
    .map_err(|e| Error::InvalidInput(format!("argon2 params: {e}")))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    argon2
        .hash_password_into(password.as_bytes(), salt, &mut key[..])
        .map_err(|e| Error::EncryptionFailure(format!("argon2: {e}")))?;
    Ok(key)
}

/// Seal `plaintext` under a key derived from `password`.
pub fn seal(plaintext: &[u8], password: &str, params: &KdfParams) -> Result<Vec<u8>> {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);

    let mut header = Vec::with_capacity(HEADER_LEN);
    header.extend_from_slice(&params.memory_kib.to_be_bytes());
    header.extend_from_slice(&params.iterations.to_be_bytes());
    header.extend_from_slice(&params.parallelism.to_be_bytes());
    header.extend_from_slice(&salt);

    let key = derive_key(password, &salt, params)?;
    let sealed = aead::seal(&key, plaintext, &header)?;

    let mut out = header;
    out.extend_from_slice(&sealed);
    Ok(out)
}

/// Open a layer produced by [`seal`].
///
/// An authentication failure means the password is wrong and maps to
/// `IncorrectPassword`; a header that cannot be parsed is `DecryptionFailure`.
pub fn open(layer: &[u8], password: &str) -> Result<Zeroizing<Vec<u8>>> {
    if layer.len() < HEADER_LEN {
        return Err(Error::DecryptionFailure);
    }
    let (header, sealed) = layer.split_at(HEADER_LEN);
    let params = KdfParams {
        memory_kib: read_u32(&header[0..4]),
        iterations: read_u32(&header[4..8]),
        parallelism: read_u32(&header[8..12]),
    };
    if !params.within_limits() {
        return Err(Error::DecryptionFailure);
    }
    let salt = &header[12..];

    let key = derive_key(password, salt, &params).map_err(|_| Error::DecryptionFailure)?;
    aead::open(&key, sealed, header).map_err(|_| Error::IncorrectPassword)
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(bytes);
    u32::from_be_bytes(buf)
}
