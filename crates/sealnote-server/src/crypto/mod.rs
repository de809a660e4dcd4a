//! Client-side note encryption.
//!
//! `encrypt` turns a plaintext into an opaque base64 blob plus a one-time key;
//! `decrypt` inverts it. Nothing here touches the network or the store. The
//! server only ever sees the blob and the [`Algorithm`] tag.
//!
//! Blob layout before base64:
//!
//! ```text
//! [ version | algorithm tag | algorithm body ]
//!   AES-256   body = aead(one_time_key, layer)
//!   RSA-2048  body = wrapped_len u16 | rsa_oaep(data_key) | aead(data_key, layer)
//! layer = 0x00 | utf8 plaintext
//!       | 0x01 | password::seal(utf8 plaintext)
//! ```
//!
//! The two header bytes are authenticated as AAD of the outer layer.

pub mod aead;
pub mod envelope;
pub mod password;

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use serde::{Deserialize, Serialize};
use zeroize::{ZeroizeOnDrop, Zeroizing};

use crate::error::{Error, Result};

pub use password::KdfParams;

/// Upper bound on note length, counted in characters.
pub const MAX_PLAINTEXT_CHARS: usize = 10_000;

const FORMAT_VERSION: u8 = 1;
const LAYER_PLAIN: u8 = 0x00;
const LAYER_PASSWORD: u8 = 0x01;

/// Which scheme sealed a note. Travels with the record so the recipient's
/// client can pick the matching decrypt path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Algorithm {
    #[default]
    #[serde(rename = "AES-256")]
    Aes256,
    #[serde(rename = "RSA-2048")]
    Rsa2048,
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Aes256 => "AES-256",
            Self::Rsa2048 => "RSA-2048",
        }
    }

    fn tag(self) -> u8 {
        match self {
            Self::Aes256 => 1,
            Self::Rsa2048 => 2,
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "AES-256" => Ok(Self::Aes256),
            "RSA-2048" => Ok(Self::Rsa2048),
            other => Err(Error::InvalidInput(format!(
                "unsupported algorithm '{other}' (expected AES-256 or RSA-2048)"
            ))),
        }
    }
}

/// The bearer secret that goes in the link fragment. Never sent to the server.
#[derive(Clone, PartialEq, Eq, ZeroizeOnDrop)]
pub struct OneTimeKey(String);

impl OneTimeKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for OneTimeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("OneTimeKey(<redacted>)")
    }
}

/// Output of [`encrypt`]: what goes to the server plus what stays with the sender.
#[derive(Debug)]
pub struct SealedNote {
    pub ciphertext: String,
    pub key: OneTimeKey,
    pub algorithm: Algorithm,
    pub password_protected: bool,
}

/// Seal `plaintext` with the default Argon2id cost.
pub fn encrypt(plaintext: &str, algorithm: Algorithm, password: Option<&str>) -> Result<SealedNote> {
    encrypt_with_params(plaintext, algorithm, password, &KdfParams::default())
}

/// Seal `plaintext`, deriving the password layer (if any) with `params`.
///
/// An empty password counts as no password.
pub fn encrypt_with_params(
    plaintext: &str,
    algorithm: Algorithm,
    password: Option<&str>,
    params: &KdfParams,
) -> Result<SealedNote> {
    validate_plaintext(plaintext)?;
    let password = password.filter(|p| !p.is_empty());

    let layer = encode_layer(plaintext, password, params)?;
    let header = [FORMAT_VERSION, algorithm.tag()];
    let mut blob = header.to_vec();

    let key_bytes: Zeroizing<Vec<u8>> = match algorithm {
        Algorithm::Aes256 => {
            let key = aead::random_key();
            blob.extend_from_slice(&aead::seal(&key, &layer, &header)?);
            Zeroizing::new(key.to_vec())
        }
        Algorithm::Rsa2048 => {
            let private = envelope::generate()?;
            let data_key = aead::random_key();
            let wrapped = envelope::wrap(&private.to_public_key(), &data_key)?;
            let wrapped_len = u16::try_from(wrapped.len())
                .map_err(|_| Error::EncryptionFailure("wrapped key too long".into()))?;

            blob.extend_from_slice(&wrapped_len.to_be_bytes());
            blob.extend_from_slice(&wrapped);
            blob.extend_from_slice(&aead::seal(&data_key, &layer, &header)?);
            envelope::export_private(&private)?
        }
    };

    Ok(SealedNote {
        ciphertext: STANDARD.encode(&blob),
        key: OneTimeKey::new(URL_SAFE_NO_PAD.encode(key_bytes.as_slice())),
        algorithm,
        password_protected: password.is_some(),
    })
}

/// Open a blob produced by [`encrypt`].
///
/// Returns `IncorrectPassword` when the note has a password layer and the
/// password is missing or wrong; every other failure is `DecryptionFailure`.
pub fn decrypt(
    ciphertext: &str,
    key: &str,
    algorithm: Algorithm,
    password: Option<&str>,
) -> Result<String> {
    let blob = STANDARD
        .decode(ciphertext.trim())
        .map_err(|_| Error::DecryptionFailure)?;
    if blob.len() < 2 || blob[0] != FORMAT_VERSION || blob[1] != algorithm.tag() {
        return Err(Error::DecryptionFailure);
    }
    let (header, body) = blob.split_at(2);

    let key_bytes = Zeroizing::new(
        URL_SAFE_NO_PAD
            .decode(key.trim())
            .map_err(|_| Error::DecryptionFailure)?,
    );

    let layer = match algorithm {
        Algorithm::Aes256 => {
            let key: [u8; aead::KEY_LEN] = key_bytes
                .as_slice()
                .try_into()
                .map_err(|_| Error::DecryptionFailure)?;
            let key = Zeroizing::new(key);
            aead::open(&key, body, header)?
        }
        Algorithm::Rsa2048 => {
            if body.len() < 2 {
                return Err(Error::DecryptionFailure);
            }
            let wrapped_len = u16::from_be_bytes([body[0], body[1]]) as usize;
            let rest = &body[2..];
            if rest.len() < wrapped_len {
                return Err(Error::DecryptionFailure);
            }
            let (wrapped, sealed) = rest.split_at(wrapped_len);
            let data_key = envelope::unwrap(&key_bytes, wrapped)?;
            aead::open(&data_key, sealed, header)?
        }
    };

    decode_layer(&layer, password)
}

fn validate_plaintext(plaintext: &str) -> Result<()> {
    if plaintext.is_empty() {
        return Err(Error::InvalidInput("note content is required".into()));
    }
    let chars = plaintext.chars().count();
    if chars > MAX_PLAINTEXT_CHARS {
        return Err(Error::InvalidInput(format!(
            "note content must be at most {MAX_PLAINTEXT_CHARS} characters (got {chars})"
        )));
    }
    Ok(())
}

fn encode_layer(
    plaintext: &str,
    password: Option<&str>,
    params: &KdfParams,
) -> Result<Zeroizing<Vec<u8>>> {
    let mut layer = Zeroizing::new(Vec::with_capacity(plaintext.len() + 64));
    match password {
        None => {
            layer.push(LAYER_PLAIN);
            layer.extend_from_slice(plaintext.as_bytes());
        }
        Some(pw) => {
            layer.push(LAYER_PASSWORD);
            layer.extend_from_slice(&password::seal(plaintext.as_bytes(), pw, params)?);
        }
    }
    Ok(layer)
}

fn decode_layer(layer: &[u8], password: Option<&str>) -> Result<String> {
    match layer.split_first() {
        Some((&LAYER_PLAIN, rest)) => utf8(rest),
        Some((&LAYER_PASSWORD, rest)) => {
            let pw = password
                .filter(|p| !p.is_empty())
                .ok_or(Error::IncorrectPassword)?;
            let inner = password::open(rest, pw)?;
            utf8(&inner)
        }
        _ => Err(Error::DecryptionFailure),
    }
}

fn utf8(bytes: &[u8]) -> Result<String> {
    String::from_utf8(bytes.to_vec()).map_err(|_| Error::DecryptionFailure)
}
