use std::fmt;
use std::time::Duration;

use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::crypto::Algorithm;
use crate::error::{Error, Result};

const ID_BYTES: usize = 16;

/// Public identifier of a note: 128 random bits as lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteId(String);

impl NoteId {
    /// Draw a new id from the OS generator.
    pub fn generate() -> Self {
        let mut bytes = [0u8; ID_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    /// Accept only ids this server could have produced.
    pub fn parse(s: &str) -> Option<Self> {
        let well_formed = s.len() == ID_BYTES * 2
            && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        well_formed.then(|| Self(s.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Time-to-live chosen by the sender. Only two values exist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Expiry {
    /// 24 hours.
    Fast,
    /// 72 hours.
    #[default]
    Standard,
}

impl Expiry {
    pub fn from_hours(hours: u64) -> Result<Self> {
        match hours {
            24 => Ok(Self::Fast),
            72 => Ok(Self::Standard),
            other => Err(Error::InvalidInput(format!(
                "expiresIn must be 24 or 72 hours (got {other})"
            ))),
        }
    }

    pub fn hours(self) -> u64 {
        match self {
            Self::Fast => 24,
            Self::Standard => 72,
        }
    }

    pub fn duration(self) -> Duration {
        Duration::from_secs(self.hours() * 3600)
    }
}

/// Request metadata of a retrieval attempt, as seen at the boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessContext {
    pub ip_address: String,
    pub user_agent: String,
}

impl AccessContext {
    pub fn at(self, timestamp: i64) -> AccessEntry {
        AccessEntry {
            timestamp,
            ip_address: self.ip_address,
            user_agent: self.user_agent,
        }
    }
}

/// One retrieval attempt, recorded as it consumes the note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessEntry {
    /// Unix seconds.
    pub timestamp: i64,
    pub ip_address: String,
    pub user_agent: String,
}

/// What a caller hands the store on creation.
#[derive(Debug, Clone)]
pub struct NewNote {
    pub ciphertext: String,
    pub algorithm: Algorithm,
    pub password_protected: bool,
    pub ttl: Expiry,
    /// Accepted and carried as metadata only; nothing is ever sent to it.
    pub recipient_email: Option<String>,
}

/// Stored form of a note. There is no field for a key or a password.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteRecord {
    pub ciphertext: String,
    pub algorithm: Algorithm,
    pub password_protected: bool,
    pub created_at: i64,
    pub ttl: Expiry,
    pub recipient_email: Option<String>,
    pub access_log: Vec<AccessEntry>,
}

impl NoteRecord {
    pub fn new(note: NewNote, created_at: i64) -> Self {
        Self {
            ciphertext: note.ciphertext,
            algorithm: note.algorithm,
            password_protected: note.password_protected,
            created_at,
            ttl: note.ttl,
            recipient_email: note.recipient_email,
            access_log: Vec::new(),
        }
    }

    /// Last second at which the note is still readable.
    pub fn expires_at(&self) -> i64 {
        self.created_at + self.ttl.duration().as_secs() as i64
    }

    /// True once the record's age exceeds its TTL.
    pub fn is_expired(&self, now: i64) -> bool {
        now > self.expires_at()
    }
}

/// The single view of a note handed out by a successful consuming read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteView {
    pub ciphertext: String,
    pub algorithm: Algorithm,
    pub password_protected: bool,
    pub recipient_email: Option<String>,
    pub access_log: Vec<AccessEntry>,
}

impl From<NoteRecord> for NoteView {
    fn from(record: NoteRecord) -> Self {
        Self {
            ciphertext: record.ciphertext,
            algorithm: record.algorithm,
            password_protected: record.password_protected,
            recipient_email: record.recipient_email,
            access_log: record.access_log,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(created_at: i64, ttl: Expiry) -> NoteRecord {
        NoteRecord::new(
            NewNote {
                ciphertext: "blob".into(),
                algorithm: Algorithm::Aes256,
                password_protected: false,
                ttl,
                recipient_email: None,
            },
            created_at,
        )
    }

    #[test]
    fn expiry_is_strictly_after_ttl() {
        let r = record(1_000, Expiry::Fast);
        assert!(!r.is_expired(1_000 + 24 * 3600));
        assert!(r.is_expired(1_000 + 24 * 3600 + 1));
    }

    #[test]
    fn standard_ttl_is_72h() {
        let r = record(0, Expiry::Standard);
        assert!(!r.is_expired(71 * 3600));
        assert!(r.is_expired(73 * 3600));
    }

    #[test]
    fn only_two_ttls_exist() {
        assert_eq!(Expiry::from_hours(24).unwrap(), Expiry::Fast);
        assert_eq!(Expiry::from_hours(72).unwrap(), Expiry::Standard);
        assert!(Expiry::from_hours(48).is_err());
        assert!(Expiry::from_hours(0).is_err());
        assert_eq!(Expiry::default(), Expiry::Standard);
    }

    #[test]
    fn expires_at_is_last_readable_second() {
        let r = record(1_000, Expiry::Fast);
        assert_eq!(r.expires_at(), 1_000 + 24 * 3600);
        assert!(!r.is_expired(r.expires_at()));
    }

    #[test]
    fn ids_are_128_bit_hex() {
        let id = NoteId::generate();
        assert_eq!(id.as_str().len(), 32);
        assert_eq!(NoteId::parse(id.as_str()), Some(id.clone()));
        assert_ne!(NoteId::generate(), id);
    }

    #[test]
    fn malformed_ids_are_rejected() {
        assert!(NoteId::parse("").is_none());
        assert!(NoteId::parse("../../etc/passwd").is_none());
        assert!(NoteId::parse(&"A".repeat(32)).is_none());
        assert!(NoteId::parse(&"a".repeat(31)).is_none());
    }
}
