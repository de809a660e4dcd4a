use thiserror::Error;

/// Every failure a note can run into, from sealing on the sender's side to
/// consumption on the server.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    // --- Boundary errors ---
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("note not found or already accessed")]
    NotFound,

    #[error("note has expired")]
    Expired,

    // --- Crypto errors ---
    #[error("incorrect password")]
    IncorrectPassword,

    /// Deliberately carries no detail: a wrong key, a truncated blob and a
    /// tampered tag all look the same to the caller.
    #[error("failed to decrypt note")]
    DecryptionFailure,

    #[error("encryption failed: {0}")]
    EncryptionFailure(String),

    // --- Store errors ---
    #[error("store is full ({limit} notes)")]
    StoreFull { limit: usize },

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
}

impl Error {
    /// True when the caller can fix the problem by supplying another password.
    pub fn is_retryable_password(&self) -> bool {
        matches!(self, Self::IncorrectPassword)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
