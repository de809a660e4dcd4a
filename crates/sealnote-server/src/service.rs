//! Boundary operations: turn sender and recipient requests into store calls.
//!
//! The service never sees a one-time key. Senders keep it in the link
//! fragment; recipients decrypt locally after `retrieve` hands back the blob.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::crypto::Algorithm;
use crate::error::{Error, Result};
use crate::store::{AccessContext, AccessEntry, Expiry, NewNote, NoteId, SecretStore, Take};

/// Largest ciphertext accepted by default. A 10 000-character note sealed
/// with either algorithm stays well below this.
pub const DEFAULT_MAX_CONTENT_BYTES: usize = 1_048_576;

/// The create payload as sent by a client.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateNoteRequest {
    #[serde(default)]
    pub content: Option<String>,
    /// Hours; 24 or 72. Absent means 72.
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub is_password_protected: bool,
    /// Absent means AES-256.
    #[serde(default)]
    pub algorithm: Option<String>,
    #[serde(default)]
    pub recipient_email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedNote {
    pub id: NoteId,
}

/// What a recipient gets back from the single successful retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievedNote {
    pub content: String,
    pub is_password_protected: bool,
    pub algorithm: Algorithm,
    pub access_log: Vec<AccessEntry>,
}

#[derive(Clone)]
pub struct NoteService {
    store: Arc<dyn SecretStore>,
    max_content_bytes: usize,
}

impl NoteService {
    pub fn new(store: Arc<dyn SecretStore>) -> Self {
        Self {
            store,
            max_content_bytes: DEFAULT_MAX_CONTENT_BYTES,
        }
    }

    pub fn with_max_content_bytes(mut self, max_content_bytes: usize) -> Self {
        self.max_content_bytes = max_content_bytes;
        self
    }

    #[cfg(test)]
    pub(crate) fn store(&self) -> &Arc<dyn SecretStore> {
        &self.store
    }

    pub fn create(&self, request: CreateNoteRequest) -> Result<NoteId> {
        let note = self.validate(request)?;
        let (algorithm, ttl) = (note.algorithm, note.ttl);

        let id = self.store.insert(note)?;
        info!(
            note = %id,
            %algorithm,
            ttl_hours = ttl.hours(),
            "audit: note.create"
        );
        Ok(id)
    }

    /// Consume the note behind `id`.
    ///
    /// `NotFound` and `Expired` are terminal: there is nothing left to retry.
    pub fn retrieve(&self, id: &str, access: AccessContext) -> Result<RetrievedNote> {
        // Anything we could not have issued cannot exist in the store.
        let Some(id) = NoteId::parse(id) else {
            return Err(Error::NotFound);
        };

        match self.store.take(&id, access)? {
            Take::Found(view) => {
                info!(note = %id, "audit: note.read");
                if view.recipient_email.is_some() {
                    info!(
                        note = %id,
                        "recipient notification requested; delivery is not implemented"
                    );
                }
                Ok(RetrievedNote {
                    content: view.ciphertext,
                    is_password_protected: view.password_protected,
                    algorithm: view.algorithm,
                    access_log: view.access_log,
                })
            }
            Take::Expired => {
                info!(note = %id, "audit: note.expired");
                Err(Error::Expired)
            }
            Take::NotFound => Err(Error::NotFound),
        }
    }

    fn validate(&self, request: CreateNoteRequest) -> Result<NewNote> {
        let ciphertext = request
            .content
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| Error::InvalidInput("content is required".into()))?;
        if ciphertext.len() > self.max_content_bytes {
            return Err(Error::InvalidInput(format!(
                "content exceeds {} bytes",
                self.max_content_bytes
            )));
        }

        let algorithm = match request.algorithm.as_deref() {
            None => Algorithm::default(),
            Some(tag) => tag.parse()?,
        };
        let ttl = match request.expires_in {
            None => Expiry::default(),
            Some(hours) => Expiry::from_hours(hours)?,
        };
        let recipient_email = request
            .recipient_email
            .map(|e| e.trim().to_owned())
            .filter(|e| !e.is_empty());

        Ok(NewNote {
            ciphertext,
            algorithm,
            password_protected: request.is_password_protected,
            ttl,
            recipient_email,
        })
    }
}
