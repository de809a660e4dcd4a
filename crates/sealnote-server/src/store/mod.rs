pub mod clock;
pub mod memory;
pub mod model;

pub use clock::{Clock, ManualClock, SystemClock};
pub use memory::MemoryStore;
pub use model::{AccessContext, AccessEntry, Expiry, NewNote, NoteId, NoteRecord, NoteView};

use crate::error::Result;

/// Outcome of a consuming read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Take {
    /// The note was removed and handed to this caller, access entry included.
    Found(NoteView),
    /// No such note, or it was already consumed.
    NotFound,
    /// The note existed but its TTL had elapsed. Reported once; the id is
    /// unknown afterwards.
    Expired,
}

/// Backing store for notes.
///
/// Implementations must make `take` a single atomic remove: for one id, at
/// most one caller ever receives `Take::Found`.
pub trait SecretStore: Send + Sync {
    fn insert(&self, note: NewNote) -> Result<NoteId>;
    /// Remove the note and return it, stamping `access` into its log.
    fn take(&self, id: &NoteId, access: AccessContext) -> Result<Take>;
    /// Reclaim every expired note, returning how many went. A reclaimed id
    /// still reads as `Take::Expired` once.
    fn sweep(&self) -> Result<usize>;
    fn len(&self) -> Result<usize>;
}
