use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::time;
use tracing::{debug, info, warn};

use super::clock::{Clock, SystemClock};
use super::model::{AccessContext, NewNote, NoteId, NoteRecord};
use super::{SecretStore, Take};
use crate::error::{Error, Result};

/// Default cap on live notes.
pub const DEFAULT_MAX_NOTES: usize = 10_000;

/// How long after its expiry a reclaimed note still answers `Expired`.
pub const TOMBSTONE_RETENTION: Duration = Duration::from_secs(72 * 3600);

#[derive(Default)]
struct Notes {
    live: HashMap<NoteId, NoteRecord>,
    /// Expired notes reclaimed unread, keyed to their expiry second.
    tombstones: HashMap<NoteId, i64>,
}

impl Notes {
    /// Move expired notes to tombstones. Returns how many live notes went.
    fn evict_expired(&mut self, now: i64, cap: usize) -> usize {
        let before = self.live.len();
        let tombstones = &mut self.tombstones;
        self.live.retain(|id, record| {
            if record.is_expired(now) {
                tombstones.insert(id.clone(), record.expires_at());
                false
            } else {
                true
            }
        });
        self.prune_tombstones(now, cap);
        before - self.live.len()
    }

    /// Forget tombstones past retention, then the oldest beyond `cap`.
    fn prune_tombstones(&mut self, now: i64, cap: usize) {
        let horizon = now - TOMBSTONE_RETENTION.as_secs() as i64;
        self.tombstones.retain(|_, expired_at| *expired_at >= horizon);

        if self.tombstones.len() > cap {
            let excess = self.tombstones.len() - cap;
            let mut oldest: Vec<(i64, NoteId)> = self
                .tombstones
                .iter()
                .map(|(id, at)| (*at, id.clone()))
                .collect();
            oldest.sort_unstable_by_key(|(at, _)| *at);
            for (_, id) in oldest.into_iter().take(excess) {
                self.tombstones.remove(&id);
            }
        }
    }
}

/// Process-memory note store. Unread notes do not survive a restart.
#[derive(Clone)]
pub struct MemoryStore {
    notes: Arc<Mutex<Notes>>,
    clock: Arc<dyn Clock>,
    max_notes: usize,
}

impl MemoryStore {
    pub fn new(max_notes: usize) -> Self {
        Self::with_clock(max_notes, Arc::new(SystemClock))
    }

    pub fn with_clock(max_notes: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            notes: Arc::new(Mutex::new(Notes::default())),
            clock,
            max_notes,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Notes>> {
        self.notes
            .lock()
            .map_err(|_| Error::StorageUnavailable("note map lock poisoned".into()))
    }

    /// Spawn a background Tokio task that calls `sweep()` every `interval`.
    /// The task ends with the runtime.
    pub fn spawn_sweep(self, interval: Duration) {
        tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.tick().await; // skip first immediate tick
            loop {
                ticker.tick().await;
                if let Err(e) = self.sweep() {
                    warn!(error = %e, "background sweep error");
                }
            }
        });
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_NOTES)
    }
}

impl SecretStore for MemoryStore {
    fn insert(&self, note: NewNote) -> Result<NoteId> {
        let now = self.clock.now();
        let mut notes = self.lock()?;

        if notes.live.len() >= self.max_notes && notes.evict_expired(now, self.max_notes) == 0 {
            return Err(Error::StoreFull {
                limit: self.max_notes,
            });
        }

        let record = NoteRecord::new(note, now);
        loop {
            let id = NoteId::generate();
            if notes.tombstones.contains_key(&id) {
                warn!("note id collision, drawing another");
                continue;
            }
            match notes.live.entry(id.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(record);
                    debug!(note = %id, "stored note");
                    return Ok(id);
                }
                Entry::Occupied(_) => {
                    warn!("note id collision, drawing another");
                }
            }
        }
    }

    fn take(&self, id: &NoteId, access: AccessContext) -> Result<Take> {
        let now = self.clock.now();

        // Removal under the lock is the consuming read: whoever gets the
        // record out of the map is the only caller that ever sees it.
        let mut record = {
            let mut notes = self.lock()?;
            match notes.live.remove(id) {
                Some(record) => record,
                None => {
                    if notes.tombstones.remove(id).is_some() {
                        debug!(note = %id, "requested note was swept after expiry");
                        return Ok(Take::Expired);
                    }
                    return Ok(Take::NotFound);
                }
            }
        };

        if record.is_expired(now) {
            debug!(note = %id, "evicted expired note on access");
            return Ok(Take::Expired);
        }
        record.access_log.push(access.at(now));
        Ok(Take::Found(record.into()))
    }

    fn sweep(&self) -> Result<usize> {
        let now = self.clock.now();
        let removed = self.lock()?.evict_expired(now, self.max_notes);
        if removed > 0 {
            info!(removed, "swept expired notes");
        }
        Ok(removed)
    }

    fn len(&self) -> Result<usize> {
        Ok(self.lock()?.live.len())
    }
}
