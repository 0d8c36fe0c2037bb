//! Bounded, revocable iteration over one fabric's scene entries.
//!
//! Iterators are the only long-lived handles into the backing store, so
//! they are pooled: at most [`CONCURRENT_ITERATORS_MAX`] may be open at
//! once across the whole table, a slot is released when the iterator is
//! dropped, and `SceneTable::finish` closes the pool so outstanding
//! iterators stop yielding entries instead of touching a torn-down table.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use log::warn;

use super::{CONCURRENT_ITERATORS_MAX, SceneTableEntry};
use crate::error::{Result, SceneError};
use crate::storage::PersistentStorage;

/// Shared accounting for open iterators.
pub(crate) struct IteratorPool {
    open: AtomicUsize,
    closed: AtomicBool,
}

impl IteratorPool {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            open: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        })
    }

    /// Claim an iterator slot, failing when the pool is exhausted.
    pub(crate) fn acquire(self: &Arc<Self>) -> Result<IteratorSlot> {
        let mut current = self.open.load(Ordering::Acquire);
        loop {
            if current >= CONCURRENT_ITERATORS_MAX {
                warn!(
                    "Scene iterator pool exhausted ({CONCURRENT_ITERATORS_MAX} open)"
                );
                return Err(SceneError::CapacityExceeded("concurrent scene iterators"));
            }
            match self.open.compare_exchange(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    return Ok(IteratorSlot {
                        pool: Arc::clone(self),
                    });
                }
                Err(observed) => current = observed,
            }
        }
    }

    /// Invalidate all outstanding iterators. Called from `finish`.
    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// RAII claim on one pool slot.
pub(crate) struct IteratorSlot {
    pool: Arc<IteratorPool>,
}

impl Drop for IteratorSlot {
    fn drop(&mut self) {
        self.pool.open.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Forward-only traversal over the entries a fabric held when the iterator
/// was opened.
///
/// The entry keys are snapshotted at open; each entry is read from storage
/// lazily on `next()`. Entries inserted after open are not observed, and an
/// entry removed mid-iteration is skipped. The pool slot is released when
/// the iterator is dropped.
pub struct SceneEntryIterator {
    slot: IteratorSlot,
    storage: Arc<dyn PersistentStorage>,
    entry_keys: Vec<String>,
    next_index: usize,
}

impl SceneEntryIterator {
    pub(crate) fn new(
        slot: IteratorSlot,
        storage: Arc<dyn PersistentStorage>,
        entry_keys: Vec<String>,
    ) -> Self {
        Self {
            slot,
            storage,
            entry_keys,
            next_index: 0,
        }
    }

    /// Number of entries in the snapshot taken at open.
    pub fn entry_count(&self) -> usize {
        self.entry_keys.len()
    }
}

impl Iterator for SceneEntryIterator {
    type Item = SceneTableEntry;

    fn next(&mut self) -> Option<Self::Item> {
        while self.next_index < self.entry_keys.len() {
            if self.slot.pool.is_closed() {
                return None;
            }
            let key = &self.entry_keys[self.next_index];
            self.next_index += 1;

            match self.storage.get(key) {
                Ok(Some(bytes)) => match SceneTableEntry::from_bytes(&bytes) {
                    Ok(entry) => return Some(entry),
                    Err(e) => warn!("Skipping undecodable scene entry at {key}: {e}"),
                },
                // Removed since the snapshot was taken.
                Ok(None) => {}
                Err(e) => warn!("Failed to read scene entry at {key}: {e}"),
            }
        }
        None
    }
}
