//! Latest-value signal cache
//!
//! Holds the most recent decoded value of every signal, across messages that
//! arrive on independent cycles. A decoded frame is published as one batch:
//! entries are built before the write lock is taken and inserted under a
//! single acquisition, so readers never see half of a frame.

use crate::types::{DecodedFrame, Timestamp};
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Latest state of one signal
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheEntry {
    /// Physical value
    pub value: f64,
    /// Raw value after sign extension (fault codes are looked up by this)
    pub raw_value: i64,
    /// When the frame carrying this value was received
    pub updated_at: Timestamp,
    /// Canonical id of the message that published it
    pub message_id: u32,
}

/// Thread-safe signal cache.
///
/// Single writer per message batch, any number of readers. Values are
/// overwritten on each new frame for their owning message.
#[derive(Debug, Default)]
pub struct SignalCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl SignalCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish every physical signal of a decoded frame atomically
    pub fn publish(&self, frame: &DecodedFrame, received_at: Timestamp) {
        let batch: Vec<(String, CacheEntry)> = frame
            .signals
            .iter()
            .map(|signal| {
                (
                    signal.name.clone(),
                    CacheEntry {
                        value: signal.value,
                        raw_value: signal.raw_value,
                        updated_at: received_at,
                        message_id: frame.can_id,
                    },
                )
            })
            .collect();

        if batch.is_empty() {
            return;
        }

        // A writer never panics while holding the lock, so the map is intact
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.extend(batch);
    }

    /// Latest entry for a single signal
    pub fn get(&self, name: &str) -> Option<CacheEntry> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Consistent copy of the whole cache, stamped with the current time
    pub fn snapshot(&self) -> CacheSnapshot {
        self.snapshot_at(Utc::now())
    }

    /// Consistent copy of the whole cache, stamped with `taken_at`.
    ///
    /// Replay tools pass the log time so staleness follows the recording
    /// rather than the wall clock.
    pub fn snapshot_at(&self, taken_at: Timestamp) -> CacheSnapshot {
        let entries = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        CacheSnapshot { entries, taken_at }
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// Point-in-time copy of the cache handed to the validation engine
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheSnapshot {
    entries: HashMap<String, CacheEntry>,
    /// When the snapshot was taken
    pub taken_at: Timestamp,
}

impl CacheSnapshot {
    /// Build a snapshot directly, e.g. for evaluating recorded values
    pub fn from_entries(
        entries: impl IntoIterator<Item = (String, CacheEntry)>,
        taken_at: Timestamp,
    ) -> Self {
        Self {
            entries: entries.into_iter().collect(),
            taken_at,
        }
    }

    pub fn get(&self, name: &str) -> Option<&CacheEntry> {
        self.entries.get(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CacheEntry)> {
        self.entries.iter().map(|(name, entry)| (name.as_str(), entry))
    }
}
