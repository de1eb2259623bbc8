//! # Run Guards
//!
//! In-process serialization for work that must not overlap.
//!
//! ```text
//! RunGuards     one async mutex per entity class
//!               execute / push runs and single-record pushes of the same
//!               class queue behind each other; different classes run
//!               side by side
//!
//! EntryLocks    one async mutex per sync log id
//!               a second retry of an entry that is still being replayed
//!               is refused instead of queued
//! ```
//!
//! Cross-process exclusion for retries comes from the conditional claim in
//! the sync log; the natural-key UNIQUE constraints back up the run guard.

use autocount_core::EntityKind;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

/// One lock per entity class.
#[derive(Debug)]
pub struct RunGuards {
    locks: HashMap<EntityKind, Arc<Mutex<()>>>,
}

impl RunGuards {
    pub fn new() -> Self {
        let locks = EntityKind::ALL
            .into_iter()
            .map(|kind| (kind, Arc::new(Mutex::new(()))))
            .collect();
        RunGuards { locks }
    }

    /// Waits for the class's lock.
    pub async fn acquire(&self, kind: EntityKind) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| Arc::new(Mutex::new(())));

        if lock.try_lock().is_err() {
            debug!(entity = %kind, "Waiting for running sync of the same entity class");
        }
        lock.lock_owned().await
    }
}

impl Default for RunGuards {
    fn default() -> Self {
        Self::new()
    }
}

/// One lock per sync log entry.
#[derive(Debug, Default)]
pub struct EntryLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl EntryLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the entry's lock, or `None` if someone holds it.
    pub async fn try_acquire(&self, log_id: &str) -> Option<OwnedMutexGuard<()>> {
        let lock = {
            let mut locks = self.locks.lock().await;
            // Forget locks nobody is holding or waiting on.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks
                .entry(log_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.try_lock_owned().ok()
    }
}
