//! In-memory idempotency store.
//!
//! Single source of truth for every accepted event and its status. One
//! reader/writer lock guards the table: lookups share it, mutations take it
//! exclusively. Nothing is persisted; the table lives as long as the process.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;

use crate::model::{EventRecord, EventStatus};

type Table = HashMap<String, EventRecord>;

/// Store backend. Owns the event table.
#[derive(Debug, Default)]
pub struct Store {
    events: RwLock<Table>,
}

/// Handle for performing store operations inside one exclusive lock scope.
///
/// Everything done through a `TxContext` is observed by other callers as a
/// single step, so a check followed by an insert cannot interleave with
/// another caller's check.
pub struct TxContext<'a> {
    events: &'a mut Table,
}

impl TxContext<'_> {
    pub fn exists(&self, event_id: &str) -> bool {
        self.events.contains_key(event_id)
    }

    pub fn get_status(&self, event_id: &str) -> Option<EventStatus> {
        self.events.get(event_id).map(|r| r.status)
    }

    pub fn save(&mut self, record: EventRecord) {
        save_on(self.events, record)
    }

    pub fn mark_processed(&mut self, event_id: &str) -> bool {
        mark_processed_on(self.events, event_id)
    }
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` with the table locked exclusively for its whole duration.
    pub fn with_transaction<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&mut TxContext) -> T,
    {
        let mut guard = self.write();
        let mut ctx = TxContext {
            events: &mut guard,
        };
        f(&mut ctx)
    }

    /// True iff a record with this key has ever been saved.
    pub fn exists(&self, event_id: &str) -> bool {
        self.read().contains_key(event_id)
    }

    /// Insert `record` under its key, replacing whatever was there.
    ///
    /// Insert-once semantics are the caller's job: check and save inside a
    /// single [`Store::with_transaction`] scope.
    pub fn save(&self, record: EventRecord) {
        save_on(&mut self.write(), record)
    }

    /// Move a record to `processed`. Returns whether a transition happened;
    /// unknown keys and already-processed records are left alone.
    pub fn mark_processed(&self, event_id: &str) -> bool {
        mark_processed_on(&mut self.write(), event_id)
    }

    pub fn get_status(&self, event_id: &str) -> Option<EventStatus> {
        self.read().get(event_id).map(|r| r.status)
    }

    pub fn get(&self, event_id: &str) -> Option<EventRecord> {
        self.read().get(event_id).cloned()
    }

    /// Snapshot of every record. Order is unspecified.
    pub fn list(&self) -> Vec<EventRecord> {
        self.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    // A panicking holder cannot leave a half-written record behind (every
    // mutation is a single map operation), so a poisoned lock is still usable.
    fn read(&self) -> RwLockReadGuard<'_, Table> {
        self.events.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Table> {
        self.events.write().unwrap_or_else(PoisonError::into_inner)
    }
}

// ---------------------------------------------------------------------------
// Shared implementations
// ---------------------------------------------------------------------------

fn save_on(events: &mut Table, record: EventRecord) {
    events.insert(record.event_id.clone(), record);
}

fn mark_processed_on(events: &mut Table, event_id: &str) -> bool {
    match events.get_mut(event_id) {
        Some(record) if record.status.can_transition_to(EventStatus::Processed) => {
            record.status = EventStatus::Processed;
            record.processed_at = Some(Utc::now());
            true
        }
        _ => false,
    }
}
