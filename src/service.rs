//! Intake service. The public API a boundary layer drives.
//!
//! The service owns the store and the worker and enforces the one invariant
//! that spans both: a given `event_id` is accepted at most once, and an
//! accepted event is visible in the store before the worker can see it.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use opentelemetry::KeyValue;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::config::WorkerConfig;
use crate::error::{Error, Result};
use crate::model::{EventRecord, EventStatus, HealthReport, ReadyReport};
use crate::store::Store;
use crate::telemetry::metrics;
use crate::worker::Worker;

/// What happened when an event was submitted.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitResult {
    /// New record stored and queued for processing.
    Accepted(Box<EventRecord>),
    /// The key was already known. Nothing was stored or queued.
    Conflict {
        event_id: String,
        status: EventStatus,
    },
}

impl SubmitResult {
    pub fn is_accepted(&self) -> bool {
        matches!(self, SubmitResult::Accepted(_))
    }
}

/// Owns all intake state for the life of the process.
pub struct IntakeService {
    store: Arc<Store>,
    worker: Worker,
    /// Submissions hold the read side across save + enqueue; shutdown takes
    /// the write side to wait them out before sealing the queue.
    accepting: RwLock<bool>,
    started_at: DateTime<Utc>,
    started: Instant,
}

impl IntakeService {
    pub fn new(config: WorkerConfig) -> Self {
        let store = Arc::new(Store::new());
        let worker = Worker::new(Arc::clone(&store), config);
        Self {
            store,
            worker,
            accepting: RwLock::new(false),
            started_at: Utc::now(),
            started: Instant::now(),
        }
    }

    /// Start the worker and open intake.
    ///
    /// After `shutdown_all` the worker cannot run again, so intake stays closed.
    pub async fn start_all(&self) {
        if !self.worker.start() {
            if !self.worker.is_running() {
                warn!("worker has been stopped, intake stays closed");
            }
            return;
        }
        *self.accepting.write().await = true;
        info!("intake open");
    }

    /// Close intake, wait for in-flight submissions, then drain the worker.
    pub async fn shutdown_all(&self) -> Result<()> {
        {
            let mut accepting = self.accepting.write().await;
            *accepting = false;
        }
        info!(pending = self.worker.pending(), "intake closed, draining worker");
        self.worker.stop().await
    }

    /// Accept `event_id` exactly once.
    ///
    /// Empty ids are rejected with [`Error::InvalidInput`]; a known id yields
    /// [`SubmitResult::Conflict`]. May wait while the work queue is full.
    pub async fn submit(
        &self,
        event_id: impl Into<String>,
        payload: serde_json::Value,
    ) -> Result<SubmitResult> {
        let event_id = event_id.into();
        if event_id.is_empty() {
            record_submission("invalid");
            return Err(Error::InvalidInput("event_id is required".to_string()));
        }

        let accepting = self.accepting.read().await;
        if !*accepting {
            record_submission("unavailable");
            return Err(Error::Unavailable);
        }

        // Room in the queue comes first: nothing is saved until the event is
        // certain to reach the worker, so a cancelled or failed wait leaves no trace.
        let slot = match self.worker.reserve().await {
            Ok(slot) => slot,
            Err(e) => {
                record_submission("unavailable");
                warn!(event_id = %event_id, "event could not be queued: {e}");
                return Err(e);
            }
        };

        let record = EventRecord::accepted(event_id, payload);

        // Check and insert under one exclusive lock scope. Dropping the slot
        // on conflict releases the room.
        let existing = self.store.with_transaction(|tx| {
            if let Some(status) = tx.get_status(&record.event_id) {
                return Some(status);
            }
            tx.save(record.clone());
            None
        });

        if let Some(status) = existing {
            drop(slot);
            record_submission("conflict");
            info!(event_id = %record.event_id, %status, "duplicate event rejected");
            return Ok(SubmitResult::Conflict {
                event_id: record.event_id,
                status,
            });
        }

        slot.send(&record);
        drop(accepting);

        record_submission("accepted");
        info!(event_id = %record.event_id, "event accepted");
        Ok(SubmitResult::Accepted(Box::new(record)))
    }

    pub fn get_status(&self, event_id: &str) -> Option<EventStatus> {
        self.store.get_status(event_id)
    }

    pub fn get(&self, event_id: &str) -> Option<EventRecord> {
        self.store.get(event_id)
    }

    /// Snapshot of every record. Order is unspecified.
    pub fn list_all(&self) -> Vec<EventRecord> {
        self.store.list()
    }

    pub fn is_ready(&self) -> bool {
        self.worker.is_running()
    }

    pub fn readiness(&self) -> ReadyReport {
        ReadyReport::from_ready(self.is_ready())
    }

    pub fn health(&self) -> HealthReport {
        HealthReport {
            status: "ok".to_string(),
            started_at: self.started_at,
            uptime: self.started.elapsed(),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }
}

fn record_submission(result: &'static str) {
    metrics::events_submitted().add(1, &[KeyValue::new("result", result)]);
}
