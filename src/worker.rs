//! Background processing worker.
//!
//! One long-lived task drains a bounded queue: for each event it waits the
//! configured delay, then marks the event processed in the store. Stopping
//! seals the queue and works through everything still buffered before the
//! task exits, so no accepted event is dropped on shutdown.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use opentelemetry::KeyValue;
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, warn};

use crate::config::WorkerConfig;
use crate::error::{Error, Result};
use crate::model::EventRecord;
use crate::store::Store;
use crate::telemetry::event::{record_status_transition, start_event_span};
use crate::telemetry::metrics;

/// A queued reference to an accepted event.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub event_id: String,
    enqueued_at: Instant,
}

impl WorkItem {
    pub fn new(event_id: impl Into<String>) -> Self {
        Self {
            event_id: event_id.into(),
            enqueued_at: Instant::now(),
        }
    }
}

/// Lifecycle of the processing task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Not started yet, or fully stopped.
    Stopped,
    /// Taking items off the queue as they arrive.
    Running,
    /// Shutdown observed; queue sealed, remaining items being processed.
    Draining,
}

impl WorkerState {
    fn as_u8(self) -> u8 {
        match self {
            WorkerState::Stopped => 0,
            WorkerState::Running => 1,
            WorkerState::Draining => 2,
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => WorkerState::Running,
            2 => WorkerState::Draining,
            _ => WorkerState::Stopped,
        }
    }
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WorkerState::Stopped => "stopped",
            WorkerState::Running => "running",
            WorkerState::Draining => "draining",
        };
        write!(f, "{s}")
    }
}

/// Room for one item in the queue, held until [`QueueSlot::send`].
pub struct QueueSlot<'a> {
    permit: mpsc::Permit<'a, WorkItem>,
    worker: &'a Worker,
}

impl QueueSlot<'_> {
    /// Queue `record`. Never waits; the room was taken by [`Worker::reserve`].
    pub fn send(self, record: &EventRecord) {
        self.permit.send(WorkItem::new(record.event_id.clone()));
        debug!(event_id = %record.event_id, pending = self.worker.pending(), "event queued");
    }
}

/// State shared between the handle and the spawned processing task.
struct Shared {
    store: Arc<Store>,
    processing_delay: Duration,
    state: AtomicU8,
    shutdown: Notify,
}

/// The processing worker. Owns the queue and the processing task.
pub struct Worker {
    sender: mpsc::Sender<WorkItem>,
    /// Present until the task is started (or an unstarted worker is stopped).
    receiver: Mutex<Option<mpsc::Receiver<WorkItem>>>,
    task: Mutex<Option<JoinHandle<()>>>,
    shared: Arc<Shared>,
}

impl Worker {
    /// Create a stopped worker feeding `store`.
    ///
    /// # Panics
    ///
    /// Panics if `config.queue_capacity` is zero.
    pub fn new(store: Arc<Store>, config: WorkerConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity);
        Self {
            sender,
            receiver: Mutex::new(Some(receiver)),
            task: Mutex::new(None),
            shared: Arc::new(Shared {
                store,
                processing_delay: config.processing_delay,
                state: AtomicU8::new(WorkerState::Stopped.as_u8()),
                shutdown: Notify::new(),
            }),
        }
    }

    /// Spawn the processing loop. Must be called from within a Tokio runtime.
    ///
    /// Returns `false` without doing anything if the loop was already started
    /// or the worker has been stopped; a stopped worker cannot be restarted.
    pub fn start(&self) -> bool {
        let Some(receiver) = lock(&self.receiver).take() else {
            warn!("worker already started or stopped, ignoring start");
            return false;
        };

        self.shared.set_state(WorkerState::Running);
        info!(
            processing_delay_ms = self.processing_delay().as_millis() as u64,
            queue_capacity = self.capacity(),
            "worker started"
        );

        let shared = Arc::clone(&self.shared);
        let handle = tokio::spawn(async move { shared.run(receiver).await });
        *lock(&self.task) = Some(handle);
        true
    }

    /// Signal the loop to exit and wait until every queued item is processed.
    ///
    /// On a worker that was never started the queue is drained inline.
    pub async fn stop(&self) -> Result<()> {
        let task = lock(&self.task).take();
        if let Some(handle) = task {
            info!(pending = self.pending(), "stopping worker");
            self.shared.shutdown.notify_one();
            if let Err(e) = handle.await {
                self.shared.set_state(WorkerState::Stopped);
                return Err(Error::Worker(format!("processing task failed: {e}")));
            }
            return Ok(());
        }

        let receiver = lock(&self.receiver).take();
        if let Some(receiver) = receiver {
            info!(pending = self.pending(), "stopping unstarted worker");
            self.shared.drain(receiver).await;
        }
        Ok(())
    }

    /// Queue an accepted event for processing.
    ///
    /// Waits while the queue is full. Fails with [`Error::QueueClosed`] once
    /// the worker has begun stopping.
    pub async fn enqueue(&self, record: &EventRecord) -> Result<()> {
        self.reserve().await?.send(record);
        Ok(())
    }

    /// Wait for room in the queue and hold it.
    ///
    /// Cancel-safe: dropping the future, or the returned slot, gives the room
    /// back without queueing anything.
    pub async fn reserve(&self) -> Result<QueueSlot<'_>> {
        let permit = self.sender.reserve().await.map_err(|_| Error::QueueClosed)?;
        Ok(QueueSlot {
            permit,
            worker: self,
        })
    }

    /// True from `start` until `stop` has finished draining.
    ///
    /// A draining worker still counts as running: `stop` only returns, and
    /// this only turns false, once every queued event is processed. Use
    /// [`Worker::state`] to tell `Running` from `Draining`.
    pub fn is_running(&self) -> bool {
        self.state() != WorkerState::Stopped
    }

    pub fn state(&self) -> WorkerState {
        self.shared.state()
    }

    /// Items buffered in the queue, counting room held by unsent slots.
    pub fn pending(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    pub fn capacity(&self) -> usize {
        self.sender.max_capacity()
    }

    pub fn processing_delay(&self) -> Duration {
        self.shared.processing_delay
    }
}

impl Shared {
    fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: WorkerState) {
        self.state.store(state.as_u8(), Ordering::SeqCst);
    }

    /// The processing loop: take items until shutdown is signalled, then drain.
    async fn run(&self, mut receiver: mpsc::Receiver<WorkItem>) {
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.notified() => {
                    info!("worker shutting down");
                    break;
                }
                item = receiver.recv() => match item {
                    Some(item) => self.process(item, "running").await,
                    // Every sender is gone: the owning Worker was dropped.
                    None => break,
                },
            }
        }

        self.drain(receiver).await;
    }

    /// Seal the queue and process whatever is still buffered.
    async fn drain(&self, mut receiver: mpsc::Receiver<WorkItem>) {
        self.set_state(WorkerState::Draining);
        receiver.close();

        let mut drained = 0usize;
        while let Some(item) = receiver.recv().await {
            self.process(item, "draining").await;
            drained += 1;
        }

        self.set_state(WorkerState::Stopped);
        info!(drained, "worker stopped");
    }

    async fn process(&self, item: WorkItem, phase: &'static str) {
        let span = start_event_span(&item.event_id);

        async {
            metrics::queue_wait_ms().record(millis(item.enqueued_at.elapsed()), &[]);
            let started = Instant::now();

            tokio::time::sleep(self.processing_delay).await;

            if self.store.mark_processed(&item.event_id) {
                record_status_transition(&span, "accepted", "processed");
                metrics::events_processed().add(1, &[KeyValue::new("phase", phase)]);
            } else {
                warn!(event_id = %item.event_id, "event unknown or already processed");
            }

            metrics::processing_duration_ms().record(millis(started.elapsed()), &[]);
        }
        .instrument(span.clone())
        .await
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}
