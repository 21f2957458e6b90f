//! Core data model.
//!
//! An event record is something a client asked us to process. It has identity
//! (the caller-supplied `event_id`), an opaque payload, and a processing status.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Event Record
// ---------------------------------------------------------------------------

/// An accepted event tracked by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Caller-supplied idempotency key. Never empty, never reassigned.
    pub event_id: String,

    /// Arbitrary payload. Stored verbatim; nothing here interprets it.
    pub payload: serde_json::Value,

    /// Current processing status.
    pub status: EventStatus,

    pub accepted_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
}

impl EventRecord {
    /// A freshly accepted record, stamped now.
    pub fn accepted(event_id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            event_id: event_id.into(),
            payload,
            status: EventStatus::Accepted,
            accepted_at: Utc::now(),
            processed_at: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Processing status of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    /// Recorded and queued, not yet processed.
    Accepted,
    /// Worker finished with it. Terminal.
    Processed,
}

impl EventStatus {
    /// Can transition from self to `to`?
    pub fn can_transition_to(self, to: EventStatus) -> bool {
        matches!((self, to), (EventStatus::Accepted, EventStatus::Processed))
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, EventStatus::Processed)
    }
}

impl std::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EventStatus::Accepted => "accepted",
            EventStatus::Processed => "processed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for EventStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accepted" => Ok(EventStatus::Accepted),
            "processed" => Ok(EventStatus::Processed),
            other => Err(format!("unknown event status: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Boundary shapes
// ---------------------------------------------------------------------------

/// Inbound submission as a boundary layer decodes it.
#[derive(Debug, Clone, Deserialize)]
pub struct EventRequest {
    #[serde(default)]
    pub event_id: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Liveness report. Never touches the store.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub uptime: Duration,
}

/// Readiness report, derived from the worker's run state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReadyReport {
    pub status: String,
    pub ready: bool,
}

impl ReadyReport {
    pub fn from_ready(ready: bool) -> Self {
        Self {
            status: if ready { "ready" } else { "not ready" }.to_string(),
            ready,
        }
    }
}
