//! Metric instrument factories for intake-rs.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"intake-rs"` meter.

use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for intake-rs instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("intake-rs")
}

/// Counter: submissions seen at the intake boundary.
/// Labels: `result` ("accepted" | "conflict" | "invalid" | "unavailable").
pub fn events_submitted() -> Counter<u64> {
    meter()
        .u64_counter("intake.events.submitted")
        .with_description("Number of event submissions by outcome")
        .build()
}

/// Counter: events moved to `processed`.
/// Labels: `phase` ("running" | "draining").
pub fn events_processed() -> Counter<u64> {
    meter()
        .u64_counter("intake.events.processed")
        .with_description("Number of events processed by the worker")
        .build()
}

/// Histogram: time spent processing one event, in milliseconds.
pub fn processing_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("intake.event.processing_ms")
        .with_description("Per-event processing duration in milliseconds")
        .with_unit("ms")
        .build()
}

/// Histogram: time an event sat in the queue before the worker took it.
pub fn queue_wait_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("intake.event.queue_wait_ms")
        .with_description("Time between enqueue and dequeue in milliseconds")
        .with_unit("ms")
        .build()
}
