//! Event processing span helpers.
//!
//! Provides span creation and status-transition recording for events
//! flowing through the worker.

use tracing::Span;

/// Start a span for processing one event.
///
/// The `event.status` field is declared empty and can be updated via
/// [`record_status_transition`].
pub fn start_event_span(event_id: &str) -> Span {
    tracing::info_span!(
        "event.process",
        "event.id" = event_id,
        "event.status" = tracing::field::Empty,
    )
}

/// Record a status transition on the given span.
///
/// Emits a tracing `info` event scoped to the span and stamps the new
/// status on its `event.status` field.
pub fn record_status_transition(span: &Span, from: &str, to: &str) {
    span.record("event.status", to);
    span.in_scope(|| {
        tracing::info!(from = from, to = to, "status_transition");
    });
}
