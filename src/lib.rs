//! # intake-rs
//!
//! In-memory event intake with idempotent acceptance and asynchronous,
//! drain-on-stop background processing.
//!
//! Provides an idempotency store, a bounded single-consumer processing
//! worker, the service that ties them together, and OpenTelemetry
//! observability.

pub mod config;
pub mod error;
pub mod model;
pub mod service;
pub mod store;
pub mod telemetry;
pub mod worker;
