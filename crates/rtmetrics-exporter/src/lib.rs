//! rtmetrics HTTP exporter.
//!
//! Wires the host runtime source, the scheduling-latency probe and the
//! exporter's own metrics into a registry and serves it over axum. Consumed by
//! the binary (`main.rs`) and by integration tests.

pub mod app_state;
pub mod config;
pub mod obs;
pub mod ops;
pub mod router;
pub mod runtime;
