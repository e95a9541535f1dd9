//! Exporter self-instrumentation.

pub mod metrics;

pub use metrics::{ExporterMetrics, InFlight};
