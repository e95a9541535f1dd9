//! rtmetrics core: runtime counter selection, sampling, snapshotting and
//! text exposition.
//!
//! This crate carries no transport or async runtime dependencies. The exporter
//! crate plugs a concrete runtime source and an HTTP surface on top of it.
//!
//! ```text
//! Registry::collect()
//!   └── for each Collector (registration order)
//!         RuntimeCollector: RuleSet (selection, fixed at construction)
//!                           → RuntimeSampler::sample()
//!                           → SnapshotBuilder::build()
//!   → merged Snapshot → expo::encode(Format)
//! ```
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here. All fallible paths
//! surface as `RtMetricsError`/`Result` so a bad counter or a misbehaving
//! collector never takes the exporting process down.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod builder;
pub mod error;
pub mod expo;
pub mod model;
pub mod registry;
pub mod rules;
pub mod sampler;

/// Shared result type.
pub use error::{ErrorCode, Result, RtMetricsError};
pub use model::{MetricDescriptor, MetricKind, Sample, SampleValue, Snapshot};
pub use registry::{Collector, CollectorId, Registry, RuntimeCollector};
