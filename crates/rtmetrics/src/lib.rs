//! Top-level facade crate for rtmetrics.
//!
//! Re-exports the collection core and the HTTP exporter so users can depend on a single crate.

pub mod core {
    pub use rtmetrics_core::*;
}

pub mod exporter {
    pub use rtmetrics_exporter::*;
}
