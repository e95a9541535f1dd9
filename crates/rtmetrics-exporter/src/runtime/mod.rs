//! Host runtime counters: tokio scheduler state, process stats, and the
//! scheduling-latency probe.

pub mod probe;
pub mod process;
pub mod source;

pub use probe::SchedLatencyProbe;
pub use source::{HostRuntimeSource, SCHED_LATENCIES};
