//! `RuntimeSource` over the hosting tokio runtime and the current process.

use std::sync::Arc;
use std::time::Instant;

use rtmetrics_core::error::{Result, RtMetricsError};
use rtmetrics_core::sampler::{CounterDescription, RawKind, RawValue, RuntimeSource};
use tokio::runtime::Handle;

use super::probe::SchedLatencyProbe;
use super::process;

pub const SCHED_WORKERS: &str = "/sched/workers:threads";
pub const SCHED_TASKS: &str = "/sched/tasks:tasks";
pub const SCHED_GLOBAL_QUEUE: &str = "/sched/queue/global:tasks";
pub const SCHED_LATENCIES: &str = "/sched/latencies:seconds";
pub const PROCESS_UPTIME: &str = "/process/uptime:nanoseconds";
pub const PROCESS_THREADS: &str = "/process/threads:threads";
pub const PROCESS_OPEN_FDS: &str = "/process/open-fds:fds";
pub const PROCESS_RESIDENT: &str = "/process/resident:bytes";

pub struct HostRuntimeSource {
    handle: Handle,
    started: Instant,
    probe: Arc<SchedLatencyProbe>,
}

impl HostRuntimeSource {
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            started: Instant::now(),
            probe: Arc::new(SchedLatencyProbe::new()),
        }
    }

    /// Source bound to the runtime this is called from.
    pub fn current() -> Result<Self> {
        let handle = Handle::try_current()
            .map_err(|e| RtMetricsError::Internal(format!("no tokio runtime: {e}")))?;
        Ok(Self::new(handle))
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Probe backing `/sched/latencies:seconds`. Nothing feeds it until
    /// [`SchedLatencyProbe::spawn`] is called.
    pub fn probe(&self) -> Arc<SchedLatencyProbe> {
        Arc::clone(&self.probe)
    }
}

impl RuntimeSource for HostRuntimeSource {
    fn descriptions(&self) -> Vec<CounterDescription> {
        vec![
            CounterDescription::new(SCHED_WORKERS, "Number of runtime worker threads.", RawKind::Uint64),
            CounterDescription::new(SCHED_TASKS, "Number of alive tasks in the runtime.", RawKind::Uint64),
            CounterDescription::new(
                SCHED_GLOBAL_QUEUE,
                "Number of tasks waiting in the runtime's global queue.",
                RawKind::Uint64,
            ),
            CounterDescription::new(
                SCHED_LATENCIES,
                "Distribution of the time tasks spend runnable before their first poll.",
                RawKind::Float64Histogram,
            )
            .expensive(),
            CounterDescription::new(PROCESS_UPTIME, "Time since the exporter started.", RawKind::Uint64),
            CounterDescription::new(PROCESS_THREADS, "Number of OS threads in the process.", RawKind::Uint64),
            CounterDescription::new(PROCESS_OPEN_FDS, "Number of open file descriptors.", RawKind::Uint64),
            CounterDescription::new(PROCESS_RESIDENT, "Resident set size of the process.", RawKind::Uint64),
        ]
    }

    fn read(&self, name: &str) -> Option<RawValue> {
        let metrics = self.handle.metrics();
        let v = match name {
            SCHED_WORKERS => RawValue::Uint64(metrics.num_workers() as u64),
            SCHED_TASKS => RawValue::Uint64(metrics.num_alive_tasks() as u64),
            SCHED_GLOBAL_QUEUE => RawValue::Uint64(metrics.global_queue_depth() as u64),
            SCHED_LATENCIES => RawValue::Histogram(self.probe.snapshot()),
            PROCESS_UPTIME => {
                let nanos = self.started.elapsed().as_nanos();
                RawValue::Uint64(u64::try_from(nanos).unwrap_or(u64::MAX))
            }
            PROCESS_THREADS => RawValue::Uint64(process::thread_count()?),
            PROCESS_OPEN_FDS => RawValue::Uint64(process::open_fds()?),
            PROCESS_RESIDENT => RawValue::Uint64(process::resident_bytes()?),
            _ => return None,
        };
        Some(v)
    }
}
