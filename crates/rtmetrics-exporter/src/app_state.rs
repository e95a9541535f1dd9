//! Shared application state for the exporter.
//!
//! Builds the registry at startup: the host runtime collector (selection fixed
//! by the configured rules) plus the exporter's own metrics. Startup errors are
//! returned, never panicked.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio::task::AbortHandle;

use rtmetrics_core::error::Result;
use rtmetrics_core::registry::{Collector, Registry, RuntimeCollector, RuntimeCollectorOptions};

use crate::config::ExporterConfig;
use crate::obs::ExporterMetrics;
use crate::runtime::{HostRuntimeSource, SCHED_LATENCIES};

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    cfg: ExporterConfig,
    registry: Arc<Registry>,
    metrics: Arc<ExporterMetrics>,
    limiter: Option<Arc<Semaphore>>,
    probe: Option<AbortHandle>,
}

impl AppState {
    /// Must be called from within a tokio runtime.
    pub fn new(cfg: ExporterConfig) -> Result<Self> {
        Self::with_registry(cfg, Registry::new())
    }

    /// Like [`AppState::new`], serving `registry` with the runtime and
    /// exporter collectors added after any collectors already on it. Nothing
    /// is started when a registration fails.
    pub fn with_registry(cfg: ExporterConfig, registry: Registry) -> Result<Self> {
        let source = HostRuntimeSource::current()?;
        let handle = source.handle().clone();
        let probe = source.probe();

        let collector = RuntimeCollector::new(
            Arc::new(source),
            RuntimeCollectorOptions {
                namespace: cfg.runtime.namespace.clone(),
                rules: cfg.runtime.rule_set()?,
                const_labels: cfg.runtime.const_label_set()?,
            },
        )?;

        let probe_wanted = collector.is_selected(SCHED_LATENCIES);

        let metrics = Arc::new(ExporterMetrics::new(env!("CARGO_PKG_VERSION"))?);

        let registry = Arc::new(registry);
        registry.register(Arc::new(collector))?;
        let self_metrics: Arc<dyn Collector> = Arc::clone(&metrics) as Arc<dyn Collector>;
        registry.register(self_metrics)?;

        // The probe only runs when its counter was explicitly selected.
        let probe_task = if probe_wanted {
            let interval = Duration::from_millis(cfg.runtime.probe_interval_ms);
            tracing::info!(interval_ms = cfg.runtime.probe_interval_ms, "scheduling-latency probe enabled");
            Some(probe.spawn(&handle, interval).abort_handle())
        } else {
            None
        };

        let limiter = match cfg.exporter.max_requests_in_flight {
            0 => None,
            n => Some(Arc::new(Semaphore::new(n))),
        };

        Ok(Self {
            inner: Arc::new(AppStateInner {
                cfg,
                registry,
                metrics,
                limiter,
                probe: probe_task,
            }),
        })
    }

    pub fn cfg(&self) -> &ExporterConfig {
        &self.inner.cfg
    }

    /// Registry served by the scrape endpoint. Applications may register
    /// additional collectors on it.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.inner.registry
    }

    pub fn metrics(&self) -> &ExporterMetrics {
        &self.inner.metrics
    }

    /// `Ok(None)` when scrapes are unlimited.
    pub fn scrape_permit(&self) -> std::result::Result<Option<OwnedSemaphorePermit>, TryAcquireError> {
        match &self.inner.limiter {
            None => Ok(None),
            Some(sem) => Arc::clone(sem).try_acquire_owned().map(Some),
        }
    }

    pub fn probe_running(&self) -> bool {
        self.inner.probe.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop background tasks. Called once the server has shut down.
    pub fn shutdown(&self) {
        if let Some(probe) = &self.inner.probe {
            probe.abort();
        }
    }
}
