//! Scrape handler metrics, exposed through the same registry as runtime
//! counters.
//!
//! Labelled counters are backed by `DashMap` with keys flattened into sorted
//! `(name, value)` vectors. Samples are emitted in key order so repeated
//! scrapes list series identically.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use rtmetrics_core::error::Result;
use rtmetrics_core::model::{LabelSet, MetricDescriptor, MetricKind, Sample};
use rtmetrics_core::registry::Collector;

type LabelKey = Vec<(String, String)>;

fn label_key(labels: &[(&str, &str)]) -> LabelKey {
    let mut key: LabelKey = labels
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    key.sort();
    key
}

#[derive(Default)]
pub struct CounterVec {
    map: DashMap<LabelKey, AtomicU64>,
}

impl CounterVec {
    pub fn inc(&self, labels: &[(&str, &str)]) {
        self.add(labels, 1);
    }

    pub fn add(&self, labels: &[(&str, &str)], v: u64) {
        let counter = self
            .map
            .entry(label_key(labels))
            .or_insert_with(|| AtomicU64::new(0));
        counter.fetch_add(v, Ordering::Relaxed);
    }

    pub fn get(&self, labels: &[(&str, &str)]) -> u64 {
        self.map
            .get(&label_key(labels))
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    fn samples(&self, desc: &Arc<MetricDescriptor>) -> Result<Vec<Sample>> {
        let mut rows: Vec<(LabelKey, u64)> = self
            .map
            .iter()
            .map(|r| (r.key().clone(), r.value().load(Ordering::Relaxed)))
            .collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));

        rows.into_iter()
            .map(|(key, v)| {
                let labels = LabelSet::from_pairs(key)?;
                Ok(Sample::scalar(Arc::clone(desc), labels, v as f64))
            })
            .collect()
    }
}

/// Metrics about the exporter itself.
pub struct ExporterMetrics {
    version: String,
    scrape_requests: CounterVec,
    in_flight: AtomicI64,
    requests_desc: Arc<MetricDescriptor>,
    in_flight_desc: Arc<MetricDescriptor>,
    build_info_desc: Arc<MetricDescriptor>,
}

impl ExporterMetrics {
    pub fn new(version: impl Into<String>) -> Result<Self> {
        Ok(Self {
            version: version.into(),
            scrape_requests: CounterVec::default(),
            in_flight: AtomicI64::new(0),
            requests_desc: Arc::new(MetricDescriptor::new(
                "rtmetrics_scrape_requests_total",
                "Total number of scrapes by HTTP status code.",
                MetricKind::Counter,
            )?),
            in_flight_desc: Arc::new(MetricDescriptor::new(
                "rtmetrics_scrape_requests_in_flight",
                "Current number of scrapes being served.",
                MetricKind::Gauge,
            )?),
            build_info_desc: Arc::new(MetricDescriptor::new(
                "rtmetrics_build_info",
                "Build information; the value is always 1.",
                MetricKind::Gauge,
            )?),
        })
    }

    pub fn record_status(&self, code: u16) {
        let code = code.to_string();
        self.scrape_requests.inc(&[("code", code.as_str())]);
    }

    pub fn scrapes(&self, code: u16) -> u64 {
        let code = code.to_string();
        self.scrape_requests.get(&[("code", code.as_str())])
    }

    /// Marks a scrape as in flight until the guard drops.
    pub fn track_in_flight(&self) -> InFlight<'_> {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        InFlight { gauge: &self.in_flight }
    }

    pub fn in_flight(&self) -> i64 {
        self.in_flight.load(Ordering::Relaxed)
    }
}

pub struct InFlight<'a> {
    gauge: &'a AtomicI64,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.gauge.fetch_sub(1, Ordering::Relaxed);
    }
}

impl Collector for ExporterMetrics {
    fn name(&self) -> &str {
        "exporter"
    }

    fn describe(&self) -> Vec<Arc<MetricDescriptor>> {
        vec![
            Arc::clone(&self.requests_desc),
            Arc::clone(&self.in_flight_desc),
            Arc::clone(&self.build_info_desc),
        ]
    }

    fn collect(&self) -> Result<Vec<Sample>> {
        let mut out = self.scrape_requests.samples(&self.requests_desc)?;
        out.push(Sample::scalar(
            Arc::clone(&self.in_flight_desc),
            LabelSet::new(),
            self.in_flight() as f64,
        ));
        out.push(Sample::scalar(
            Arc::clone(&self.build_info_desc),
            LabelSet::from_pairs([("version", self.version.as_str())])?,
            1.0,
        ));
        Ok(out)
    }
}
