//! Snapshot data model.
//!
//! Everything here is immutable once built: descriptors are created at
//! configuration time, snapshots once per scrape. Histogram values can only be
//! produced by [`crate::builder`], which keeps their bucket sequence valid.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::SystemTime;

use crate::error::{Result, RtMetricsError};

/// Metric type as exposed to scrapers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
}

impl MetricKind {
    /// Name used on `# TYPE` lines.
    pub fn as_str(self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
        }
    }
}

/// Returns whether `s` is a valid exposition metric name.
pub fn is_valid_metric_name(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == ':' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

/// Returns whether `s` is a valid label name.
pub fn is_valid_label_name(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Static description of one metric family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricDescriptor {
    name: String,
    help: String,
    kind: MetricKind,
    unit: Option<String>,
}

impl MetricDescriptor {
    /// Create a descriptor. Fails on an invalid metric name.
    pub fn new(name: impl Into<String>, help: impl Into<String>, kind: MetricKind) -> Result<Self> {
        let name = name.into();
        if !is_valid_metric_name(&name) {
            return Err(RtMetricsError::Config(format!("invalid metric name: {name:?}")));
        }
        Ok(Self {
            name,
            help: help.into(),
            kind,
            unit: None,
        })
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        let unit = unit.into();
        self.unit = if unit.is_empty() { None } else { Some(unit) };
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn help(&self) -> &str {
        &self.help
    }
    pub fn kind(&self) -> MetricKind {
        self.kind
    }
    pub fn unit(&self) -> Option<&str> {
        self.unit.as_deref()
    }
}

/// Label pairs of a sample, ordered by key. Keys are unique.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LabelSet(BTreeMap<String, String>);

impl LabelSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from pairs; a repeated or invalid key is a config error.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut set = Self::new();
        for (k, v) in pairs {
            set.insert(k, v)?;
        }
        Ok(set)
    }

    /// Insert one label. `__`-prefixed keys are reserved.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Result<()> {
        let key = key.into();
        if !is_valid_label_name(&key) || key.starts_with("__") {
            return Err(RtMetricsError::Config(format!("invalid label name: {key:?}")));
        }
        if self.0.contains_key(&key) {
            return Err(RtMetricsError::Config(format!("duplicate label: {key}")));
        }
        self.0.insert(key, value.into());
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Trace reference attached to a histogram bucket (OpenMetrics only).
#[derive(Debug, Clone, PartialEq)]
pub struct Exemplar {
    pub labels: LabelSet,
    pub value: f64,
    pub timestamp: Option<SystemTime>,
}

/// One cumulative histogram bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct Bucket {
    pub upper_bound: f64,
    pub cumulative_count: u64,
    pub exemplar: Option<Exemplar>,
}

/// Cumulative histogram. Bounds strictly increase and end at `+Inf`.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramValue {
    buckets: Vec<Bucket>,
    sum: f64,
    count: u64,
}

impl HistogramValue {
    pub(crate) fn from_validated(buckets: Vec<Bucket>, sum: f64) -> Self {
        let count = buckets.last().map(|b| b.cumulative_count).unwrap_or(0);
        Self { buckets, sum, count }
    }

    pub fn buckets(&self) -> &[Bucket] {
        &self.buckets
    }
    pub fn sum(&self) -> f64 {
        self.sum
    }
    pub fn count(&self) -> u64 {
        self.count
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SampleValue {
    Scalar(f64),
    Histogram(HistogramValue),
}

/// One exposed series: descriptor, labels and the current value.
#[derive(Debug, Clone)]
pub struct Sample {
    pub descriptor: Arc<MetricDescriptor>,
    pub labels: LabelSet,
    pub value: SampleValue,
}

impl Sample {
    pub fn scalar(descriptor: Arc<MetricDescriptor>, labels: LabelSet, value: f64) -> Self {
        Self {
            descriptor,
            labels,
            value: SampleValue::Scalar(value),
        }
    }

    pub fn histogram(
        descriptor: Arc<MetricDescriptor>,
        labels: LabelSet,
        value: HistogramValue,
    ) -> Self {
        Self {
            descriptor,
            labels,
            value: SampleValue::Histogram(value),
        }
    }

    pub fn name(&self) -> &str {
        self.descriptor.name()
    }

    /// Value shape agrees with the descriptor kind, and histogram series do
    /// not carry an `le` label.
    pub fn is_consistent(&self) -> bool {
        match (&self.value, self.descriptor.kind()) {
            (SampleValue::Histogram(_), MetricKind::Histogram) => !self.labels.contains_key("le"),
            (SampleValue::Scalar(_), MetricKind::Counter | MetricKind::Gauge) => true,
            _ => false,
        }
    }
}

/// Point-in-time set of samples produced by one collection.
#[derive(Debug, Clone)]
pub struct Snapshot {
    collection_timestamp: SystemTime,
    samples: Vec<Sample>,
}

impl Snapshot {
    /// Wrap samples, stamping the current wall-clock time.
    pub fn new(samples: Vec<Sample>) -> Self {
        Self {
            collection_timestamp: SystemTime::now(),
            samples,
        }
    }

    pub fn collection_timestamp(&self) -> SystemTime {
        self.collection_timestamp
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<Sample> {
        self.samples
    }

    /// Distinct metric names in first-appearance order.
    pub fn names(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for s in &self.samples {
            if !out.contains(&s.name()) {
                out.push(s.name());
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
