//! Snapshot builder: raw counter values → typed, immutable samples.
//!
//! Naming: `/gc/heap/allocs:bytes` under namespace `rt` becomes
//! `rt_gc_heap_allocs_bytes`. Cumulative scalars are counters and gain a
//! `_total` suffix. Sub-second time units are converted to seconds.
//!
//! A metric whose raw data cannot be turned into a valid sample is dropped with
//! a warning; the rest of the snapshot is unaffected.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::{Result, RtMetricsError};
use crate::model::{
    Bucket, Exemplar, HistogramValue, LabelSet, MetricDescriptor, MetricKind, Sample, Snapshot,
};
use crate::sampler::{CounterDescription, RawHistogram, RawKind, RawValue};

/// Unit rewrites applied while building: (raw unit, exposed unit, scale).
const UNIT_CONVERSIONS: [(&str, &str, f64); 3] = [
    ("nanoseconds", "seconds", 1e-9),
    ("microseconds", "seconds", 1e-6),
    ("milliseconds", "seconds", 1e-3),
];

/// How one runtime counter maps onto an exposed metric.
#[derive(Debug, Clone)]
pub struct Conversion {
    runtime_name: String,
    descriptor: Arc<MetricDescriptor>,
    scale: f64,
}

impl Conversion {
    /// Derive the exposed descriptor for a runtime counter.
    pub fn from_description(desc: &CounterDescription, namespace: &str) -> Result<Self> {
        let (path, raw_unit) = desc.name.split_once(':').ok_or_else(|| {
            RtMetricsError::Config(format!(
                "runtime counter {:?} has no unit (expected /path:unit)",
                desc.name
            ))
        })?;

        let (unit, scale) = UNIT_CONVERSIONS
            .iter()
            .find(|(from, _, _)| *from == raw_unit)
            .map(|(_, to, scale)| (*to, *scale))
            .unwrap_or((raw_unit, 1.0));

        let mut parts: Vec<String> = Vec::with_capacity(3);
        if !namespace.is_empty() {
            parts.push(sanitize(namespace));
        }
        let path = sanitize(path.trim_start_matches('/'));
        if path.is_empty() {
            return Err(RtMetricsError::Config(format!(
                "runtime counter {:?} has an empty path",
                desc.name
            )));
        }
        parts.push(path);
        let unit = sanitize(unit);
        if !unit.is_empty() {
            parts.push(unit.clone());
        }

        let mut name = parts.join("_");
        let kind = match (desc.kind, desc.cumulative) {
            (RawKind::Float64Histogram, _) => MetricKind::Histogram,
            (_, true) => {
                name.push_str("_total");
                MetricKind::Counter
            }
            (_, false) => MetricKind::Gauge,
        };

        let help = if desc.help.is_empty() {
            format!("Runtime counter {}.", desc.name)
        } else {
            desc.help.clone()
        };
        let descriptor = MetricDescriptor::new(name, help, kind)?.with_unit(unit);

        Ok(Self {
            runtime_name: desc.name.clone(),
            descriptor: Arc::new(descriptor),
            scale,
        })
    }

    pub fn runtime_name(&self) -> &str {
        &self.runtime_name
    }
    pub fn descriptor(&self) -> &Arc<MetricDescriptor> {
        &self.descriptor
    }
    pub fn scale(&self) -> f64 {
        self.scale
    }
}

fn sanitize(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// Turns sampler output into a snapshot.
#[derive(Debug, Clone, Default)]
pub struct SnapshotBuilder {
    const_labels: LabelSet,
}

impl SnapshotBuilder {
    /// `const_labels` are attached to every produced sample.
    pub fn new(const_labels: LabelSet) -> Self {
        Self { const_labels }
    }

    /// One sample per conversion present in `raw`, in conversion order.
    pub fn build(&self, raw: &HashMap<String, RawValue>, conversions: &[Conversion]) -> Snapshot {
        let mut samples = Vec::with_capacity(conversions.len());
        let mut seen: HashSet<&str> = HashSet::with_capacity(conversions.len());

        for conv in conversions {
            let Some(value) = raw.get(conv.runtime_name()) else { continue };
            let name = conv.descriptor().name();

            if !seen.insert(name) {
                tracing::warn!(metric = %name, counter = %conv.runtime_name(), "duplicate metric name; sample dropped");
                continue;
            }

            match self.convert(conv, value) {
                Ok(sample) => samples.push(sample),
                Err(e) => {
                    tracing::warn!(metric = %name, code = e.code().as_str(), error = %e, "sample dropped");
                }
            }
        }

        Snapshot::new(samples)
    }

    fn convert(&self, conv: &Conversion, value: &RawValue) -> Result<Sample> {
        let desc = Arc::clone(conv.descriptor());
        let name = desc.name().to_string();
        let labels = self.const_labels.clone();

        match (desc.kind(), value) {
            (MetricKind::Counter | MetricKind::Gauge, RawValue::Uint64(n)) => {
                Ok(Sample::scalar(desc, labels, *n as f64 * conv.scale))
            }
            (MetricKind::Counter, RawValue::Float64(f)) if f.is_nan() || *f < 0.0 => Err(
                RtMetricsError::dropped(&name, format!("counter value {f} is not a non-negative number")),
            ),
            (MetricKind::Counter | MetricKind::Gauge, RawValue::Float64(f)) => {
                Ok(Sample::scalar(desc, labels, *f * conv.scale))
            }
            (MetricKind::Histogram, RawValue::Histogram(h)) => {
                let hist = build_histogram(&name, h, conv.scale)?;
                Ok(Sample::histogram(desc, labels, hist))
            }
            (kind, v) => Err(RtMetricsError::dropped(
                &name,
                format!("raw {:?} value does not fit a {} metric", v.kind(), kind.as_str()),
            )),
        }
    }
}

/// Normalize a raw histogram into a cumulative one.
///
/// Buckets are sorted by bound, buckets sharing a bound are merged, counts are
/// accumulated, and a `+Inf` bucket is appended when missing. `scale` is applied
/// to bounds, the sum and exemplar values.
pub fn build_histogram(metric: &str, raw: &RawHistogram, scale: f64) -> Result<HistogramValue> {
    let mut buckets: Vec<(f64, u64, Option<Exemplar>)> = Vec::with_capacity(raw.buckets.len() + 1);
    for b in &raw.buckets {
        let bound = b.upper_bound * scale;
        if bound.is_nan() || bound == f64::NEG_INFINITY {
            return Err(RtMetricsError::dropped(
                metric,
                format!("bucket bound {} is not a valid upper bound", b.upper_bound),
            ));
        }
        let exemplar = b.exemplar.clone().map(|mut e| {
            e.value *= scale;
            e
        });
        buckets.push((bound, b.count, exemplar));
    }
    buckets.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut merged: Vec<(f64, u64, Option<Exemplar>)> = Vec::with_capacity(buckets.len() + 1);
    for (bound, count, exemplar) in buckets {
        match merged.last_mut() {
            Some(last) if last.0 == bound => {
                last.1 = last.1.checked_add(count).ok_or_else(|| {
                    RtMetricsError::dropped(metric, "bucket count overflow")
                })?;
                last.2 = pick_exemplar(last.2.take(), exemplar);
            }
            _ => merged.push((bound, count, exemplar)),
        }
    }

    let mut running: u64 = 0;
    let mut out = Vec::with_capacity(merged.len() + 1);
    for (bound, count, exemplar) in &merged {
        running = running
            .checked_add(*count)
            .ok_or_else(|| RtMetricsError::dropped(metric, "cumulative count overflow"))?;
        out.push(Bucket {
            upper_bound: *bound,
            cumulative_count: running,
            exemplar: exemplar.clone(),
        });
    }
    if out.last().map(|b| b.upper_bound) != Some(f64::INFINITY) {
        out.push(Bucket {
            upper_bound: f64::INFINITY,
            cumulative_count: running,
            exemplar: None,
        });
    }

    let sum = match raw.sum {
        Some(s) => {
            let s = s * scale;
            if !s.is_finite() {
                return Err(RtMetricsError::dropped(metric, format!("histogram sum {s} is not finite")));
            }
            s
        }
        None => estimate_sum(&merged),
    };

    Ok(HistogramValue::from_validated(out, sum))
}

fn pick_exemplar(a: Option<Exemplar>, b: Option<Exemplar>) -> Option<Exemplar> {
    match (a, b) {
        (Some(a), Some(b)) => Some(if b.value > a.value { b } else { a }),
        (a, b) => a.or(b),
    }
}

// Sources that cannot report a sum (bucketed runtime histograms) get one
// estimated from bucket bounds; the overflow bucket counts at its lower edge.
fn estimate_sum(merged: &[(f64, u64, Option<Exemplar>)]) -> f64 {
    let mut sum = 0.0;
    let mut lower = 0.0;
    for (bound, count, _) in merged {
        let at = if bound.is_finite() { *bound } else { lower };
        sum += at * *count as f64;
        if bound.is_finite() {
            lower = *bound;
        }
    }
    sum
}
