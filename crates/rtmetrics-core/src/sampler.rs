//! Runtime sampler: raw counter reads from a runtime introspection source.
//!
//! Counter names follow the `/path/segments:unit` convention
//! (e.g. `/sched/latencies:seconds`). Sources are opaque; the sampler only
//! asks them for the counters a rule set selected.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use dashmap::DashMap;

use crate::model::Exemplar;

/// Shape of a raw counter value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawKind {
    Uint64,
    Float64,
    Float64Histogram,
}

/// What a runtime says about one of its counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterDescription {
    pub name: String,
    pub help: String,
    pub kind: RawKind,
    /// Monotonically increasing since process start.
    pub cumulative: bool,
    /// Reading it costs enough that it must be opted into explicitly.
    pub expensive: bool,
}

impl CounterDescription {
    pub fn new(name: impl Into<String>, help: impl Into<String>, kind: RawKind) -> Self {
        Self {
            name: name.into(),
            help: help.into(),
            kind,
            cumulative: false,
            expensive: false,
        }
    }

    pub fn cumulative(mut self) -> Self {
        self.cumulative = true;
        self
    }

    pub fn expensive(mut self) -> Self {
        self.expensive = true;
        self
    }
}

/// One raw (non-cumulative) histogram bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct RawBucket {
    pub upper_bound: f64,
    pub count: u64,
    pub exemplar: Option<Exemplar>,
}

impl RawBucket {
    pub fn new(upper_bound: f64, count: u64) -> Self {
        Self {
            upper_bound,
            count,
            exemplar: None,
        }
    }

    pub fn with_exemplar(mut self, exemplar: Exemplar) -> Self {
        self.exemplar = Some(exemplar);
        self
    }
}

/// Raw histogram as reported by a source. Buckets may be unsorted and may
/// repeat a bound; the snapshot builder normalizes them.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawHistogram {
    pub buckets: Vec<RawBucket>,
    pub sum: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Uint64(u64),
    Float64(f64),
    Histogram(RawHistogram),
}

impl RawValue {
    pub fn kind(&self) -> RawKind {
        match self {
            RawValue::Uint64(_) => RawKind::Uint64,
            RawValue::Float64(_) => RawKind::Float64,
            RawValue::Histogram(_) => RawKind::Float64Histogram,
        }
    }
}

/// A runtime's introspection interface.
pub trait RuntimeSource: Send + Sync {
    /// Every counter this source can report.
    fn descriptions(&self) -> Vec<CounterDescription>;

    /// Current value of one counter; `None` when unsupported right now.
    fn read(&self, name: &str) -> Option<RawValue>;
}

/// Reads selected counters from a source.
#[derive(Clone)]
pub struct RuntimeSampler {
    source: Arc<dyn RuntimeSource>,
}

impl RuntimeSampler {
    pub fn new(source: Arc<dyn RuntimeSource>) -> Self {
        Self { source }
    }

    /// Read exactly the `selected` counters. Unsupported ones are omitted.
    pub fn sample(&self, selected: &BTreeSet<String>) -> HashMap<String, RawValue> {
        let mut out = HashMap::with_capacity(selected.len());
        for name in selected {
            match self.source.read(name) {
                Some(v) => {
                    out.insert(name.clone(), v);
                }
                None => tracing::debug!(counter = %name, "counter not supported by runtime; omitted"),
            }
        }
        out
    }
}

/// Source whose counters are set by application code.
///
/// Descriptions are reported sorted by name so collections are reproducible.
#[derive(Default)]
pub struct InMemorySource {
    descriptions: DashMap<String, CounterDescription>,
    values: DashMap<String, RawValue>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a counter. Re-describing a name replaces the description.
    pub fn describe(&self, desc: CounterDescription) {
        self.descriptions.insert(desc.name.clone(), desc);
    }

    /// Set the current value of a counter (described or not).
    pub fn set(&self, name: &str, value: RawValue) {
        self.values.insert(name.to_string(), value);
    }

    /// Forget a counter's value; reads report it unsupported.
    pub fn clear(&self, name: &str) {
        self.values.remove(name);
    }
}

impl RuntimeSource for InMemorySource {
    fn descriptions(&self) -> Vec<CounterDescription> {
        let mut out: Vec<CounterDescription> =
            self.descriptions.iter().map(|e| e.value().clone()).collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    fn read(&self, name: &str) -> Option<RawValue> {
        self.values.get(name).map(|v| v.value().clone())
    }
}
