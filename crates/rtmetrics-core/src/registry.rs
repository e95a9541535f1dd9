//! Collector registry.
//!
//! Collectors are held in a copy-on-write list: `collect` clones the current
//! `Arc` under a short read lock and works on that, so registrations never wait
//! for in-flight collections and a collection never sees a half-registered
//! collector.
//!
//! A collector whose `describe` is empty is *unchecked*: it skips
//! registration-time name checks and its samples are only validated at
//! collection time.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::builder::{Conversion, SnapshotBuilder};
use crate::error::{Result, RtMetricsError};
use crate::model::{LabelSet, MetricDescriptor, Sample, Snapshot};
use crate::rules::RuleSet;
use crate::sampler::{RuntimeSampler, RuntimeSource};

/// Anything that contributes samples to a snapshot.
pub trait Collector: Send + Sync {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    /// Every descriptor this collector may produce. Empty means unchecked.
    fn describe(&self) -> Vec<Arc<MetricDescriptor>>;

    /// Current samples.
    fn collect(&self) -> Result<Vec<Sample>>;
}

/// Options for [`RuntimeCollector`].
#[derive(Debug, Clone)]
pub struct RuntimeCollectorOptions {
    pub namespace: String,
    pub rules: RuleSet,
    pub const_labels: LabelSet,
}

/// Collector over a runtime source. Counter selection is fixed at construction:
/// counters the rules do not select are never read.
pub struct RuntimeCollector {
    name: String,
    sampler: RuntimeSampler,
    selected: BTreeSet<String>,
    conversions: Vec<Conversion>,
    builder: SnapshotBuilder,
}

impl RuntimeCollector {
    pub fn new(source: Arc<dyn RuntimeSource>, opts: RuntimeCollectorOptions) -> Result<Self> {
        if opts.const_labels.contains_key("le") {
            return Err(RtMetricsError::Config(
                "const label \"le\" is reserved for histogram buckets".into(),
            ));
        }

        let descs = source.descriptions();
        let mut conversions = Vec::new();
        let mut names = HashSet::new();
        for desc in descs.iter().filter(|d| opts.rules.selects(d)) {
            match Conversion::from_description(desc, &opts.namespace) {
                Ok(conv) => {
                    if !names.insert(conv.descriptor().name().to_string()) {
                        tracing::warn!(counter = %desc.name, metric = %conv.descriptor().name(), "runtime counter maps onto an already exposed name; skipped");
                        continue;
                    }
                    conversions.push(conv);
                }
                Err(e) => {
                    tracing::warn!(counter = %desc.name, error = %e, "runtime counter cannot be exposed; skipped");
                }
            }
        }

        let selected: BTreeSet<String> = conversions
            .iter()
            .map(|c| c.runtime_name().to_string())
            .collect();

        tracing::info!(
            available = descs.len(),
            selected = selected.len(),
            namespace = %opts.namespace,
            "runtime collector configured"
        );

        Ok(Self {
            name: "runtime".to_string(),
            sampler: RuntimeSampler::new(source),
            selected,
            conversions,
            builder: SnapshotBuilder::new(opts.const_labels),
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Whether a runtime counter is part of this collector's selection.
    pub fn is_selected(&self, counter: &str) -> bool {
        self.selected.contains(counter)
    }

    pub fn selected(&self) -> &BTreeSet<String> {
        &self.selected
    }
}

impl Collector for RuntimeCollector {
    fn name(&self) -> &str {
        &self.name
    }

    fn describe(&self) -> Vec<Arc<MetricDescriptor>> {
        self.conversions
            .iter()
            .map(|c| Arc::clone(c.descriptor()))
            .collect()
    }

    fn collect(&self) -> Result<Vec<Sample>> {
        let raw = self.sampler.sample(&self.selected);
        Ok(self.builder.build(&raw, &self.conversions).into_samples())
    }
}

/// Handle returned by [`Registry::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CollectorId(u64);

struct Entry {
    id: CollectorId,
    collector: Arc<dyn Collector>,
    descriptors: Vec<Arc<MetricDescriptor>>,
    by_name: HashMap<String, Arc<MetricDescriptor>>,
}

impl Entry {
    fn is_checked(&self) -> bool {
        !self.descriptors.is_empty()
    }
}

/// Set of registered collectors. Construct once, share via `Arc`.
#[derive(Default)]
pub struct Registry {
    entries: RwLock<Arc<Vec<Arc<Entry>>>>,
    next_id: AtomicU64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a collector. Fails with `Collision` when one of its names is
    /// already registered (or repeated in its own description); the registry
    /// is left unchanged in that case.
    pub fn register(&self, collector: Arc<dyn Collector>) -> Result<CollectorId> {
        let descriptors = collector.describe();
        let mut by_name = HashMap::with_capacity(descriptors.len());
        for d in &descriptors {
            if by_name.insert(d.name().to_string(), Arc::clone(d)).is_some() {
                return Err(RtMetricsError::Collision { name: d.name().to_string() });
            }
        }

        let mut guard = self
            .entries
            .write()
            .map_err(|_| RtMetricsError::Internal("registry lock poisoned".into()))?;

        for entry in guard.iter() {
            if let Some(name) = descriptors
                .iter()
                .map(|d| d.name())
                .find(|n| entry.by_name.contains_key(*n))
            {
                tracing::warn!(collector = %collector.name(), metric = %name, owner = %entry.collector.name(), "registration rejected: metric name collision");
                return Err(RtMetricsError::Collision { name: name.to_string() });
            }
        }

        let id = CollectorId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut next: Vec<Arc<Entry>> = guard.iter().cloned().collect();
        next.push(Arc::new(Entry {
            id,
            collector: Arc::clone(&collector),
            descriptors,
            by_name,
        }));
        *guard = Arc::new(next);

        tracing::debug!(collector = %collector.name(), id = id.0, "collector registered");
        Ok(id)
    }

    /// Remove a collector. Returns whether it was registered.
    pub fn unregister(&self, id: CollectorId) -> Result<bool> {
        let mut guard = self
            .entries
            .write()
            .map_err(|_| RtMetricsError::Internal("registry lock poisoned".into()))?;
        if !guard.iter().any(|e| e.id == id) {
            return Ok(false);
        }
        let next: Vec<Arc<Entry>> = guard.iter().filter(|e| e.id != id).cloned().collect();
        *guard = Arc::new(next);
        Ok(true)
    }

    fn current(&self) -> Result<Arc<Vec<Arc<Entry>>>> {
        let guard = self
            .entries
            .read()
            .map_err(|_| RtMetricsError::Internal("registry lock poisoned".into()))?;
        Ok(Arc::clone(&guard))
    }

    /// Number of registered collectors.
    pub fn len(&self) -> Result<usize> {
        Ok(self.current()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Registered descriptors, in registration order.
    pub fn descriptors(&self) -> Result<Vec<Arc<MetricDescriptor>>> {
        Ok(self
            .current()?
            .iter()
            .flat_map(|e| e.descriptors.iter().cloned())
            .collect())
    }

    /// Collect from every registered collector and merge into one snapshot.
    ///
    /// Samples keep registration order; within a collector they are grouped by
    /// metric name in first-appearance order. Any collector error, undescribed
    /// or inconsistent sample, duplicate series or cross-collector name clash
    /// fails the whole collection.
    pub fn collect(&self) -> Result<Snapshot> {
        let entries = self.current()?;

        // Described names are owned up front so unchecked collectors cannot
        // shadow them.
        let mut owners: HashMap<String, CollectorId> = HashMap::new();
        for entry in entries.iter() {
            for name in entry.by_name.keys() {
                owners.insert(name.clone(), entry.id);
            }
        }

        let mut series: HashSet<(String, LabelSet)> = HashSet::new();
        let mut samples = Vec::new();

        for entry in entries.iter() {
            let cname = entry.collector.name();
            let produced = entry.collector.collect().map_err(|e| match e {
                RtMetricsError::Collector { .. } | RtMetricsError::Collision { .. } => e,
                other => RtMetricsError::Collector {
                    collector: cname.to_string(),
                    reason: other.to_string(),
                },
            })?;

            for (name, group) in group_by_name(produced) {
                check_group(entry, &name, &group)?;

                match owners.get(&name) {
                    Some(owner) if *owner != entry.id => {
                        tracing::warn!(collector = %cname, metric = %name, "metric produced by more than one collector");
                        return Err(RtMetricsError::Collision { name });
                    }
                    Some(_) => {}
                    None => {
                        owners.insert(name.clone(), entry.id);
                    }
                }

                for s in &group {
                    if !series.insert((name.clone(), s.labels.clone())) {
                        return Err(RtMetricsError::Collector {
                            collector: cname.to_string(),
                            reason: format!("duplicate series for {name}"),
                        });
                    }
                }
                samples.extend(group);
            }
        }

        tracing::trace!(collectors = entries.len(), samples = samples.len(), "collection complete");
        Ok(Snapshot::new(samples))
    }
}

fn group_by_name(samples: Vec<Sample>) -> Vec<(String, Vec<Sample>)> {
    let mut groups: Vec<(String, Vec<Sample>)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for s in samples {
        match index.get(s.name()) {
            Some(&i) => groups[i].1.push(s),
            None => {
                index.insert(s.name().to_string(), groups.len());
                groups.push((s.name().to_string(), vec![s]));
            }
        }
    }
    groups
}

fn check_group(entry: &Entry, name: &str, group: &[Sample]) -> Result<()> {
    let fail = |reason: String| RtMetricsError::Collector {
        collector: entry.collector.name().to_string(),
        reason,
    };

    let declared = if entry.is_checked() {
        entry.by_name.get(name)
    } else {
        group.first().map(|s| &s.descriptor)
    };
    let expected: &MetricDescriptor = match declared {
        Some(d) => d.as_ref(),
        None if entry.is_checked() => {
            return Err(fail(format!("sample for undescribed metric {name}")));
        }
        None => return Ok(()),
    };

    for s in group {
        if *s.descriptor != *expected {
            return Err(fail(format!("descriptor for {name} differs from its declaration")));
        }
        if !s.is_consistent() {
            return Err(fail(format!("sample value for {name} does not fit its kind")));
        }
    }
    Ok(())
}
