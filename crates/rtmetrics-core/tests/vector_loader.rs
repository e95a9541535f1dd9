//! JSON exposition vector loader shared by encoder tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs;
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};

use serde::Deserialize;

use rtmetrics_core::builder::build_histogram;
use rtmetrics_core::model::{Exemplar, LabelSet, MetricDescriptor, MetricKind, Sample, Snapshot};
use rtmetrics_core::sampler::{RawBucket, RawHistogram};

#[derive(Debug, Deserialize)]
pub struct TestVector {
    pub description: String,
    pub format: String,
    pub metrics: Vec<MetricData>,
    pub expect: String,
}

#[derive(Debug, Deserialize)]
pub struct MetricData {
    pub name: String,
    pub help: String,
    pub kind: String,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub buckets: Vec<BucketData>,
    #[serde(default)]
    pub sum: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct BucketData {
    pub le: f64,
    pub count: u64,
    #[serde(default)]
    pub exemplar: Option<ExemplarData>,
}

#[derive(Debug, Deserialize)]
pub struct ExemplarData {
    pub labels: BTreeMap<String, String>,
    pub value: f64,
    #[serde(default)]
    pub timestamp: Option<f64>,
}

pub fn load(name: &str) -> TestVector {
    let s = fs::read_to_string(format!("tests/vectors/{name}")).unwrap();
    serde_json::from_str(&s).unwrap()
}

impl TestVector {
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::new(self.metrics.iter().map(MetricData::sample).collect())
    }
}

impl MetricData {
    fn sample(&self) -> Sample {
        let kind = match self.kind.as_str() {
            "counter" => MetricKind::Counter,
            "gauge" => MetricKind::Gauge,
            "histogram" => MetricKind::Histogram,
            other => panic!("unsupported kind: {other}"),
        };
        let mut desc = MetricDescriptor::new(&self.name, &self.help, kind).unwrap();
        if let Some(unit) = &self.unit {
            desc = desc.with_unit(unit);
        }
        let desc = Arc::new(desc);
        let labels = LabelSet::from_pairs(self.labels.clone()).unwrap();

        if kind == MetricKind::Histogram {
            let raw = RawHistogram {
                buckets: self
                    .buckets
                    .iter()
                    .map(|b| {
                        let bucket = RawBucket::new(b.le, b.count);
                        match &b.exemplar {
                            Some(e) => bucket.with_exemplar(Exemplar {
                                labels: LabelSet::from_pairs(e.labels.clone()).unwrap(),
                                value: e.value,
                                timestamp: e.timestamp.map(|t| UNIX_EPOCH + Duration::from_secs_f64(t)),
                            }),
                            None => bucket,
                        }
                    })
                    .collect(),
                sum: self.sum,
            };
            Sample::histogram(desc, labels, build_histogram(&self.name, &raw, 1.0).unwrap())
        } else {
            Sample::scalar(desc, labels, self.value.expect("scalar vector needs a value"))
        }
    }
}
