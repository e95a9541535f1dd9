//! Snapshot builder tests: naming, unit conversion, histogram normalization.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::collections::HashMap;

use rtmetrics_core::builder::{build_histogram, Conversion, SnapshotBuilder};
use rtmetrics_core::model::{Exemplar, LabelSet, MetricKind, SampleValue};
use rtmetrics_core::sampler::{CounterDescription, RawBucket, RawHistogram, RawKind, RawValue};

fn conv(desc: CounterDescription) -> Conversion {
    Conversion::from_description(&desc, "rt").unwrap()
}

#[test]
fn naming_follows_path_and_unit() {
    let c = conv(CounterDescription::new("/gc/heap/allocs:bytes", "", RawKind::Uint64).cumulative());
    assert_eq!(c.descriptor().name(), "rt_gc_heap_allocs_bytes_total");
    assert_eq!(c.descriptor().kind(), MetricKind::Counter);
    assert_eq!(c.descriptor().unit(), Some("bytes"));

    let c = conv(CounterDescription::new("/process/open-fds:fds", "Open fds.", RawKind::Uint64));
    assert_eq!(c.descriptor().name(), "rt_process_open_fds_fds");
    assert_eq!(c.descriptor().kind(), MetricKind::Gauge);
    assert_eq!(c.descriptor().help(), "Open fds.");

    let c = conv(CounterDescription::new("/sched/latencies:seconds", "", RawKind::Float64Histogram));
    assert_eq!(c.descriptor().name(), "rt_sched_latencies_seconds");
    assert_eq!(c.descriptor().kind(), MetricKind::Histogram);

    let c = Conversion::from_description(
        &CounterDescription::new("/sched/tasks:tasks", "", RawKind::Uint64),
        "",
    )
    .unwrap();
    assert_eq!(c.descriptor().name(), "sched_tasks_tasks");
}

#[test]
fn counter_name_without_unit_is_rejected() {
    let err = Conversion::from_description(&CounterDescription::new("/sched/tasks", "", RawKind::Uint64), "rt")
        .expect_err("must fail");
    assert_eq!(err.code().as_str(), "CONFIG");
}

#[test]
fn nanoseconds_convert_to_seconds() {
    let c = conv(CounterDescription::new("/process/uptime:nanoseconds", "", RawKind::Uint64));
    assert_eq!(c.descriptor().name(), "rt_process_uptime_seconds");
    assert_eq!(c.descriptor().unit(), Some("seconds"));

    let raw = HashMap::from([("/process/uptime:nanoseconds".to_string(), RawValue::Uint64(2_500_000_000))]);
    let snap = SnapshotBuilder::default().build(&raw, &[c]);
    match &snap.samples()[0].value {
        SampleValue::Scalar(v) => assert!((v - 2.5).abs() < 1e-12, "got {v}"),
        other => panic!("unexpected value {other:?}"),
    }
}

#[test]
fn histogram_buckets_are_sorted_merged_and_cumulative() {
    let raw = RawHistogram {
        buckets: vec![
            RawBucket::new(0.5, 3),
            RawBucket::new(0.1, 2),
            RawBucket::new(0.5, 1),
            RawBucket::new(1.0, 4),
        ],
        sum: Some(3.25),
    };
    let h = build_histogram("h", &raw, 1.0).unwrap();

    let bounds: Vec<f64> = h.buckets().iter().map(|b| b.upper_bound).collect();
    let counts: Vec<u64> = h.buckets().iter().map(|b| b.cumulative_count).collect();
    assert_eq!(bounds, vec![0.1, 0.5, 1.0, f64::INFINITY]);
    assert_eq!(counts, vec![2, 6, 10, 10]);
    assert_eq!(h.count(), 10);
    assert_eq!(h.sum(), 3.25);
}

#[test]
fn histogram_keeps_explicit_inf_bucket() {
    let raw = RawHistogram {
        buckets: vec![RawBucket::new(f64::INFINITY, 5), RawBucket::new(1.0, 1)],
        sum: None,
    };
    let h = build_histogram("h", &raw, 1.0).unwrap();
    assert_eq!(h.buckets().len(), 2);
    assert_eq!(h.buckets()[1].upper_bound, f64::INFINITY);
    assert_eq!(h.count(), 6);
    // Estimated: 1 obs at 1.0, 5 overflow obs at the 1.0 lower edge.
    assert_eq!(h.sum(), 6.0);
}

#[test]
fn empty_histogram_is_a_single_inf_bucket() {
    let h = build_histogram("h", &RawHistogram::default(), 1.0).unwrap();
    assert_eq!(h.buckets().len(), 1);
    assert_eq!(h.buckets()[0].upper_bound, f64::INFINITY);
    assert_eq!(h.count(), 0);
    assert_eq!(h.sum(), 0.0);
}

#[test]
fn histogram_scale_applies_to_bounds_sum_and_exemplars() {
    let ex = Exemplar {
        labels: LabelSet::from_pairs([("trace_id", "abc")]).unwrap(),
        value: 1500.0,
        timestamp: None,
    };
    let raw = RawHistogram {
        buckets: vec![RawBucket::new(1000.0, 1), RawBucket::new(2000.0, 1).with_exemplar(ex)],
        sum: Some(2500.0),
    };
    let h = build_histogram("h", &raw, 1e-3).unwrap();
    assert!((h.buckets()[0].upper_bound - 1.0).abs() < 1e-12);
    assert!((h.buckets()[1].upper_bound - 2.0).abs() < 1e-12);
    assert!((h.sum() - 2.5).abs() < 1e-12);
    let ex = h.buckets()[1].exemplar.as_ref().unwrap();
    assert!((ex.value - 1.5).abs() < 1e-12);
}

#[test]
fn malformed_histogram_is_rejected() {
    let nan = RawHistogram {
        buckets: vec![RawBucket::new(f64::NAN, 1)],
        sum: None,
    };
    let err = build_histogram("h", &nan, 1.0).expect_err("must fail");
    assert_eq!(err.code().as_str(), "SAMPLE_DROPPED");

    let overflow = RawHistogram {
        buckets: vec![RawBucket::new(1.0, u64::MAX), RawBucket::new(2.0, 1)],
        sum: None,
    };
    assert!(build_histogram("h", &overflow, 1.0).is_err());

    let bad_sum = RawHistogram {
        buckets: vec![RawBucket::new(1.0, 1)],
        sum: Some(f64::INFINITY),
    };
    assert!(build_histogram("h", &bad_sum, 1.0).is_err());
}

#[test]
fn bad_metric_is_dropped_without_aborting_snapshot() {
    let hist = conv(CounterDescription::new("/sched/latencies:seconds", "", RawKind::Float64Histogram));
    let tasks = conv(CounterDescription::new("/sched/tasks:tasks", "", RawKind::Uint64));
    let mismatched = conv(CounterDescription::new("/sched/workers:threads", "", RawKind::Uint64));

    let raw = HashMap::from([
        (
            "/sched/latencies:seconds".to_string(),
            RawValue::Histogram(RawHistogram {
                buckets: vec![RawBucket::new(f64::NAN, 1)],
                sum: None,
            }),
        ),
        ("/sched/tasks:tasks".to_string(), RawValue::Uint64(7)),
        (
            "/sched/workers:threads".to_string(),
            RawValue::Histogram(RawHistogram::default()),
        ),
    ]);

    let snap = SnapshotBuilder::default().build(&raw, &[hist, tasks, mismatched]);
    assert_eq!(snap.names(), vec!["rt_sched_tasks_tasks"]);
}

#[test]
fn missing_raw_values_are_skipped_and_order_follows_conversions() {
    let a = conv(CounterDescription::new("/b:bytes", "", RawKind::Float64));
    let b = conv(CounterDescription::new("/a:bytes", "", RawKind::Float64));
    let c = conv(CounterDescription::new("/c:bytes", "", RawKind::Float64));
    let raw = HashMap::from([
        ("/a:bytes".to_string(), RawValue::Float64(1.0)),
        ("/b:bytes".to_string(), RawValue::Float64(2.0)),
    ]);
    let snap = SnapshotBuilder::default().build(&raw, &[a, b, c]);
    assert_eq!(snap.names(), vec!["rt_b_bytes", "rt_a_bytes"]);
}

#[test]
fn negative_counter_is_dropped() {
    let c = conv(CounterDescription::new("/gc/cycles:cycles", "", RawKind::Float64).cumulative());
    let raw = HashMap::from([("/gc/cycles:cycles".to_string(), RawValue::Float64(-1.0))]);
    assert!(SnapshotBuilder::default().build(&raw, &[c]).is_empty());
}

#[test]
fn const_labels_are_attached() {
    let c = conv(CounterDescription::new("/sched/tasks:tasks", "", RawKind::Uint64));
    let raw = HashMap::from([("/sched/tasks:tasks".to_string(), RawValue::Uint64(3))]);
    let labels = LabelSet::from_pairs([("instance", "a")]).unwrap();
    let snap = SnapshotBuilder::new(labels).build(&raw, &[c]);
    assert_eq!(snap.samples()[0].labels.get("instance"), Some("a"));
}

#[test]
fn duplicate_names_keep_the_first() {
    let a = conv(CounterDescription::new("/a-b:x", "", RawKind::Uint64));
    let b = conv(CounterDescription::new("/a_b:x", "", RawKind::Uint64));
    assert_eq!(a.descriptor().name(), b.descriptor().name());
    let raw = HashMap::from([
        ("/a-b:x".to_string(), RawValue::Uint64(1)),
        ("/a_b:x".to_string(), RawValue::Uint64(2)),
    ]);
    let snap = SnapshotBuilder::default().build(&raw, &[a, b]);
    assert_eq!(snap.len(), 1);
    assert_eq!(snap.samples()[0].value, SampleValue::Scalar(1.0));
}
