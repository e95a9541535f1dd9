//! Encode-then-parse: every (name, labels, value) triple survives encoding.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::collections::BTreeMap;
use std::sync::Arc;

use rtmetrics_core::expo::{encode, Format};
use rtmetrics_core::model::{Exemplar, LabelSet, MetricKind, SampleValue, Snapshot};
use rtmetrics_core::registry::RuntimeCollectorOptions;
use rtmetrics_core::rules::{Action, RuleSet, RuleSpec};
use rtmetrics_core::sampler::{
    CounterDescription, InMemorySource, RawBucket, RawHistogram, RawKind, RawValue,
};
use rtmetrics_core::{Registry, RuntimeCollector};

type Series = (String, BTreeMap<String, String>);

/// Minimal exposition parser: sample lines only, exemplars ignored.
fn parse(body: &str) -> Vec<(Series, f64)> {
    let mut out = Vec::new();
    for line in body.lines() {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (series, rest) = match line.find('{') {
            Some(open) => {
                let (labels, after) = parse_labels(&line[open + 1..]);
                ((line[..open].to_string(), labels), after)
            }
            None => {
                let (name, after) = line.split_once(' ').unwrap();
                ((name.to_string(), BTreeMap::new()), after)
            }
        };
        let value = rest.trim_start().split(' ').next().unwrap();
        out.push((series, parse_value(value)));
    }
    out
}

fn parse_labels(s: &str) -> (BTreeMap<String, String>, &str) {
    let mut labels = BTreeMap::new();
    let mut rest = s;
    loop {
        if let Some(after) = rest.strip_prefix('}') {
            return (labels, after);
        }
        rest = rest.trim_start_matches(',');
        let (key, after) = rest.split_once("=\"").unwrap();
        let mut value = String::new();
        let mut chars = after.char_indices();
        let end = loop {
            let (i, c) = chars.next().unwrap();
            match c {
                '\\' => match chars.next().unwrap().1 {
                    'n' => value.push('\n'),
                    other => value.push(other),
                },
                '"' => break i,
                _ => value.push(c),
            }
        };
        labels.insert(key.to_string(), value);
        rest = &after[end + 1..];
    }
}

fn parse_value(s: &str) -> f64 {
    match s {
        "+Inf" => f64::INFINITY,
        "-Inf" => f64::NEG_INFINITY,
        "NaN" => f64::NAN,
        _ => s.parse().unwrap(),
    }
}

fn expected(snap: &Snapshot, format: Format) -> Vec<(Series, f64)> {
    let mut out = Vec::new();
    for s in snap.samples() {
        let labels: BTreeMap<String, String> = s
            .labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        match &s.value {
            SampleValue::Scalar(v) => {
                let name = match (format, s.descriptor.kind()) {
                    (Format::OpenMetrics, MetricKind::Counter) if !s.name().ends_with("_total") => {
                        format!("{}_total", s.name())
                    }
                    _ => s.name().to_string(),
                };
                out.push(((name, labels), *v));
            }
            SampleValue::Histogram(h) => {
                for b in h.buckets() {
                    let mut l = labels.clone();
                    l.insert("le".into(), rtmetrics_core::expo::fmt_float(b.upper_bound));
                    out.push(((format!("{}_bucket", s.name()), l), b.cumulative_count as f64));
                }
                out.push(((format!("{}_sum", s.name()), labels.clone()), h.sum()));
                out.push(((format!("{}_count", s.name()), labels), h.count() as f64));
            }
        }
    }
    out
}

fn snapshot() -> Snapshot {
    let src = Arc::new(InMemorySource::new());
    src.describe(CounterDescription::new("/gc/cycles:cycles", "GC cycles.", RawKind::Uint64).cumulative());
    src.describe(CounterDescription::new("/process/uptime:nanoseconds", "Uptime.", RawKind::Uint64));
    src.describe(CounterDescription::new("/heap/ratio:ratio", "Ratio with \"quotes\".", RawKind::Float64));
    src.describe(
        CounterDescription::new("/sched/latencies:seconds", "Latency.", RawKind::Float64Histogram).expensive(),
    );
    src.set("/gc/cycles:cycles", RawValue::Uint64(42));
    src.set("/process/uptime:nanoseconds", RawValue::Uint64(1_250_000_000));
    src.set("/heap/ratio:ratio", RawValue::Float64(0.125));
    src.set(
        "/sched/latencies:seconds",
        RawValue::Histogram(RawHistogram {
            buckets: vec![
                RawBucket::new(0.000_001, 10),
                RawBucket::new(0.001, 5).with_exemplar(Exemplar {
                    labels: LabelSet::from_pairs([("trace_id", "4bf92f")]).unwrap(),
                    value: 0.0007,
                    timestamp: None,
                }),
                RawBucket::new(0.1, 1),
            ],
            sum: None,
        }),
    );

    let collector = RuntimeCollector::new(
        src,
        RuntimeCollectorOptions {
            namespace: "rt".into(),
            rules: RuleSet::new(&[RuleSpec::include("/sched/latencies")], Action::Include).unwrap(),
            const_labels: LabelSet::from_pairs([("job", "line\nbreak \\ \"q\"")]).unwrap(),
        },
    )
    .unwrap();

    let reg = Registry::new();
    reg.register(Arc::new(collector)).unwrap();
    reg.collect().unwrap()
}

fn assert_same(parsed: Vec<(Series, f64)>, expected: Vec<(Series, f64)>) {
    assert_eq!(parsed.len(), expected.len());
    for ((ps, pv), (es, ev)) in parsed.iter().zip(expected.iter()) {
        assert_eq!(ps, es);
        let tolerance = 1e-9 * ev.abs().max(1.0);
        assert!(
            pv == ev || (pv - ev).abs() <= tolerance,
            "series {es:?}: parsed {pv} expected {ev}"
        );
    }
}

#[test]
fn text_round_trip() {
    let snap = snapshot();
    assert_eq!(snap.names().len(), 4);
    let body = String::from_utf8(encode(&snap, Format::Text).to_vec()).unwrap();
    assert_same(parse(&body), expected(&snap, Format::Text));
}

#[test]
fn openmetrics_round_trip() {
    let snap = snapshot();
    let body = String::from_utf8(encode(&snap, Format::OpenMetrics).to_vec()).unwrap();
    assert!(body.ends_with("# EOF\n"));
    assert!(body.contains("# {trace_id=\"4bf92f\"} 0.0007"));
    assert_same(parse(&body), expected(&snap, Format::OpenMetrics));
}

#[test]
fn histogram_buckets_are_monotonic_and_end_at_inf() {
    let snap = snapshot();
    let mut seen = 0;
    for s in snap.samples() {
        if let SampleValue::Histogram(h) = &s.value {
            seen += 1;
            let b = h.buckets();
            assert!(b.windows(2).all(|w| w[0].upper_bound < w[1].upper_bound));
            assert!(b.windows(2).all(|w| w[0].cumulative_count <= w[1].cumulative_count));
            assert_eq!(b.last().unwrap().upper_bound, f64::INFINITY);
            assert_eq!(b.last().unwrap().cumulative_count, h.count());
        }
    }
    assert_eq!(seen, 1);
}
