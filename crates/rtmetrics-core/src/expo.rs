//! Text exposition encoders.
//!
//! Two wire formats:
//! - `Text`: Prometheus text format 0.0.4
//! - `OpenMetrics`: OpenMetrics 1.0 text (`# UNIT`, exemplars, `# EOF`)
//!
//! Encoding is a pure function of the snapshot: samples are written in
//! snapshot order, with `# HELP`/`# TYPE` emitted whenever the metric family
//! changes.

use std::fmt::Write;
use std::time::UNIX_EPOCH;

use bytes::{Bytes, BytesMut};

use crate::error::{Result, RtMetricsError};
use crate::model::{Bucket, Exemplar, LabelSet, MetricDescriptor, MetricKind, Sample, SampleValue, Snapshot};

const TEXT_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";
const OPENMETRICS_CONTENT_TYPE: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Text,
    OpenMetrics,
}

impl Format {
    /// Parse a configured format name. Unknown names are a config error.
    pub fn parse(s: &str) -> Result<Format> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "plain" | "prometheus" => Ok(Format::Text),
            "openmetrics" | "open-metrics" => Ok(Format::OpenMetrics),
            other => Err(RtMetricsError::Config(format!("unsupported exposition format: {other:?}"))),
        }
    }

    /// Pick a format from an `Accept` header. OpenMetrics is only chosen when
    /// enabled and explicitly accepted with a non-zero q that is not below
    /// the q of `text/plain`. Equal q values keep header order.
    pub fn negotiate(accept: Option<&str>, openmetrics_enabled: bool) -> Format {
        if !openmetrics_enabled {
            return Format::Text;
        }
        let Some(accept) = accept else { return Format::Text };

        let mut ranges: Vec<(&str, f64)> = accept
            .split(',')
            .filter_map(|part| {
                let mut params = part.split(';').map(str::trim);
                let media = params.next().filter(|m| !m.is_empty())?;
                let q = params
                    .find_map(|p| p.strip_prefix("q="))
                    .map_or(Some(1.0), |q| q.parse::<f64>().ok())?;
                (q > 0.0).then_some((media, q))
            })
            .collect();
        // Stable: ties stay in header order.
        ranges.sort_by(|a, b| b.1.total_cmp(&a.1));

        for (media, _) in ranges {
            if media.eq_ignore_ascii_case("application/openmetrics-text") {
                return Format::OpenMetrics;
            }
            if media.eq_ignore_ascii_case("text/plain") {
                return Format::Text;
            }
        }
        Format::Text
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Format::Text => TEXT_CONTENT_TYPE,
            Format::OpenMetrics => OPENMETRICS_CONTENT_TYPE,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Format::Text => "text",
            Format::OpenMetrics => "openmetrics",
        }
    }
}

/// Encode by format name; the name is checked before anything is written.
pub fn encode_as(snapshot: &Snapshot, format: &str) -> Result<Bytes> {
    let format = Format::parse(format)?;
    Ok(encode(snapshot, format))
}

/// Encode a snapshot.
pub fn encode(snapshot: &Snapshot, format: Format) -> Bytes {
    let mut out = BytesMut::with_capacity(256 + snapshot.len() * 64);
    let mut current: Option<&str> = None;

    for sample in snapshot.samples() {
        if current != Some(sample.name()) {
            write_header(&mut out, &sample.descriptor, format);
            current = Some(sample.name());
        }
        write_sample(&mut out, sample, format);
    }

    if format == Format::OpenMetrics {
        out.extend_from_slice(b"# EOF\n");
    }
    out.freeze()
}

fn family_name(desc: &MetricDescriptor, format: Format) -> &str {
    match (format, desc.kind()) {
        (Format::OpenMetrics, MetricKind::Counter) => {
            desc.name().strip_suffix("_total").unwrap_or(desc.name())
        }
        _ => desc.name(),
    }
}

fn write_header(out: &mut BytesMut, desc: &MetricDescriptor, format: Format) {
    let family = family_name(desc, format);
    match format {
        Format::Text => {
            let _ = writeln!(out, "# HELP {} {}", family, escape_help(desc.help(), false));
            let _ = writeln!(out, "# TYPE {} {}", family, desc.kind().as_str());
        }
        Format::OpenMetrics => {
            let _ = writeln!(out, "# TYPE {} {}", family, desc.kind().as_str());
            if let Some(unit) = desc.unit() {
                if family.ends_with(&format!("_{unit}")) {
                    let _ = writeln!(out, "# UNIT {} {}", family, unit);
                }
            }
            let _ = writeln!(out, "# HELP {} {}", family, escape_help(desc.help(), true));
        }
    }
}

fn write_sample(out: &mut BytesMut, sample: &Sample, format: Format) {
    let desc = &sample.descriptor;
    match &sample.value {
        SampleValue::Scalar(v) => {
            let name = match (format, desc.kind()) {
                (Format::OpenMetrics, MetricKind::Counter) => {
                    format!("{}_total", family_name(desc, format))
                }
                _ => desc.name().to_string(),
            };
            let _ = writeln!(out, "{}{} {}", name, render_labels(&sample.labels, None), fmt_float(*v));
        }
        SampleValue::Histogram(h) => {
            let name = desc.name();
            for bucket in h.buckets() {
                write_bucket(out, name, &sample.labels, bucket, format);
            }
            let labels = render_labels(&sample.labels, None);
            let _ = writeln!(out, "{}_sum{} {}", name, labels, fmt_float(h.sum()));
            let _ = writeln!(out, "{}_count{} {}", name, labels, h.count());
        }
    }
}

fn write_bucket(out: &mut BytesMut, name: &str, labels: &LabelSet, bucket: &Bucket, format: Format) {
    let le = fmt_float(bucket.upper_bound);
    let _ = write!(
        out,
        "{}_bucket{} {}",
        name,
        render_labels(labels, Some(("le", le.as_str()))),
        bucket.cumulative_count
    );
    if format == Format::OpenMetrics {
        if let Some(ex) = &bucket.exemplar {
            write_exemplar(out, ex);
        }
    }
    out.extend_from_slice(b"\n");
}

fn write_exemplar(out: &mut BytesMut, ex: &Exemplar) {
    let labels = render_labels(&ex.labels, None);
    let labels = if labels.is_empty() { "{}".to_string() } else { labels };
    let _ = write!(out, " # {} {}", labels, fmt_float(ex.value));
    if let Some(ts) = ex.timestamp.and_then(|t| t.duration_since(UNIX_EPOCH).ok()) {
        let _ = write!(out, " {}", ts.as_secs_f64());
    }
}

fn render_labels(labels: &LabelSet, extra: Option<(&str, &str)>) -> String {
    if labels.is_empty() && extra.is_none() {
        return String::new();
    }
    let mut s = String::from("{");
    let pairs = labels.iter().chain(extra);
    for (i, (k, v)) in pairs.enumerate() {
        if i > 0 {
            s.push(',');
        }
        let _ = write!(s, "{}=\"{}\"", k, escape_label(v));
    }
    s.push('}');
    s
}

fn escape_label(v: &str) -> String {
    v.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

fn escape_help(v: &str, quotes: bool) -> String {
    let s = v.replace('\\', "\\\\").replace('\n', "\\n");
    if quotes {
        s.replace('"', "\\\"")
    } else {
        s
    }
}

/// Render a float the way exposition parsers expect.
pub fn fmt_float(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else if v == f64::INFINITY {
        "+Inf".to_string()
    } else if v == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else {
        format!("{v}")
    }
}
