use std::collections::BTreeMap;
use std::net::SocketAddr;

use serde::Deserialize;

use rtmetrics_core::error::{Result, RtMetricsError};
use rtmetrics_core::model::{is_valid_metric_name, LabelSet};
use rtmetrics_core::rules::{Action, RuleSet, RuleSpec};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExporterConfig {
    pub version: u32,

    #[serde(default)]
    pub exporter: ExporterSection,

    #[serde(default)]
    pub runtime: RuntimeSection,

    #[serde(default)]
    pub log: LogSection,
}

impl ExporterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(RtMetricsError::Config(format!(
                "unsupported config version {} (expected 1)",
                self.version
            )));
        }

        self.exporter.validate()?;
        self.runtime.validate()?;

        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExporterSection {
    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default = "default_path")]
    pub path: String,

    #[serde(default = "default_enable_openmetrics")]
    pub enable_openmetrics: bool,

    /// 0 = unlimited.
    #[serde(default)]
    pub max_requests_in_flight: usize,
}

impl Default for ExporterSection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            path: default_path(),
            enable_openmetrics: default_enable_openmetrics(),
            max_requests_in_flight: 0,
        }
    }
}

impl ExporterSection {
    pub fn validate(&self) -> Result<()> {
        self.listen.parse::<SocketAddr>().map_err(|_| {
            RtMetricsError::Config(format!(
                "exporter.listen must be a valid socket address, got {:?}",
                self.listen
            ))
        })?;
        if !self.path.starts_with('/') || self.path.len() < 2 {
            return Err(RtMetricsError::Config(
                "exporter.path must start with '/' and name a route".into(),
            ));
        }
        if self.path == "/healthz" {
            return Err(RtMetricsError::Config(
                "exporter.path must not shadow /healthz".into(),
            ));
        }
        Ok(())
    }
}

fn default_listen() -> String {
    "0.0.0.0:8080".into()
}
fn default_path() -> String {
    "/metrics".into()
}
fn default_enable_openmetrics() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuntimeSection {
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Action for counters no rule matches. Expensive counters always need an
    /// explicit include rule.
    #[serde(default = "default_action")]
    pub default: Action,

    #[serde(default = "default_probe_interval_ms")]
    pub probe_interval_ms: u64,

    #[serde(default)]
    pub const_labels: BTreeMap<String, String>,

    #[serde(default)]
    pub rules: Vec<RuleSpec>,
}

impl Default for RuntimeSection {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            default: default_action(),
            probe_interval_ms: default_probe_interval_ms(),
            const_labels: BTreeMap::new(),
            rules: Vec::new(),
        }
    }
}

impl RuntimeSection {
    pub fn validate(&self) -> Result<()> {
        if !self.namespace.is_empty() && !is_valid_metric_name(&self.namespace) {
            return Err(RtMetricsError::Config(format!(
                "runtime.namespace is not a valid metric name prefix: {:?}",
                self.namespace
            )));
        }
        if !(10..=60000).contains(&self.probe_interval_ms) {
            return Err(RtMetricsError::Config(
                "runtime.probe_interval_ms must be between 10 and 60000".into(),
            ));
        }
        // Fail fast on malformed patterns and labels.
        self.rule_set()?;
        self.const_label_set()?;
        Ok(())
    }

    pub fn rule_set(&self) -> Result<RuleSet> {
        RuleSet::new(&self.rules, self.default)
    }

    pub fn const_label_set(&self) -> Result<LabelSet> {
        let labels = LabelSet::from_pairs(self.const_labels.clone())?;
        if labels.contains_key("le") {
            return Err(RtMetricsError::Config(
                "runtime.const_labels must not use \"le\"".into(),
            ));
        }
        Ok(labels)
    }
}

fn default_namespace() -> String {
    "rt".into()
}
fn default_action() -> Action {
    Action::Include
}
fn default_probe_interval_ms() -> u64 {
    1000
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogSection {
    /// `EnvFilter` directive; `RUST_LOG` takes precedence.
    #[serde(default = "default_filter")]
    pub filter: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            filter: default_filter(),
        }
    }
}

fn default_filter() -> String {
    "info".into()
}
