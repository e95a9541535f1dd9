//! Exporter config loader (strict parsing).

pub mod schema;

use std::fs;

use rtmetrics_core::error::{Result, RtMetricsError};

pub use schema::{ExporterConfig, ExporterSection, LogSection, RuntimeSection};

pub fn load_from_file(path: &str) -> Result<ExporterConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| RtMetricsError::Internal(format!("read config failed: {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<ExporterConfig> {
    let cfg: ExporterConfig = serde_yaml::from_str(s)
        .map_err(|e| RtMetricsError::Config(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}
