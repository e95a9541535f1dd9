//! Shared error type across rtmetrics crates.

use thiserror::Error;

/// Stable error codes (used in logs, HTTP error bodies and tests).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Malformed rule, pattern, label, format or config file.
    Config,
    /// Two collectors claim the same metric name.
    Collision,
    /// One metric's data was invalid and excluded.
    SampleDropped,
    /// A collector failed or contradicted its own description.
    Collector,
    /// Internal error.
    Internal,
}

impl ErrorCode {
    /// String representation used in responses and log fields.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::Config => "CONFIG",
            ErrorCode::Collision => "COLLISION",
            ErrorCode::SampleDropped => "SAMPLE_DROPPED",
            ErrorCode::Collector => "COLLECTOR",
            ErrorCode::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, RtMetricsError>;

/// Unified error type used by core and exporter.
#[derive(Debug, Error)]
pub enum RtMetricsError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("metric name collision: {name} is already registered")]
    Collision { name: String },
    #[error("sample dropped for {metric}: {reason}")]
    SampleDropped { metric: String, reason: String },
    #[error("collector {collector} failed: {reason}")]
    Collector { collector: String, reason: String },
    #[error("internal: {0}")]
    Internal(String),
}

impl RtMetricsError {
    /// Map to a stable code.
    pub fn code(&self) -> ErrorCode {
        match self {
            RtMetricsError::Config(_) => ErrorCode::Config,
            RtMetricsError::Collision { .. } => ErrorCode::Collision,
            RtMetricsError::SampleDropped { .. } => ErrorCode::SampleDropped,
            RtMetricsError::Collector { .. } => ErrorCode::Collector,
            RtMetricsError::Internal(_) => ErrorCode::Internal,
        }
    }

    pub(crate) fn dropped(metric: &str, reason: impl Into<String>) -> Self {
        RtMetricsError::SampleDropped {
            metric: metric.to_string(),
            reason: reason.into(),
        }
    }
}
