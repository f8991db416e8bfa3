//! Logging, tracing and metrics settings.

use serde::Deserialize;
use std::path::PathBuf;

/// Telemetry configuration settings.
#[derive(Debug, Deserialize, Clone)]
pub struct TelemetrySettings {
    /// Service name for telemetry.
    pub service_name: String,
    /// OTLP endpoint for traces.
    pub otlp_endpoint: Option<String>,
    /// Sampling ratio for traces.
    #[serde(default = "default_sampling")]
    pub sampling_ratio: f64,
    /// Directory for a daily rolling JSON log, in addition to stdout.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

pub(super) fn default_sampling() -> f64 {
    1.0
}
