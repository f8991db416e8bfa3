use anyhow::{Context, Result};
use opentelemetry::trace::TracerProvider;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{Resource, propagation::TraceContextPropagator, trace::Sampler};
use opentelemetry_semantic_conventions::resource;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::infrastructure::config::TelemetrySettings;

const LOG_FILE_PREFIX: &str = "ephemera.log";

/// Builder for setting up telemetry (logging, tracing, rolling log file).
pub struct TelemetryBuilder {
    service_name: String,
    service_version: String,
    otlp_endpoint: Option<String>,
    log_dir: Option<PathBuf>,
    log_level: String,
    sampling_ratio: f64,
}

/// Keeps the background log writer alive; dropping it flushes the file.
#[must_use = "dropping the guard stops the file writer"]
pub struct TelemetryGuard {
    _file: Option<WorkerGuard>,
}

impl TelemetryBuilder {
    /// Creates a builder logging JSON to stdout at `info`.
    pub fn new(service_name: impl Into<String>, service_version: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            service_version: service_version.into(),
            otlp_endpoint: None,
            log_dir: None,
            log_level: "info".to_string(),
            sampling_ratio: 1.0,
        }
    }

    /// Builder configured from `settings`.
    #[must_use]
    pub fn from_settings(settings: &TelemetrySettings, service_version: &str) -> Self {
        let mut builder =
            Self::new(&settings.service_name, service_version).with_sampling_ratio(settings.sampling_ratio);
        if let Some(endpoint) = &settings.otlp_endpoint {
            builder = builder.with_tracing(endpoint);
        }
        if let Some(dir) = &settings.log_dir {
            builder = builder.with_log_dir(dir);
        }
        builder
    }

    /// Exports spans over OTLP to `endpoint`.
    #[must_use]
    pub fn with_tracing(mut self, endpoint: impl Into<String>) -> Self {
        self.otlp_endpoint = Some(endpoint.into());
        self
    }

    /// Also writes a daily rolling log below `dir`.
    #[must_use]
    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    /// Level used when `RUST_LOG` is unset.
    #[must_use]
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Trace sampling ratio.
    #[must_use]
    pub fn with_sampling_ratio(mut self, ratio: f64) -> Self {
        self.sampling_ratio = ratio;
        self
    }

    /// Initializes the global subscriber.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The OTLP span exporter cannot be built
    /// - The tracing subscriber cannot be initialized
    pub fn init(self) -> Result<TelemetryGuard> {
        opentelemetry::global::set_text_map_propagator(TraceContextPropagator::new());

        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.log_level));

        let fmt_layer = fmt::layer().json().with_span_events(FmtSpan::CLOSE).boxed();

        let (file_layer, file_guard) = match &self.log_dir {
            Some(dir) => {
                let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
                let (writer, guard) = tracing_appender::non_blocking(appender);
                let layer = fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(writer)
                    .boxed();
                (Some(layer), Some(guard))
            }
            None => (None, None),
        };

        let registry = Registry::default()
            .with(env_filter)
            .with(fmt_layer)
            .with(file_layer);

        if let Some(endpoint) = self.otlp_endpoint {
            let resource = Resource::builder()
                .with_attributes(vec![
                    opentelemetry::KeyValue::new(resource::SERVICE_NAME, self.service_name.clone()),
                    opentelemetry::KeyValue::new(
                        resource::SERVICE_VERSION,
                        self.service_version.clone(),
                    ),
                ])
                .build();

            let exporter = opentelemetry_otlp::SpanExporter::builder()
                .with_tonic()
                .with_endpoint(endpoint)
                .build()
                .context("Failed to build OTLP span exporter")?;

            let processor = opentelemetry_sdk::trace::BatchSpanProcessor::builder(exporter).build();

            let provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
                .with_span_processor(processor)
                .with_resource(resource)
                .with_sampler(Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(
                    self.sampling_ratio,
                ))))
                .build();

            opentelemetry::global::set_tracer_provider(provider.clone());

            let tracer = provider.tracer(self.service_name);
            let telemetry_layer = tracing_opentelemetry::layer().with_tracer(tracer);

            registry
                .with(telemetry_layer)
                .try_init()
                .context("Failed to init subscriber")?;
        } else {
            registry.try_init().context("Failed to init subscriber")?;
        }

        Ok(TelemetryGuard { _file: file_guard })
    }
}
