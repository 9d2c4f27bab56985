use opentelemetry_sdk::{logs::LoggerProvider, trace::TracerProvider as SdkTracerProvider};
use std::str::FromStr;

/// Shape of the stdout log stream
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line with the active span list
    #[default]
    Json,
    /// Single-line human readable output for local runs
    Compact,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "compact" | "text" => Ok(Self::Compact),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    pub service_name: String,
    /// OTLP gRPC collector, only dialed when `otel_enabled`
    pub otel_endpoint: String,
    pub otel_enabled: bool,
    /// Fallback directive when `RUST_LOG` is unset
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "translate-worker".to_string(),
            otel_endpoint: "http://localhost:4317".to_string(),
            otel_enabled: false,
            log_level: "info".to_string(),
            log_format: LogFormat::Json,
        }
    }
}

/// Exporters that must outlive the process loop and be flushed at shutdown
pub struct TelemetryProviders {
    pub tracer_provider: SdkTracerProvider,
    pub logger_provider: LoggerProvider,
}

impl TelemetryProviders {
    /// Flush pending spans and log records; errors go to stderr since the
    /// log pipeline itself is being torn down
    pub fn shutdown(self) {
        if let Err(e) = self.tracer_provider.shutdown() {
            eprintln!("Error shutting down tracer provider: {:?}", e);
        }
        if let Err(e) = self.logger_provider.shutdown() {
            eprintln!("Error shutting down logger provider: {:?}", e);
        }
    }
}
