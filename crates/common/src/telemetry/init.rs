use anyhow::{Context, Result};
use opentelemetry::{trace::TracerProvider, KeyValue};
use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_otlp::{LogExporter, WithExportConfig};
use opentelemetry_sdk::{
    logs::{BatchLogProcessor, LoggerProvider},
    propagation::TraceContextPropagator,
    runtime,
    trace::{RandomIdGenerator, Sampler, TracerProvider as SdkTracerProvider},
    Resource,
};
use tracing_subscriber::{
    fmt, layer::SubscriberExt, registry::LookupSpan, util::SubscriberInitExt, EnvFilter, Layer,
};

use super::{LogFormat, TelemetryConfig, TelemetryProviders, TraceContextLogProcessor};

/// Build the env filter: `RUST_LOG` wins, otherwise the configured level
fn env_filter(config: &TelemetryConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level))
}

fn stdout_layer<S>(format: LogFormat) -> Box<dyn Layer<S> + Send + Sync + 'static>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    match format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_span_list(true)
            .with_current_span(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(false).boxed(),
    }
}

/// Initialize structured logging and, when enabled, OpenTelemetry export.
///
/// With OTEL enabled, spans and log events are exported over OTLP/gRPC and
/// W3C trace context is installed as the global propagator so traces follow
/// document events across NATS. Stdout always gets logs in `log_format`.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<Option<TelemetryProviders>> {
    if !config.otel_enabled {
        tracing_subscriber::registry()
            .with(env_filter(config))
            .with(stdout_layer(config.log_format))
            .try_init()
            .context("failed to install tracing subscriber")?;
        return Ok(None);
    }

    opentelemetry::global::set_text_map_propagator(TraceContextPropagator::new());

    let resource = Resource::new(vec![KeyValue::new(
        opentelemetry_semantic_conventions::resource::SERVICE_NAME,
        config.service_name.clone(),
    )]);

    let trace_exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(&config.otel_endpoint)
        .build()
        .context("failed to build OTLP span exporter")?;

    let tracer_provider = SdkTracerProvider::builder()
        .with_batch_exporter(trace_exporter, runtime::Tokio)
        .with_sampler(Sampler::AlwaysOn)
        .with_id_generator(RandomIdGenerator::default())
        .with_resource(resource.clone())
        .build();

    let log_exporter = LogExporter::builder()
        .with_tonic()
        .with_endpoint(&config.otel_endpoint)
        .build()
        .context("failed to build OTLP log exporter")?;

    let batch_processor = BatchLogProcessor::builder(log_exporter, runtime::Tokio).build();

    let logger_provider = LoggerProvider::builder()
        .with_log_processor(TraceContextLogProcessor::new(batch_processor))
        .with_resource(resource)
        .build();

    let tracer = tracer_provider.tracer(config.service_name.clone());
    let otel_trace_layer = tracing_opentelemetry::layer().with_tracer(tracer);
    let otel_log_layer = OpenTelemetryTracingBridge::new(&logger_provider);

    // The trace layer must precede the log bridge so log records can see
    // the OTel context of the active span
    tracing_subscriber::registry()
        .with(env_filter(config))
        .with(otel_trace_layer)
        .with(otel_log_layer)
        .with(stdout_layer(config.log_format))
        .try_init()
        .context("failed to install tracing subscriber")?;

    Ok(Some(TelemetryProviders {
        tracer_provider,
        logger_provider,
    }))
}

/// Flush and shut down exporters. Safe to call with `None`.
pub fn shutdown_telemetry(providers: Option<TelemetryProviders>) {
    if let Some(providers) = providers {
        providers.shutdown();
    }
}
