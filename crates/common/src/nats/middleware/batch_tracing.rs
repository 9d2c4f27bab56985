use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use super::batch_types::{BatchRequest, BatchResult};
use tower::{Layer, Service};
use tracing::{field, info_span, Instrument, Span};

/// Configuration for batch consumption tracing
#[derive(Clone, Debug, Default)]
pub struct NatsConsumeTracingConfig {
    /// Service name for span attributes
    pub service_name: String,
}

impl NatsConsumeTracingConfig {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }
}

/// Tower layer opening one span per batch invocation.
///
/// The span is attached with `Instrument`, so it is exited when the batch
/// future completes or is dropped on cancellation.
#[derive(Clone, Default)]
pub struct NatsConsumeTracingLayer {
    config: NatsConsumeTracingConfig,
}

impl NatsConsumeTracingLayer {
    pub fn new(config: NatsConsumeTracingConfig) -> Self {
        Self { config }
    }
}

impl<S> Layer<S> for NatsConsumeTracingLayer {
    type Service = NatsConsumeTracingService<S>;

    fn layer(&self, service: S) -> Self::Service {
        NatsConsumeTracingService {
            inner: service,
            config: self.config.clone(),
        }
    }
}

/// Service that adds tracing to batch consumption
#[derive(Clone)]
pub struct NatsConsumeTracingService<S> {
    inner: S,
    config: NatsConsumeTracingConfig,
}

impl<S> Service<BatchRequest> for NatsConsumeTracingService<S>
where
    S: Service<BatchRequest, Response = BatchResult> + Clone + Send + 'static,
    S::Error: std::fmt::Display + Send,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: BatchRequest) -> Self::Future {
        let span = info_span!(
            target: "nats",
            "nats_consume_batch",
            otel.name = "nats_consume_batch",
            messaging.system = "nats",
            messaging.operation = "receive",
            messaging.batch.message_count = req.len(),
            messaging.destination.name = %req.stream_name,
            messaging.consumer.name = %req.consumer_name,
            service.name = %self.config.service_name,
            batch.succeeded = field::Empty,
            batch.failed = field::Empty,
            otel.status_code = field::Empty,
        );

        let mut inner = self.inner.clone();

        Box::pin(
            async move {
                let result = inner.call(req).await;

                match &result {
                    Ok(batch_result) => {
                        let span = Span::current();
                        span.record("batch.succeeded", batch_result.succeeded.len());
                        span.record("batch.failed", batch_result.failed.len());
                        span.record("otel.status_code", "OK");
                    }
                    Err(e) => {
                        Span::current().record("otel.status_code", "ERROR");
                        tracing::error!(error = %e, "batch processing failed");
                    }
                }

                result
            }
            .instrument(span),
        )
    }
}
