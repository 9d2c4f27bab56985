use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use super::publish_types::{PublishRequest, PublishResponse};
use crate::nats::trace_context::inject_trace_context;
use tower::{Layer, Service};
use tracing::{field, info_span, Instrument};

/// Names the producer on every publish span
#[derive(Clone, Debug, Default)]
pub struct NatsTracingConfig {
    pub service_name: String,
}

impl NatsTracingConfig {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }
}

/// Opens a producer span per publish and writes it into the message headers,
/// so downstream consumers continue the same trace
#[derive(Clone)]
pub struct NatsPublishTracingLayer {
    config: NatsTracingConfig,
}

impl NatsPublishTracingLayer {
    pub fn new(config: NatsTracingConfig) -> Self {
        Self { config }
    }
}

impl<S> Layer<S> for NatsPublishTracingLayer {
    type Service = NatsPublishTracingService<S>;

    fn layer(&self, service: S) -> Self::Service {
        NatsPublishTracingService {
            inner: service,
            config: self.config.clone(),
        }
    }
}

#[derive(Clone)]
pub struct NatsPublishTracingService<S> {
    inner: S,
    config: NatsTracingConfig,
}

impl<S> Service<PublishRequest> for NatsPublishTracingService<S>
where
    S: Service<PublishRequest, Response = PublishResponse> + Clone + Send + 'static,
    S::Error: std::fmt::Display + Send,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: PublishRequest) -> Self::Future {
        let span = info_span!(
            target: "nats",
            "nats_publish",
            otel.name = %format!("{} publish", req.subject),
            otel.kind = "producer",
            messaging.system = "nats",
            messaging.operation = "publish",
            messaging.destination.name = %req.subject,
            messaging.message.id = req.message_id().unwrap_or_default(),
            messaging.message.body.size = req.payload.len(),
            service.name = %self.config.service_name,
            messaging.nats.stream = field::Empty,
            messaging.nats.sequence = field::Empty,
            messaging.nats.duplicate = field::Empty,
            otel.status_code = field::Empty,
        );

        // Headers carry the publish span, not the caller's span
        span.in_scope(|| inject_trace_context(&mut req.headers));

        let mut inner = self.inner.clone();
        let recorder = span.clone();

        Box::pin(
            async move {
                let result = inner.call(req).await;
                match &result {
                    Ok(response) => {
                        recorder.record("messaging.nats.stream", response.ack.stream.as_str());
                        recorder.record("messaging.nats.sequence", response.ack.sequence);
                        recorder.record("messaging.nats.duplicate", response.ack.duplicate);
                        recorder.record("otel.status_code", "OK");
                    }
                    Err(_) => {
                        recorder.record("otel.status_code", "ERROR");
                    }
                }
                result
            }
            .instrument(span),
        )
    }
}
