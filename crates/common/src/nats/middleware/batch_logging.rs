use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use super::batch_types::{BatchRequest, BatchResult};
use tower::{Layer, Service};
use tracing::{error, info, warn, Instrument, Span};

/// Tower layer for logging batch consumption
#[derive(Clone, Default)]
pub struct NatsConsumeLoggingLayer;

impl NatsConsumeLoggingLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for NatsConsumeLoggingLayer {
    type Service = NatsConsumeLoggingService<S>;

    fn layer(&self, service: S) -> Self::Service {
        NatsConsumeLoggingService { inner: service }
    }
}

/// Service that logs the outcome of each batch
#[derive(Clone)]
pub struct NatsConsumeLoggingService<S> {
    inner: S,
}

impl<S> Service<BatchRequest> for NatsConsumeLoggingService<S>
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
        let stream = req.stream_name.clone();
        let event_count = req.len();
        let start = Instant::now();
        let mut inner = self.inner.clone();

        let span = Span::current();

        Box::pin(
            async move {
                let result = inner.call(req).await;
                let duration_ms = start.elapsed().as_millis();

                match &result {
                    Ok(batch) => {
                        let succeeded = batch.succeeded.len();
                        let failed = batch.failed.len();

                        if failed > 0 {
                            warn!(
                                stream = %stream,
                                event_count,
                                succeeded,
                                failed,
                                duration_ms = %duration_ms,
                                "processed batch from {stream} with {failed} failed events"
                            );
                        } else {
                            info!(
                                stream = %stream,
                                event_count,
                                succeeded,
                                duration_ms = %duration_ms,
                                "processed batch from {stream} in {duration_ms}ms [{succeeded} ok]"
                            );
                        }
                    }
                    Err(e) => {
                        error!(
                            stream = %stream,
                            event_count,
                            duration_ms = %duration_ms,
                            error = %e,
                            "failed to process batch from {stream} in {duration_ms}ms: {e}"
                        );
                    }
                }

                result
            }
            .instrument(span),
        )
    }
}
