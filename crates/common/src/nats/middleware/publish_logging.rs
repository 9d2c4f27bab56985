use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use super::publish_types::{PublishRequest, PublishResponse};
use tower::{Layer, Service};
use tracing::{debug, error, info, Instrument, Span};

/// Logs every publish with its dedupe id and where the stream stored it
#[derive(Clone, Default)]
pub struct NatsPublishLoggingLayer;

impl NatsPublishLoggingLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for NatsPublishLoggingLayer {
    type Service = NatsPublishLoggingService<S>;

    fn layer(&self, service: S) -> Self::Service {
        NatsPublishLoggingService { inner: service }
    }
}

#[derive(Clone)]
pub struct NatsPublishLoggingService<S> {
    inner: S,
}

fn log_publish<E: Display>(
    subject: &str,
    message_id: Option<&str>,
    elapsed_ms: u128,
    result: &Result<PublishResponse, E>,
) {
    let message_id = message_id.unwrap_or("-");

    match result {
        Ok(response) if response.was_duplicate() => info!(
            subject = %subject,
            message_id = %message_id,
            stream = %response.ack.stream,
            sequence = response.ack.sequence,
            "stream already held {message_id}, publish dropped as duplicate"
        ),
        Ok(response) => debug!(
            subject = %subject,
            message_id = %message_id,
            stream = %response.ack.stream,
            sequence = response.ack.sequence,
            duration_ms = %elapsed_ms,
            "stored on {} at sequence {}",
            response.ack.stream,
            response.ack.sequence
        ),
        Err(e) => error!(
            subject = %subject,
            message_id = %message_id,
            duration_ms = %elapsed_ms,
            error = %e,
            "publish to {subject} failed: {e}"
        ),
    }
}

impl<S> Service<PublishRequest> for NatsPublishLoggingService<S>
where
    S: Service<PublishRequest, Response = PublishResponse> + Clone + Send + 'static,
    S::Error: Display + Send,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: PublishRequest) -> Self::Future {
        let subject = req.subject.clone();
        let message_id = req.message_id().map(str::to_owned);
        let mut inner = self.inner.clone();

        Box::pin(
            async move {
                let started = Instant::now();
                let result = inner.call(req).await;
                log_publish(
                    &subject,
                    message_id.as_deref(),
                    started.elapsed().as_millis(),
                    &result,
                );
                result
            }
            .instrument(Span::current()),
        )
    }
}
