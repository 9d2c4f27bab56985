use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use super::publish_types::{PublishRequest, PublishResponse};
use super::{
    NatsPublishLoggingLayer, NatsPublishLoggingService, NatsPublishTracingLayer,
    NatsPublishTracingService, NatsTracingConfig,
};
use crate::nats::JetStreamPublisher;
use anyhow::Result;
use tower::{Service, ServiceBuilder};

/// Inner service that performs the actual JetStream publish
#[derive(Clone)]
pub struct NatsPublishService {
    publisher: Arc<dyn JetStreamPublisher>,
}

impl NatsPublishService {
    pub fn new(publisher: Arc<dyn JetStreamPublisher>) -> Self {
        Self { publisher }
    }
}

impl Service<PublishRequest> for NatsPublishService {
    type Response = PublishResponse;
    type Error = anyhow::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: PublishRequest) -> Self::Future {
        let publisher = Arc::clone(&self.publisher);

        Box::pin(async move {
            let ack = publisher
                .publish_with_headers(req.subject.clone(), req.headers, req.payload)
                .await?;
            Ok(PublishResponse {
                subject: req.subject,
                ack,
            })
        })
    }
}

/// Publisher stack, outermost first: Tracing -> Logging -> Publish
pub type LayeredPublisher =
    NatsPublishTracingService<NatsPublishLoggingService<NatsPublishService>>;

/// Build the layered publisher used by every producer in the worker
pub fn build_publisher(
    publisher: Arc<dyn JetStreamPublisher>,
    tracing_config: NatsTracingConfig,
) -> LayeredPublisher {
    ServiceBuilder::new()
        .layer(NatsPublishTracingLayer::new(tracing_config))
        .layer(NatsPublishLoggingLayer::new())
        .service(NatsPublishService::new(publisher))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nats::{MockJetStreamPublisher, PublishAck, NATS_MSG_ID};
    use tower::ServiceExt;

    fn ack(sequence: u64, duplicate: bool) -> PublishAck {
        PublishAck {
            stream: "translation_jobs".to_string(),
            sequence,
            duplicate,
        }
    }

    #[tokio::test]
    async fn test_publish_forwards_subject_headers_and_payload() {
        let mut mock = MockJetStreamPublisher::new();
        mock.expect_publish_with_headers()
            .withf(|subject, headers, payload| {
                subject == "translation_jobs.submitted"
                    && headers.get(NATS_MSG_ID).map(|v| v.as_str()) == Some("job-1")
                    && payload == &bytes::Bytes::from_static(b"{}")
            })
            .times(1)
            .returning(|_, _, _| Ok(ack(1, false)));

        let publisher = build_publisher(Arc::new(mock), NatsTracingConfig::new("test"));
        let request =
            PublishRequest::new("translation_jobs.submitted", "{}").with_message_id("job-1");

        let response = publisher.oneshot(request).await.unwrap();
        assert_eq!(response.subject, "translation_jobs.submitted");
        assert_eq!(response.ack.sequence, 1);
        assert!(!response.was_duplicate());
    }

    #[tokio::test]
    async fn test_tracing_layer_adds_trace_headers_without_dropping_msg_id() {
        let mut mock = MockJetStreamPublisher::new();
        mock.expect_publish_with_headers()
            .withf(|_, headers, _| {
                headers.get(NATS_MSG_ID).map(|v| v.as_str()) == Some("job-2")
                    && headers.get("Content-Type").map(|v| v.as_str()) == Some("application/json")
            })
            .times(1)
            .returning(|_, _, _| Ok(ack(2, false)));

        let publisher = build_publisher(Arc::new(mock), NatsTracingConfig::new("test"));
        let request = PublishRequest::new("translation_jobs.submitted", "{}")
            .with_message_id("job-2")
            .with_header("Content-Type", "application/json");

        assert!(publisher.oneshot(request).await.is_ok());
    }

    #[tokio::test]
    async fn test_duplicate_ack_is_reported() {
        let mut mock = MockJetStreamPublisher::new();
        mock.expect_publish_with_headers()
            .times(1)
            .returning(|_, _, _| Ok(ack(7, true)));

        let publisher = build_publisher(Arc::new(mock), NatsTracingConfig::new("test"));
        let response = publisher
            .oneshot(
                PublishRequest::new("translation_jobs.submitted", "{}").with_message_id("job-1"),
            )
            .await
            .unwrap();

        assert!(response.was_duplicate());
        assert_eq!(response.ack.sequence, 7);
    }

    #[tokio::test]
    async fn test_publish_error_propagates() {
        let mut mock = MockJetStreamPublisher::new();
        mock.expect_publish_with_headers()
            .times(1)
            .returning(|_, _, _| Err(anyhow::anyhow!("stream not found")));

        let publisher = build_publisher(Arc::new(mock), NatsTracingConfig::new("test"));
        let result = publisher
            .oneshot(PublishRequest::new("translated_documents.fr", "{}"))
            .await;

        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("stream not found"));
    }
}
