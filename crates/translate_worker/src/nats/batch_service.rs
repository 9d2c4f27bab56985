use crate::domain::BatchCoordinator;
use common::nats::{BatchRequest, BatchResult};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::Service;
use tracing::debug;

/// Tower service handing each fetched batch to the [`BatchCoordinator`].
///
/// Per-event failures are reported inside the `BatchResult`; this service
/// itself only fails when something prevents the whole batch from being
/// evaluated.
#[derive(Clone)]
pub struct TranslationBatchService {
    coordinator: Arc<BatchCoordinator>,
}

impl TranslationBatchService {
    pub fn new(coordinator: Arc<BatchCoordinator>) -> Self {
        Self { coordinator }
    }
}

impl Service<BatchRequest> for TranslationBatchService {
    type Response = BatchResult;
    type Error = anyhow::Error;
    type Future = BoxFuture<'static, Result<BatchResult, anyhow::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: BatchRequest) -> Self::Future {
        let coordinator = Arc::clone(&self.coordinator);

        Box::pin(async move {
            debug!(
                stream = %req.stream_name,
                consumer = %req.consumer_name,
                event_count = req.len(),
                "handing batch to coordinator"
            );
            Ok(coordinator.process_batch(req.events).await)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EventRouter;
    use common::domain::{DomainError, MockAsyncTranslator, MockSyncTranslator};
    use common::nats::{
        InboundEvent, NatsConsumeLoggingLayer, NatsConsumeTracingConfig, NatsConsumeTracingLayer,
    };
    use tower::{ServiceBuilder, ServiceExt};

    fn service(sync: MockSyncTranslator, async_: MockAsyncTranslator) -> TranslationBatchService {
        let router = EventRouter::new(Arc::new(sync), Arc::new(async_));
        TranslationBatchService::new(Arc::new(BatchCoordinator::new(Arc::new(router), 4)))
    }

    #[tokio::test]
    async fn test_service_returns_partial_result() {
        let mut sync = MockSyncTranslator::new();
        sync.expect_process_sync().never();
        let mut async_ = MockAsyncTranslator::new();
        async_.expect_process_async().never();

        let request = BatchRequest::new(
            vec![InboundEvent::new("41", "documents.created", &b"garbage"[..], None)],
            "documents",
            "translate-worker",
        );

        let result = service(sync, async_).oneshot(request).await.unwrap();
        assert!(result.succeeded.is_empty());
        assert_eq!(result.failed_ids().collect::<Vec<_>>(), vec!["41"]);
    }

    #[tokio::test]
    async fn test_service_composes_with_batch_middleware() {
        let sync = MockSyncTranslator::new();
        let mut async_ = MockAsyncTranslator::new();
        async_
            .expect_process_async()
            .returning(|_| Err(DomainError::ProcessingError("queue full".to_string())));

        let stack = ServiceBuilder::new()
            .layer(NatsConsumeTracingLayer::new(NatsConsumeTracingConfig::new("test")))
            .layer(NatsConsumeLoggingLayer::new())
            .service(service(sync, async_));

        let payload = serde_json::to_vec(&serde_json::json!({
            "specversion": "1.0",
            "id": "evt-pdf",
            "type": "document-created",
            "time": "2024-03-01T10:00:00Z",
            "data": {
                "chainId": "chain-1",
                "source": { "url": "s3://in/report.pdf", "type": "application/pdf", "size": 10 },
                "document": { "url": "s3://in/report.pdf", "type": "application/pdf", "size": 10 }
            }
        }))
        .unwrap();
        let request = BatchRequest::new(
            vec![InboundEvent::new("42", "documents.created", payload, None)],
            "documents",
            "translate-worker",
        );

        let result = stack.oneshot(request).await.unwrap();
        assert_eq!(result.total(), 1);
        assert_eq!(result.failed[0].event_id, "42");
        assert!(result.failed[0].reason.contains("queue full"));
    }
}
