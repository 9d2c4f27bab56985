use crate::domain::{BatchCoordinator, EventRouter};
use crate::nats::{
    NatsSyncTranslationClient, SyncTranslationClientConfig, TranslationBatchService,
    TranslationJobProducer,
};
use common::domain::TranslationSettings;
use common::nats::{
    BatchConsumer, NatsClient, NatsConsumeLoggingLayer, NatsConsumeLoggingService,
    NatsConsumeTracingConfig, NatsConsumeTracingLayer, NatsConsumeTracingService,
    RedeliveryPolicy,
};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tracing::info;
use translate_runner::AppProcess;

pub struct TranslateWorkerConfig {
    pub documents_stream: String,
    pub documents_subject: String,
    pub consumer_name: String,
    pub nats_batch_size: usize,
    pub nats_batch_wait_secs: u64,
    pub redelivery: RedeliveryPolicy,
    pub batch_concurrency: usize,
    pub sync_translation_subject: String,
    pub sync_translation_timeout_secs: u64,
    pub translation_jobs_stream: String,
    pub translated_documents_stream: String,
    pub service_name: String,
}

/// Batch service stack, outermost first: Tracing -> Logging -> Translation
pub type TranslationBatchStack =
    NatsConsumeTracingService<NatsConsumeLoggingService<TranslationBatchService>>;

/// The document consumer together with everything it routes to
pub struct TranslateWorker {
    consumer: BatchConsumer<TranslationBatchStack>,
}

impl TranslateWorker {
    pub async fn new(
        nats_client: &NatsClient,
        settings: TranslationSettings,
        config: TranslateWorkerConfig,
    ) -> anyhow::Result<Self> {
        info!("initializing translate worker");

        let sync_translator = Arc::new(NatsSyncTranslationClient::new(
            nats_client.create_requester_client(),
            nats_client.create_publisher_client(),
            settings.clone(),
            SyncTranslationClientConfig {
                request_subject: config.sync_translation_subject.clone(),
                timeout: Duration::from_secs(config.sync_translation_timeout_secs),
                translated_documents_stream: config.translated_documents_stream.clone(),
            },
        ));
        let async_translator = Arc::new(TranslationJobProducer::new(
            nats_client.create_publisher_client(),
            &config.translation_jobs_stream,
            settings,
        ));

        let router = Arc::new(EventRouter::new(sync_translator, async_translator));
        let coordinator = Arc::new(BatchCoordinator::new(router, config.batch_concurrency));

        let service = ServiceBuilder::new()
            .layer(NatsConsumeTracingLayer::new(NatsConsumeTracingConfig::new(
                config.service_name.clone(),
            )))
            .layer(NatsConsumeLoggingLayer::new())
            .service(TranslationBatchService::new(coordinator));

        let consumer = BatchConsumer::new(
            nats_client.create_consumer_client(),
            &config.documents_stream,
            &config.consumer_name,
            &config.documents_subject,
            config.nats_batch_size,
            config.nats_batch_wait_secs,
            config.redelivery.clone(),
            service,
        )
        .await?;

        info!(
            stream = %config.documents_stream,
            consumer = %config.consumer_name,
            batch_concurrency = config.batch_concurrency,
            max_deliver = config.redelivery.max_deliver,
            "translate worker initialized"
        );

        Ok(Self { consumer })
    }

    /// Named processes to hand to the runner
    pub fn into_runner_processes(self) -> Vec<(&'static str, AppProcess)> {
        let consumer = self.consumer;
        let document_consumer: AppProcess = Box::new(
            move |ctx: CancellationToken| -> BoxFuture<'static, anyhow::Result<()>> {
                Box::pin(consumer.run(ctx))
            },
        );

        vec![("document_consumer", document_consumer)]
    }
}
