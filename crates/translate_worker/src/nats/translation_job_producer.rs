use chrono::{DateTime, Utc};
use common::domain::{
    AsyncTranslator, CloudEvent, DomainError, DomainResult, TranslationOutcome,
    TranslationSettings,
};
use common::nats::{
    build_publisher, JetStreamPublisher, LayeredPublisher, NatsTracingConfig, PublishRequest,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower::ServiceExt;
use tracing::debug;

/// Job handed to the out-of-band translation pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationJob {
    pub job_id: String,
    pub event: CloudEvent,
    pub settings: TranslationSettings,
    pub submitted_at: DateTime<Utc>,
}

pub struct TranslationJobProducer {
    publisher: LayeredPublisher,
    subject: String,
    settings: TranslationSettings,
}

impl TranslationJobProducer {
    pub fn new(
        jetstream: Arc<dyn JetStreamPublisher>,
        jobs_stream: &str,
        settings: TranslationSettings,
    ) -> Self {
        let subject = format!("{}.submitted", jobs_stream);
        debug!(subject = %subject, "initialized translation job producer");

        Self {
            publisher: build_publisher(
                jetstream,
                NatsTracingConfig::new("translation_job_producer"),
            ),
            subject,
            settings,
        }
    }
}

#[async_trait::async_trait]
impl AsyncTranslator for TranslationJobProducer {
    async fn process_async(&self, event: &CloudEvent) -> DomainResult<TranslationOutcome> {
        // The job id doubles as the JetStream message id, so a redelivered
        // event republishes a duplicate that the stream drops
        let job = TranslationJob {
            job_id: event.id.clone(),
            event: event.clone(),
            settings: self.settings.clone(),
            submitted_at: Utc::now(),
        };

        let payload = serde_json::to_vec(&job)
            .map_err(|e| DomainError::ProcessingError(format!("failed to encode job: {}", e)))?;
        let request = PublishRequest::new(self.subject.clone(), payload)
            .with_message_id(&job.job_id)
            .with_header("Content-Type", "application/json");

        let response = self
            .publisher
            .clone()
            .oneshot(request)
            .await
            .map_err(DomainError::RepositoryError)?;

        if response.was_duplicate() {
            debug!(job_id = %job.job_id, "translation job already submitted");
        } else {
            debug!(
                job_id = %job.job_id,
                subject = %self.subject,
                sequence = response.ack.sequence,
                "translation job submitted"
            );
        }
        Ok(TranslationOutcome::Submitted { job_id: job.job_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::domain::ModelParameters;
    use common::nats::{MockJetStreamPublisher, PublishAck, NATS_MSG_ID};

    fn ack(duplicate: bool) -> PublishAck {
        PublishAck {
            stream: "translation_jobs".to_string(),
            sequence: 1,
            duplicate,
        }
    }

    fn event() -> CloudEvent {
        CloudEvent::from_slice(
            br#"{
                "specversion": "1.0",
                "id": "evt-big",
                "type": "document-created",
                "time": "2024-03-01T10:00:00Z",
                "data": {
                    "chainId": "chain-9",
                    "source": {
                        "url": "s3://in/big.pdf", "type": "application/pdf", "size": 900000
                    },
                    "document": {
                        "url": "s3://in/big.pdf", "type": "application/pdf", "size": 900000
                    }
                }
            }"#,
        )
        .unwrap()
    }

    fn settings() -> TranslationSettings {
        let params = ModelParameters::from_json(r#"{"temperature":0.2,"seed":7}"#).unwrap();
        TranslationSettings::new(vec!["es".to_string()], Some("en".to_string()), params).unwrap()
    }

    #[tokio::test]
    async fn test_job_published_with_dedupe_id() {
        let mut jetstream = MockJetStreamPublisher::new();
        jetstream
            .expect_publish_with_headers()
            .withf(|subject, headers, payload| {
                let job: TranslationJob = serde_json::from_slice(payload).unwrap();
                subject == "translation_jobs.submitted"
                    && headers.get(NATS_MSG_ID).map(|v| v.as_str()) == Some("evt-big")
                    && job.job_id == "evt-big"
                    && job.event.data.chain_id == "chain-9"
                    && job.settings.source_language.as_deref() == Some("en")
                    && job.settings.model_parameters.extra.get("seed")
                        == Some(&serde_json::json!(7))
            })
            .times(1)
            .returning(|_, _, _| Ok(ack(false)));

        let producer =
            TranslationJobProducer::new(Arc::new(jetstream), "translation_jobs", settings());
        let outcome = producer.process_async(&event()).await.unwrap();

        assert_eq!(
            outcome,
            TranslationOutcome::Submitted {
                job_id: "evt-big".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_resubmission_yields_same_job_id() {
        let mut jetstream = MockJetStreamPublisher::new();
        let mut seq = mockall::Sequence::new();
        jetstream
            .expect_publish_with_headers()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(ack(false)));
        jetstream
            .expect_publish_with_headers()
            .withf(|_, headers, _| headers.get(NATS_MSG_ID).map(|v| v.as_str()) == Some("evt-big"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(ack(true)));

        let producer =
            TranslationJobProducer::new(Arc::new(jetstream), "translation_jobs", settings());
        let first = producer.process_async(&event()).await.unwrap();
        let second = producer.process_async(&event()).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_publish_failure_is_repository_error() {
        let mut jetstream = MockJetStreamPublisher::new();
        jetstream
            .expect_publish_with_headers()
            .times(1)
            .returning(|_, _, _| Err(anyhow::anyhow!("stream not found")));

        let producer =
            TranslationJobProducer::new(Arc::new(jetstream), "translation_jobs", settings());
        let result = producer.process_async(&event()).await;

        assert!(matches!(result, Err(DomainError::RepositoryError(_))));
    }
}
