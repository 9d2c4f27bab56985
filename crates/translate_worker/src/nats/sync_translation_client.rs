use common::domain::{
    CloudEvent, Document, DomainError, DomainResult, SyncTranslator, TranslatedDocument,
    TranslationOutcome, TranslationSettings,
};
use common::nats::{
    build_publisher, inject_trace_context, JetStreamPublisher, LayeredPublisher, NatsRequester,
    NatsTracingConfig, PublishRequest,
};
use async_nats::HeaderMap;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use tracing::{debug, instrument};

/// Where the inline translator listens and where its output goes
#[derive(Debug, Clone)]
pub struct SyncTranslationClientConfig {
    pub request_subject: String,
    pub timeout: Duration,
    /// Translated documents are published to `{stream}.{language}`
    pub translated_documents_stream: String,
}

#[derive(Serialize)]
struct TranslationRequest<'a> {
    event: &'a CloudEvent,
    settings: &'a TranslationSettings,
}

#[derive(Debug, Deserialize)]
struct TranslationReply {
    #[serde(default)]
    documents: Vec<TranslatedDocument>,
    #[serde(default)]
    error: Option<String>,
}

/// Inline translation over NATS request/reply.
///
/// Each translated document is forwarded to the next middleware as a new
/// document event on the translated documents stream.
pub struct NatsSyncTranslationClient {
    requester: Arc<dyn NatsRequester>,
    publisher: LayeredPublisher,
    settings: TranslationSettings,
    config: SyncTranslationClientConfig,
}

impl NatsSyncTranslationClient {
    pub fn new(
        requester: Arc<dyn NatsRequester>,
        jetstream: Arc<dyn JetStreamPublisher>,
        settings: TranslationSettings,
        config: SyncTranslationClientConfig,
    ) -> Self {
        debug!(
            request_subject = %config.request_subject,
            timeout_ms = config.timeout.as_millis() as u64,
            "initialized sync translation client"
        );

        Self {
            requester,
            publisher: build_publisher(
                jetstream,
                NatsTracingConfig::new("sync_translation_client"),
            ),
            settings,
            config,
        }
    }

    async fn request_translation(
        &self,
        event: &CloudEvent,
    ) -> DomainResult<Vec<TranslatedDocument>> {
        let payload = serde_json::to_vec(&TranslationRequest {
            event,
            settings: &self.settings,
        })
        .map_err(|e| DomainError::ProcessingError(format!("failed to encode request: {}", e)))?;

        let mut headers = HeaderMap::new();
        inject_trace_context(&mut headers);

        let reply = self
            .requester
            .request(
                self.config.request_subject.clone(),
                headers,
                Bytes::from(payload),
                self.config.timeout,
            )
            .await
            .map_err(|e| {
                DomainError::ProcessingError(format!("sync translation request failed: {:#}", e))
            })?;

        let reply: TranslationReply = serde_json::from_slice(&reply).map_err(|e| {
            DomainError::ProcessingError(format!("invalid sync translation reply: {}", e))
        })?;

        if let Some(error) = reply.error {
            return Err(DomainError::ProcessingError(format!(
                "sync translator rejected document: {}",
                error
            )));
        }

        Ok(reply.documents)
    }

    /// Every configured target language must come back exactly as a single
    /// subject token; anything else would publish to the wrong subject or
    /// silently drop a translation.
    fn check_languages(&self, documents: &[TranslatedDocument]) -> DomainResult<()> {
        let targets = &self.settings.target_languages;

        for document in documents {
            let language = document.language.as_str();
            if !is_subject_token(language) {
                return Err(DomainError::ProcessingError(format!(
                    "sync translator returned invalid language code '{}'",
                    language
                )));
            }
            if !targets.iter().any(|target| target == language) {
                return Err(DomainError::ProcessingError(format!(
                    "sync translator returned unrequested language '{}'",
                    language
                )));
            }
        }

        let missing: Vec<&str> = targets
            .iter()
            .filter(|target| !documents.iter().any(|d| &d.language == *target))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(DomainError::ProcessingError(format!(
                "sync translator returned no document for: {}",
                missing.join(", ")
            )));
        }

        Ok(())
    }

    /// Publish the event announcing one translated document
    async fn forward(
        &self,
        event: &CloudEvent,
        translated: &TranslatedDocument,
    ) -> DomainResult<()> {
        let next_id = format!("{}-{}", event.id, translated.language);
        let mut next = event.with_output_document(
            next_id.clone(),
            Document {
                url: translated.url.clone(),
                mime_type: translated.mime_type.clone(),
                size: translated.size,
                etag: None,
            },
        );
        if let Some(metadata) = next.data.metadata.as_object_mut() {
            metadata.insert(
                "language".to_string(),
                serde_json::Value::String(translated.language.clone()),
            );
        }

        let subject = format!(
            "{}.{}",
            self.config.translated_documents_stream, translated.language
        );
        let request = PublishRequest::new(subject, next.to_vec()?)
            .with_message_id(&next_id)
            .with_header("Content-Type", "application/cloudevents+json");

        self.publisher
            .clone()
            .oneshot(request)
            .await
            .map_err(|e| {
                DomainError::ProcessingError(format!("failed to forward translation: {:#}", e))
            })?;

        Ok(())
    }
}

fn is_subject_token(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[async_trait]
impl SyncTranslator for NatsSyncTranslationClient {
    #[instrument(skip(self, event), fields(cloud_event_id = %event.id))]
    async fn process_sync(&self, event: &CloudEvent) -> DomainResult<TranslationOutcome> {
        let documents = self.request_translation(event).await?;
        self.check_languages(&documents)?;

        for document in &documents {
            self.forward(event, document).await?;
        }

        debug!(
            cloud_event_id = %event.id,
            document_count = documents.len(),
            "sync translation completed"
        );

        Ok(TranslationOutcome::Completed { documents })
    }
}
