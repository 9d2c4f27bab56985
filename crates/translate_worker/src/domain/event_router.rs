use crate::domain::{classify_document, ProcessingPath};
use common::domain::{AsyncTranslator, CloudEvent, DomainError, SyncTranslator, TranslationOutcome};
use common::nats::{set_span_parent_from_headers, InboundEvent};
use std::sync::Arc;
use tracing::{debug, field, info_span, warn, Instrument, Span};

/// Result of routing a single event
#[derive(Debug)]
pub enum EventOutcome {
    Success {
        event_id: String,
        path: ProcessingPath,
        result: TranslationOutcome,
    },
    Failure {
        event_id: String,
        cause: DomainError,
    },
}

impl EventOutcome {
    pub fn event_id(&self) -> &str {
        match self {
            EventOutcome::Success { event_id, .. } | EventOutcome::Failure { event_id, .. } => {
                event_id
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, EventOutcome::Success { .. })
    }

    /// Collapse into the `(event_id, Ok | Err(reason))` pair used to build
    /// a batch result
    pub fn into_resolution(self) -> (String, Result<(), String>) {
        match self {
            EventOutcome::Success { event_id, .. } => (event_id, Ok(())),
            EventOutcome::Failure { event_id, cause } => (event_id, Err(cause.to_string())),
        }
    }
}

/// Routes one inbound event to the sync or async translator.
///
/// Never returns an error: anything that goes wrong for an event ends up
/// in [`EventOutcome::Failure`] tagged with that event's id.
pub struct EventRouter {
    sync_translator: Arc<dyn SyncTranslator>,
    async_translator: Arc<dyn AsyncTranslator>,
}

impl EventRouter {
    pub fn new(
        sync_translator: Arc<dyn SyncTranslator>,
        async_translator: Arc<dyn AsyncTranslator>,
    ) -> Self {
        Self {
            sync_translator,
            async_translator,
        }
    }

    pub async fn route(&self, event: &InboundEvent) -> EventOutcome {
        let span = info_span!(
            "route_event",
            event.id = %event.event_id,
            messaging.destination.name = %event.subject,
            document.mime_type = field::Empty,
            document.size = field::Empty,
            translate.path = field::Empty,
            otel.status_code = field::Empty,
        );
        set_span_parent_from_headers(&span, event.headers.as_ref());

        async {
            let outcome = self.dispatch(event).await;
            let status = if outcome.is_success() { "OK" } else { "ERROR" };
            Span::current().record("otel.status_code", status);
            outcome
        }
        .instrument(span)
        .await
    }

    async fn dispatch(&self, event: &InboundEvent) -> EventOutcome {
        let event_id = event.event_id.clone();

        let cloud_event = match CloudEvent::from_slice(&event.payload) {
            Ok(cloud_event) => cloud_event,
            Err(cause) => {
                warn!(event_id = %event_id, error = %cause, "failed to decode document event");
                return EventOutcome::Failure { event_id, cause };
            }
        };

        let document = cloud_event.document_ref();
        let path = classify_document(&document);

        let span = Span::current();
        span.record("document.mime_type", document.mime_type.as_str());
        if let Some(size) = document.size {
            span.record("document.size", size);
        }
        span.record("translate.path", path.as_str());

        debug!(
            event_id = %event_id,
            cloud_event_id = %cloud_event.id,
            path = %path,
            "dispatching document event"
        );

        let result = match path {
            ProcessingPath::Sync => self.sync_translator.process_sync(&cloud_event).await,
            ProcessingPath::Async => self.async_translator.process_async(&cloud_event).await,
        };

        match result {
            Ok(result) => EventOutcome::Success {
                event_id,
                path,
                result,
            },
            Err(cause) => {
                warn!(
                    event_id = %event_id,
                    path = %path,
                    error = %cause,
                    "document translation failed"
                );
                EventOutcome::Failure { event_id, cause }
            }
        }
    }
}
