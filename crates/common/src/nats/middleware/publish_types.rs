use crate::nats::PublishAck;
use async_nats::HeaderMap;
use bytes::Bytes;

/// JetStream de-duplication header
pub const NATS_MSG_ID: &str = "Nats-Msg-Id";

/// Outbound JetStream message
#[derive(Debug, Clone)]
pub struct PublishRequest {
    pub subject: String,
    pub payload: Bytes,
    /// Trace context is injected here by the tracing layer
    pub headers: HeaderMap,
}

impl PublishRequest {
    pub fn new(subject: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            subject: subject.into(),
            payload: payload.into(),
            headers: HeaderMap::new(),
        }
    }

    /// Set the JetStream message id so a republish of the same logical
    /// message inside the stream's duplicate window is dropped
    pub fn with_message_id(mut self, message_id: &str) -> Self {
        self.headers.insert(NATS_MSG_ID, message_id);
        self
    }

    pub fn with_header(mut self, name: &'static str, value: &str) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn message_id(&self) -> Option<&str> {
        self.headers.get(NATS_MSG_ID).map(|v| v.as_str())
    }
}

#[derive(Debug)]
pub struct PublishResponse {
    pub subject: String,
    pub ack: PublishAck,
}

impl PublishResponse {
    /// True when the stream dropped the message as a repeat of an earlier one
    pub fn was_duplicate(&self) -> bool {
        self.ack.duplicate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_id_round_trips_through_headers() {
        let req = PublishRequest::new("translation_jobs.submitted", "{}").with_message_id("evt-1");

        assert_eq!(req.message_id(), Some("evt-1"));
        assert_eq!(
            req.headers.get(NATS_MSG_ID).map(|v| v.as_str()),
            Some("evt-1")
        );
    }

    #[test]
    fn test_plain_request_has_no_message_id() {
        let req = PublishRequest::new("translated_documents.fr", "{}")
            .with_header("Content-Type", "application/json");

        assert_eq!(req.message_id(), None);
        assert_eq!(
            req.headers.get("Content-Type").map(|v| v.as_str()),
            Some("application/json")
        );
    }
}
