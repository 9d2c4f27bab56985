use anyhow::{anyhow, Result};
use async_nats::jetstream;
use async_nats::HeaderMap;
use bytes::Bytes;
use std::collections::{HashMap, HashSet};

/// A single delivered message, detached from the NATS connection.
///
/// Owns its data so it can move through Tower layers and into
/// concurrently polled per-event futures.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    /// Transport-assigned identifier used to ack/nak this message
    pub event_id: String,
    /// The NATS subject the message was published to
    pub subject: String,
    /// Serialized document-processing event
    pub payload: Bytes,
    /// Optional headers (used for trace context propagation)
    pub headers: Option<HeaderMap>,
}

impl InboundEvent {
    pub fn new(
        event_id: impl Into<String>,
        subject: impl Into<String>,
        payload: impl Into<Bytes>,
        headers: Option<HeaderMap>,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            subject: subject.into(),
            payload: payload.into(),
            headers,
        }
    }

    /// Build an event from a JetStream message.
    /// The stream sequence number becomes the event identifier.
    pub fn from_message(msg: &jetstream::Message) -> Result<Self> {
        let info = msg
            .info()
            .map_err(|e| anyhow!("message has no JetStream metadata: {}", e))?;

        Ok(Self {
            event_id: info.stream_sequence.to_string(),
            subject: msg.subject.to_string(),
            payload: msg.payload.clone(),
            headers: msg.headers.clone(),
        })
    }
}

/// A batch of events handed to the batch processing service
#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub events: Vec<InboundEvent>,
    pub stream_name: String,
    pub consumer_name: String,
}

impl BatchRequest {
    pub fn new(
        events: Vec<InboundEvent>,
        stream_name: impl Into<String>,
        consumer_name: impl Into<String>,
    ) -> Self {
        Self {
            events,
            stream_name: stream_name.into(),
            consumer_name: consumer_name.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// An event that must be redelivered, with the reason it failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItemFailure {
    pub event_id: String,
    pub reason: String,
}

/// Partial-batch response: which events to acknowledge, which to redeliver.
///
/// Every event id of the batch appears in exactly one of the two lists,
/// in order of first appearance in the batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchResult {
    pub succeeded: Vec<String>,
    pub failed: Vec<BatchItemFailure>,
}

impl BatchResult {
    /// Partition per-event resolutions, given in batch order.
    ///
    /// An id seen more than once is reported once; if any occurrence
    /// failed, the first failure reason wins.
    pub fn from_resolutions<I>(resolutions: I) -> Self
    where
        I: IntoIterator<Item = (String, std::result::Result<(), String>)>,
    {
        let mut order = Vec::new();
        let mut seen = HashSet::new();
        let mut failures: HashMap<String, String> = HashMap::new();

        for (event_id, resolution) in resolutions {
            if seen.insert(event_id.clone()) {
                order.push(event_id.clone());
            }
            if let Err(reason) = resolution {
                failures.entry(event_id).or_insert(reason);
            }
        }

        let mut result = Self::default();
        for event_id in order {
            match failures.remove(&event_id) {
                Some(reason) => result.failed.push(BatchItemFailure { event_id, reason }),
                None => result.succeeded.push(event_id),
            }
        }
        result
    }

    pub fn is_empty(&self) -> bool {
        self.succeeded.is_empty() && self.failed.is_empty()
    }

    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn failed_ids(&self) -> impl Iterator<Item = &str> {
        self.failed.iter().map(|f| f.event_id.as_str())
    }
}
