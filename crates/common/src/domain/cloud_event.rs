use crate::domain::result::{DomainError, DomainResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Document-processing event exchanged between middlewares.
///
/// Follows the CloudEvents 1.0 envelope; the middleware-specific payload
/// lives under `data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudEvent {
    pub specversion: String,
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub time: DateTime<Utc>,
    pub data: DataEnvelope,
}

/// Payload of a document-processing event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataEnvelope {
    pub chain_id: String,
    /// The document that entered the pipeline
    pub source: Document,
    /// The document this event is about
    pub document: Document,
    #[serde(default = "empty_metadata")]
    pub metadata: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_type: Option<String>,
}

fn empty_metadata() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

/// Reference to a document held in external storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub url: String,
    #[serde(rename = "type")]
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
}

/// Read-only view over the attributes that drive routing decisions
pub trait DocumentMetadata {
    fn mime_type(&self) -> &str;

    /// Size in bytes, `None` when the producer did not declare it
    fn size(&self) -> Option<u64>;
}

impl DocumentMetadata for Document {
    fn mime_type(&self) -> &str {
        &self.mime_type
    }

    fn size(&self) -> Option<u64> {
        self.size
    }
}

/// The MIME type and size of the document under processing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRef {
    pub mime_type: String,
    pub size: Option<u64>,
}

impl DocumentRef {
    pub fn from_metadata(metadata: &impl DocumentMetadata) -> Self {
        Self {
            mime_type: metadata.mime_type().to_string(),
            size: metadata.size(),
        }
    }
}

impl CloudEvent {
    /// Decode an event from its JSON wire form
    pub fn from_slice(payload: &[u8]) -> DomainResult<Self> {
        serde_json::from_slice(payload)
            .map_err(|e| DomainError::DeserializationError(e.to_string()))
    }

    pub fn to_vec(&self) -> DomainResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| DomainError::RepositoryError(e.into()))
    }

    pub fn document(&self) -> &Document {
        &self.data.document
    }

    pub fn document_ref(&self) -> DocumentRef {
        DocumentRef::from_metadata(self.document())
    }

    /// Derive the event handed to the next middleware once `document` has
    /// been produced from this event's document
    pub fn with_output_document(&self, id: String, document: Document) -> Self {
        let mut next = self.clone();
        next.id = id;
        next.time = Utc::now();
        next.data.document = document;
        next
    }
}
