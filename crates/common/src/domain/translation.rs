use crate::domain::cloud_event::CloudEvent;
use crate::domain::model_parameters::ModelParameters;
use crate::domain::result::DomainResult;
use crate::garde::validate_struct;
use async_trait::async_trait;
use garde::Validate;
use serde::{Deserialize, Serialize};

/// Translation settings forwarded with every sync request and async job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct TranslationSettings {
    #[garde(length(min = 1), inner(length(min = 2)))]
    pub target_languages: Vec<String>,

    /// Source language; `None` lets the backend detect it
    #[garde(skip)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_language: Option<String>,

    #[garde(dive)]
    #[serde(default)]
    pub model_parameters: ModelParameters,
}

impl TranslationSettings {
    pub fn new(
        target_languages: Vec<String>,
        source_language: Option<String>,
        model_parameters: ModelParameters,
    ) -> DomainResult<Self> {
        let settings = Self {
            target_languages,
            source_language,
            model_parameters,
        };
        validate_struct(&settings)?;
        Ok(settings)
    }
}

/// A document produced by the translation backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslatedDocument {
    pub language: String,
    pub url: String,
    #[serde(rename = "type")]
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// What a translation processor reports back for one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranslationOutcome {
    /// Translation finished inline
    Completed { documents: Vec<TranslatedDocument> },
    /// Translation job accepted; results arrive through a later event
    Submitted { job_id: String },
}

/// Inline translation of small, supported documents
///
/// Implementations must return within the batch's processing budget.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait SyncTranslator: Send + Sync {
    async fn process_sync(&self, event: &CloudEvent) -> DomainResult<TranslationOutcome>;
}

/// Out-of-band translation of large or unsupported documents
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait AsyncTranslator: Send + Sync {
    async fn process_async(&self, event: &CloudEvent) -> DomainResult<TranslationOutcome>;
}
