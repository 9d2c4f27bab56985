use anyhow::{bail, Context};
use common::domain::{DomainResult, ModelParameters, TranslationSettings};
use common::nats::RedeliveryPolicy;
use config::{Config, ConfigError, Environment};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Stdout log format (json, compact)
    #[serde(default = "default_log_format")]
    pub log_format: String,

    // NATS configuration
    /// NATS server URL
    #[serde(default = "default_nats_url")]
    pub nats_url: String,

    /// Stream carrying inbound document events
    #[serde(default = "default_documents_stream")]
    pub documents_stream: String,

    /// Subject filter for the document consumer
    #[serde(default = "default_documents_subject")]
    pub documents_subject: String,

    /// Durable consumer name
    #[serde(default = "default_consumer_name")]
    pub consumer_name: String,

    /// Batch size for consumer
    #[serde(default = "default_nats_batch_size")]
    pub nats_batch_size: usize,

    /// Max wait time for batches in seconds
    #[serde(default = "default_nats_batch_wait_secs")]
    pub nats_batch_wait_secs: u64,

    /// Seconds a delivered document event may stay unacknowledged; must
    /// exceed the sync translation timeout
    #[serde(default = "default_ack_wait_secs")]
    pub ack_wait_secs: u64,

    /// Deliveries of one document event before JetStream drops it
    #[serde(default = "default_max_deliver")]
    pub max_deliver: i64,

    /// Nak delays in seconds per delivery attempt (comma-separated)
    #[serde(default = "default_nak_backoff_secs")]
    pub nak_backoff_secs: String,

    /// Events of one batch processed concurrently
    #[serde(default = "default_batch_concurrency")]
    pub batch_concurrency: usize,

    // Translation backends
    /// Request/reply subject of the inline translator
    #[serde(default = "default_sync_translation_subject")]
    pub sync_translation_subject: String,

    #[serde(default = "default_sync_translation_timeout_secs")]
    pub sync_translation_timeout_secs: u64,

    /// Stream receiving async translation jobs
    #[serde(default = "default_translation_jobs_stream")]
    pub translation_jobs_stream: String,

    /// Stream receiving events for translated documents
    #[serde(default = "default_translated_documents_stream")]
    pub translated_documents_stream: String,

    /// Dedupe window of the two output streams in seconds
    #[serde(default = "default_duplicate_window_secs")]
    pub duplicate_window_secs: u64,

    /// Target language codes (comma-separated)
    #[serde(default = "default_target_languages")]
    pub target_languages: String,

    /// Source language code; detected downstream when unset
    #[serde(default)]
    pub source_language: Option<String>,

    /// Model parameters as a JSON object
    #[serde(default)]
    pub model_parameters: String,

    /// Startup timeout for initialization operations in seconds
    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,

    // OpenTelemetry configuration
    /// OpenTelemetry OTLP endpoint (gRPC)
    #[serde(default = "default_otel_endpoint")]
    pub otel_endpoint: String,

    /// Enable OpenTelemetry export
    #[serde(default = "default_otel_enabled")]
    pub otel_enabled: bool,

    /// Service name for OpenTelemetry resource
    #[serde(default = "default_otel_service_name")]
    pub otel_service_name: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_nats_url() -> String {
    "nats://localhost:4222".to_string()
}

fn default_documents_stream() -> String {
    "documents".to_string()
}

fn default_documents_subject() -> String {
    "documents.>".to_string()
}

fn default_consumer_name() -> String {
    "translate-worker".to_string()
}

fn default_nats_batch_size() -> usize {
    10
}

fn default_nats_batch_wait_secs() -> u64 {
    5
}

fn default_ack_wait_secs() -> u64 {
    60
}

fn default_max_deliver() -> i64 {
    5
}

fn default_nak_backoff_secs() -> String {
    "1,5,30".to_string()
}

fn default_batch_concurrency() -> usize {
    10
}

fn default_sync_translation_subject() -> String {
    "translation.sync".to_string()
}

fn default_sync_translation_timeout_secs() -> u64 {
    30
}

fn default_translation_jobs_stream() -> String {
    "translation_jobs".to_string()
}

fn default_translated_documents_stream() -> String {
    "translated_documents".to_string()
}

fn default_duplicate_window_secs() -> u64 {
    120
}

fn default_target_languages() -> String {
    "en".to_string()
}

fn default_startup_timeout_secs() -> u64 {
    30
}

// OpenTelemetry defaults
fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_otel_enabled() -> bool {
    false
}

fn default_otel_service_name() -> String {
    "translate-all-in-one".to_string()
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Environment::with_prefix("TRANSLATE"))
            .build()?
            .try_deserialize()
    }

    pub fn target_language_list(&self) -> Vec<String> {
        self.target_languages
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Redelivery settings of the document consumer. A sync translation
    /// must finish inside the ack wait, or JetStream redelivers the event
    /// while it is still being handled.
    pub fn redelivery_policy(&self) -> anyhow::Result<RedeliveryPolicy> {
        if self.ack_wait_secs <= self.sync_translation_timeout_secs {
            bail!(
                "ack_wait_secs ({}) must be greater than sync_translation_timeout_secs ({})",
                self.ack_wait_secs,
                self.sync_translation_timeout_secs
            );
        }
        if self.max_deliver == 0 || self.max_deliver < -1 {
            bail!("max_deliver must be positive or -1 for unlimited, got {}", self.max_deliver);
        }

        let backoff = self
            .nak_backoff_secs
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<u64>()
                    .map(Duration::from_secs)
                    .with_context(|| format!("invalid nak backoff entry '{}'", s))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(RedeliveryPolicy {
            ack_wait: Duration::from_secs(self.ack_wait_secs),
            max_deliver: self.max_deliver,
            backoff,
        })
    }

    /// Parse and validate the settings forwarded to both translators
    pub fn translation_settings(&self) -> DomainResult<TranslationSettings> {
        let model_parameters = ModelParameters::from_json(&self.model_parameters)?;
        let source_language = self
            .source_language
            .as_ref()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        TranslationSettings::new(self.target_language_list(), source_language, model_parameters)
    }
}
