use crate::nats::traits::{
    Acknowledger, JetStreamConsumer, JetStreamPublisher, NatsRequester, PublishAck, PullConsumer,
};
use anyhow::{anyhow, Context, Result};
use async_nats::jetstream::{self, stream::Config as StreamConfig};
use async_nats::HeaderMap;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// JetStream's own default duplicate window
pub const DEFAULT_DUPLICATE_WINDOW: Duration = Duration::from_secs(120);

/// A stream owned by this service. It captures every subject below
/// `{name}.`; `Nats-Msg-Id` repeats inside `duplicate_window` are dropped.
#[derive(Debug, Clone)]
pub struct StreamSpec {
    pub name: String,
    pub description: String,
    pub duplicate_window: Duration,
}

impl StreamSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            duplicate_window: DEFAULT_DUPLICATE_WINDOW,
        }
    }

    pub fn with_duplicate_window(mut self, window: Duration) -> Self {
        self.duplicate_window = window;
        self
    }

    fn to_config(&self) -> StreamConfig {
        StreamConfig {
            name: self.name.clone(),
            subjects: vec![format!("{}.>", self.name)],
            description: Some(self.description.clone()),
            duplicate_window: self.duplicate_window,
            ..Default::default()
        }
    }
}

pub struct NatsClient {
    client: async_nats::Client,
    jetstream: jetstream::Context,
}

impl NatsClient {
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self> {
        info!(url = %url, timeout_ms = timeout.as_millis() as u64, "Connecting to NATS");

        let client = async_nats::ConnectOptions::new()
            .connection_timeout(timeout)
            .connect(url)
            .await
            .with_context(|| format!("Failed to connect to NATS at {}", url))?;

        let jetstream = jetstream::new(client.clone());

        info!("Connected to NATS");
        Ok(Self { client, jetstream })
    }

    /// Create the stream unless it already exists. An existing stream keeps
    /// its configuration.
    pub async fn ensure_stream(&self, stream: &StreamSpec) -> Result<()> {
        let created = self
            .jetstream
            .get_or_create_stream(stream.to_config())
            .await
            .with_context(|| format!("Failed to ensure stream {}", stream.name))?;

        let configured = &created.cached_info().config;
        if configured.duplicate_window != stream.duplicate_window {
            warn!(
                stream = %stream.name,
                configured_ms = configured.duplicate_window.as_millis() as u64,
                wanted_ms = stream.duplicate_window.as_millis() as u64,
                "existing stream has a different duplicate window"
            );
        }

        debug!(stream = %stream.name, "Stream ready");
        Ok(())
    }

    pub fn jetstream(&self) -> &jetstream::Context {
        &self.jetstream
    }

    pub fn create_consumer_client(&self) -> Arc<dyn JetStreamConsumer> {
        Arc::new(NatsJetStreamConsumer::new(self.jetstream.clone()))
    }

    pub fn create_publisher_client(&self) -> Arc<dyn JetStreamPublisher> {
        Arc::new(NatsJetStreamPublisher::new(self.jetstream.clone()))
    }

    pub fn create_requester_client(&self) -> Arc<dyn NatsRequester> {
        Arc::new(NatsCoreRequester::new(self.client.clone()))
    }

    /// Flush buffered publishes before the connection is dropped
    pub async fn close(self) {
        info!("Closing NATS connection");
        if let Err(e) = self.client.flush().await {
            error!(error = %e, "Failed to flush NATS connection on close");
        }
    }
}

pub struct NatsJetStreamConsumer {
    context: jetstream::Context,
}

impl NatsJetStreamConsumer {
    pub fn new(context: jetstream::Context) -> Self {
        Self { context }
    }
}

#[async_trait]
impl JetStreamConsumer for NatsJetStreamConsumer {
    async fn create_consumer(
        &self,
        config: jetstream::consumer::pull::Config,
        stream_name: &str,
    ) -> Result<Box<dyn PullConsumer>> {
        let durable = config.durable_name.clone().unwrap_or_default();
        let consumer = self
            .context
            .create_consumer_on_stream(config, stream_name)
            .await
            .with_context(|| format!("Failed to create consumer {} on {}", durable, stream_name))?;

        Ok(Box::new(NatsPullConsumer { consumer }))
    }
}

pub struct NatsPullConsumer {
    consumer: jetstream::consumer::PullConsumer,
}

#[async_trait]
impl PullConsumer for NatsPullConsumer {
    async fn fetch_messages(
        &self,
        max_messages: usize,
        expires: Duration,
    ) -> Result<Vec<jetstream::Message>> {
        let batch = self
            .consumer
            .fetch()
            .max_messages(max_messages)
            .expires(expires)
            .messages()
            .await
            .context("Failed to fetch messages")?;

        // A broken message is left for redelivery; the rest of the batch proceeds
        let messages = batch
            .filter_map(|received| async move {
                received
                    .map_err(|e| warn!(error = %e, "Dropping unreadable message from batch"))
                    .ok()
            })
            .collect::<Vec<_>>()
            .await;

        Ok(messages)
    }
}

#[async_trait]
impl Acknowledger for jetstream::Message {
    fn delivered(&self) -> i64 {
        self.info().map(|info| info.delivered).unwrap_or(1)
    }

    async fn ack(&self) -> Result<()> {
        jetstream::Message::ack(self)
            .await
            .map_err(|e| anyhow!("failed to ack message: {}", e))
    }

    async fn nak(&self, delay: Option<Duration>) -> Result<()> {
        self.ack_with(jetstream::AckKind::Nak(delay))
            .await
            .map_err(|e| anyhow!("failed to nak message: {}", e))
    }
}

pub struct NatsJetStreamPublisher {
    context: jetstream::Context,
}

impl NatsJetStreamPublisher {
    pub fn new(context: jetstream::Context) -> Self {
        Self { context }
    }
}

#[async_trait]
impl JetStreamPublisher for NatsJetStreamPublisher {
    #[instrument(
        skip(self, headers, payload),
        fields(subject = %subject, payload_size = payload.len())
    )]
    async fn publish_with_headers(
        &self,
        subject: String,
        headers: HeaderMap,
        payload: Bytes,
    ) -> Result<PublishAck> {
        let ack = self
            .context
            .publish_with_headers(subject, headers, payload)
            .await
            .context("Failed to publish message to JetStream")?
            .await
            .context("Failed to receive JetStream acknowledgment")?;

        Ok(PublishAck {
            stream: ack.stream,
            sequence: ack.sequence,
            duplicate: ack.duplicate,
        })
    }
}

/// Request/reply over the core connection; JetStream is not involved
pub struct NatsCoreRequester {
    client: async_nats::Client,
}

impl NatsCoreRequester {
    pub fn new(client: async_nats::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NatsRequester for NatsCoreRequester {
    #[instrument(
        skip(self, headers, payload),
        fields(subject = %subject, payload_size = payload.len())
    )]
    async fn request(
        &self,
        subject: String,
        headers: HeaderMap,
        payload: Bytes,
        timeout: Duration,
    ) -> Result<Bytes> {
        let reply = tokio::time::timeout(
            timeout,
            self.client.request_with_headers(subject, headers, payload),
        )
        .await
        .map_err(|_| anyhow!("request timed out after {}ms", timeout.as_millis()))?
        .context("Failed to send NATS request")?;

        Ok(reply.payload)
    }
}
