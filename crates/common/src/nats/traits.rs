use anyhow::Result;
use async_nats::jetstream;
use async_nats::HeaderMap;
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

/// Trait for JetStream consumer operations
/// Abstracts the operations needed to create and use a NATS JetStream consumer
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait JetStreamConsumer: Send + Sync {
    /// Create a durable pull consumer on a stream
    async fn create_consumer(
        &self,
        config: jetstream::consumer::pull::Config,
        stream_name: &str,
    ) -> Result<Box<dyn PullConsumer>>;
}

/// Trait for pull consumer operations
/// Abstracts the fetch operation on a pull consumer
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait PullConsumer: Send + Sync {
    /// Fetch messages from the consumer
    /// Returns a batch of messages up to max_messages, waiting up to expires duration
    async fn fetch_messages(
        &self,
        max_messages: usize,
        expires: Duration,
    ) -> Result<Vec<jetstream::Message>>;
}

/// Stream position assigned to a published message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishAck {
    pub stream: String,
    pub sequence: u64,
    /// The stream already held a message with the same `Nats-Msg-Id`
    pub duplicate: bool,
}

/// Trait for JetStream publisher operations
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait JetStreamPublisher: Send + Sync {
    /// Publish a message with headers and await the JetStream acknowledgment
    async fn publish_with_headers(
        &self,
        subject: String,
        headers: HeaderMap,
        payload: Bytes,
    ) -> Result<PublishAck>;
}

/// Trait for core NATS request/reply
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait NatsRequester: Send + Sync {
    /// Send a request and wait up to `timeout` for the reply payload
    async fn request(
        &self,
        subject: String,
        headers: HeaderMap,
        payload: Bytes,
        timeout: Duration,
    ) -> Result<Bytes>;
}

/// Settles one delivered message with the server
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait Acknowledger: Send + Sync {
    /// How many times the server has delivered this message, starting at 1
    fn delivered(&self) -> i64;

    async fn ack(&self) -> Result<()>;

    /// Reject for redelivery, optionally not before `delay`
    async fn nak(&self, delay: Option<Duration>) -> Result<()>;
}
