use crate::nats::{
    Acknowledger, BatchRequest, BatchResult, InboundEvent, JetStreamConsumer, PullConsumer,
};
use anyhow::{Context, Result};
use async_nats::jetstream::{self, Message};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower::{Service, ServiceExt};
use tracing::{debug, error, info, warn};

/// How long and how often JetStream redelivers an unsettled message.
///
/// `backoff` spaces out the redeliveries of nak'd messages: the n-th
/// delivery is nak'd with `backoff[n - 1]`, clamped to the last entry.
/// It is not put on the consumer itself, where the server would use it in
/// place of `ack_wait`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedeliveryPolicy {
    /// Time a delivered message may stay unacknowledged before redelivery
    pub ack_wait: Duration,
    /// Deliveries before the server gives up on a message
    pub max_deliver: i64,
    pub backoff: Vec<Duration>,
}

impl Default for RedeliveryPolicy {
    fn default() -> Self {
        Self {
            ack_wait: Duration::from_secs(60),
            max_deliver: 5,
            backoff: vec![
                Duration::from_secs(1),
                Duration::from_secs(5),
                Duration::from_secs(30),
            ],
        }
    }
}

impl RedeliveryPolicy {
    /// Nak delay for a message on its `delivered`-th delivery
    pub fn nak_delay(&self, delivered: i64) -> Option<Duration> {
        let attempt = usize::try_from(delivered.max(1) - 1).unwrap_or(usize::MAX);
        self.backoff
            .get(attempt)
            .or_else(|| self.backoff.last())
            .copied()
    }

    /// Whether the server will stop redelivering after this delivery
    pub fn is_final_delivery(&self, delivered: i64) -> bool {
        self.max_deliver > 0 && delivered >= self.max_deliver
    }
}

/// A JetStream pull consumer that hands whole batches to a Tower service.
///
/// The service answers with a `BatchResult`; succeeded events are acked,
/// failed events are nak'd for delayed redelivery. If the service fails, nothing
/// in the batch is acknowledged and JetStream redelivers all of it once
/// the ack-wait expires.
pub struct BatchConsumer<S> {
    consumer: Box<dyn PullConsumer>,
    stream_name: String,
    consumer_name: String,
    batch_size: usize,
    max_wait: Duration,
    redelivery: RedeliveryPolicy,
    service: S,
}

impl<S> BatchConsumer<S>
where
    S: Service<BatchRequest, Response = BatchResult, Error = anyhow::Error> + Send + 'static,
    S::Future: Send + 'static,
{
    /// Create (or bind to) the durable consumer and wrap it
    pub async fn new(
        jetstream: Arc<dyn JetStreamConsumer>,
        stream_name: &str,
        consumer_name: &str,
        subject_filter: &str,
        batch_size: usize,
        max_wait_secs: u64,
        redelivery: RedeliveryPolicy,
        service: S,
    ) -> Result<Self> {
        debug!(
            stream = %stream_name,
            consumer = %consumer_name,
            filter_subject = %subject_filter,
            "creating batch consumer"
        );

        let config = jetstream::consumer::pull::Config {
            name: Some(consumer_name.to_string()),
            durable_name: Some(consumer_name.to_string()),
            filter_subject: subject_filter.to_string(),
            ack_policy: jetstream::consumer::AckPolicy::Explicit,
            ack_wait: redelivery.ack_wait,
            max_deliver: redelivery.max_deliver,
            ..Default::default()
        };

        let consumer = jetstream
            .create_consumer(config, stream_name)
            .await
            .context("failed to create consumer")?;

        debug!(
            stream = %stream_name,
            consumer = %consumer_name,
            "batch consumer created successfully"
        );

        Ok(Self {
            consumer,
            stream_name: stream_name.to_string(),
            consumer_name: consumer_name.to_string(),
            batch_size,
            max_wait: Duration::from_secs(max_wait_secs),
            redelivery,
            service,
        })
    }

    /// Run the consumer loop until cancellation.
    ///
    /// Cancellation drops the in-flight batch; its messages stay
    /// unacknowledged and are redelivered.
    pub async fn run(mut self, ctx: CancellationToken) -> Result<()> {
        info!(
            stream = %self.stream_name,
            consumer = %self.consumer_name,
            "starting batch consumer"
        );

        loop {
            tokio::select! {
                _ = ctx.cancelled() => {
                    info!(
                        stream = %self.stream_name,
                        consumer = %self.consumer_name,
                        "received shutdown signal, stopping consumer"
                    );
                    break;
                }
                result = self.fetch_and_process_batch() => {
                    if let Err(e) = result {
                        error!(
                            stream = %self.stream_name,
                            consumer = %self.consumer_name,
                            error = %e,
                            "error processing batch"
                        );
                        // Continue processing despite errors
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        }

        debug!(
            stream = %self.stream_name,
            consumer = %self.consumer_name,
            "consumer stopped gracefully"
        );
        Ok(())
    }

    async fn fetch_and_process_batch(&mut self) -> Result<()> {
        debug!(
            batch_size = self.batch_size,
            max_wait_secs = self.max_wait.as_secs(),
            "fetching message batch"
        );

        let raw_messages = self
            .consumer
            .fetch_messages(self.batch_size, self.max_wait)
            .await?;

        if raw_messages.is_empty() {
            debug!("no messages in batch");
            return Ok(());
        }

        debug!(message_count = raw_messages.len(), "received message batch");

        let (events, by_event_id) = collect_events(&raw_messages);
        if events.is_empty() {
            return Ok(());
        }

        let request = BatchRequest::new(events, &self.stream_name, &self.consumer_name);
        let result = self
            .service
            .ready()
            .await?
            .call(request)
            .await
            .context("batch service failed, leaving batch unacknowledged")?;

        settle(&raw_messages, &by_event_id, result, &self.redelivery).await;
        Ok(())
    }
}

/// Convert messages to events, remembering which message each id came from.
/// Messages without JetStream metadata are skipped and left unacknowledged.
fn collect_events(messages: &[Message]) -> (Vec<InboundEvent>, HashMap<String, usize>) {
    let mut events = Vec::with_capacity(messages.len());
    let mut by_event_id = HashMap::with_capacity(messages.len());

    for (idx, msg) in messages.iter().enumerate() {
        match InboundEvent::from_message(msg) {
            Ok(event) => {
                by_event_id.insert(event.event_id.clone(), idx);
                events.push(event);
            }
            Err(e) => {
                warn!(
                    subject = %msg.subject,
                    error = %e,
                    "skipping message without JetStream metadata"
                );
            }
        }
    }

    (events, by_event_id)
}

/// Apply a batch result to the delivered messages. Each known id is
/// settled once; ids that match no message are logged and skipped.
async fn settle<M: Acknowledger>(
    messages: &[M],
    by_event_id: &HashMap<String, usize>,
    result: BatchResult,
    redelivery: &RedeliveryPolicy,
) {
    for event_id in &result.succeeded {
        let Some(msg) = by_event_id.get(event_id).and_then(|idx| messages.get(*idx)) else {
            warn!(event_id = %event_id, "ack for unknown event id");
            continue;
        };

        if let Err(e) = msg.ack().await {
            error!(event_id = %event_id, error = %e, "failed to acknowledge message");
        }
    }

    for failure in &result.failed {
        let Some(msg) = by_event_id
            .get(&failure.event_id)
            .and_then(|idx| messages.get(*idx))
        else {
            warn!(event_id = %failure.event_id, "nak for unknown event id");
            continue;
        };

        let delivered = msg.delivered();
        let delay = redelivery.nak_delay(delivered);
        if redelivery.is_final_delivery(delivered) {
            error!(
                event_id = %failure.event_id,
                delivered,
                reason = %failure.reason,
                "message failed on its last delivery and will not be redelivered"
            );
        } else {
            warn!(
                event_id = %failure.event_id,
                delivered,
                delay_ms = delay.map(|d| d.as_millis() as u64),
                reason = %failure.reason,
                "rejecting message for redelivery"
            );
        }

        if let Err(e) = msg.nak(delay).await {
            error!(event_id = %failure.event_id, error = %e, "failed to reject message");
        }
    }

    debug!(
        ack_count = result.succeeded.len(),
        nak_count = result.failed.len(),
        "settled message batch"
    );
}
