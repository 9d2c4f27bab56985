use crate::domain::{EventOutcome, EventRouter};
use common::domain::DomainError;
use common::nats::{BatchResult, InboundEvent};
use futures::{FutureExt, StreamExt};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info};

pub const DEFAULT_BATCH_CONCURRENCY: usize = 10;

/// Runs every event of a batch through the router and partitions the
/// outcomes into acknowledged and redelivered ids.
///
/// Events are independent: one event failing, or panicking, never affects
/// the others. The partition is built in input order no matter which
/// events finish first.
pub struct BatchCoordinator {
    router: Arc<EventRouter>,
    max_concurrency: usize,
}

impl BatchCoordinator {
    /// `max_concurrency` is clamped to at least 1
    pub fn new(router: Arc<EventRouter>, max_concurrency: usize) -> Self {
        Self {
            router,
            max_concurrency: max_concurrency.max(1),
        }
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    pub async fn process_batch(&self, events: Vec<InboundEvent>) -> BatchResult {
        if events.is_empty() {
            return BatchResult::default();
        }

        let batch_size = events.len();
        debug!(
            batch_size,
            max_concurrency = self.max_concurrency,
            "processing event batch"
        );

        let mut outcomes: Vec<(usize, EventOutcome)> = futures::stream::iter(
            events.into_iter().enumerate(),
        )
        .map(|(position, event)| {
            let router = Arc::clone(&self.router);
            async move {
                let outcome = AssertUnwindSafe(router.route(&event))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| {
                        let reason = panic_message(panic.as_ref());
                        error!(
                            event_id = %event.event_id,
                            reason = %reason,
                            "event processing panicked"
                        );
                        EventOutcome::Failure {
                            event_id: event.event_id.clone(),
                            cause: DomainError::ProcessingError(format!("panic: {}", reason)),
                        }
                    });
                (position, outcome)
            }
        })
        .buffer_unordered(self.max_concurrency)
        .collect()
        .await;

        outcomes.sort_by_key(|(position, _)| *position);

        let result = BatchResult::from_resolutions(
            outcomes
                .into_iter()
                .map(|(_, outcome)| outcome.into_resolution()),
        );

        info!(
            batch_size,
            succeeded = result.succeeded.len(),
            failed = result.failed.len(),
            "event batch processed"
        );

        result
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
