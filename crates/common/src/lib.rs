pub mod domain;
pub mod garde;
pub mod nats;
pub mod telemetry;

pub use domain::*;
pub use nats::*;

// Re-export mocks when testing feature is enabled
#[cfg(any(test, feature = "testing"))]
pub use domain::MockAsyncTranslator;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockSyncTranslator;
#[cfg(any(test, feature = "testing"))]
pub use nats::MockJetStreamConsumer;
#[cfg(any(test, feature = "testing"))]
pub use nats::MockJetStreamPublisher;
#[cfg(any(test, feature = "testing"))]
pub use nats::MockNatsRequester;
#[cfg(any(test, feature = "testing"))]
pub use nats::MockPullConsumer;
