mod batch_logging;
mod batch_tracing;
mod batch_types;
mod publish_logging;
mod publish_tracing;
mod publish_types;
mod publisher;

pub use batch_logging::*;
pub use batch_tracing::*;
pub use batch_types::*;
pub use publish_logging::*;
pub use publish_tracing::*;
pub use publish_types::*;
pub use publisher::*;
