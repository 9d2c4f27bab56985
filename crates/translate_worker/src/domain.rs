mod batch_coordinator;
mod classifier;
mod event_router;

pub use batch_coordinator::*;
pub use classifier::*;
pub use event_router::*;
