pub mod domain;
pub mod nats;
pub mod translate_worker;

pub use domain::*;
pub use nats::*;
pub use translate_worker::*;
