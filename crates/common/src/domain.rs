mod cloud_event;
mod model_parameters;
mod result;
mod translation;

pub use cloud_event::*;
pub use model_parameters::*;
pub use result::*;
pub use translation::*;
