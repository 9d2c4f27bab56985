mod batch_service;
mod sync_translation_client;
mod translation_job_producer;

pub use batch_service::*;
pub use sync_translation_client::*;
pub use translation_job_producer::*;
