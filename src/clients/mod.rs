pub mod batch_status_client;
pub mod extraction_client;

pub use batch_status_client::{BatchStatusSource, HttpBatchStatusClient};
pub use extraction_client::{submit_with_timeout, ExtractionClient, HttpExtractionClient};
