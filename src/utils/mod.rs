pub mod s3;
pub mod dicom_tags;
pub mod helpers;
pub mod logging;

#[cfg(test)]
pub(crate) mod memory_store;

// Re-export commonly used items
pub use s3::{S3Config, S3Store, ObjectStore, ListPage, build_s3_bucket, resolve_credentials};
pub use dicom_tags::*;
pub use helpers::*;
pub use logging::RunLogging;
