#![deny(clippy::all)]

//! Acquire and organize DICOM files kept in S3-compatible object storage.
//!
//! - [`fetch`] downloads the DICOM objects under a bucket prefix.
//! - [`unpack`] expands a zip archive stored in a bucket back into it.
//! - [`organize`] sorts local DICOM files into `<PatientID>/<StudyInstanceUID>/`
//!   folders and collects their metadata.

pub mod error;
pub mod fetch;
pub mod organize;
pub mod unpack;
pub mod utils;

pub use error::{Error, ErrorKind, ItemFailure, Result};
pub use fetch::{fetch, FetchOptions, FetchReport};
pub use organize::{organize, write_outputs, DicomRecord, MetadataTable, OrganizeReport};
pub use unpack::{unpack, UnpackOptions, UnpackReport};
pub use utils::{ObjectStore, RunLogging, S3Config, S3Store};

pub const DEFAULT_LOGS_DIR: &str = "./logs";
