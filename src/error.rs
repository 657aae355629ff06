use std::path::PathBuf;

use s3::creds::error::CredentialsError;
use s3::error::S3Error;
use snafu::Snafu;

/// Errors raised by the fetch, unpack and organize pipelines.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    /// Environment variable {name} is not set
    MissingEnv { name: &'static str },

    /// AWS credential not provided or missing
    MissingCredentials { source: CredentialsError },

    /// Incomplete AWS credential provided: {missing} is not set
    PartialCredentials { missing: &'static str },

    /// Could not configure bucket {bucket}
    Bucket { bucket: String, source: S3Error },

    /// Could not list objects under prefix '{prefix}'
    ListObjects { prefix: String, source: S3Error },

    /// Could not get object {key}
    GetObject { key: String, source: S3Error },

    /// Could not put object {key}
    PutObject { key: String, source: S3Error },

    /// Object storage returned HTTP {code} for {key}
    UnexpectedStatus { key: String, code: u16 },

    /// Could not open archive {key}
    OpenArchive {
        key: String,
        source: zip::result::ZipError,
    },

    /// Could not read archive entry {name}
    ReadEntry {
        name: String,
        source: zip::result::ZipError,
    },

    /// Could not extract archive entry {name}
    ExtractEntry { name: String, source: std::io::Error },

    #[snafu(display("Could not create directory {}", path.display()))]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Could not write file {}", path.display()))]
    WriteFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Could not walk directory {}", root.display()))]
    WalkDir { root: PathBuf, source: walkdir::Error },

    #[snafu(display("Could not read DICOM file {}", path.display()))]
    ReadDicom {
        path: PathBuf,
        source: Box<dicom_object::ReadError>,
    },

    #[snafu(display("Could not move {} to {}", from.display(), to.display()))]
    MoveFile {
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Could not write metadata table {}", path.display()))]
    WriteCsv { path: PathBuf, source: csv::Error },
}

/// Coarse classification of an [`Error`], for callers that branch on
/// the kind of failure rather than its details.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A required setting is missing; nothing was attempted.
    Configuration,
    /// Credentials could not be resolved.
    Authentication,
    /// The object store rejected or failed a request.
    Storage,
    /// The zip archive or one of its entries is unreadable.
    Archive,
    /// Local filesystem failure.
    Filesystem,
    /// A file is not a readable DICOM file.
    Parse,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::MissingEnv { .. } => ErrorKind::Configuration,
            Error::MissingCredentials { .. } | Error::PartialCredentials { .. } => {
                ErrorKind::Authentication
            }
            Error::Bucket { .. }
            | Error::ListObjects { .. }
            | Error::GetObject { .. }
            | Error::PutObject { .. }
            | Error::UnexpectedStatus { .. } => ErrorKind::Storage,
            Error::OpenArchive { .. } | Error::ReadEntry { .. } | Error::ExtractEntry { .. } => {
                ErrorKind::Archive
            }
            Error::CreateDir { .. }
            | Error::WriteFile { .. }
            | Error::WalkDir { .. }
            | Error::MoveFile { .. }
            | Error::WriteCsv { .. } => ErrorKind::Filesystem,
            Error::ReadDicom { .. } => ErrorKind::Parse,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A single object, entry or file that could not be processed. The
/// pipeline that produced it kept going with the remaining items.
#[derive(Debug)]
pub struct ItemFailure {
    pub key: String,
    pub error: Error,
}

impl ItemFailure {
    pub fn new(key: impl Into<String>, error: Error) -> Self {
        ItemFailure {
            key: key.into(),
            error,
        }
    }
}
