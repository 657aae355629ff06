use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use snafu::Report;
use tracing::{error, info, warn};

use dicom_bucket_tools::fetch::{DEFAULT_BUCKET, DEFAULT_DOWNLOAD_DIR, DEFAULT_PREFIX, DICOM_SUFFIX};
use dicom_bucket_tools::organize::{
    CONFLICT_LOG, DEFAULT_DESTINATION_DIR, DEFAULT_METADATA_CSV, DEFAULT_SOURCE_DIR,
};
use dicom_bucket_tools::unpack::DEFAULT_ARCHIVE_KEY;
use dicom_bucket_tools::{
    fetch, organize, unpack, write_outputs, Error, ErrorKind, FetchOptions, RunLogging, S3Config,
    S3Store, UnpackOptions, DEFAULT_LOGS_DIR,
};

/// Acquire and organize DICOM files stored in S3
#[derive(Debug, Parser)]
#[command(name = "dicom-bucket-tools", version)]
struct App {
    /// directory receiving info.log and error.log
    #[arg(long, global = true, default_value = DEFAULT_LOGS_DIR)]
    logs_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Download the DICOM files under a bucket prefix
    Fetch {
        /// bucket to read from
        #[arg(long, default_value = DEFAULT_BUCKET)]
        bucket: String,
        /// key prefix of the files
        #[arg(long, default_value = DEFAULT_PREFIX)]
        prefix: String,
        /// local directory to save the files in
        #[arg(long, default_value = DEFAULT_DOWNLOAD_DIR)]
        local_dir: PathBuf,
        /// only download keys ending with this suffix
        #[arg(long, default_value = DICOM_SUFFIX)]
        suffix: String,
        /// do not show a progress bar
        #[arg(long)]
        no_progress: bool,
    },
    /// Expand a zip archive in the bucket named by S3_BUCKET back into it
    Unpack {
        /// key of the archive
        #[arg(long, default_value = DEFAULT_ARCHIVE_KEY)]
        archive_key: String,
        /// prefix for the extracted object keys
        #[arg(long, default_value_t)]
        key_prefix: String,
    },
    /// Sort local DICOM files into patient/study folders
    Organize {
        /// directory containing the downloaded files
        #[arg(long, default_value = DEFAULT_SOURCE_DIR)]
        source_dir: PathBuf,
        /// root of the reorganized tree
        #[arg(long, default_value = DEFAULT_DESTINATION_DIR)]
        destination_dir: PathBuf,
        /// metadata table output
        #[arg(long, default_value = DEFAULT_METADATA_CSV)]
        metadata_csv: PathBuf,
        /// conflict log output [default: <logs-dir>/conflict_log.txt]
        #[arg(long)]
        conflict_log: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let app = App::parse();

    let logging = match RunLogging::install(&app.logs_dir) {
        Ok(logging) => logging,
        Err(e) => {
            eprintln!("{}", Report::from_error(e));
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Could not start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(app.command, logging.log_dir())) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log_failure(&e);
            match e.kind() {
                ErrorKind::Configuration => ExitCode::from(2),
                _ => ExitCode::FAILURE,
            }
        }
    }
}

fn log_failure(e: &Error) {
    match e {
        Error::MissingCredentials { .. } => {
            error!("AWS credential not provided or missing.");
            error!("{}", Report::from_error(e));
        }
        Error::PartialCredentials { .. } => {
            error!("Incomplete AWS credential provided.");
            error!("{}", Report::from_error(e));
        }
        e if e.kind() == ErrorKind::Configuration => error!("{}", Report::from_error(e)),
        e => error!("Unexpected error: {}", Report::from_error(e)),
    }
}

async fn run(command: Command, logs_dir: &Path) -> Result<(), Error> {
    match command {
        Command::Fetch {
            bucket,
            prefix,
            local_dir,
            suffix,
            no_progress,
        } => {
            let store = S3Store::connect(&S3Config::new(bucket))?;
            let options = FetchOptions {
                prefix,
                local_dir,
                suffix,
                progress: !no_progress,
            };
            let report = fetch(&store, &options).await?;
            if !report.is_complete() {
                warn!(
                    "{} of {} files could not be downloaded",
                    report.failures.len(),
                    report.downloaded.len() + report.failures.len()
                );
            }
        }
        Command::Unpack {
            archive_key,
            key_prefix,
        } => {
            let config = S3Config::from_env()?;
            let store = S3Store::connect(&config)?;
            let options = UnpackOptions {
                archive_key,
                key_prefix,
            };
            let report = unpack(&store, &options).await?;
            info!(
                "{} entries uploaded, {} directory entries skipped",
                report.uploaded.len(),
                report.skipped_directories
            );
            if !report.is_complete() {
                warn!("{} entries could not be uploaded", report.failures.len());
            }
        }
        Command::Organize {
            source_dir,
            destination_dir,
            metadata_csv,
            conflict_log,
        } => {
            let conflict_log = conflict_log.unwrap_or_else(|| logs_dir.join(CONFLICT_LOG));
            let report = organize(&source_dir, &destination_dir)?;
            write_outputs(&report, &metadata_csv, &conflict_log)?;
            info!(
                "{} files recorded, {} moved, {} conflicts, {} missing identifiers, {} unreadable",
                report.table.len(),
                report.moved.len(),
                report.conflicts.len(),
                report.missing_identifiers.len(),
                report.unreadable.len()
            );
        }
    }
    Ok(())
}
