use std::fmt;
use std::path::{Path, PathBuf};

use snafu::ResultExt;
use tracing::{Event, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

use crate::error::{CreateDirSnafu, Result};

pub const INFO_LOG: &str = "info.log";
pub const ERROR_LOG: &str = "error.log";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S,%3f";

/// Formats file log lines as `<timestamp> - <LEVEL> - <message>`.
struct LineFormat;

impl<S, N> FormatEvent<S, N> for LineFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        write!(
            writer,
            "{} - {} - ",
            chrono::Local::now().format(TIMESTAMP_FORMAT),
            event.metadata().level()
        )?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Logging for a single run: console output plus two append-only files
/// under `log_dir`, one taking INFO and above, one taking only ERROR.
///
/// The subscriber is the default for the current thread only while this
/// value lives. Dropping it flushes both files.
pub struct RunLogging {
    log_dir: PathBuf,
    _default: tracing::subscriber::DefaultGuard,
    _guards: Vec<WorkerGuard>,
}

impl RunLogging {
    pub fn install(log_dir: impl AsRef<Path>) -> Result<Self> {
        Self::build(log_dir.as_ref(), true)
    }

    /// Same as [`RunLogging::install`] without the console layer.
    pub fn install_files_only(log_dir: impl AsRef<Path>) -> Result<Self> {
        Self::build(log_dir.as_ref(), false)
    }

    fn build(log_dir: &Path, console: bool) -> Result<Self> {
        std::fs::create_dir_all(log_dir).context(CreateDirSnafu { path: log_dir })?;

        let (info_writer, info_guard) =
            tracing_appender::non_blocking(tracing_appender::rolling::never(log_dir, INFO_LOG));
        let (error_writer, error_guard) =
            tracing_appender::non_blocking(tracing_appender::rolling::never(log_dir, ERROR_LOG));

        let console_layer = console.then(|| {
            let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_filter(filter)
        });

        let subscriber = tracing_subscriber::registry()
            .with(console_layer)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(info_writer)
                    .with_ansi(false)
                    .event_format(LineFormat)
                    .with_filter(LevelFilter::INFO),
            )
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(error_writer)
                    .with_ansi(false)
                    .event_format(LineFormat)
                    .with_filter(LevelFilter::ERROR),
            );

        Ok(RunLogging {
            log_dir: log_dir.to_path_buf(),
            _default: tracing::subscriber::set_default(subscriber),
            _guards: vec![info_guard, error_guard],
        })
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }
}
