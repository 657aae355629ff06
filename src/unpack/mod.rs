use std::io::{Cursor, Read};

use snafu::{Report, ResultExt};
use tracing::{debug, error, info};
use zip::ZipArchive;

use crate::error::{ExtractEntrySnafu, ItemFailure, OpenArchiveSnafu, ReadEntrySnafu, Result};
use crate::utils::ObjectStore;

pub const DEFAULT_ARCHIVE_KEY: &str = "LIDCSmallDataset.zip";

#[derive(Debug, Clone)]
pub struct UnpackOptions {
    /// Key of the zip archive inside the bucket
    pub archive_key: String,
    /// Prepended to every entry name to form its object key
    pub key_prefix: String,
}

impl Default for UnpackOptions {
    fn default() -> Self {
        UnpackOptions {
            archive_key: DEFAULT_ARCHIVE_KEY.to_string(),
            key_prefix: String::new(),
        }
    }
}

#[derive(Debug, Default)]
pub struct UnpackReport {
    /// Object keys written, in archive order
    pub uploaded: Vec<String>,
    /// Directory entries, which are not uploaded
    pub skipped_directories: usize,
    /// Entries that could not be read or uploaded
    pub failures: Vec<ItemFailure>,
}

impl UnpackReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

fn read_entry(archive: &mut ZipArchive<Cursor<Vec<u8>>>, index: usize) -> Result<Option<(String, Vec<u8>)>> {
    let mut entry = archive
        .by_index(index)
        .context(ReadEntrySnafu { name: format!("#{}", index) })?;
    let name = entry.name().to_string();
    if entry.is_dir() {
        return Ok(None);
    }
    let mut content = Vec::with_capacity(entry.size() as usize);
    entry
        .read_to_end(&mut content)
        .context(ExtractEntrySnafu { name: &name })?;
    Ok(Some((name, content)))
}

/// Fetch the zip archive `options.archive_key` and upload each file it
/// contains back to the same store, keyed by its path inside the archive.
///
/// Fetching or opening the archive is fatal. An entry that cannot be
/// extracted or uploaded is recorded and the rest are still processed.
pub async fn unpack(store: &dyn ObjectStore, options: &UnpackOptions) -> Result<UnpackReport> {
    info!("Fetching archive {} from bucket {}", options.archive_key, store.name());
    let data = store.get_object(&options.archive_key).await?;
    let mut archive = ZipArchive::new(Cursor::new(data)).context(OpenArchiveSnafu {
        key: &options.archive_key,
    })?;

    let mut report = UnpackReport::default();
    for index in 0..archive.len() {
        let (name, content) = match read_entry(&mut archive, index) {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                report.skipped_directories += 1;
                continue;
            }
            Err(e) => {
                error!("{}", Report::from_error(&e));
                report.failures.push(ItemFailure::new(format!("#{}", index), e));
                continue;
            }
        };

        let key = format!("{}{}", options.key_prefix, name);
        debug!("Uploading {} ({} bytes)", key, content.len());
        match store.put_object(&key, &content).await {
            Ok(()) => report.uploaded.push(key),
            Err(e) => {
                error!("Failed to upload {}: {}", key, Report::from_error(&e));
                report.failures.push(ItemFailure::new(key, e));
            }
        }
    }

    info!(
        "Files extracted and uploaded to {}/{}",
        store.name(),
        options.key_prefix
    );
    Ok(report)
}
