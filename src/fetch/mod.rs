use std::path::{Path, PathBuf};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use snafu::{Report, ResultExt};
use tracing::{error, info, warn};

use crate::error::{CreateDirSnafu, ItemFailure, Result};
use crate::utils::{key_file_name, sanitize_key, ObjectStore};

pub const DEFAULT_BUCKET: &str = "ct-scan-proj-data";
pub const DEFAULT_PREFIX: &str = "lidc_small_dset/";
pub const DEFAULT_DOWNLOAD_DIR: &str = "./dicom_data/";
pub const DICOM_SUFFIX: &str = ".dcm";

/// What to download and where.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Only keys under this prefix are listed
    pub prefix: String,
    /// Local directory receiving the files, created if absent
    pub local_dir: PathBuf,
    /// Keys not ending with this suffix are skipped
    pub suffix: String,
    /// Show a progress bar while downloading
    pub progress: bool,
}

impl FetchOptions {
    pub fn new(prefix: impl Into<String>, local_dir: impl Into<PathBuf>) -> Self {
        FetchOptions {
            prefix: prefix.into(),
            local_dir: local_dir.into(),
            suffix: DICOM_SUFFIX.to_string(),
            progress: false,
        }
    }
}

impl Default for FetchOptions {
    fn default() -> Self {
        FetchOptions::new(DEFAULT_PREFIX, DEFAULT_DOWNLOAD_DIR)
    }
}

/// Outcome of one fetch run.
#[derive(Debug, Default)]
pub struct FetchReport {
    /// Number of keys found under the prefix
    pub listed: usize,
    /// Local files written, in listing order
    pub downloaded: Vec<PathBuf>,
    /// Folder placeholders and keys with another suffix
    pub skipped: usize,
    /// Objects that could not be downloaded
    pub failures: Vec<ItemFailure>,
}

impl FetchReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Local path for `key`: the whole key flattened into one file name.
pub fn local_path_for(local_dir: &Path, key: &str) -> PathBuf {
    local_dir.join(sanitize_key(key))
}

fn wants(key: &str, suffix: &str) -> bool {
    let file_name = key_file_name(key);
    !file_name.is_empty() && file_name.ends_with(suffix)
}

/// Download every object under `options.prefix` whose key ends with the
/// configured suffix into `options.local_dir`.
///
/// Listing failures abort the run. A failed download is logged, recorded
/// in the report, and the remaining objects are still fetched.
pub async fn fetch(store: &dyn ObjectStore, options: &FetchOptions) -> Result<FetchReport> {
    info!(
        "Fetching file list from bucket: {}, prefix: {}",
        store.name(),
        options.prefix
    );
    let keys = store.list_all(&options.prefix).await?;

    std::fs::create_dir_all(&options.local_dir).context(CreateDirSnafu {
        path: &options.local_dir,
    })?;

    let mut report = FetchReport {
        listed: keys.len(),
        ..Default::default()
    };
    if keys.is_empty() {
        warn!("No files found in the specified S3 prefix.");
        return Ok(report);
    }

    let (wanted, skipped): (Vec<String>, Vec<String>) =
        keys.into_iter().partition(|key| wants(key, &options.suffix));
    report.skipped = skipped.len();

    let progress_bar = if options.progress {
        let bar = ProgressBar::new(wanted.len() as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40} {pos}/{len} {wide_msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar.enable_steady_tick(Duration::from_millis(480));
        bar
    } else {
        ProgressBar::hidden()
    };

    for key in wanted {
        let local_path = local_path_for(&options.local_dir, &key);
        info!("Downloading {} to {}", key, local_path.display());
        progress_bar.set_message(key.clone());

        match store.download_to(&key, &local_path).await {
            Ok(_) => report.downloaded.push(local_path),
            Err(e) => {
                error!("Failed to download {}: {}", key, Report::from_error(&e));
                report.failures.push(ItemFailure::new(key, e));
            }
        }
        progress_bar.inc(1);
    }
    progress_bar.finish_and_clear();

    info!(
        "Downloaded {} of {} files ({} failed)",
        report.downloaded.len(),
        report.downloaded.len() + report.failures.len(),
        report.failures.len()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::utils::memory_store::MemoryStore;

    #[test]
    fn test_local_path_for() {
        let path = local_path_for(Path::new("dicom_data"), "studies/2020-01-01 scan/img1.dcm");
        assert_eq!(path, Path::new("dicom_data/studies_2020-01-01scan_img1.dcm"));
    }

    #[test]
    fn test_wants() {
        assert!(wants("lidc/LIDC-0001/1-001.dcm", ".dcm"));
        assert!(!wants("lidc/LIDC-0001/", ".dcm"));
        assert!(!wants("lidc/LIDC-0001/annotations.xml", ".dcm"));
    }

    #[tokio::test]
    async fn test_fetch_downloads_matching_objects() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::with_page_size(2);
        store.insert("lidc/", vec![]);
        store.insert("lidc/LIDC-0001/1-001.dcm", b"one".to_vec());
        store.insert("lidc/LIDC-0001/1-002.dcm", b"two".to_vec());
        store.insert("lidc/LIDC-0001/notes.xml", b"<xml/>".to_vec());
        store.insert("lidc/LIDC 0002/1-001.dcm", b"three".to_vec());
        store.insert("other/1-001.dcm", b"elsewhere".to_vec());

        let local_dir = dir.path().join("dicom_data");
        let report = fetch(&store, &FetchOptions::new("lidc/", &local_dir))
            .await
            .unwrap();

        assert_eq!(report.listed, 5);
        assert_eq!(report.skipped, 2);
        assert!(report.is_complete());
        assert_eq!(
            report.downloaded,
            vec![
                local_dir.join("lidc_LIDC0002_1-001.dcm"),
                local_dir.join("lidc_LIDC-0001_1-001.dcm"),
                local_dir.join("lidc_LIDC-0001_1-002.dcm"),
            ]
        );
        assert_eq!(
            std::fs::read(local_dir.join("lidc_LIDC0002_1-001.dcm")).unwrap(),
            b"three"
        );
        assert!(!local_dir.join("lidc_LIDC-0001_notes.xml").exists());
    }

    #[tokio::test]
    async fn test_fetch_continues_after_failed_download() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::default();
        store.insert("scans/a.dcm", b"a".to_vec());
        store.insert("scans/b.dcm", b"b".to_vec());
        store.insert("scans/c.dcm", b"c".to_vec());
        store.fail_on("scans/b.dcm");

        let report = fetch(&store, &FetchOptions::new("scans/", dir.path()))
            .await
            .unwrap();

        assert_eq!(report.downloaded.len(), 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].key, "scans/b.dcm");
        assert_eq!(report.failures[0].error.kind(), ErrorKind::Storage);
        assert!(dir.path().join("scans_c.dcm").exists());
        assert!(!report.is_complete());
    }

    #[tokio::test]
    async fn test_fetch_empty_prefix_creates_dir() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::default();
        let local_dir = dir.path().join("empty");

        let report = fetch(&store, &FetchOptions::new("nothing/", &local_dir))
            .await
            .unwrap();

        assert_eq!(report.listed, 0);
        assert!(report.downloaded.is_empty());
        assert!(local_dir.is_dir());
    }
}
