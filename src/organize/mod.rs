use std::io::Write;
use std::path::{Path, PathBuf};

use snafu::ResultExt;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::error::{CreateDirSnafu, ItemFailure, Result, WalkDirSnafu, WriteFileSnafu};
use crate::utils::{is_hidden, move_file};

mod record;
#[cfg(test)]
pub(crate) mod testing;

pub use record::{read_record, DicomRecord, MetadataTable};

pub const DEFAULT_SOURCE_DIR: &str = "./dicom_data";
pub const DEFAULT_DESTINATION_DIR: &str = "./reorganized_dicom_data";
pub const DEFAULT_METADATA_CSV: &str = "./dicom_metadata.csv";
pub const CONFLICT_LOG: &str = "conflict_log.txt";

/// Outcome of one organize run.
#[derive(Debug, Default)]
pub struct OrganizeReport {
    /// One record per parsed file, in traversal order.
    pub table: MetadataTable,
    /// `Duplicate file: <source>` for each file whose destination was taken.
    pub conflicts: Vec<String>,
    /// Destination paths of the files that were moved.
    pub moved: Vec<PathBuf>,
    /// Parsed files left in place because PatientID or StudyInstanceUID is absent.
    pub missing_identifiers: Vec<PathBuf>,
    /// Files that could not be parsed as DICOM.
    pub unreadable: Vec<ItemFailure>,
    /// Filesystem failures while walking or moving.
    pub failures: Vec<ItemFailure>,
}

impl OrganizeReport {
    /// Every readable file with both identifiers was moved without conflict.
    pub fn is_complete(&self) -> bool {
        self.conflicts.is_empty()
            && self.missing_identifiers.is_empty()
            && self.unreadable.is_empty()
            && self.failures.is_empty()
    }
}

/// Where a file ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    Moved(PathBuf),
    /// The destination already existed; the source was left in place.
    Conflict,
}

/// `<destination_dir>/<patient_id>/<study_uid>/`
pub fn study_dir(destination_dir: &Path, patient_id: &str, study_uid: &str) -> PathBuf {
    destination_dir
        .join(path_component(patient_id))
        .join(path_component(study_uid))
}

// identifiers come from file contents and must stay a single path segment
fn path_component(id: &str) -> String {
    let component = id.replace(['/', '\\'], "_");
    if component == "." || component == ".." {
        component.replace('.', "_")
    } else {
        component
    }
}

/// Move `file` into its study directory unless a file with the same name
/// is already there.
pub fn reorganize_file(
    file: &Path,
    destination_dir: &Path,
    patient_id: &str,
    study_uid: &str,
) -> Result<Placement> {
    let target_dir = study_dir(destination_dir, patient_id, study_uid);
    std::fs::create_dir_all(&target_dir).context(CreateDirSnafu { path: &target_dir })?;

    let target = match file.file_name() {
        Some(name) => target_dir.join(name),
        None => target_dir,
    };
    if target.exists() {
        warn!("Duplicate file detected: {}. Skipping.", file.display());
        return Ok(Placement::Conflict);
    }

    move_file(file, &target)?;
    info!("Moved {} to {}", file.display(), target.display());
    Ok(Placement::Moved(target))
}

/// Walk `source_dir`, record the metadata of every DICOM file and move
/// each one to `<destination_dir>/<PatientID>/<StudyInstanceUID>/`.
///
/// Hidden files are ignored. Files that are not DICOM stay where they
/// are and produce no record. Files missing either identifier produce a
/// record but are not moved. A file whose destination already exists is
/// not moved and is noted as a conflict.
pub fn organize(source_dir: &Path, destination_dir: &Path) -> Result<OrganizeReport> {
    let mut report = OrganizeReport::default();

    let walker = WalkDir::new(source_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0 || !e.file_type().is_dir() || !same_dir(e.path(), destination_dir)
        });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => {
                return Err(e).context(WalkDirSnafu { root: source_dir });
            }
            Err(e) => {
                let key = e
                    .path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default();
                error!("Could not read {}: {}", key, e);
                report
                    .failures
                    .push(ItemFailure::new(key, crate::error::Error::WalkDir {
                        root: source_dir.to_path_buf(),
                        source: e,
                    }));
                continue;
            }
        };
        if entry.path_is_symlink() {
            debug!("Skipping symbolic link: {}", entry.path().display());
            continue;
        }
        if !entry.file_type().is_file() {
            continue;
        }

        let file_name = entry.file_name().to_string_lossy();
        if is_hidden(&file_name) {
            info!("Skipping hidden/system file: {}", file_name);
            continue;
        }

        let path = entry.path();
        let record = match read_record(path) {
            Ok(record) => record,
            Err(e) => {
                warn!("Invalid DICOM file: {}: {}", path.display(), snafu::Report::from_error(&e));
                report
                    .unreadable
                    .push(ItemFailure::new(path.display().to_string(), e));
                continue;
            }
        };

        let identifiers = record
            .identifiers()
            .map(|(patient, study)| (patient.to_string(), study.to_string()));
        report.table.push(record);

        let Some((patient_id, study_uid)) = identifiers else {
            warn!("Missing metadata for file: {}, skipping.", path.display());
            report.missing_identifiers.push(path.to_path_buf());
            continue;
        };

        match reorganize_file(path, destination_dir, &patient_id, &study_uid) {
            Ok(Placement::Moved(target)) => report.moved.push(target),
            Ok(Placement::Conflict) => report
                .conflicts
                .push(format!("Duplicate file: {}", path.display())),
            Err(e) => {
                error!("{}", snafu::Report::from_error(&e));
                report
                    .failures
                    .push(ItemFailure::new(path.display().to_string(), e));
            }
        }
    }

    Ok(report)
}

// false when either path does not resolve
fn same_dir(dir: &Path, other: &Path) -> bool {
    match (dir.canonicalize(), other.canonicalize()) {
        (Ok(dir), Ok(other)) => dir == other,
        _ => false,
    }
}

/// Files written by [`write_outputs`]; `None` when there was nothing to write.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct OrganizeOutputs {
    pub metadata_csv: Option<PathBuf>,
    pub conflict_log: Option<PathBuf>,
}

/// Persist the metadata table as CSV and the conflicts one per line.
/// Either file is skipped when it would be empty.
pub fn write_outputs(
    report: &OrganizeReport,
    metadata_csv: &Path,
    conflict_log: &Path,
) -> Result<OrganizeOutputs> {
    let mut outputs = OrganizeOutputs::default();

    if report.table.is_empty() {
        info!("No valid DICOM metadata found.");
    } else {
        report.table.write_csv(metadata_csv)?;
        info!("Metadata extracted and saved to {}", metadata_csv.display());
        outputs.metadata_csv = Some(metadata_csv.to_path_buf());
    }

    if !report.conflicts.is_empty() {
        write_conflict_log(&report.conflicts, conflict_log)?;
        info!("File conflicts logged in {}", conflict_log.display());
        outputs.conflict_log = Some(conflict_log.to_path_buf());
    }

    Ok(outputs)
}

fn write_conflict_log(conflicts: &[String], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).context(CreateDirSnafu { path: parent })?;
    }
    let mut file = std::fs::File::create(path).context(WriteFileSnafu { path })?;
    for entry in conflicts {
        writeln!(file, "{}", entry).context(WriteFileSnafu { path })?;
    }
    Ok(())
}
