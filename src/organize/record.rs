use std::path::Path;

use dicom_dictionary_std::tags;
use dicom_object::{InMemDicomObject, OpenFileOptions};
use serde::{Serialize, Serializer};
use snafu::ResultExt;

use crate::error::{CreateDirSnafu, ReadDicomSnafu, Result, WriteCsvSnafu};
use crate::utils::{element_float, element_floats, element_int, element_text};

/// Metadata extracted from one DICOM file. Every field is optional: a
/// missing attribute is recorded as absent rather than failing the read.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DicomRecord {
    #[serde(rename = "PatientID")]
    pub patient_id: Option<String>,
    #[serde(rename = "StudyInstanceUID")]
    pub study_instance_uid: Option<String>,
    #[serde(rename = "SeriesInstanceUID")]
    pub series_instance_uid: Option<String>,
    #[serde(rename = "NumberOfSlices")]
    pub instance_number: Option<i32>,
    #[serde(rename = "SliceThickness")]
    pub slice_thickness: Option<f64>,
    #[serde(rename = "PixelSpacing", serialize_with = "serialize_spacing")]
    pub pixel_spacing: Option<Vec<f64>>,
    #[serde(rename = "StudyDate")]
    pub study_date: Option<String>,
    #[serde(rename = "AcquisitionDate")]
    pub acquisition_date: Option<String>,
}

impl DicomRecord {
    pub fn from_object(obj: &InMemDicomObject) -> Self {
        DicomRecord {
            patient_id: element_text(obj, tags::PATIENT_ID),
            study_instance_uid: element_text(obj, tags::STUDY_INSTANCE_UID),
            series_instance_uid: element_text(obj, tags::SERIES_INSTANCE_UID),
            instance_number: element_int(obj, tags::INSTANCE_NUMBER),
            slice_thickness: element_float(obj, tags::SLICE_THICKNESS),
            pixel_spacing: element_floats(obj, tags::PIXEL_SPACING),
            study_date: element_text(obj, tags::STUDY_DATE),
            acquisition_date: element_text(obj, tags::ACQUISITION_DATE),
        }
    }

    /// `(patient, study)` when both identifiers are present.
    pub fn identifiers(&self) -> Option<(&str, &str)> {
        Some((
            self.patient_id.as_deref()?,
            self.study_instance_uid.as_deref()?,
        ))
    }
}

// `[0.703125, 0.703125]`, empty when absent
fn serialize_spacing<S: Serializer>(value: &Option<Vec<f64>>, serializer: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(values) => {
            let parts: Vec<String> = values.iter().map(|v| v.to_string()).collect();
            serializer.serialize_str(&format!("[{}]", parts.join(", ")))
        }
        None => serializer.serialize_none(),
    }
}

/// Parse the header of the DICOM file at `path` and extract its metadata
/// record. Reading stops before the pixel data.
pub fn read_record(path: &Path) -> Result<DicomRecord> {
    let obj = OpenFileOptions::new()
        .read_until(tags::PIXEL_DATA)
        .open_file(path)
        .map_err(Box::from)
        .context(ReadDicomSnafu { path })?;
    Ok(DicomRecord::from_object(&obj))
}

/// Extracted records in traversal order, one row per parsed file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataTable {
    records: Vec<DicomRecord>,
}

impl MetadataTable {
    pub fn new() -> Self {
        MetadataTable::default()
    }

    pub fn push(&mut self, record: DicomRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[DicomRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Write the table as CSV: a header row, then one row per record.
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).context(CreateDirSnafu { path: parent })?;
        }
        let mut writer = csv::Writer::from_path(path).context(WriteCsvSnafu { path })?;
        for record in &self.records {
            writer.serialize(record).context(WriteCsvSnafu { path })?;
        }
        writer
            .flush()
            .map_err(csv::Error::from)
            .context(WriteCsvSnafu { path })?;
        Ok(())
    }
}

impl FromIterator<DicomRecord> for MetadataTable {
    fn from_iter<I: IntoIterator<Item = DicomRecord>>(iter: I) -> Self {
        MetadataTable {
            records: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::organize::testing::write_dicom;
    use crate::utils::METADATA_TAGS;

    #[test]
    fn test_read_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1-001.dcm");
        write_dicom(&path, Some("LIDC-0001"), Some("1.2.3.4"));

        let record = read_record(&path).unwrap();
        assert_eq!(record.patient_id.as_deref(), Some("LIDC-0001"));
        assert_eq!(record.study_instance_uid.as_deref(), Some("1.2.3.4"));
        assert_eq!(record.series_instance_uid.as_deref(), Some("1.2.3.4.5"));
        assert_eq!(record.instance_number, Some(7));
        assert_eq!(record.slice_thickness, Some(2.5));
        assert_eq!(record.pixel_spacing, Some(vec![0.703125, 0.703125]));
        assert_eq!(record.study_date.as_deref(), Some("20000101"));
        assert_eq!(record.acquisition_date, None);
        assert_eq!(record.identifiers(), Some(("LIDC-0001", "1.2.3.4")));
    }

    #[test]
    fn test_read_record_stops_before_pixel_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1-002.dcm");
        write_dicom(&path, Some("LIDC-0002"), Some("1.2.3.4"));
        // cut the pixel data short; the header is still intact
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 4]).unwrap();

        let record = read_record(&path).unwrap();
        assert_eq!(record.identifiers(), Some(("LIDC-0002", "1.2.3.4")));
    }

    #[test]
    fn test_read_record_missing_identifier() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("anon.dcm");
        write_dicom(&path, None, Some("1.2.3.4"));

        let record = read_record(&path).unwrap();
        assert_eq!(record.patient_id, None);
        assert_eq!(record.identifiers(), None);
    }

    #[test]
    fn test_read_record_not_dicom() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"not a dicom file").unwrap();

        let err = read_record(&path).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
    }

    #[test]
    fn test_write_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("dicom_metadata.csv");
        let table: MetadataTable = vec![
            DicomRecord {
                patient_id: Some("P1".into()),
                study_instance_uid: Some("S1".into()),
                instance_number: Some(3),
                slice_thickness: Some(1.25),
                pixel_spacing: Some(vec![0.5, 0.5]),
                study_date: Some("20000101".into()),
                ..Default::default()
            },
            DicomRecord::default(),
        ]
        .into_iter()
        .collect();

        table.write_csv(&path).unwrap();
        let csv = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        let header: Vec<&str> = METADATA_TAGS.iter().map(|(name, _)| *name).collect();
        assert_eq!(lines[0], header.join(","));
        assert_eq!(
            lines,
            vec![
                "PatientID,StudyInstanceUID,SeriesInstanceUID,NumberOfSlices,SliceThickness,PixelSpacing,StudyDate,AcquisitionDate",
                "P1,S1,,3,1.25,\"[0.5, 0.5]\",20000101,",
                ",,,,,,,",
            ]
        );
    }
}
