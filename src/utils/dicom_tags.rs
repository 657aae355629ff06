use dicom_core::header::Tag;
use dicom_dictionary_std::tags;
use dicom_object::InMemDicomObject;

/// Attributes read from every file, paired with their column name in the
/// metadata table. `NumberOfSlices` is filled from the InstanceNumber
/// attribute, so it holds the slice index of that file within its series.
pub const METADATA_TAGS: [(&str, Tag); 8] = [
    ("PatientID", tags::PATIENT_ID),
    ("StudyInstanceUID", tags::STUDY_INSTANCE_UID),
    ("SeriesInstanceUID", tags::SERIES_INSTANCE_UID),
    ("NumberOfSlices", tags::INSTANCE_NUMBER),
    ("SliceThickness", tags::SLICE_THICKNESS),
    ("PixelSpacing", tags::PIXEL_SPACING),
    ("StudyDate", tags::STUDY_DATE),
    ("AcquisitionDate", tags::ACQUISITION_DATE),
];

/// Text value of `tag`, without DICOM padding. Missing, empty or
/// non-textual attributes are `None`.
pub fn element_text(obj: &InMemDicomObject, tag: Tag) -> Option<String> {
    let elem = obj.element(tag).ok()?;
    let value = elem.to_str().ok()?;
    let value = value.trim_matches(|c: char| c == '\0' || c.is_whitespace());
    (!value.is_empty()).then(|| value.to_string())
}

/// Integer value of `tag` (e.g. IS), if present and parseable.
pub fn element_int(obj: &InMemDicomObject, tag: Tag) -> Option<i32> {
    obj.element(tag).ok()?.to_int::<i32>().ok()
}

/// Floating point value of `tag` (e.g. DS), if present and parseable.
pub fn element_float(obj: &InMemDicomObject, tag: Tag) -> Option<f64> {
    obj.element(tag).ok()?.to_float64().ok()
}

/// All floating point values of a multi-valued `tag`.
pub fn element_floats(obj: &InMemDicomObject, tag: Tag) -> Option<Vec<f64>> {
    let values = obj.element(tag).ok()?.to_multi_float64().ok()?;
    (!values.is_empty()).then_some(values)
}
