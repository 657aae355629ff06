use std::path::Path;

use dicom_core::{dicom_value, DataElement, PrimitiveValue, VR};
use dicom_dictionary_std::{tags, uids};
use dicom_object::{FileMetaTableBuilder, InMemDicomObject};

/// Write a minimal CT image file carrying the organizer's attributes.
pub fn write_dicom(path: &Path, patient_id: Option<&str>, study_uid: Option<&str>) {
    let mut obj = InMemDicomObject::new_empty();
    obj.put(DataElement::new(
        tags::SOP_CLASS_UID,
        VR::UI,
        PrimitiveValue::from(uids::CT_IMAGE_STORAGE),
    ));
    obj.put(DataElement::new(
        tags::SOP_INSTANCE_UID,
        VR::UI,
        PrimitiveValue::from("1.2.3.4.5.6"),
    ));
    if let Some(patient_id) = patient_id {
        obj.put(DataElement::new(tags::PATIENT_ID, VR::LO, PrimitiveValue::from(patient_id)));
    }
    if let Some(study_uid) = study_uid {
        obj.put(DataElement::new(
            tags::STUDY_INSTANCE_UID,
            VR::UI,
            PrimitiveValue::from(study_uid),
        ));
    }
    obj.put(DataElement::new(
        tags::SERIES_INSTANCE_UID,
        VR::UI,
        PrimitiveValue::from("1.2.3.4.5"),
    ));
    obj.put(DataElement::new(tags::INSTANCE_NUMBER, VR::IS, PrimitiveValue::from("7")));
    obj.put(DataElement::new(tags::SLICE_THICKNESS, VR::DS, PrimitiveValue::from("2.5")));
    obj.put(DataElement::new(
        tags::PIXEL_SPACING,
        VR::DS,
        dicom_value!(Strs, ["0.703125", "0.703125"]),
    ));
    obj.put(DataElement::new(tags::STUDY_DATE, VR::DA, PrimitiveValue::from("20000101")));
    obj.put(DataElement::new(tags::PIXEL_DATA, VR::OW, dicom_value!(U16, [0, 0, 0, 0])));

    let file = obj
        .with_meta(
            FileMetaTableBuilder::new()
                .media_storage_sop_class_uid(uids::CT_IMAGE_STORAGE)
                .media_storage_sop_instance_uid("1.2.3.4.5.6")
                .transfer_syntax(uids::EXPLICIT_VR_LITTLE_ENDIAN),
        )
        .unwrap();
    file.write_to_file(path).unwrap();
}
