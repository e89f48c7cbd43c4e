//! Container writers.
//!
//! [`ContainerWriter`] is the seam between the converter and persistence.
//! [`DicomFileWriter`] writes each instance as a VL Whole Slide Microscopy
//! Image file using the dicom-rs object model.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use dicom_core::value::{DataSetSequence, PixelFragmentSequence};
use dicom_core::{DataElement, PrimitiveValue, Tag, VR};
use dicom_dictionary_std::tags;
use dicom_object::mem::InMemElement;
use dicom_object::{FileMetaTableBuilder, InMemDicomObject};
use tracing::debug;

use crate::error::WriterError;
use crate::tile::{FrameCodec, PixelStream};

use super::{ContainerInstance, SharedMetadata, WSI_SOP_CLASS_UID};

/// Maximum length of a DS value
const DS_MAX_LEN: usize = 16;

/// Largest defined element length (0xFFFFFFFF marks undefined length)
const MAX_ELEMENT_LENGTH: u64 = 0xFFFF_FFFE;

// =============================================================================
// ContainerWriter Trait
// =============================================================================

/// Persists finished instances.
#[async_trait]
pub trait ContainerWriter: Send + Sync {
    /// Write one instance, returning where it was stored.
    async fn write(
        &self,
        shared: &SharedMetadata,
        instance: &ContainerInstance,
    ) -> Result<PathBuf, WriterError>;
}

/// Output file name for an instance: `compressed_instance_{n}.dcm` or
/// `instance_{n}.dcm`.
pub fn instance_file_name(codec: FrameCodec, instance_number: u32) -> String {
    if codec.is_compressed() {
        format!("compressed_instance_{}.dcm", instance_number)
    } else {
        format!("instance_{}.dcm", instance_number)
    }
}

// =============================================================================
// DICOM File Writer
// =============================================================================

/// Writes `.dcm` files into one output directory, creating it on first use.
#[derive(Debug, Clone)]
pub struct DicomFileWriter {
    output_dir: PathBuf,
}

impl DicomFileWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

#[async_trait]
impl ContainerWriter for DicomFileWriter {
    async fn write(
        &self,
        shared: &SharedMetadata,
        instance: &ContainerInstance,
    ) -> Result<PathBuf, WriterError> {
        let number = instance.instance_number;
        let fail = |message: String| WriterError {
            instance: number,
            message,
        };

        if !instance.is_consistent() {
            return Err(fail(format!(
                "{} frame metadata entries for {} frames in the pixel stream",
                instance.frames.len(),
                instance.pixel_stream.frame_count()
            )));
        }

        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| fail(format!("{}: {}", self.output_dir.display(), e)))?;

        let path = self
            .output_dir
            .join(instance_file_name(instance.codec, number));

        let file = build_dataset(shared, instance)?
            .with_meta(
                FileMetaTableBuilder::new()
                    .transfer_syntax(instance.codec.transfer_syntax())
                    .media_storage_sop_class_uid(WSI_SOP_CLASS_UID)
                    .media_storage_sop_instance_uid(shared.sop_instance_uid(number)),
            )
            .map_err(|e| fail(e.to_string()))?;

        let target = path.clone();
        tokio::task::spawn_blocking(move || file.write_to_file(&target))
            .await
            .map_err(|e| fail(e.to_string()))?
            .map_err(|e| fail(e.to_string()))?;

        debug!(instance = number, path = %path.display(), "Wrote DICOM file");
        Ok(path)
    }
}

// =============================================================================
// Dataset Construction
// =============================================================================

/// Build the full dataset (without file meta) for one instance.
///
/// Fails when a value does not fit its DICOM representation: frame sides
/// above 65535, matrix positions above `i32::MAX` or pixel data longer than
/// a defined element length.
pub fn build_dataset(
    shared: &SharedMetadata,
    instance: &ContainerInstance,
) -> Result<InMemDicomObject, WriterError> {
    let mut obj = InMemDicomObject::new_empty();
    let codec = instance.codec;
    let fail = |message: String| WriterError {
        instance: instance.instance_number,
        message,
    };

    // SOP common, patient, study, series
    obj.put(text(tags::SPECIFIC_CHARACTER_SET, VR::CS, "ISO_IR 100"));
    obj.put(multi_text(
        tags::IMAGE_TYPE,
        VR::CS,
        &["ORIGINAL", "PRIMARY", "VOLUME", "NONE"],
    ));
    obj.put(text(tags::SOP_CLASS_UID, VR::UI, WSI_SOP_CLASS_UID));
    obj.put(text(
        tags::SOP_INSTANCE_UID,
        VR::UI,
        shared.sop_instance_uid(instance.instance_number),
    ));
    for tag in [tags::STUDY_DATE, tags::SERIES_DATE, tags::CONTENT_DATE] {
        obj.put(text(tag, VR::DA, &shared.date));
    }
    for tag in [tags::STUDY_TIME, tags::SERIES_TIME, tags::CONTENT_TIME] {
        obj.put(text(tag, VR::TM, &shared.time));
    }
    obj.put(text(
        tags::ACQUISITION_DATE_TIME,
        VR::DT,
        shared.acquisition_date_time(),
    ));
    obj.put(text(tags::ACCESSION_NUMBER, VR::SH, &shared.accession_number));
    obj.put(text(tags::MODALITY, VR::CS, "SM"));
    obj.put(text(tags::MANUFACTURER, VR::LO, &shared.manufacturer));
    obj.put(text(
        tags::REFERRING_PHYSICIAN_NAME,
        VR::PN,
        &shared.referring_physician_name,
    ));
    obj.put(text(
        tags::MANUFACTURER_MODEL_NAME,
        VR::LO,
        &shared.manufacturer_model_name,
    ));
    obj.put(text(tags::VOLUMETRIC_PROPERTIES, VR::CS, "VOLUME"));
    obj.put(text(tags::PATIENT_NAME, VR::PN, &shared.patient_name));
    obj.put(text(tags::PATIENT_ID, VR::LO, &shared.patient_id));
    obj.put(text(tags::PATIENT_BIRTH_DATE, VR::DA, &shared.patient_birth_date));
    obj.put(text(tags::PATIENT_SEX, VR::CS, &shared.patient_sex));
    obj.put(text(
        tags::DEVICE_SERIAL_NUMBER,
        VR::LO,
        &shared.device_serial_number,
    ));
    obj.put(text(tags::SOFTWARE_VERSIONS, VR::LO, &shared.software_versions));
    obj.put(DataElement::new(
        tags::ACQUISITION_DURATION,
        VR::FD,
        PrimitiveValue::from(shared.acquisition_duration),
    ));
    obj.put(text(
        tags::STUDY_INSTANCE_UID,
        VR::UI,
        &shared.study_instance_uid,
    ));
    obj.put(text(
        tags::SERIES_INSTANCE_UID,
        VR::UI,
        shared.series_instance_uid(instance.level),
    ));
    obj.put(text(tags::STUDY_ID, VR::SH, &shared.study_id));
    obj.put(text(tags::SERIES_NUMBER, VR::IS, instance.level.to_string()));
    obj.put(text(
        tags::INSTANCE_NUMBER,
        VR::IS,
        instance.instance_number.to_string(),
    ));
    obj.put(text(tags::PATIENT_ORIENTATION, VR::CS, ""));
    if !shared.image_comments.is_empty() {
        obj.put(text(tags::IMAGE_COMMENTS, VR::LT, &shared.image_comments));
    }

    // Multi-frame dimensions
    obj.put(sequence(
        tags::DIMENSION_ORGANIZATION_SEQUENCE,
        vec![InMemDicomObject::from_element_iter([text(
            tags::DIMENSION_ORGANIZATION_UID,
            VR::UI,
            &shared.dimension_organization_uid,
        )])],
    ));
    obj.put(text(tags::DIMENSION_ORGANIZATION_TYPE, VR::CS, "TILED_SPARSE"));
    obj.put(sequence(
        tags::DIMENSION_INDEX_SEQUENCE,
        [
            tags::COLUMN_POSITION_IN_TOTAL_IMAGE_PIXEL_MATRIX,
            tags::ROW_POSITION_IN_TOTAL_IMAGE_PIXEL_MATRIX,
        ]
        .into_iter()
        .map(|pointer| dimension_index(&shared.dimension_organization_uid, pointer))
        .collect(),
    ));
    obj.put(sequence(
        tags::WHOLE_SLIDE_MICROSCOPY_IMAGE_FRAME_TYPE_SEQUENCE,
        vec![InMemDicomObject::from_element_iter([multi_text(
            tags::FRAME_TYPE,
            VR::CS,
            &["ORIGINAL", "PRIMARY", "VOLUME", "NONE"],
        )])],
    ));

    // Image pixel
    obj.put(ushort(tags::SAMPLES_PER_PIXEL, 3));
    obj.put(text(
        tags::PHOTOMETRIC_INTERPRETATION,
        VR::CS,
        codec.photometric_interpretation(),
    ));
    obj.put(ushort(tags::PLANAR_CONFIGURATION, 0));
    obj.put(text(
        tags::NUMBER_OF_FRAMES,
        VR::IS,
        instance.frame_count().to_string(),
    ));
    let rows = u16::try_from(instance.tile_size.height)
        .map_err(|_| fail(format!("frame height {} exceeds Rows", instance.tile_size.height)))?;
    let columns = u16::try_from(instance.tile_size.width)
        .map_err(|_| fail(format!("frame width {} exceeds Columns", instance.tile_size.width)))?;
    obj.put(ushort(tags::ROWS, rows));
    obj.put(ushort(tags::COLUMNS, columns));
    obj.put(ushort(tags::BITS_ALLOCATED, 8));
    obj.put(ushort(tags::BITS_STORED, 8));
    obj.put(ushort(tags::HIGH_BIT, 7));
    obj.put(ushort(tags::PIXEL_REPRESENTATION, 0));
    obj.put(text(tags::BURNED_IN_ANNOTATION, VR::CS, "NO"));
    if codec.is_compressed() {
        obj.put(text(tags::LOSSY_IMAGE_COMPRESSION, VR::CS, "01"));
        if let Some(ratio) = compression_ratio(instance) {
            obj.put(decimal(tags::LOSSY_IMAGE_COMPRESSION_RATIO, ratio));
        }
        obj.put(text(
            tags::LOSSY_IMAGE_COMPRESSION_METHOD,
            VR::CS,
            "ISO_10918_1",
        ));
    } else {
        obj.put(text(tags::LOSSY_IMAGE_COMPRESSION, VR::CS, "00"));
    }
    obj.put(text(tags::COLOR_SPACE, VR::CS, "sRGB"));

    // Specimen
    obj.put(text(
        tags::CONTAINER_IDENTIFIER,
        VR::LO,
        &shared.container_identifier,
    ));
    for tag in [
        tags::ISSUER_OF_THE_CONTAINER_IDENTIFIER_SEQUENCE,
        tags::CONTAINER_TYPE_CODE_SEQUENCE,
        tags::ACQUISITION_CONTEXT_SEQUENCE,
    ] {
        obj.put(sequence(tag, Vec::new()));
    }
    obj.put(sequence(
        tags::SPECIMEN_DESCRIPTION_SEQUENCE,
        vec![InMemDicomObject::from_element_iter([
            text(tags::SPECIMEN_IDENTIFIER, VR::LO, &shared.specimen_identifier),
            text(tags::SPECIMEN_UID, VR::UI, &shared.specimen_uid),
            sequence(tags::ISSUER_OF_THE_SPECIMEN_IDENTIFIER_SEQUENCE, Vec::new()),
            sequence(tags::SPECIMEN_PREPARATION_SEQUENCE, Vec::new()),
        ])],
    ));

    // Whole slide microscopy image
    let (volume_w, volume_h, volume_d) = shared.imaged_volume;
    obj.put(float(tags::IMAGED_VOLUME_WIDTH, volume_w));
    obj.put(float(tags::IMAGED_VOLUME_HEIGHT, volume_h));
    obj.put(float(tags::IMAGED_VOLUME_DEPTH, volume_d));
    obj.put(DataElement::new(
        tags::TOTAL_PIXEL_MATRIX_COLUMNS,
        VR::UL,
        PrimitiveValue::from(instance.total_matrix.0),
    ));
    obj.put(DataElement::new(
        tags::TOTAL_PIXEL_MATRIX_ROWS,
        VR::UL,
        PrimitiveValue::from(instance.total_matrix.1),
    ));
    obj.put(sequence(
        tags::TOTAL_PIXEL_MATRIX_ORIGIN_SEQUENCE,
        vec![InMemDicomObject::from_element_iter([
            decimal(tags::X_OFFSET_IN_SLIDE_COORDINATE_SYSTEM, instance.origin.0),
            decimal(tags::Y_OFFSET_IN_SLIDE_COORDINATE_SYSTEM, instance.origin.1),
        ])],
    ));
    obj.put(text(tags::SPECIMEN_LABEL_IN_IMAGE, VR::CS, "NO"));
    obj.put(text(tags::FOCUS_METHOD, VR::CS, "AUTO"));
    obj.put(text(tags::EXTENDED_DEPTH_OF_FIELD, VR::CS, "NO"));
    obj.put(multi_text(
        tags::IMAGE_ORIENTATION_SLIDE,
        VR::DS,
        &["0", "-1", "0", "-1", "0", "0"],
    ));
    obj.put(optical_path_sequence(shared));

    // Functional groups
    obj.put(sequence(
        tags::SHARED_FUNCTIONAL_GROUPS_SEQUENCE,
        vec![InMemDicomObject::from_element_iter([
            sequence(
                tags::OPTICAL_PATH_IDENTIFICATION_SEQUENCE,
                vec![InMemDicomObject::from_element_iter([text(
                    tags::OPTICAL_PATH_IDENTIFIER,
                    VR::SH,
                    &shared.optical_path.identifier,
                )])],
            ),
            sequence(
                tags::PIXEL_MEASURES_SEQUENCE,
                vec![InMemDicomObject::from_element_iter([
                    text(tags::SLICE_THICKNESS, VR::DS, "1"),
                    DataElement::new(
                        tags::PIXEL_SPACING,
                        VR::DS,
                        PrimitiveValue::Strs(
                            [instance.pixel_spacing.0, instance.pixel_spacing.1]
                                .into_iter()
                                .map(format_ds)
                                .collect(),
                        ),
                    ),
                ])],
            ),
        ])],
    ));
    let per_frame = instance
        .frames
        .iter()
        .map(|frame| {
            let (column, row) = frame.dimension_index;
            let column_position = signed(
                tags::COLUMN_POSITION_IN_TOTAL_IMAGE_PIXEL_MATRIX,
                frame.matrix_col_position,
            )
            .map_err(&fail)?;
            let row_position = signed(
                tags::ROW_POSITION_IN_TOTAL_IMAGE_PIXEL_MATRIX,
                frame.matrix_row_position,
            )
            .map_err(&fail)?;

            Ok(InMemDicomObject::from_element_iter([
                sequence(
                    tags::FRAME_CONTENT_SEQUENCE,
                    vec![InMemDicomObject::from_element_iter([DataElement::new(
                        tags::DIMENSION_INDEX_VALUES,
                        VR::UL,
                        PrimitiveValue::U32([column, row].into_iter().collect()),
                    )])],
                ),
                sequence(
                    tags::PLANE_POSITION_SLIDE_SEQUENCE,
                    vec![InMemDicomObject::from_element_iter([
                        decimal(tags::X_OFFSET_IN_SLIDE_COORDINATE_SYSTEM, frame.slide_x_offset),
                        decimal(tags::Y_OFFSET_IN_SLIDE_COORDINATE_SYSTEM, frame.slide_y_offset),
                        decimal(tags::Z_OFFSET_IN_SLIDE_COORDINATE_SYSTEM, frame.slide_z_offset),
                        column_position,
                        row_position,
                    ])],
                ),
            ]))
        })
        .collect::<Result<Vec<_>, WriterError>>()?;
    obj.put(sequence(tags::PER_FRAME_FUNCTIONAL_GROUPS_SEQUENCE, per_frame));

    obj.put(pixel_data(&instance.pixel_stream).map_err(fail)?);
    Ok(obj)
}

/// Uncompressed frame bytes over compressed payload bytes.
fn compression_ratio(instance: &ContainerInstance) -> Option<f64> {
    let compressed = instance.pixel_stream.payload_len();
    if compressed == 0 {
        return None;
    }
    let frame_len =
        instance.tile_size.width as f64 * instance.tile_size.height as f64 * 3.0;
    let ratio = frame_len * instance.frame_count() as f64 / compressed as f64;
    Some((ratio * 100.0).round() / 100.0)
}

fn optical_path_sequence(shared: &SharedMetadata) -> InMemElement {
    let path = &shared.optical_path;
    let code = |c: &super::CodedConcept| {
        InMemDicomObject::from_element_iter([
            text(tags::CODE_VALUE, VR::SH, &c.value),
            text(tags::CODING_SCHEME_DESIGNATOR, VR::SH, &c.scheme),
            text(tags::CODE_MEANING, VR::LO, &c.meaning),
        ])
    };

    let mut item = InMemDicomObject::from_element_iter([
        sequence(
            tags::ILLUMINATION_TYPE_CODE_SEQUENCE,
            vec![code(&path.illumination_type)],
        ),
        text(tags::OPTICAL_PATH_IDENTIFIER, VR::SH, &path.identifier),
        text(tags::OPTICAL_PATH_DESCRIPTION, VR::ST, &path.description),
        sequence(
            tags::ILLUMINATION_COLOR_CODE_SEQUENCE,
            vec![code(&path.illumination_color)],
        ),
    ]);
    if let Some(profile) = &path.icc_profile {
        item.put(DataElement::new(
            tags::ICC_PROFILE,
            VR::OB,
            PrimitiveValue::from(profile.clone()),
        ));
    }

    sequence(tags::OPTICAL_PATH_SEQUENCE, vec![item])
}

fn dimension_index(organization_uid: &str, pointer: Tag) -> InMemDicomObject {
    InMemDicomObject::from_element_iter([
        text(tags::DIMENSION_ORGANIZATION_UID, VR::UI, organization_uid),
        DataElement::new(
            tags::DIMENSION_INDEX_POINTER,
            VR::AT,
            PrimitiveValue::Tags([pointer].into_iter().collect()),
        ),
        DataElement::new(
            tags::FUNCTIONAL_GROUP_POINTER,
            VR::AT,
            PrimitiveValue::Tags([tags::PLANE_POSITION_SLIDE_SEQUENCE].into_iter().collect()),
        ),
    ])
}

fn pixel_data(stream: &PixelStream) -> Result<InMemElement, String> {
    match stream {
        PixelStream::Native { data, .. } => {
            check_length("native pixel data", data.len() as u64)?;
            Ok(DataElement::new(
                tags::PIXEL_DATA,
                VR::OB,
                PrimitiveValue::from(data.to_vec()),
            ))
        }
        PixelStream::Encapsulated {
            offset_table,
            fragments,
        } => {
            for fragment in fragments {
                check_length("pixel data fragment", fragment.len() as u64)?;
            }
            Ok(DataElement::new(
                tags::PIXEL_DATA,
                VR::OB,
                PixelFragmentSequence::new(
                    offset_table.clone(),
                    fragments.iter().map(|f| f.to_vec()).collect::<Vec<_>>(),
                ),
            ))
        }
    }
}

// =============================================================================
// Element Helpers
// =============================================================================

fn text(tag: Tag, vr: VR, value: impl Into<String>) -> InMemElement {
    DataElement::new(tag, vr, PrimitiveValue::from(value.into()))
}

fn multi_text(tag: Tag, vr: VR, values: &[&str]) -> InMemElement {
    DataElement::new(
        tag,
        vr,
        PrimitiveValue::Strs(values.iter().map(|v| v.to_string()).collect()),
    )
}

fn ushort(tag: Tag, value: u16) -> InMemElement {
    DataElement::new(tag, VR::US, PrimitiveValue::from(value))
}

fn float(tag: Tag, value: f32) -> InMemElement {
    DataElement::new(tag, VR::FL, PrimitiveValue::from(value))
}

fn check_length(what: &str, len: u64) -> Result<(), String> {
    if len > MAX_ELEMENT_LENGTH {
        return Err(format!(
            "{} of {} bytes exceeds the 4 GiB element length limit",
            what, len
        ));
    }
    Ok(())
}

fn signed(tag: Tag, value: u64) -> Result<InMemElement, String> {
    let value = i32::try_from(value)
        .map_err(|_| format!("{} of {} exceeds the SL range", tag, value))?;
    Ok(DataElement::new(tag, VR::SL, PrimitiveValue::from(value)))
}

fn decimal(tag: Tag, value: f64) -> InMemElement {
    DataElement::new(tag, VR::DS, PrimitiveValue::from(format_ds(value)))
}

fn sequence(tag: Tag, items: Vec<InMemDicomObject>) -> InMemElement {
    DataElement::new(tag, VR::SQ, DataSetSequence::from(items))
}

/// Format a decimal string of at most 16 characters, dropping precision
/// as needed.
pub fn format_ds(value: f64) -> String {
    let plain = value.to_string();
    if plain.len() <= DS_MAX_LEN {
        return plain;
    }

    for precision in (0..=DS_MAX_LEN).rev() {
        let formatted = format!("{:.*}", precision, value);
        let trimmed = if formatted.contains('.') {
            formatted.trim_end_matches('0').trim_end_matches('.')
        } else {
            formatted.as_str()
        };
        if trimmed.len() <= DS_MAX_LEN {
            return trimmed.to_string();
        }
    }

    format!("{:.6e}", value)
}
