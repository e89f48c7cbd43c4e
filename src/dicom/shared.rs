//! Static boilerplate shared by every instance of a run.
//!
//! None of these values depend on tiling; they describe the (synthetic)
//! patient, study, equipment, specimen and optical path.

use serde::Serialize;

use crate::tile::FrameCodec;

/// VL Whole Slide Microscopy Image Storage
pub const WSI_SOP_CLASS_UID: &str = "1.2.840.10008.5.1.4.1.1.77.1.6";

pub const DEFAULT_STUDY_INSTANCE_UID: &str =
    "1.2.276.0.7230010.3.1.2.296485376.1.1484917433.721084";
pub const DEFAULT_SERIES_UID_ROOT: &str = "1.2.276.0.7230010.3.1.3.296485376.1.1484917433.721085";
pub const DEFAULT_SOP_INSTANCE_UID_ROOT: &str =
    "1.2.276.0.7230010.3.1.4.296485376.1.1484917438.721089";
pub const DEFAULT_DIMENSION_ORGANIZATION_UID: &str =
    "1.2.276.0.7230010.3.1.4.296485376.1.1484917433.721087";
pub const DEFAULT_SPECIMEN_UID: &str = "1.2.276.0.7230010.3.1.4.3252829876.4112.1426166133.871";

/// A coded concept: code value, coding scheme and meaning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodedConcept {
    pub value: String,
    pub scheme: String,
    pub meaning: String,
}

impl CodedConcept {
    pub fn new(value: &str, scheme: &str, meaning: &str) -> Self {
        Self {
            value: value.to_string(),
            scheme: scheme.to_string(),
            meaning: meaning.to_string(),
        }
    }
}

/// Description of the single optical path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpticalPath {
    pub identifier: String,
    pub description: String,
    pub illumination_type: CodedConcept,
    pub illumination_color: CodedConcept,
    /// Embedded ICC profile, written as `ICCProfile` when present
    #[serde(skip)]
    pub icc_profile: Option<Vec<u8>>,
}

impl Default for OpticalPath {
    fn default() -> Self {
        Self {
            identifier: "1".to_string(),
            description: "Brightfield".to_string(),
            illumination_type: CodedConcept::new("111744", "DCM", "Brightfield illumination"),
            illumination_color: CodedConcept::new("R-102C0", "SRT", "Full Spectrum"),
            icc_profile: None,
        }
    }
}

/// Run-wide metadata record handed to the container writer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SharedMetadata {
    pub patient_name: String,
    pub patient_id: String,
    pub patient_birth_date: String,
    pub patient_sex: String,

    pub study_instance_uid: String,
    pub study_id: String,
    pub accession_number: String,
    pub referring_physician_name: String,
    /// DA, e.g. `20170120`
    pub date: String,
    /// TM, e.g. `130353.000000`
    pub time: String,

    /// SeriesInstanceUID = `{series_uid_root}.{level}`
    pub series_uid_root: String,
    /// SOPInstanceUID = `{sop_instance_uid_root}.{instance_number}`
    pub sop_instance_uid_root: String,
    pub dimension_organization_uid: String,

    pub manufacturer: String,
    pub manufacturer_model_name: String,
    pub device_serial_number: String,
    pub software_versions: String,
    pub acquisition_duration: f64,
    pub image_comments: String,

    pub container_identifier: String,
    pub specimen_identifier: String,
    pub specimen_uid: String,

    /// Imaged volume in mm (width, height, depth)
    pub imaged_volume: (f32, f32, f32),
    pub optical_path: OpticalPath,
}

impl SharedMetadata {
    /// Boilerplate for one slide. Patient name and ID are the slide's file
    /// stem, prefixed with the codec label.
    pub fn for_slide(slide_stem: &str, codec: FrameCodec) -> Self {
        let patient = format!("{}_{}", codec.label(), slide_stem);
        Self {
            patient_name: patient.clone(),
            patient_id: patient,
            ..Self::default()
        }
    }

    pub fn series_instance_uid(&self, level: usize) -> String {
        format!("{}.{}", self.series_uid_root, level)
    }

    pub fn sop_instance_uid(&self, instance_number: u32) -> String {
        format!("{}.{}", self.sop_instance_uid_root, instance_number)
    }

    /// `YYYYMMDDHHMMSS.FFFFFF` built from `date` and `time`.
    pub fn acquisition_date_time(&self) -> String {
        format!("{}{}", self.date, self.time)
    }
}

impl Default for SharedMetadata {
    fn default() -> Self {
        Self {
            patient_name: "Anonymous".to_string(),
            patient_id: "Anonymous".to_string(),
            patient_birth_date: "19700101".to_string(),
            patient_sex: "M".to_string(),
            study_instance_uid: DEFAULT_STUDY_INSTANCE_UID.to_string(),
            study_id: "NONE".to_string(),
            accession_number: "123456789".to_string(),
            referring_physician_name: "SOME^PHYSICIAN".to_string(),
            date: "20170120".to_string(),
            time: "130353.000000".to_string(),
            series_uid_root: DEFAULT_SERIES_UID_ROOT.to_string(),
            sop_instance_uid_root: DEFAULT_SOP_INSTANCE_UID_ROOT.to_string(),
            dimension_organization_uid: DEFAULT_DIMENSION_ORGANIZATION_UID.to_string(),
            manufacturer: "MyManufacturer".to_string(),
            manufacturer_model_name: "MyModel".to_string(),
            device_serial_number: "MySerialNumber".to_string(),
            software_versions: env!("CARGO_PKG_VERSION").to_string(),
            acquisition_duration: 100.0,
            image_comments: String::new(),
            container_identifier: "CI_12345".to_string(),
            specimen_identifier: "Specimen^Identifier".to_string(),
            specimen_uid: DEFAULT_SPECIMEN_UID.to_string(),
            imaged_volume: (15.0, 15.0, 1.0),
            optical_path: OpticalPath::default(),
        }
    }
}
