//! DICOM output: shared boilerplate, per-batch instances and file writing.

mod instance;
mod shared;
mod writer;

pub use instance::ContainerInstance;
pub use shared::{
    CodedConcept, OpticalPath, SharedMetadata, DEFAULT_DIMENSION_ORGANIZATION_UID,
    DEFAULT_SERIES_UID_ROOT, DEFAULT_SOP_INSTANCE_UID_ROOT, DEFAULT_SPECIMEN_UID,
    DEFAULT_STUDY_INSTANCE_UID, WSI_SOP_CLASS_UID,
};
pub use writer::{build_dataset, format_ds, instance_file_name, ContainerWriter, DicomFileWriter};
