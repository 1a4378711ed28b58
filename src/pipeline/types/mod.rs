pub mod manifest;
pub mod pass;
pub mod request;
pub mod state;

pub use manifest::{
    CameraCapture, ExportManifest, PassRecord, CAMERA_POSES_FILE_NAME, MANIFEST_FILE_NAME,
};
pub use pass::{PassKind, PassSpec};
pub use request::{ExportRequest, ExportRequestBuilder, ObjectSelection};
pub use state::PipelineState;
