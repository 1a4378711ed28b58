pub mod config;
pub mod coordinator;
pub mod error;
pub mod pipeline;
pub mod render;
pub mod scene;
pub mod semantic;

pub use config::Configuration;
pub use coordinator::{ExportCoordinator, ExportHandle};
pub use error::{CaptureError, ErrorKind, ExportFailure};
pub use render::CameraRig;
pub use pipeline::{
    CapturePipelineOrchestrator, ExportManifest, ExportRequest, ExportSummary, PassKind,
    PipelineState,
};
