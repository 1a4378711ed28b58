pub mod mutator;
pub mod orchestration;
pub mod snapshot;
pub mod types;

pub use mutator::PassMaterialMutator;
pub use orchestration::{
    CapturePipelineOrchestrator, CapturePipelineOrchestratorBuilder, ExportProgress,
    ExportSummary, ProgressObserver,
};
pub use snapshot::{SceneSnapshot, SnapshotGuard};
pub use types::{
    CameraCapture, ExportManifest, ExportRequest, ObjectSelection, PassKind, PassRecord, PassSpec,
    PipelineState,
};
