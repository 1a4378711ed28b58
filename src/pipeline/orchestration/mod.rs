pub mod orchestrator;
pub mod progress;
pub mod writer;

pub use orchestrator::{CapturePipelineOrchestrator, CapturePipelineOrchestratorBuilder, ExportSummary};
pub use progress::{
    ExportProgress, ProgressCollector, ProgressLogger, ProgressObserver, ProgressStats,
    ProgressTracker,
};
pub use writer::ExportWriter;
