use crate::error::{CaptureError, ExportFailure};
use crate::pipeline::orchestration::{CapturePipelineOrchestrator, ExportSummary};
use crate::pipeline::types::{ExportRequest, PipelineState};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Runs exports on background tasks so the caller (typically a UI) stays responsive.
#[derive(Clone)]
pub struct ExportCoordinator {
    orchestrator: Arc<CapturePipelineOrchestrator>,
}

impl ExportCoordinator {
    pub fn new(orchestrator: Arc<CapturePipelineOrchestrator>) -> Self {
        Self { orchestrator }
    }

    pub fn orchestrator(&self) -> &Arc<CapturePipelineOrchestrator> {
        &self.orchestrator
    }

    pub fn subscribe(&self) -> watch::Receiver<PipelineState> {
        self.orchestrator.subscribe()
    }

    /// State changes as a stream, starting with the current state.
    pub fn state_stream(&self) -> WatchStream<PipelineState> {
        WatchStream::new(self.orchestrator.subscribe())
    }

    /// Spawns the export. Busy and invalid requests surface through the handle like any
    /// other failure.
    pub fn start(&self, request: ExportRequest) -> ExportHandle {
        let cancel_token = CancellationToken::new();
        let orchestrator = Arc::clone(&self.orchestrator);
        let token = cancel_token.clone();
        let task = tokio::spawn(async move { orchestrator.export(request, token).await });
        debug!("Export task spawned");

        ExportHandle {
            task: Some(task),
            cancel_token,
        }
    }
}

/// Handle to a running export. Dropping it cancels the run.
pub struct ExportHandle {
    task: Option<JoinHandle<Result<ExportSummary, ExportFailure>>>,
    cancel_token: CancellationToken,
}

impl ExportHandle {
    /// Requests cooperative cancellation. The run stops before its next frame and restores
    /// the scene.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |task| task.is_finished())
    }

    pub async fn wait(mut self) -> Result<ExportSummary, ExportFailure> {
        let Some(task) = self.task.take() else {
            return Err(CaptureError::Cancelled.into());
        };
        match task.await {
            Ok(result) => result,
            Err(join_error) => Err(CaptureError::from(join_error).into()),
        }
    }
}

impl Drop for ExportHandle {
    fn drop(&mut self) {
        if self.task.is_some() {
            debug!("Export handle dropped, cancelling run");
            self.cancel_token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Configuration;
    use crate::error::ErrorKind;
    use crate::pipeline::types::PassKind;
    use crate::render::SoftwareRenderer;
    use crate::scene::{Footprint, InMemoryScene, MaterialRef, MeshObject, SharedScene};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio_stream::StreamExt;

    fn coordinator(frame_delay: Duration) -> ExportCoordinator {
        let mut scene = InMemoryScene::new();
        scene.add_object(
            Box::new(MeshObject::new(
                "crate",
                vec![MaterialRef::Asset("wood".to_string())],
            )),
            Footprint::new(0.25, 0.25, 0.5, 0.5),
        );
        let scene = Arc::new(Mutex::new(scene));
        let renderer = SoftwareRenderer::new(scene.clone(), 16, 16).with_frame_delay(frame_delay);
        let shared: SharedScene = scene;

        let orchestrator = CapturePipelineOrchestrator::builder(Configuration::default())
            .scene(shared)
            .renderer(Arc::new(renderer))
            .build()
            .expect("Failed to build orchestrator");
        ExportCoordinator::new(Arc::new(orchestrator))
    }

    #[tokio::test]
    async fn test_export_runs_to_completion() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(Duration::ZERO);
        let request = ExportRequest::builder(dir.path())
            .range(0, 3)
            .pass(PassKind::Color)
            .build();

        let summary = coordinator.start(request).wait().await.unwrap();

        assert_eq!(summary.manifest.frame_count(), 3);
        assert_eq!(coordinator.orchestrator().state(), PipelineState::Done);
    }

    #[tokio::test]
    async fn test_cancel_fails_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(Duration::from_millis(20));
        let request = ExportRequest::builder(dir.path())
            .range(0, 50)
            .pass(PassKind::Color)
            .build();

        let handle = coordinator.start(request);
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.cancel();
        let failure = handle.wait().await.unwrap_err();

        assert_eq!(failure.kind, ErrorKind::Cancelled);
        assert_eq!(coordinator.orchestrator().state(), PipelineState::Failed);
        assert!(!coordinator.orchestrator().is_busy());
    }

    #[tokio::test]
    async fn test_state_stream_ends_in_done() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(Duration::ZERO);
        let mut states = coordinator.state_stream();
        assert_eq!(states.next().await, Some(PipelineState::Idle));

        let request = ExportRequest::builder(dir.path())
            .range(0, 2)
            .pass(PassKind::Color)
            .build();
        coordinator.start(request).wait().await.unwrap();

        assert_eq!(states.next().await, Some(PipelineState::Done));
    }
}
