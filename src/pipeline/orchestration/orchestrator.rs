use super::progress::{ExportProgress, ProgressCollector, ProgressObserver};
use super::writer::ExportWriter;
use crate::config::Configuration;
use crate::error::{CaptureError, ConfigError, ExportFailure, RenderError};
use crate::pipeline::mutator::PassMaterialMutator;
use crate::pipeline::snapshot::SnapshotGuard;
use crate::pipeline::types::{
    CameraCapture, ExportManifest, ExportRequest, ObjectSelection, PassKind, PassRecord, PassSpec,
    PipelineState,
};
use crate::render::{AnimationRange, RenderSubsystem, RigCamera, SequenceRenderDriver};
use crate::scene::{lock_scene, ObjectId, SharedScene};
use crate::semantic::{SemanticClassRegistry, SharedRegistry};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError};
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

/// Terminal `Done` result of an export run.
#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub manifest_path: PathBuf,
    pub manifest: ExportManifest,
}

/// Runs export requests pass by pass against the shared scene.
///
/// Each pass is a capture/mutate/render/restore bracket; passes never overlap and only one
/// export runs at a time. With a camera rig the whole pass list runs once per camera.
pub struct CapturePipelineOrchestrator {
    scene: SharedScene,
    registry: SharedRegistry,
    driver: SequenceRenderDriver,
    writer: ExportWriter,
    progress: Mutex<ProgressCollector>,
    state_tx: watch::Sender<PipelineState>,
    busy: AtomicBool,
    restore_failed: AtomicBool,
}

impl CapturePipelineOrchestrator {
    pub fn builder(configuration: Configuration) -> CapturePipelineOrchestratorBuilder {
        CapturePipelineOrchestratorBuilder::new(configuration)
    }

    pub fn state(&self) -> PipelineState {
        self.state_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PipelineState> {
        self.state_tx.subscribe()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub fn is_restore_failure_latched(&self) -> bool {
        self.restore_failed.load(Ordering::Acquire)
    }

    /// Clears the latch set by a failed restore once the user has dealt with the scene.
    /// Returns whether a latch was set.
    pub fn acknowledge_restore_failure(&self) -> bool {
        let was_latched = self.restore_failed.swap(false, Ordering::AcqRel);
        if was_latched {
            warn!("Restore failure acknowledged, exports are allowed again");
            self.set_state(PipelineState::Idle);
        }
        was_latched
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    pub fn scene(&self) -> &SharedScene {
        &self.scene
    }

    /// Runs one export to completion or failure.
    ///
    /// Invalid requests fail before the scene is touched and leave the state unchanged.
    /// Any failure after that restores the active pass before returning.
    #[instrument(skip(self, request, cancel), fields(passes = request.passes.len(), frames = request.range.len()))]
    pub async fn export(
        &self,
        request: ExportRequest,
        cancel: CancellationToken,
    ) -> Result<ExportSummary, ExportFailure> {
        let Some(_busy) = BusyGuard::acquire(&self.busy) else {
            warn!("Rejected export request: another export is running");
            return Err(CaptureError::PipelineBusy.into());
        };
        if self.is_restore_failure_latched() {
            return Err(CaptureError::RestoreFailure(vec![
                "a previous export could not restore the scene; acknowledge it before exporting again"
                    .to_string(),
            ])
            .into());
        }

        request.validate()?;
        let targets = self.resolve_objects(&request.object_selection)?;
        let registry = self
            .registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        info!(
            "Starting export of {} pass(es) through {} camera(s) over frames {}..{} for {} object(s) into {}",
            request.passes.len(),
            request.camera_rig.as_ref().map_or(1, |rig| rig.len()),
            request.range.start,
            request.range.end,
            targets.selected.len(),
            request.output_root.display()
        );

        match self.run(&request, &targets, &registry, &cancel).await {
            Ok(summary) => {
                self.set_state(PipelineState::Done);
                info!("Export finished: {}", summary.manifest_path.display());
                Ok(summary)
            }
            Err(failure) => {
                if !failure.kind.is_recoverable() {
                    self.restore_failed.store(true, Ordering::Release);
                    error!("Export left the scene unrestored: {}", failure);
                } else {
                    warn!("Export failed: {}", failure);
                }
                self.set_state(PipelineState::Failed);
                Err(failure)
            }
        }
    }

    async fn run(
        &self,
        request: &ExportRequest,
        targets: &ObjectTargets,
        registry: &SemanticClassRegistry,
        cancel: &CancellationToken,
    ) -> Result<ExportSummary, ExportFailure> {
        let mut manifest = ExportManifest::new(request.range);
        let cameras: Vec<Option<&RigCamera>> = match &request.camera_rig {
            Some(rig) => rig.cameras().iter().map(Some).collect(),
            None => vec![None],
        };

        for (camera_index, &camera) in cameras.iter().enumerate() {
            let camera_name = camera.map(|rig_camera| rig_camera.name.as_str());
            let mount = match camera {
                Some(rig_camera) => rig_camera.mount,
                None => lock_scene(&self.scene).camera_mount(),
            };
            if let Some(name) = camera_name {
                info!(
                    "Rendering through rig camera '{}' ({}/{})",
                    name,
                    camera_index + 1,
                    cameras.len()
                );
            }
            let mut capture = CameraCapture::new(
                camera_name.map(str::to_string),
                mount,
                request.camera_directory(camera),
            );

            for (pass_index, pass) in request.passes.iter().enumerate() {
                if cancel.is_cancelled() {
                    info!("Export cancelled before pass '{}'", pass.kind.name());
                    return Err(ExportFailure::from(CaptureError::Cancelled)
                        .with_pass(pass.kind)
                        .with_camera(camera_name));
                }
                let context = PassContext {
                    camera_index,
                    camera_count: cameras.len(),
                    camera,
                    pass_index,
                    pass_count: request.passes.len(),
                    spec: pass,
                    directory: request.pass_directory(pass, camera),
                    range: request.range,
                };
                let record = self
                    .run_pass(&context, targets, registry, cancel, &mut capture)
                    .await
                    .map_err(|failure| failure.with_camera(camera_name))?;
                capture.passes.push(record);
            }
            manifest.cameras.push(capture);
        }

        self.set_state(PipelineState::Finalizing);
        let segmentation = request.has_pass(PassKind::SemanticSegmentation);
        if segmentation {
            manifest.semantic_classes = Some(registry.serialize().classes);
        }
        let manifest_path = self
            .writer
            .write(
                &request.output_root,
                &manifest,
                segmentation.then_some(registry),
                request.camera_rig.as_ref(),
            )
            .await?;

        Ok(ExportSummary {
            manifest_path,
            manifest,
        })
    }

    /// One full capture/mutate/render/restore bracket. Restore runs whatever happened in
    /// between, and a restore failure takes precedence over the pass error.
    #[instrument(skip_all, fields(pass = context.spec.kind.name(), camera = context.camera_index, index = context.pass_index))]
    async fn run_pass(
        &self,
        context: &PassContext<'_>,
        targets: &ObjectTargets,
        registry: &SemanticClassRegistry,
        cancel: &CancellationToken,
        capture: &mut CameraCapture,
    ) -> Result<PassRecord, ExportFailure> {
        let kind = context.spec.kind;
        self.set_state(PipelineState::Preparing {
            camera_index: context.camera_index,
            pass_index: context.pass_index,
            pass: kind,
        });

        let guard = SnapshotGuard::capture(self.scene.clone(), targets.captured_for(kind))
            .map_err(|e| ExportFailure::from(e).with_pass(kind))?;

        let outcome = self
            .mutate_and_render(context, targets, registry, cancel, capture)
            .await;
        if outcome.is_err() {
            self.set_state(PipelineState::Aborting {
                camera_index: context.camera_index,
                pass_index: context.pass_index,
                pass: kind,
            });
        }

        self.set_state(PipelineState::Restoring {
            camera_index: context.camera_index,
            pass_index: context.pass_index,
            pass: kind,
        });
        match (outcome, guard.restore()) {
            (outcome, Err(restore_error)) => {
                if let Err(failure) = &outcome {
                    error!("Pass '{}' failed before restore: {}", kind.name(), failure);
                }
                error!("Restoring the scene after pass '{}' failed: {}", kind.name(), restore_error);
                Err(ExportFailure::from(restore_error).with_pass(kind))
            }
            (Ok(record), Ok(())) => {
                info!("Pass '{}' complete: {} frame(s)", kind.name(), record.frame_count);
                Ok(record)
            }
            (Err(failure), Ok(())) => Err(failure),
        }
    }

    async fn mutate_and_render(
        &self,
        context: &PassContext<'_>,
        targets: &ObjectTargets,
        registry: &SemanticClassRegistry,
        cancel: &CancellationToken,
        capture: &mut CameraCapture,
    ) -> Result<PassRecord, ExportFailure> {
        let pass = context.spec;
        let fail = |error: CaptureError| ExportFailure::from(error).with_pass(pass.kind);

        {
            let mut scene = lock_scene(&self.scene);
            if let Some(camera) = context.camera {
                scene.set_camera_mount(camera.mount);
            }
            PassMaterialMutator::apply(pass, &mut *scene, &targets.selected, registry)
                .map_err(|e| fail(e.into()))?;
            if pass.kind.paints_every_object() {
                PassMaterialMutator::mask(&mut *scene, &targets.unselected)
                    .map_err(|e| fail(e.into()))?;
            }
        }
        tokio::fs::create_dir_all(&context.directory)
            .await
            .map_err(|e| fail(e.into()))?;

        self.set_state(PipelineState::Rendering {
            camera_index: context.camera_index,
            pass_index: context.pass_index,
            pass: pass.kind,
        });
        let mut progress = ExportProgress {
            pass: pass.kind,
            current_camera: context.camera_index,
            camera_count: context.camera_count,
            current_pass: context.pass_index,
            pass_count: context.pass_count,
            current_frame: 0,
            total_frames: context.range.len(),
        };
        self.progress.lock().await.notify_pass_started(&progress);

        let mut frames = self
            .driver
            .render_range(context.range, &context.directory, pass.format)
            .await
            .map_err(|e| fail(e.into()))?;

        loop {
            if cancel.is_cancelled() {
                info!(
                    "Cancellation observed in pass '{}' before frame {}",
                    pass.kind.name(),
                    frames.next_expected_frame()
                );
                return Err(fail(CaptureError::Cancelled).with_frame(frames.next_expected_frame()));
            }

            let frame = match frames.next_frame().await {
                None => break,
                Some(Ok(frame)) => frame,
                Some(Err(e)) => {
                    let frame = e.frame().unwrap_or(frames.next_expected_frame());
                    return Err(fail(e.into()).with_frame(frame));
                }
            };

            // the first pass of each camera defines its poses
            let camera = frame.camera_frame();
            if context.pass_index == 0 {
                capture.frames.push(camera);
            } else if capture.frames.get(progress.current_frame) != Some(&camera) {
                return Err(fail(
                    RenderError::FrameFailed {
                        frame: frame.frame_index,
                        message: "camera pose differs from the first pass".to_string(),
                    }
                    .into(),
                )
                .with_frame(frame.frame_index));
            }

            progress.current_frame += 1;
            self.progress.lock().await.notify_frame_rendered(&progress);
        }

        self.progress.lock().await.notify_pass_finished(&progress);
        Ok(PassRecord {
            pass: pass.kind,
            directory: context.directory.clone(),
            format: pass.format,
            frame_count: frames.rendered(),
        })
    }

    fn resolve_objects(&self, selection: &ObjectSelection) -> Result<ObjectTargets, CaptureError> {
        let scene = lock_scene(&self.scene);
        let renderable = scene.renderable_object_ids();
        let ids = match selection {
            ObjectSelection::All => {
                return Ok(ObjectTargets {
                    selected: renderable.clone(),
                    unselected: Vec::new(),
                    renderable,
                });
            }
            ObjectSelection::Only(ids) => ids,
        };

        for &id in ids {
            match scene.object(id) {
                Some(object) if object.kind().is_renderable() => {}
                Some(_) => {
                    return Err(CaptureError::InvalidRequest(format!(
                        "object {} is not renderable",
                        id
                    )));
                }
                None => {
                    return Err(CaptureError::InvalidRequest(format!(
                        "object {} is not in the scene",
                        id
                    )));
                }
            }
        }
        let (selected, unselected): (Vec<ObjectId>, Vec<ObjectId>) =
            renderable.iter().partition(|id| ids.contains(id));
        Ok(ObjectTargets {
            selected,
            unselected,
            renderable,
        })
    }

    fn set_state(&self, state: PipelineState) {
        let previous = self.state_tx.send_replace(state.clone());
        info!("Pipeline state: {} -> {}", previous.as_str(), state.as_str());
    }
}

struct PassContext<'a> {
    camera_index: usize,
    camera_count: usize,
    camera: Option<&'a RigCamera>,
    pass_index: usize,
    pass_count: usize,
    spec: &'a PassSpec,
    directory: PathBuf,
    range: AnimationRange,
}

/// Renderable objects split by the request's selection, in scene order.
struct ObjectTargets {
    selected: Vec<ObjectId>,
    unselected: Vec<ObjectId>,
    renderable: Vec<ObjectId>,
}

impl ObjectTargets {
    /// Objects a pass of `kind` may change, and so must snapshot.
    fn captured_for(&self, kind: PassKind) -> &[ObjectId] {
        if kind.paints_every_object() {
            &self.renderable
        } else {
            &self.selected
        }
    }
}

struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct CapturePipelineOrchestratorBuilder {
    configuration: Configuration,
    scene: Option<SharedScene>,
    registry: Option<SharedRegistry>,
    renderer: Option<Arc<dyn RenderSubsystem>>,
    progress: ProgressCollector,
}

impl CapturePipelineOrchestratorBuilder {
    pub fn new(configuration: Configuration) -> Self {
        Self {
            configuration,
            scene: None,
            registry: None,
            renderer: None,
            progress: ProgressCollector::new(),
        }
    }

    pub fn scene(mut self, scene: SharedScene) -> Self {
        self.scene = Some(scene);
        self
    }

    // Uses an existing registry handle, otherwise an empty registry is created.
    pub fn registry(mut self, registry: SharedRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn renderer(mut self, renderer: Arc<dyn RenderSubsystem>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn add_observer(mut self, observer: Box<dyn ProgressObserver>) -> Self {
        self.progress = self.progress.add_observer(observer);
        self
    }

    // Overrides the zero-padding of frame file names from the configuration.
    pub fn frame_name_padding(mut self, padding: usize) -> Self {
        self.configuration.frame_name_padding = padding;
        self
    }

    pub fn build(self) -> Result<CapturePipelineOrchestrator, CaptureError> {
        self.configuration.validate()?;
        let scene = self
            .scene
            .ok_or_else(|| ConfigError::Invalid("scene not set".to_string()))?;
        let renderer = self
            .renderer
            .ok_or_else(|| ConfigError::Invalid("renderer not set".to_string()))?;
        let registry = self.registry.unwrap_or_default();

        let driver = SequenceRenderDriver::new(renderer)
            .with_frame_name_padding(self.configuration.frame_name_padding);
        let writer = ExportWriter::new()
            .camera_poses_csv(self.configuration.export_camera_poses_csv)
            .semantic_classes_csv(self.configuration.export_semantic_classes_csv);
        let (state_tx, _) = watch::channel(PipelineState::Idle);

        info!("Capture pipeline ready with renderer '{}'", driver.subsystem_name());
        Ok(CapturePipelineOrchestrator {
            scene,
            registry,
            driver,
            writer,
            progress: Mutex::new(self.progress),
            state_tx,
            busy: AtomicBool::new(false),
            restore_failed: AtomicBool::new(false),
        })
    }
}
