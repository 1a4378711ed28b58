use crate::pipeline::types::PassKind;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::info;

/// Position of an export run, reported on pass and frame boundaries only.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExportProgress {
    pub pass: PassKind,
    pub current_camera: usize,
    pub camera_count: usize,
    pub current_pass: usize,
    pub pass_count: usize,
    pub current_frame: usize,
    pub total_frames: usize,
}

/// Observer pattern for export progress
pub trait ProgressObserver: Send + Sync {
    fn on_pass_started(&mut self, progress: &ExportProgress);
    fn on_frame_rendered(&mut self, progress: &ExportProgress);
    fn on_pass_finished(&mut self, _progress: &ExportProgress) {}
}

/// Fans progress out to every registered observer
#[derive(Default)]
pub struct ProgressCollector {
    observers: Vec<Box<dyn ProgressObserver>>,
}

impl ProgressCollector {
    pub fn new() -> Self {
        Self {
            observers: Vec::new(),
        }
    }

    pub fn add_observer(mut self, observer: Box<dyn ProgressObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    pub fn notify_pass_started(&mut self, progress: &ExportProgress) {
        for observer in &mut self.observers {
            observer.on_pass_started(progress);
        }
    }

    pub fn notify_frame_rendered(&mut self, progress: &ExportProgress) {
        for observer in &mut self.observers {
            observer.on_frame_rendered(progress);
        }
    }

    pub fn notify_pass_finished(&mut self, progress: &ExportProgress) {
        for observer in &mut self.observers {
            observer.on_pass_finished(progress);
        }
    }
}

/// Logs pass boundaries and every tenth frame.
pub struct ProgressLogger;

impl ProgressObserver for ProgressLogger {
    fn on_pass_started(&mut self, progress: &ExportProgress) {
        info!(
            "Camera {}/{}, pass {}/{} '{}' started ({} frames)",
            progress.current_camera + 1,
            progress.camera_count,
            progress.current_pass + 1,
            progress.pass_count,
            progress.pass.name(),
            progress.total_frames
        );
    }

    fn on_frame_rendered(&mut self, progress: &ExportProgress) {
        if progress.current_frame % 10 == 0 || progress.current_frame == progress.total_frames {
            info!(
                "Pass '{}': {}/{} frames",
                progress.pass.name(),
                progress.current_frame,
                progress.total_frames
            );
        }
    }

    fn on_pass_finished(&mut self, progress: &ExportProgress) {
        info!("Pass '{}' finished", progress.pass.name());
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProgressStats {
    pub passes_started: usize,
    pub passes_finished: usize,
    pub frames_rendered: usize,
    pub last: Option<ExportProgress>,
}

/// Keeps running totals readable from another task, e.g. a UI.
#[derive(Clone, Default)]
pub struct ProgressTracker {
    stats: Arc<Mutex<ProgressStats>>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> ProgressStats {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn update(&self, progress: &ExportProgress, apply: impl FnOnce(&mut ProgressStats)) {
        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        apply(&mut stats);
        stats.last = Some(*progress);
    }
}

impl ProgressObserver for ProgressTracker {
    fn on_pass_started(&mut self, progress: &ExportProgress) {
        self.update(progress, |stats| stats.passes_started += 1);
    }

    fn on_frame_rendered(&mut self, progress: &ExportProgress) {
        self.update(progress, |stats| stats.frames_rendered += 1);
    }

    fn on_pass_finished(&mut self, progress: &ExportProgress) {
        self.update(progress, |stats| stats.passes_finished += 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracker_counts_through_collector() {
        let tracker = ProgressTracker::new();
        let mut collector = ProgressCollector::new()
            .add_observer(Box::new(ProgressLogger))
            .add_observer(Box::new(tracker.clone()));
        let mut progress = ExportProgress {
            pass: PassKind::Color,
            current_camera: 0,
            camera_count: 1,
            current_pass: 0,
            pass_count: 1,
            current_frame: 0,
            total_frames: 2,
        };

        collector.notify_pass_started(&progress);
        for frame in 1..=2 {
            progress.current_frame = frame;
            collector.notify_frame_rendered(&progress);
        }
        collector.notify_pass_finished(&progress);

        let stats = tracker.stats();
        assert_eq!(stats.passes_started, 1);
        assert_eq!(stats.frames_rendered, 2);
        assert_eq!(stats.passes_finished, 1);
        assert_eq!(stats.last.map(|p| p.current_frame), Some(2));
    }
}
