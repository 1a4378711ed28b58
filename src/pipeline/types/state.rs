use super::pass::PassKind;

/// Orchestrator state as published to observers. `camera_index` is 0 unless the export
/// renders through a rig.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineState {
    Idle,
    Preparing {
        camera_index: usize,
        pass_index: usize,
        pass: PassKind,
    },
    Rendering {
        camera_index: usize,
        pass_index: usize,
        pass: PassKind,
    },
    Restoring {
        camera_index: usize,
        pass_index: usize,
        pass: PassKind,
    },
    Finalizing,
    Aborting {
        camera_index: usize,
        pass_index: usize,
        pass: PassKind,
    },
    Done,
    Failed,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Idle => "Idle",
            PipelineState::Preparing { .. } => "Preparing",
            PipelineState::Rendering { .. } => "Rendering",
            PipelineState::Restoring { .. } => "Restoring",
            PipelineState::Finalizing => "Finalizing",
            PipelineState::Aborting { .. } => "Aborting",
            PipelineState::Done => "Done",
            PipelineState::Failed => "Failed",
        }
    }

    /// True while a run holds the scene.
    pub fn is_active(&self) -> bool {
        !matches!(
            self,
            PipelineState::Idle | PipelineState::Done | PipelineState::Failed
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }
}
