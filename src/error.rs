use crate::pipeline::types::PassKind;
use crate::scene::{ObjectId, Rgb};
use crate::semantic::ClassId;
use std::fmt;
use thiserror::Error;

// Main Application Error Type

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Invalid export request: {0}")]
    InvalidRequest(String),
    #[error("An export is already running")]
    PipelineBusy,
    #[error("Registry Error: {0}")]
    Registry(#[from] RegistryError),
    #[error("Scene Error: {0}")]
    Scene(#[from] SceneError),
    #[error("Render Error: {0}")]
    Render(#[from] RenderError),
    #[error("Camera Rig Error: {0}")]
    Rig(#[from] RigError),
    #[error("Scene restore failed for {} object(s): {}", .0.len(), .0.join("; "))]
    RestoreFailure(Vec<String>),
    #[error("Export cancelled")]
    Cancelled,
    #[error("I/O Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization Error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Configuration Error: {0}")]
    Config(#[from] ConfigError),
    #[error("Export task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl CaptureError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CaptureError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            CaptureError::PipelineBusy => ErrorKind::PipelineBusy,
            CaptureError::Registry(e) => e.kind(),
            CaptureError::Scene(_) => ErrorKind::SceneFailure,
            CaptureError::Render(_) => ErrorKind::RenderFailure,
            CaptureError::Rig(e) => e.kind(),
            CaptureError::RestoreFailure(_) => ErrorKind::RestoreFailure,
            CaptureError::Cancelled => ErrorKind::Cancelled,
            CaptureError::Io(_) | CaptureError::Serialization(_) => ErrorKind::Io,
            CaptureError::Config(_) => ErrorKind::InvalidRequest,
            CaptureError::Task(e) if e.is_cancelled() => ErrorKind::Cancelled,
            CaptureError::Task(_) => ErrorKind::Internal,
        }
    }
}

/// User-visible failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidRequest,
    DuplicateColor,
    DuplicateName,
    SchemaError,
    SceneFailure,
    RenderFailure,
    PipelineBusy,
    RestoreFailure,
    Cancelled,
    Io,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidRequest => "InvalidRequest",
            ErrorKind::DuplicateColor => "DuplicateColor",
            ErrorKind::DuplicateName => "DuplicateName",
            ErrorKind::SchemaError => "SchemaError",
            ErrorKind::SceneFailure => "SceneFailure",
            ErrorKind::RenderFailure => "RenderFailure",
            ErrorKind::PipelineBusy => "PipelineBusy",
            ErrorKind::RestoreFailure => "RestoreFailure",
            ErrorKind::Cancelled => "Cancelled",
            ErrorKind::Io => "Io",
            ErrorKind::Internal => "Internal",
        }
    }

    /// Only a failed restore can leave the user's scene altered.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, ErrorKind::RestoreFailure)
    }
}

#[derive(Error, Debug)]
pub enum SceneError {
    #[error("Object {0} is not part of the scene")]
    UnknownObject(ObjectId),
    #[error("Object {id} has {expected} material slot(s), got {actual}")]
    SlotMismatch {
        id: ObjectId,
        expected: usize,
        actual: usize,
    },
    #[error("Object {0} rejected the change: {1}")]
    Rejected(ObjectId, String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("Color {color} is already used by class '{existing}'")]
    DuplicateColor { color: Rgb, existing: String },
    #[error("A class named '{0}' already exists")]
    DuplicateName(String),
    #[error("Invalid class name '{0}'")]
    InvalidName(String),
    #[error("Unknown class {0}")]
    UnknownClass(ClassId),
    #[error("Class '{0}' is reserved and cannot be changed")]
    ReservedClass(String),
    #[error("Color {0} is reserved for uncovered background pixels")]
    ReservedColor(Rgb),
    #[error("Malformed registry document: {0}")]
    SchemaError(String),
}

impl RegistryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::DuplicateColor { .. } | RegistryError::ReservedColor(_) => {
                ErrorKind::DuplicateColor
            }
            RegistryError::DuplicateName(_) => ErrorKind::DuplicateName,
            RegistryError::SchemaError(_) => ErrorKind::SchemaError,
            RegistryError::InvalidName(_)
            | RegistryError::UnknownClass(_)
            | RegistryError::ReservedClass(_) => ErrorKind::InvalidRequest,
        }
    }
}

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Frame {frame} failed to render: {message}")]
    FrameFailed { frame: i64, message: String },
    #[error("Render job was rejected: {0}")]
    Submit(String),
    #[error("Render stream out of order: expected frame {expected}, got {actual}")]
    OutOfOrder { expected: i64, actual: i64 },
    #[error("Render stream ended after {rendered} of {expected} frames")]
    Incomplete { rendered: usize, expected: usize },
    #[error("Failed to write frame output: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to encode frame image: {0}")]
    Image(#[from] image::ImageError),
}

impl RenderError {
    /// The frame the failure is attributed to, when the subsystem reported one.
    pub fn frame(&self) -> Option<i64> {
        match self {
            RenderError::FrameFailed { frame, .. } => Some(*frame),
            RenderError::OutOfOrder { actual, .. } => Some(*actual),
            _ => None,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RigError {
    #[error("Camera rig has no cameras")]
    Empty,
    #[error("Invalid rig camera name '{0}'")]
    InvalidName(String),
    #[error("Rig camera '{0}' is defined more than once")]
    DuplicateName(String),
    #[error("Rig camera '{camera}' has field of view {fov_degrees}, expected (0, 180)")]
    InvalidFov { camera: String, fov_degrees: f64 },
    #[error("Malformed camera rig document: {0}")]
    Malformed(String),
}

impl RigError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RigError::Malformed(_) => ErrorKind::SchemaError,
            _ => ErrorKind::InvalidRequest,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Terminal `Failed` result of an export run.
#[derive(Debug, Clone)]
pub struct ExportFailure {
    pub kind: ErrorKind,
    pub message: String,
    pub pass: Option<PassKind>,
    pub frame: Option<i64>,
    /// Rig camera the failing pass rendered through.
    pub camera: Option<String>,
}

impl ExportFailure {
    pub fn new(error: &CaptureError) -> Self {
        let frame = match error {
            CaptureError::Render(render) => render.frame(),
            _ => None,
        };
        Self {
            kind: error.kind(),
            message: error.to_string(),
            pass: None,
            frame,
            camera: None,
        }
    }

    pub fn with_pass(mut self, pass: PassKind) -> Self {
        self.pass = Some(pass);
        self
    }

    pub fn with_frame(mut self, frame: i64) -> Self {
        self.frame = Some(frame);
        self
    }

    pub fn with_camera(mut self, camera: Option<&str>) -> Self {
        self.camera = camera.map(str::to_string);
        self
    }
}

impl From<CaptureError> for ExportFailure {
    fn from(error: CaptureError) -> Self {
        ExportFailure::new(&error)
    }
}

impl fmt::Display for ExportFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.message)?;
        if let Some(pass) = &self.pass {
            write!(f, " (pass {}", pass.name())?;
            if let Some(frame) = self.frame {
                write!(f, ", frame {}", frame)?;
            }
            write!(f, ")")?;
        } else if let Some(frame) = self.frame {
            write!(f, " (frame {})", frame)?;
        }
        if let Some(camera) = &self.camera {
            write!(f, " [camera {}]", camera)?;
        }
        Ok(())
    }
}

impl std::error::Error for ExportFailure {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_display_names_pass_and_frame() {
        let error = CaptureError::Render(RenderError::FrameFailed {
            frame: 12,
            message: "gpu lost".to_string(),
        });
        let failure = ExportFailure::new(&error).with_pass(PassKind::SemanticSegmentation);

        assert_eq!(failure.kind, ErrorKind::RenderFailure);
        assert_eq!(failure.frame, Some(12));
        let text = failure.to_string();
        assert!(text.contains("semantic"));
        assert!(text.contains("frame 12"));
    }

    #[test]
    fn test_only_restore_failure_is_fatal() {
        assert!(!ErrorKind::RestoreFailure.is_recoverable());
        assert!(ErrorKind::RenderFailure.is_recoverable());
        assert!(ErrorKind::PipelineBusy.is_recoverable());
    }
}
