pub mod driver;
pub mod rig;
pub mod software;

pub use driver::{FrameSequence, SequenceRenderDriver};
pub use rig::{CameraRig, RigCamera, RosCamera, RosRigDocument, CAMERA_RIG_FILE_NAME};
pub use software::{CameraTrack, SoftwareRenderer};

use crate::error::RenderError;
use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::path::PathBuf;
use std::pin::Pin;

/// Half-open range of animation frames, `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnimationRange {
    pub start: i64,
    pub end: i64,
}

impl AnimationRange {
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    /// Number of frames, or `None` when it does not fit in `usize`.
    pub fn frame_count(&self) -> Option<usize> {
        if self.is_empty() {
            return Some(0);
        }
        self.end
            .checked_sub(self.start)
            .and_then(|count| usize::try_from(count).ok())
    }

    /// Number of frames. Ranges too long to count report zero and are rejected by request
    /// validation.
    pub fn len(&self) -> usize {
        self.frame_count().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn frames(&self) -> Range<i64> {
        self.start..self.end
    }
}

/// Output image encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    #[default]
    Png,
    Jpeg,
}

impl ImageFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpeg",
        }
    }

    pub fn is_lossless(&self) -> bool {
        matches!(self, ImageFormat::Png)
    }
}

impl From<ImageFormat> for image::ImageFormat {
    fn from(value: ImageFormat) -> Self {
        match value {
            ImageFormat::Png => image::ImageFormat::Png,
            ImageFormat::Jpeg => image::ImageFormat::Jpeg,
        }
    }
}

/// File name of a frame image: zero-padded frame index plus extension.
pub fn frame_file_name(frame_index: i64, padding: usize, format: ImageFormat) -> String {
    format!(
        "{:0width$}.{}",
        frame_index,
        format.extension(),
        width = padding
    )
}

/// Camera position and orientation (quaternion, `w x y z`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraPose {
    pub position: [f64; 3],
    pub rotation: [f64; 4],
}

impl CameraPose {
    pub fn at(position: [f64; 3]) -> Self {
        Self {
            position,
            rotation: [1.0, 0.0, 0.0, 0.0],
        }
    }
}

/// Pinhole intrinsics in output-image pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    pub width: u32,
    pub height: u32,
}

impl CameraIntrinsics {
    /// Square-pixel intrinsics from a horizontal field of view.
    pub fn from_fov(fov_degrees: f64, width: u32, height: u32) -> Self {
        let focal = f64::from(width) / 2.0 / (fov_degrees.to_radians() / 2.0).tan();
        Self {
            fx: focal,
            fy: focal,
            cx: f64::from(width / 2),
            cy: f64::from(height / 2),
            width,
            height,
        }
    }
}

/// Camera state for one frame. Shared by every pass of an export.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraFrame {
    pub frame_index: i64,
    pub pose: CameraPose,
    pub intrinsics: CameraIntrinsics,
}

/// One frame reported back by the render subsystem.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedFrame {
    pub frame_index: i64,
    pub image_path: PathBuf,
    pub pose: CameraPose,
    pub intrinsics: CameraIntrinsics,
}

impl RenderedFrame {
    pub fn camera_frame(&self) -> CameraFrame {
        CameraFrame {
            frame_index: self.frame_index,
            pose: self.pose,
            intrinsics: self.intrinsics,
        }
    }
}

/// A render job handed to the subsystem.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderJob {
    pub range: AnimationRange,
    pub output_dir: PathBuf,
    pub format: ImageFormat,
    pub frame_name_padding: usize,
}

pub type FrameStream = Pin<Box<dyn Stream<Item = Result<RenderedFrame, RenderError>> + Send>>;

/// The external engine that turns the live scene into frame images.
#[async_trait]
pub trait RenderSubsystem: Send + Sync {
    /// Starts rendering `job.range`. Frames arrive on the returned stream as they finish.
    async fn submit_range(&self, job: RenderJob) -> Result<FrameStream, RenderError>;

    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_length() {
        assert_eq!(AnimationRange::new(10, 14).len(), 4);
        assert!(AnimationRange::new(3, 3).is_empty());
        assert_eq!(AnimationRange::new(5, 2).len(), 0);
    }

    #[test]
    fn test_range_too_long_to_count() {
        let range = AnimationRange::new(i64::MIN, i64::MAX);
        assert_eq!(range.frame_count(), None);
        assert_eq!(range.len(), 0);
        assert!(!range.is_empty());
        assert_eq!(AnimationRange::new(-2, 3).frame_count(), Some(5));
    }

    #[test]
    fn test_frame_file_name_is_zero_padded() {
        assert_eq!(frame_file_name(42, 6, ImageFormat::Png), "000042.png");
        assert_eq!(frame_file_name(7, 4, ImageFormat::Jpeg), "0007.jpeg");
    }

    #[test]
    fn test_intrinsics_from_ninety_degree_fov() {
        let intrinsics = CameraIntrinsics::from_fov(90.0, 640, 480);
        assert!((intrinsics.fx - 320.0).abs() < 1e-9);
        assert_eq!(intrinsics.fx, intrinsics.fy);
        assert_eq!(intrinsics.cx, 320.0);
        assert_eq!(intrinsics.cy, 240.0);
    }
}
