use super::pass::PassKind;
use crate::render::{AnimationRange, CameraFrame, ImageFormat};
use crate::scene::{CameraMount, Rgb};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const MANIFEST_FILE_NAME: &str = "manifest.json";
pub const CAMERA_POSES_FILE_NAME: &str = "camera_poses.csv";

const MANIFEST_VERSION: u32 = 2;

/// Output of one completed pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassRecord {
    pub pass: PassKind,
    pub directory: PathBuf,
    pub format: ImageFormat,
    pub frame_count: usize,
}

/// Everything rendered through one camera: its passes and the frames they share.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraCapture {
    /// Rig camera name, `None` for the scene's own camera.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera: Option<String>,
    pub mount: CameraMount,
    pub directory: PathBuf,
    pub passes: Vec<PassRecord>,
    pub frames: Vec<CameraFrame>,
}

impl CameraCapture {
    pub fn new(camera: Option<String>, mount: CameraMount, directory: PathBuf) -> Self {
        Self {
            camera,
            mount,
            directory,
            passes: Vec::new(),
            frames: Vec::new(),
        }
    }

    pub fn pass(&self, kind: PassKind) -> Option<&PassRecord> {
        self.passes.iter().find(|record| record.pass.same_pass(&kind))
    }

    /// Camera frames as `id,tx,ty,tz,qw,qx,qy,qz,fx,fy,cx,cy` lines.
    pub fn camera_poses_csv(&self) -> String {
        let mut lines = vec!["id,tx,ty,tz,qw,qx,qy,qz,fx,fy,cx,cy".to_string()];
        for frame in &self.frames {
            let [tx, ty, tz] = frame.pose.position;
            let [qw, qx, qy, qz] = frame.pose.rotation;
            let k = frame.intrinsics;
            lines.push(format!(
                "{},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{},{}",
                frame.frame_index, tx, ty, tz, qw, qx, qy, qz, k.fx, k.fy, k.cx, k.cy
            ));
        }
        lines.join("\n") + "\n"
    }

    pub fn poses_path(&self) -> PathBuf {
        self.directory.join(CAMERA_POSES_FILE_NAME)
    }
}

/// Summary of a finished export: one capture per camera, in render order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportManifest {
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub range: AnimationRange,
    pub cameras: Vec<CameraCapture>,
    /// Class table used by the segmentation pass, when one ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic_classes: Option<IndexMap<String, Rgb>>,
}

impl ExportManifest {
    pub fn new(range: AnimationRange) -> Self {
        Self {
            version: MANIFEST_VERSION,
            created_at: Utc::now(),
            range,
            cameras: Vec::new(),
            semantic_classes: None,
        }
    }

    pub fn camera(&self, name: &str) -> Option<&CameraCapture> {
        self.cameras
            .iter()
            .find(|capture| capture.camera.as_deref() == Some(name))
    }

    /// Every pass record across all cameras.
    pub fn passes(&self) -> impl Iterator<Item = &PassRecord> {
        self.cameras.iter().flat_map(|capture| capture.passes.iter())
    }

    /// Frames rendered through the first camera.
    pub fn frame_count(&self) -> usize {
        self.cameras.first().map_or(0, |capture| capture.frames.len())
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
