use crate::error::CaptureError;
use crate::pipeline::types::{ExportManifest, MANIFEST_FILE_NAME};
use crate::render::{CameraRig, CAMERA_RIG_FILE_NAME};
use crate::semantic::{write_classes_csv, SemanticClassRegistry};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Writes the run metadata: per-camera pose files, then the run-level files in the
/// output root.
#[derive(Debug, Clone)]
pub struct ExportWriter {
    camera_poses_csv: bool,
    semantic_classes_csv: bool,
}

impl ExportWriter {
    pub fn new() -> Self {
        Self {
            camera_poses_csv: true,
            semantic_classes_csv: true,
        }
    }

    pub fn camera_poses_csv(mut self, enabled: bool) -> Self {
        self.camera_poses_csv = enabled;
        self
    }

    pub fn semantic_classes_csv(mut self, enabled: bool) -> Self {
        self.semantic_classes_csv = enabled;
        self
    }

    /// Writes the side files first and the manifest last, so a manifest on disk always
    /// belongs to a complete run. Returns the manifest path.
    pub async fn write(
        &self,
        output_root: &Path,
        manifest: &ExportManifest,
        registry: Option<&SemanticClassRegistry>,
        rig: Option<&CameraRig>,
    ) -> Result<PathBuf, CaptureError> {
        tokio::fs::create_dir_all(output_root).await?;

        if self.camera_poses_csv {
            for capture in &manifest.cameras {
                tokio::fs::create_dir_all(&capture.directory).await?;
                let path = capture.poses_path();
                tokio::fs::write(&path, capture.camera_poses_csv()).await?;
                debug!("Wrote {} camera pose(s) to {}", capture.frames.len(), path.display());
            }
        }
        if let Some(rig) = rig {
            let (width, height) = manifest
                .cameras
                .iter()
                .find_map(|capture| capture.frames.first())
                .map_or((0, 0), |frame| (frame.intrinsics.width, frame.intrinsics.height));
            let path = output_root.join(CAMERA_RIG_FILE_NAME);
            tokio::fs::write(&path, rig.to_ros_json(width, height)?).await?;
            debug!("Wrote camera rig with {} camera(s) to {}", rig.len(), path.display());
        }
        if let Some(registry) = registry.filter(|_| self.semantic_classes_csv) {
            write_classes_csv(registry, output_root).await?;
        }

        let path = output_root.join(MANIFEST_FILE_NAME);
        tokio::fs::write(&path, manifest.to_json()?).await?;
        info!("Wrote export manifest to {}", path.display());
        Ok(path)
    }
}

impl Default for ExportWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::{CameraCapture, CAMERA_POSES_FILE_NAME};
    use crate::render::{AnimationRange, RosRigDocument};
    use crate::scene::CameraMount;
    use crate::semantic::SEMANTIC_CLASSES_FILE_NAME;
    use std::path::Path;

    fn manifest_for(root: &Path, cameras: &[Option<&str>]) -> ExportManifest {
        let mut manifest = ExportManifest::new(AnimationRange::new(0, 3));
        for camera in cameras {
            let directory = match camera {
                Some(name) => root.join(name),
                None => root.to_path_buf(),
            };
            manifest.cameras.push(CameraCapture::new(
                camera.map(str::to_string),
                CameraMount::default(),
                directory,
            ));
        }
        manifest
    }

    #[tokio::test]
    async fn test_writes_manifest_and_side_files() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = manifest_for(dir.path(), &[None]);
        let registry = SemanticClassRegistry::new();

        let path = ExportWriter::new()
            .write(dir.path(), &manifest, Some(&registry), None)
            .await
            .unwrap();

        assert_eq!(path, dir.path().join(MANIFEST_FILE_NAME));
        assert!(dir.path().join(CAMERA_POSES_FILE_NAME).exists());
        assert!(dir.path().join(SEMANTIC_CLASSES_FILE_NAME).exists());
        assert!(!dir.path().join(CAMERA_RIG_FILE_NAME).exists());
    }

    #[tokio::test]
    async fn test_rig_export_writes_poses_per_camera() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = manifest_for(dir.path(), &[Some("left"), Some("right")]);
        let rig = CameraRig::new()
            .with_camera("left", CameraMount::default())
            .with_camera("right", CameraMount::default());

        ExportWriter::new()
            .write(dir.path(), &manifest, None, Some(&rig))
            .await
            .unwrap();

        assert!(dir.path().join("left").join(CAMERA_POSES_FILE_NAME).exists());
        assert!(dir.path().join("right").join(CAMERA_POSES_FILE_NAME).exists());
        let document: RosRigDocument = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join(CAMERA_RIG_FILE_NAME)).unwrap(),
        )
        .unwrap();
        assert_eq!(document.cameras.len(), 2);
    }

    #[tokio::test]
    async fn test_disabled_side_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = manifest_for(dir.path(), &[None]);
        let registry = SemanticClassRegistry::new();

        ExportWriter::new()
            .camera_poses_csv(false)
            .semantic_classes_csv(false)
            .write(dir.path(), &manifest, Some(&registry), None)
            .await
            .unwrap();

        assert!(dir.path().join(MANIFEST_FILE_NAME).exists());
        assert!(!dir.path().join(CAMERA_POSES_FILE_NAME).exists());
        assert!(!dir.path().join(SEMANTIC_CLASSES_FILE_NAME).exists());
    }
}
