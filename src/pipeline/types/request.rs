use super::pass::{PassKind, PassSpec};
use crate::error::CaptureError;
use crate::render::{AnimationRange, CameraRig, ImageFormat, RigCamera};
use crate::scene::ObjectId;
use std::path::{Path, PathBuf};

/// Which objects take part in the capture.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ObjectSelection {
    /// Every renderable object in the scene
    #[default]
    All,
    /// Only these objects get pass materials. Segmentation still paints every other
    /// renderable object with the `Undefined` color.
    Only(Vec<ObjectId>),
}

/// What the UI asks the pipeline to export.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportRequest {
    pub passes: Vec<PassSpec>,
    pub object_selection: ObjectSelection,
    pub output_root: PathBuf,
    pub range: AnimationRange,
    /// Renders every pass once per rig camera. Without a rig the scene's own camera
    /// mount is used and passes write straight under `output_root`.
    pub camera_rig: Option<CameraRig>,
}

impl ExportRequest {
    pub fn builder(output_root: impl AsRef<Path>) -> ExportRequestBuilder {
        ExportRequestBuilder::new(output_root)
    }

    /// Rejects requests that must not touch the scene at all.
    pub fn validate(&self) -> Result<(), CaptureError> {
        if self.passes.is_empty() {
            return Err(CaptureError::InvalidRequest(
                "no passes requested".to_string(),
            ));
        }
        if self.range.is_empty() {
            return Err(CaptureError::InvalidRequest(format!(
                "animation range {}..{} is empty",
                self.range.start, self.range.end
            )));
        }
        if self.range.frame_count().is_none() {
            return Err(CaptureError::InvalidRequest(format!(
                "animation range {}..{} has too many frames",
                self.range.start, self.range.end
            )));
        }

        for (i, pass) in self.passes.iter().enumerate() {
            if self.passes[..i]
                .iter()
                .any(|earlier| earlier.kind.same_pass(&pass.kind))
            {
                return Err(CaptureError::InvalidRequest(format!(
                    "pass '{}' requested more than once",
                    pass.kind.name()
                )));
            }
            if pass.kind.requires_lossless() && !pass.format.is_lossless() {
                return Err(CaptureError::InvalidRequest(format!(
                    "pass '{}' needs a lossless format, got {}",
                    pass.kind.name(),
                    pass.format.extension()
                )));
            }
            match pass.kind {
                PassKind::Depth { range_meters } if range_meters <= 0.0 => {
                    return Err(CaptureError::InvalidRequest(
                        "depth range must be positive".to_string(),
                    ));
                }
                PassKind::OpticalFlow { scale } if scale <= 0.0 => {
                    return Err(CaptureError::InvalidRequest(
                        "optical flow scale must be positive".to_string(),
                    ));
                }
                _ => {}
            }
        }

        if let ObjectSelection::Only(ids) = &self.object_selection {
            if ids.is_empty() {
                return Err(CaptureError::InvalidRequest(
                    "object selection is empty".to_string(),
                ));
            }
        }
        if let Some(rig) = &self.camera_rig {
            rig.validate()?;
        }
        Ok(())
    }

    /// Output directory of `pass` when rendered through `camera`.
    pub fn pass_directory(&self, pass: &PassSpec, camera: Option<&RigCamera>) -> PathBuf {
        match camera {
            Some(camera) => self.camera_directory(Some(camera)).join(pass.kind.name()),
            None => pass.output_directory.clone(),
        }
    }

    /// Directory holding a camera's passes and pose file.
    pub fn camera_directory(&self, camera: Option<&RigCamera>) -> PathBuf {
        match camera {
            Some(camera) => self.output_root.join(&camera.name),
            None => self.output_root.clone(),
        }
    }

    pub fn has_pass(&self, kind: PassKind) -> bool {
        self.passes.iter().any(|pass| pass.kind.same_pass(&kind))
    }
}

pub struct ExportRequestBuilder {
    output_root: PathBuf,
    passes: Vec<(PassKind, Option<ImageFormat>)>,
    object_selection: ObjectSelection,
    range: AnimationRange,
    image_format: ImageFormat,
    camera_rig: Option<CameraRig>,
}

impl ExportRequestBuilder {
    pub fn new(output_root: impl AsRef<Path>) -> Self {
        Self {
            output_root: output_root.as_ref().to_path_buf(),
            passes: Vec::new(),
            object_selection: ObjectSelection::All,
            range: AnimationRange::new(0, 0),
            image_format: ImageFormat::Png,
            camera_rig: None,
        }
    }

    pub fn range(mut self, start: i64, end: i64) -> Self {
        self.range = AnimationRange::new(start, end);
        self
    }

    // Format for passes added without an explicit one.
    pub fn image_format(mut self, format: ImageFormat) -> Self {
        self.image_format = format;
        self
    }

    pub fn pass(mut self, kind: PassKind) -> Self {
        self.passes.push((kind, None));
        self
    }

    pub fn pass_with_format(mut self, kind: PassKind, format: ImageFormat) -> Self {
        self.passes.push((kind, Some(format)));
        self
    }

    pub fn objects(mut self, ids: Vec<ObjectId>) -> Self {
        self.object_selection = ObjectSelection::Only(ids);
        self
    }

    pub fn camera_rig(mut self, rig: CameraRig) -> Self {
        self.camera_rig = Some(rig);
        self
    }

    pub fn build(self) -> ExportRequest {
        let passes = self
            .passes
            .into_iter()
            .map(|(kind, format)| {
                PassSpec::new(
                    kind,
                    &self.output_root,
                    format.unwrap_or(self.image_format),
                )
            })
            .collect();
        ExportRequest {
            passes,
            object_selection: self.object_selection,
            output_root: self.output_root,
            range: self.range,
            camera_rig: self.camera_rig,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::scene::CameraMount;

    fn kind_of(request: ExportRequest) -> Option<ErrorKind> {
        request.validate().err().map(|e| e.kind())
    }

    #[test]
    fn test_empty_requests_are_invalid() {
        let no_passes = ExportRequest::builder("/out").range(0, 10).build();
        let no_frames = ExportRequest::builder("/out")
            .pass(PassKind::Color)
            .range(5, 5)
            .build();

        assert_eq!(kind_of(no_passes), Some(ErrorKind::InvalidRequest));
        assert_eq!(kind_of(no_frames), Some(ErrorKind::InvalidRequest));
    }

    #[test]
    fn test_uncountable_range_is_invalid() {
        let request = ExportRequest::builder("/out")
            .range(i64::MIN, i64::MAX)
            .pass(PassKind::Color)
            .build();
        assert_eq!(kind_of(request), Some(ErrorKind::InvalidRequest));
    }

    #[test]
    fn test_duplicate_and_lossy_passes_are_invalid() {
        let duplicate = ExportRequest::builder("/out")
            .range(0, 3)
            .pass(PassKind::Depth { range_meters: 50.0 })
            .pass(PassKind::Depth {
                range_meters: 100.0,
            })
            .build();
        let lossy = ExportRequest::builder("/out")
            .range(0, 3)
            .pass_with_format(PassKind::SemanticSegmentation, ImageFormat::Jpeg)
            .build();

        assert_eq!(kind_of(duplicate), Some(ErrorKind::InvalidRequest));
        assert_eq!(kind_of(lossy), Some(ErrorKind::InvalidRequest));
    }

    #[test]
    fn test_rig_cameras_get_their_own_directories() {
        let rig = CameraRig::new()
            .with_camera("left", CameraMount::default())
            .with_camera("right", CameraMount::default());
        let request = ExportRequest::builder("/out")
            .range(0, 3)
            .pass(PassKind::Normal)
            .camera_rig(rig.clone())
            .build();

        assert!(request.validate().is_ok());
        let right = &rig.cameras()[1];
        assert_eq!(
            request.pass_directory(&request.passes[0], Some(right)),
            PathBuf::from("/out/right/normal")
        );
        assert_eq!(
            request.pass_directory(&request.passes[0], None),
            PathBuf::from("/out/normal")
        );
    }

    #[test]
    fn test_invalid_rig_is_invalid_request() {
        let request = ExportRequest::builder("/out")
            .range(0, 3)
            .pass(PassKind::Color)
            .camera_rig(CameraRig::new())
            .build();
        assert_eq!(kind_of(request), Some(ErrorKind::InvalidRequest));
    }

    #[test]
    fn test_builder_applies_default_format() {
        let request = ExportRequest::builder("/out")
            .range(0, 3)
            .image_format(ImageFormat::Jpeg)
            .pass(PassKind::Color)
            .pass_with_format(PassKind::SemanticSegmentation, ImageFormat::Png)
            .build();

        assert!(request.validate().is_ok());
        assert_eq!(request.passes[0].format, ImageFormat::Jpeg);
        assert_eq!(request.passes[1].format, ImageFormat::Png);
        assert!(request.has_pass(PassKind::SemanticSegmentation));
    }
}
