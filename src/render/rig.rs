use super::CameraIntrinsics;
use crate::error::RigError;
use crate::scene::CameraMount;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Rig description written next to the manifest when an export renders through a rig.
pub const CAMERA_RIG_FILE_NAME: &str = "camera_rig.json";

/// One camera of a rig, mounted relative to the animated rig track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RigCamera {
    pub name: String,
    pub mount: CameraMount,
}

impl RigCamera {
    pub fn new(name: impl Into<String>, mount: CameraMount) -> Self {
        Self {
            name: name.into(),
            mount,
        }
    }
}

/// Set of cameras that each render every pass of an export.
///
/// Output for a camera lands in `<output_root>/<camera name>/`, so names double as
/// directory names.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CameraRig {
    cameras: Vec<RigCamera>,
}

impl CameraRig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_camera(mut self, name: impl Into<String>, mount: CameraMount) -> Self {
        self.cameras.push(RigCamera::new(name, mount));
        self
    }

    pub fn cameras(&self) -> &[RigCamera] {
        &self.cameras
    }

    pub fn len(&self) -> usize {
        self.cameras.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cameras.is_empty()
    }

    pub fn validate(&self) -> Result<(), RigError> {
        if self.cameras.is_empty() {
            return Err(RigError::Empty);
        }
        let mut seen = HashSet::new();
        for camera in &self.cameras {
            if !is_valid_camera_name(&camera.name) {
                return Err(RigError::InvalidName(camera.name.clone()));
            }
            if !seen.insert(camera.name.as_str()) {
                return Err(RigError::DuplicateName(camera.name.clone()));
            }
            let fov = camera.mount.fov_degrees;
            if !(fov > 0.0 && fov < 180.0) {
                return Err(RigError::InvalidFov {
                    camera: camera.name.clone(),
                    fov_degrees: fov,
                });
            }
        }
        Ok(())
    }

    /// ROS-style rig description for images of `width` x `height` pixels.
    pub fn ros_document(&self, width: u32, height: u32) -> RosRigDocument {
        let cameras = self
            .cameras
            .iter()
            .map(|camera| {
                let k = CameraIntrinsics::from_fov(camera.mount.fov_degrees, width, height);
                let [w, x, y, z] = camera.mount.rotation;
                let entry = RosCamera {
                    intrinsics: [k.fx, 0.0, k.cx, 0.0, k.fy, k.cy, 0.0, 0.0, 1.0],
                    rotation: [x, y, z, w],
                    translation: camera.mount.translation,
                    sensor_size: [f64::from(width), f64::from(height)],
                };
                (camera.name.clone(), entry)
            })
            .collect();
        RosRigDocument { cameras }
    }

    pub fn to_ros_json(&self, width: u32, height: u32) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.ros_document(width, height))
    }

    /// Builds a rig from a ROS-style description. Cameras with a zero sensor are skipped.
    pub fn from_ros_json(json: &str) -> Result<Self, RigError> {
        let document: RosRigDocument =
            serde_json::from_str(json).map_err(|e| RigError::Malformed(e.to_string()))?;

        let mut rig = CameraRig::new();
        for (name, camera) in document.cameras {
            let [width, _] = camera.sensor_size;
            let focal = camera.intrinsics[0];
            if camera.sensor_size.iter().any(|&v| v <= 0.0) {
                warn!("Skipping rig camera '{}' with an empty sensor", name);
                continue;
            }
            if focal <= 0.0 {
                return Err(RigError::Malformed(format!(
                    "camera '{}' has focal length {}",
                    name, focal
                )));
            }
            let fov_degrees = 2.0 * (width / 2.0 / focal).atan().to_degrees();
            let [x, y, z, w] = camera.rotation;
            rig = rig.with_camera(
                name,
                CameraMount::new(camera.translation, [w, x, y, z], fov_degrees),
            );
        }

        rig.validate()?;
        debug!("Loaded camera rig with {} camera(s)", rig.len());
        Ok(rig)
    }
}

fn is_valid_camera_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// On-disk rig format: camera name to row-major 3x3 intrinsics, `x y z w` rotation,
/// translation and sensor size in pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosRigDocument {
    pub cameras: IndexMap<String, RosCamera>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosCamera {
    pub intrinsics: [f64; 9],
    pub rotation: [f64; 4],
    pub translation: [f64; 3],
    pub sensor_size: [f64; 2],
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stereo_rig() -> CameraRig {
        CameraRig::new()
            .with_camera("left", CameraMount::new([-0.1, 0.0, 0.0], [1.0, 0.0, 0.0, 0.0], 90.0))
            .with_camera("right", CameraMount::new([0.1, 0.0, 0.0], [1.0, 0.0, 0.0, 0.0], 60.0))
    }

    #[test]
    fn test_invalid_rigs_are_rejected() {
        assert_eq!(CameraRig::new().validate(), Err(RigError::Empty));

        let duplicate = CameraRig::new()
            .with_camera("cam", CameraMount::default())
            .with_camera("cam", CameraMount::default());
        assert_eq!(
            duplicate.validate(),
            Err(RigError::DuplicateName("cam".to_string()))
        );

        let escaping = CameraRig::new().with_camera("../cam", CameraMount::default());
        assert!(matches!(escaping.validate(), Err(RigError::InvalidName(_))));

        let flat = CameraRig::new()
            .with_camera("cam", CameraMount::new([0.0; 3], [1.0, 0.0, 0.0, 0.0], 180.0));
        assert!(matches!(flat.validate(), Err(RigError::InvalidFov { .. })));
    }

    #[test]
    fn test_ros_document_layout() {
        let document = stereo_rig().ros_document(640, 480);
        let left = &document.cameras["left"];

        assert!((left.intrinsics[0] - 320.0).abs() < 1e-9);
        assert_eq!(left.intrinsics[2], 320.0);
        assert_eq!(left.intrinsics[5], 240.0);
        assert_eq!(left.intrinsics[8], 1.0);
        assert_eq!(left.rotation, [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(left.sensor_size, [640.0, 480.0]);
    }

    #[test]
    fn test_rig_reads_back_from_ros_json() {
        let rig = stereo_rig();
        let json = rig.to_ros_json(640, 480).unwrap();

        let loaded = CameraRig::from_ros_json(&json).unwrap();

        assert_eq!(loaded.len(), 2);
        let right = &loaded.cameras()[1];
        assert_eq!(right.name, "right");
        assert!((right.mount.fov_degrees - 60.0).abs() < 1e-6);
        assert_eq!(right.mount.translation, [0.1, 0.0, 0.0]);
    }

    #[test]
    fn test_malformed_ros_json_is_rejected() {
        let result = CameraRig::from_ros_json("{ \"cameras\": { \"a\": { \"intrinsics\": [1] } } }");
        assert!(matches!(result, Err(RigError::Malformed(_))));
    }
}
