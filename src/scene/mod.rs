pub mod memory;

pub use memory::{Footprint, InMemoryScene, LandscapeObject, LightObject, MeshObject};

use crate::error::SceneError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

/// Stable identifier of an object in the scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(pub Uuid);

impl ObjectId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 8-bit RGB triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const WHITE: Rgb = Rgb::new(255, 255, 255);
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn to_array(self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }
}

/// Color of pixels no object covers.
pub const BACKGROUND_COLOR: Rgb = Rgb::BLACK;

impl From<[u8; 3]> for Rgb {
    fn from(value: [u8; 3]) -> Self {
        Rgb::new(value[0], value[1], value[2])
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.r, self.g, self.b)
    }
}

/// Materials the renderer provides for data passes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PassMaterial {
    /// Linear depth, saturating at `range_meters`.
    Depth { range_meters: f32 },
    /// World-space normals.
    Normal,
    /// Screen-space motion, multiplied by `scale`.
    OpticalFlow { scale: f32 },
}

/// What an object slot is shaded with.
#[derive(Debug, Clone, PartialEq)]
pub enum MaterialRef {
    /// The user's own material asset.
    Asset(String),
    /// Flat, unlit color. Used by the segmentation pass.
    Unlit(Rgb),
    Pass(PassMaterial),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Mesh,
    Landscape,
    Light,
}

impl ObjectKind {
    pub fn is_renderable(&self) -> bool {
        !matches!(self, ObjectKind::Light)
    }
}

/// Recorded visual state of one object.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectVisualState {
    pub object_id: ObjectId,
    pub materials: Vec<MaterialRef>,
    pub visible: bool,
}

/// Scene-wide effects that alter final pixel values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostProcessSettings {
    pub anti_aliasing: bool,
    pub tone_mapping: bool,
    pub bloom: bool,
}

impl PostProcessSettings {
    /// Settings that leave shaded colors untouched.
    pub fn exact() -> Self {
        Self {
            anti_aliasing: false,
            tone_mapping: false,
            bloom: false,
        }
    }
}

impl Default for PostProcessSettings {
    fn default() -> Self {
        Self {
            anti_aliasing: true,
            tone_mapping: true,
            bloom: false,
        }
    }
}

/// Pose and field of view of the rendering camera relative to its animated track.
///
/// Rig renders move the one rendering camera onto each rig camera in turn; rotation is a
/// `w x y z` quaternion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraMount {
    pub translation: [f64; 3],
    pub rotation: [f64; 4],
    pub fov_degrees: f64,
}

impl CameraMount {
    pub fn new(translation: [f64; 3], rotation: [f64; 4], fov_degrees: f64) -> Self {
        Self {
            translation,
            rotation,
            fov_degrees,
        }
    }
}

impl Default for CameraMount {
    fn default() -> Self {
        Self::new([0.0, 0.0, 0.0], [1.0, 0.0, 0.0, 0.0], 90.0)
    }
}

/// Visual capability every concrete object kind exposes to the capture pipeline.
///
/// Geometry and animation are deliberately absent: the pipeline can only read and
/// write materials and visibility.
pub trait SceneObject: Send + Sync {
    fn id(&self) -> ObjectId;
    fn name(&self) -> &str;
    fn kind(&self) -> ObjectKind;

    fn materials(&self) -> Vec<MaterialRef>;

    /// Replaces every slot. The slice must match the object's slot count.
    fn set_materials(&mut self, materials: &[MaterialRef]) -> Result<(), SceneError>;

    fn is_visible(&self) -> bool;
    fn set_visible(&mut self, visible: bool);

    fn slot_count(&self) -> usize {
        self.materials().len()
    }

    /// Shades every slot with the same material.
    fn override_materials(&mut self, material: MaterialRef) -> Result<(), SceneError> {
        let materials = vec![material; self.slot_count()];
        self.set_materials(&materials)
    }

    fn visual_state(&self) -> ObjectVisualState {
        ObjectVisualState {
            object_id: self.id(),
            materials: self.materials(),
            visible: self.is_visible(),
        }
    }
}

/// The live scene graph as seen by the capture pipeline.
pub trait Scene: Send {
    /// Renderable objects, in scene order.
    fn renderable_object_ids(&self) -> Vec<ObjectId>;

    fn object(&self, id: ObjectId) -> Option<&dyn SceneObject>;
    fn object_mut(&mut self, id: ObjectId) -> Option<&mut (dyn SceneObject + 'static)>;

    fn post_process(&self) -> PostProcessSettings;
    fn set_post_process(&mut self, settings: PostProcessSettings);

    fn camera_mount(&self) -> CameraMount;
    fn set_camera_mount(&mut self, mount: CameraMount);

    fn contains(&self, id: ObjectId) -> bool {
        self.object(id).is_some()
    }
}

pub type SharedScene = Arc<Mutex<dyn Scene>>;

/// Locks the scene, recovering from a poisoned lock so restore can still run.
pub fn lock_scene<'a, S: ?Sized>(scene: &'a Mutex<S>) -> MutexGuard<'a, S> {
    scene.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_materials_fills_every_slot() {
        let mut mesh = MeshObject::new(
            "chair",
            vec![
                MaterialRef::Asset("wood".to_string()),
                MaterialRef::Asset("fabric".to_string()),
            ],
        );
        mesh.override_materials(MaterialRef::Unlit(Rgb::new(1, 2, 3)))
            .unwrap();

        assert_eq!(
            mesh.materials(),
            vec![
                MaterialRef::Unlit(Rgb::new(1, 2, 3)),
                MaterialRef::Unlit(Rgb::new(1, 2, 3))
            ]
        );
    }

    #[test]
    fn test_lights_are_not_renderable() {
        assert!(!ObjectKind::Light.is_renderable());
        assert!(ObjectKind::Landscape.is_renderable());
    }
}
