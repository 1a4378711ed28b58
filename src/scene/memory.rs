use super::{CameraMount, MaterialRef, ObjectId, ObjectKind, PostProcessSettings, Scene, SceneObject};
use crate::error::SceneError;
use indexmap::IndexMap;
use tracing::debug;

/// Static mesh with one material per slot.
#[derive(Debug, Clone)]
pub struct MeshObject {
    id: ObjectId,
    name: String,
    slots: Vec<MaterialRef>,
    visible: bool,
}

impl MeshObject {
    pub fn new(name: impl Into<String>, slots: Vec<MaterialRef>) -> Self {
        Self {
            id: ObjectId::new(),
            name: name.into(),
            slots,
            visible: true,
        }
    }

    pub fn with_id(mut self, id: ObjectId) -> Self {
        self.id = id;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }
}

impl SceneObject for MeshObject {
    fn id(&self) -> ObjectId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ObjectKind {
        ObjectKind::Mesh
    }

    fn materials(&self) -> Vec<MaterialRef> {
        self.slots.clone()
    }

    fn set_materials(&mut self, materials: &[MaterialRef]) -> Result<(), SceneError> {
        if materials.len() != self.slots.len() {
            return Err(SceneError::SlotMismatch {
                id: self.id,
                expected: self.slots.len(),
                actual: materials.len(),
            });
        }
        self.slots = materials.to_vec();
        Ok(())
    }

    fn is_visible(&self) -> bool {
        self.visible
    }

    fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }
}

/// Terrain carrying a single landscape material.
#[derive(Debug, Clone)]
pub struct LandscapeObject {
    id: ObjectId,
    name: String,
    material: MaterialRef,
    visible: bool,
}

impl LandscapeObject {
    pub fn new(name: impl Into<String>, material: MaterialRef) -> Self {
        Self {
            id: ObjectId::new(),
            name: name.into(),
            material,
            visible: true,
        }
    }
}

impl SceneObject for LandscapeObject {
    fn id(&self) -> ObjectId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ObjectKind {
        ObjectKind::Landscape
    }

    fn materials(&self) -> Vec<MaterialRef> {
        vec![self.material.clone()]
    }

    fn set_materials(&mut self, materials: &[MaterialRef]) -> Result<(), SceneError> {
        match materials {
            [material] => {
                self.material = material.clone();
                Ok(())
            }
            _ => Err(SceneError::SlotMismatch {
                id: self.id,
                expected: 1,
                actual: materials.len(),
            }),
        }
    }

    fn is_visible(&self) -> bool {
        self.visible
    }

    fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }
}

/// Light source. Has no materials and is never rendered into a pass.
#[derive(Debug, Clone)]
pub struct LightObject {
    id: ObjectId,
    name: String,
    visible: bool,
}

impl LightObject {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: ObjectId::new(),
            name: name.into(),
            visible: true,
        }
    }
}

impl SceneObject for LightObject {
    fn id(&self) -> ObjectId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ObjectKind {
        ObjectKind::Light
    }

    fn materials(&self) -> Vec<MaterialRef> {
        Vec::new()
    }

    fn set_materials(&mut self, materials: &[MaterialRef]) -> Result<(), SceneError> {
        if materials.is_empty() {
            Ok(())
        } else {
            Err(SceneError::Rejected(
                self.id,
                "lights have no material slots".to_string(),
            ))
        }
    }

    fn is_visible(&self) -> bool {
        self.visible
    }

    fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }
}

/// Screen-space placement of an object, in normalized image coordinates.
///
/// This is geometry plus animation: the capture pipeline never writes it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Footprint {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub depth_meters: f32,
    /// Normalized displacement per frame.
    pub velocity: (f32, f32),
}

impl Footprint {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            depth_meters: 10.0,
            velocity: (0.0, 0.0),
        }
    }

    pub fn with_depth(mut self, depth_meters: f32) -> Self {
        self.depth_meters = depth_meters;
        self
    }

    pub fn with_velocity(mut self, dx: f32, dy: f32) -> Self {
        self.velocity = (dx, dy);
        self
    }

    /// Placement at a given animation frame.
    pub fn at_frame(&self, frame: i64) -> Footprint {
        let t = frame as f32;
        Footprint {
            x: self.x + self.velocity.0 * t,
            y: self.y + self.velocity.1 * t,
            ..*self
        }
    }
}

struct Placed {
    object: Box<dyn SceneObject>,
    footprint: Option<Footprint>,
}

/// Scene graph held in memory, in insertion (painter's) order.
pub struct InMemoryScene {
    objects: IndexMap<ObjectId, Placed>,
    post_process: PostProcessSettings,
    camera: CameraMount,
}

impl InMemoryScene {
    pub fn new() -> Self {
        Self {
            objects: IndexMap::new(),
            post_process: PostProcessSettings::default(),
            camera: CameraMount::default(),
        }
    }

    pub fn with_camera_mount(mut self, mount: CameraMount) -> Self {
        self.camera = mount;
        self
    }

    pub fn with_post_process(mut self, settings: PostProcessSettings) -> Self {
        self.post_process = settings;
        self
    }

    pub fn add_object(&mut self, object: Box<dyn SceneObject>, footprint: Footprint) -> ObjectId {
        let id = object.id();
        debug!("Adding object '{}' ({})", object.name(), id);
        self.objects.insert(
            id,
            Placed {
                object,
                footprint: Some(footprint),
            },
        );
        id
    }

    pub fn add_light(&mut self, light: LightObject) -> ObjectId {
        let id = light.id();
        self.objects.insert(
            id,
            Placed {
                object: Box::new(light),
                footprint: None,
            },
        );
        id
    }

    pub fn remove_object(&mut self, id: ObjectId) -> bool {
        self.objects.shift_remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Objects with screen placement, back to front.
    pub fn placements(&self) -> impl Iterator<Item = (&dyn SceneObject, Footprint)> {
        self.objects
            .values()
            .filter_map(|placed| placed.footprint.map(|fp| (placed.object.as_ref(), fp)))
    }
}

impl Default for InMemoryScene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene for InMemoryScene {
    fn renderable_object_ids(&self) -> Vec<ObjectId> {
        self.objects
            .values()
            .filter(|placed| placed.object.kind().is_renderable())
            .map(|placed| placed.object.id())
            .collect()
    }

    fn object(&self, id: ObjectId) -> Option<&dyn SceneObject> {
        self.objects.get(&id).map(|placed| placed.object.as_ref())
    }

    fn object_mut(&mut self, id: ObjectId) -> Option<&mut (dyn SceneObject + 'static)> {
        self.objects.get_mut(&id).map(|placed| placed.object.as_mut())
    }

    fn post_process(&self) -> PostProcessSettings {
        self.post_process
    }

    fn set_post_process(&mut self, settings: PostProcessSettings) {
        self.post_process = settings;
    }

    fn camera_mount(&self) -> CameraMount {
        self.camera
    }

    fn set_camera_mount(&mut self, mount: CameraMount) {
        self.camera = mount;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_renderable_ids_skip_lights_and_keep_order() {
        let mut scene = InMemoryScene::new();
        let a = scene.add_object(
            Box::new(MeshObject::new("a", vec![MaterialRef::Asset("m".into())])),
            Footprint::new(0.0, 0.0, 0.5, 0.5),
        );
        scene.add_light(LightObject::new("sun"));
        let b = scene.add_object(
            Box::new(LandscapeObject::new(
                "ground",
                MaterialRef::Asset("grass".into()),
            )),
            Footprint::new(0.0, 0.5, 1.0, 0.5),
        );

        assert_eq!(scene.renderable_object_ids(), vec![a, b]);
        assert_eq!(scene.placements().count(), 2);
    }

    #[test]
    fn test_landscape_rejects_multiple_slots() {
        let mut ground = LandscapeObject::new("ground", MaterialRef::Asset("grass".into()));
        let result = ground.set_materials(&[
            MaterialRef::Asset("a".into()),
            MaterialRef::Asset("b".into()),
        ]);
        assert!(matches!(
            result,
            Err(SceneError::SlotMismatch { expected: 1, actual: 2, .. })
        ));
    }

    #[test]
    fn test_footprint_moves_with_frame() {
        let fp = Footprint::new(0.1, 0.2, 0.1, 0.1).with_velocity(0.01, 0.0);
        let moved = fp.at_frame(10);
        assert!((moved.x - 0.2).abs() < 1e-6);
        assert_eq!(moved.y, 0.2);
        assert_eq!(moved.width, 0.1);
    }
}
