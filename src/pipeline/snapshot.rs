use crate::error::{CaptureError, SceneError};
use crate::scene::{
    lock_scene, CameraMount, ObjectId, ObjectVisualState, PostProcessSettings, Scene, SharedScene,
};
use tracing::{debug, error, warn};

/// Restorable visual state of a set of objects plus the scene-wide post-process settings
/// and camera mount.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneSnapshot {
    states: Vec<ObjectVisualState>,
    post_process: PostProcessSettings,
    camera: CameraMount,
}

impl SceneSnapshot {
    /// Records the current state of every listed object. Each call is a fresh, full capture.
    pub fn capture(scene: &dyn Scene, object_ids: &[ObjectId]) -> Result<Self, SceneError> {
        let states = object_ids
            .iter()
            .map(|&id| {
                scene
                    .object(id)
                    .map(|object| object.visual_state())
                    .ok_or(SceneError::UnknownObject(id))
            })
            .collect::<Result<Vec<_>, _>>()?;

        debug!("Captured visual state of {} object(s)", states.len());
        Ok(Self {
            states,
            post_process: scene.post_process(),
            camera: scene.camera_mount(),
        })
    }

    /// Reapplies the recorded state to every object.
    ///
    /// A failing object does not stop the others from being restored; all failures are
    /// reported together as a `RestoreFailure`.
    pub fn restore(&self, scene: &mut dyn Scene) -> Result<(), CaptureError> {
        let mut failures = Vec::new();

        for state in &self.states {
            let Some(object) = scene.object_mut(state.object_id) else {
                failures.push(format!("object {} is no longer in the scene", state.object_id));
                continue;
            };
            object.set_visible(state.visible);
            if let Err(e) = object.set_materials(&state.materials) {
                failures.push(e.to_string());
            }
        }
        scene.set_post_process(self.post_process);
        scene.set_camera_mount(self.camera);

        if failures.is_empty() {
            debug!("Restored visual state of {} object(s)", self.states.len());
            Ok(())
        } else {
            Err(CaptureError::RestoreFailure(failures))
        }
    }

    pub fn states(&self) -> &[ObjectVisualState] {
        &self.states
    }

    pub fn post_process(&self) -> PostProcessSettings {
        self.post_process
    }

    pub fn camera_mount(&self) -> CameraMount {
        self.camera
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

/// Snapshot bound to the shared scene. Restores on drop unless `restore` was called, so a
/// cancelled or panicking pass never leaves the scene mutated.
pub struct SnapshotGuard {
    scene: SharedScene,
    snapshot: Option<SceneSnapshot>,
}

impl SnapshotGuard {
    pub fn capture(scene: SharedScene, object_ids: &[ObjectId]) -> Result<Self, CaptureError> {
        let snapshot = {
            let guard = lock_scene(&scene);
            SceneSnapshot::capture(&*guard, object_ids)?
        };
        Ok(Self {
            scene,
            snapshot: Some(snapshot),
        })
    }

    pub fn snapshot(&self) -> Option<&SceneSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn restore(mut self) -> Result<(), CaptureError> {
        self.restore_now()
    }

    fn restore_now(&mut self) -> Result<(), CaptureError> {
        match self.snapshot.take() {
            Some(snapshot) => {
                let mut scene = lock_scene(&self.scene);
                snapshot.restore(&mut *scene)
            }
            None => Ok(()),
        }
    }
}

impl Drop for SnapshotGuard {
    fn drop(&mut self) {
        if self.snapshot.is_none() {
            return;
        }
        warn!("Snapshot dropped without explicit restore, restoring scene now");
        if let Err(e) = self.restore_now() {
            error!("Scene restore on drop failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{
        Footprint, InMemoryScene, LandscapeObject, MaterialRef, MeshObject, ObjectKind,
        PassMaterial, Rgb, SceneObject,
    };
    use std::sync::{Arc, Mutex};

    /// Mesh that refuses every material change.
    struct FrozenMesh(MeshObject);

    impl SceneObject for FrozenMesh {
        fn id(&self) -> ObjectId {
            self.0.id()
        }

        fn name(&self) -> &str {
            self.0.name()
        }

        fn kind(&self) -> ObjectKind {
            ObjectKind::Mesh
        }

        fn materials(&self) -> Vec<MaterialRef> {
            self.0.materials()
        }

        fn set_materials(&mut self, _materials: &[MaterialRef]) -> Result<(), SceneError> {
            Err(SceneError::Rejected(self.id(), "materials are frozen".to_string()))
        }

        fn is_visible(&self) -> bool {
            self.0.is_visible()
        }

        fn set_visible(&mut self, visible: bool) {
            self.0.set_visible(visible);
        }
    }

    fn scene_with_two_objects() -> (InMemoryScene, Vec<ObjectId>) {
        let mut scene = InMemoryScene::new();
        let chair = scene.add_object(
            Box::new(MeshObject::new(
                "chair",
                vec![
                    MaterialRef::Asset("oak".to_string()),
                    MaterialRef::Asset("leather".to_string()),
                ],
            )),
            Footprint::new(0.0, 0.0, 0.5, 0.5),
        );
        let ground = scene.add_object(
            Box::new(LandscapeObject::new(
                "ground",
                MaterialRef::Asset("grass".to_string()),
            )),
            Footprint::new(0.0, 0.5, 1.0, 0.5),
        );
        (scene, vec![chair, ground])
    }

    #[test]
    fn test_restore_is_bit_identical() {
        let (mut scene, ids) = scene_with_two_objects();
        let before = SceneSnapshot::capture(&scene, &ids).unwrap();

        let snapshot = SceneSnapshot::capture(&scene, &ids).unwrap();
        for &id in &ids {
            let object = scene.object_mut(id).unwrap();
            object
                .override_materials(MaterialRef::Pass(PassMaterial::Normal))
                .unwrap();
            object.set_visible(false);
        }
        scene.set_post_process(PostProcessSettings::exact());
        scene.set_camera_mount(CameraMount::new([0.5, 0.0, 0.0], [1.0, 0.0, 0.0, 0.0], 60.0));
        snapshot.restore(&mut scene).unwrap();

        assert_eq!(SceneSnapshot::capture(&scene, &ids).unwrap(), before);
        assert_eq!(scene.camera_mount(), CameraMount::default());
    }

    #[test]
    fn test_rejected_materials_still_restore_visibility() {
        let (mut scene, mut ids) = scene_with_two_objects();
        let frozen = scene.add_object(
            Box::new(FrozenMesh(MeshObject::new(
                "statue",
                vec![MaterialRef::Asset("marble".to_string())],
            ))),
            Footprint::new(0.5, 0.0, 0.5, 0.5),
        );
        ids.push(frozen);
        let snapshot = SceneSnapshot::capture(&scene, &ids).unwrap();

        scene.object_mut(frozen).unwrap().set_visible(false);
        let result = snapshot.restore(&mut scene);

        assert!(matches!(result, Err(CaptureError::RestoreFailure(ref f)) if f.len() == 1));
        assert!(scene.object(frozen).unwrap().is_visible());
    }

    #[test]
    fn test_capture_of_unknown_object_fails() {
        let (scene, _) = scene_with_two_objects();
        let result = SceneSnapshot::capture(&scene, &[ObjectId::new()]);
        assert!(matches!(result, Err(SceneError::UnknownObject(_))));
    }

    #[test]
    fn test_restore_reports_missing_objects_and_restores_the_rest() {
        let (mut scene, ids) = scene_with_two_objects();
        let snapshot = SceneSnapshot::capture(&scene, &ids).unwrap();

        scene
            .object_mut(ids[1])
            .unwrap()
            .override_materials(MaterialRef::Unlit(Rgb::new(9, 9, 9)))
            .unwrap();
        scene.remove_object(ids[0]);

        let result = snapshot.restore(&mut scene);

        match result {
            Err(CaptureError::RestoreFailure(failures)) => assert_eq!(failures.len(), 1),
            other => panic!("expected restore failure, got {:?}", other),
        }
        assert_eq!(
            scene.object(ids[1]).unwrap().materials(),
            vec![MaterialRef::Asset("grass".to_string())]
        );
    }

    #[test]
    fn test_guard_restores_on_drop() {
        let (scene, ids) = scene_with_two_objects();
        let scene = Arc::new(Mutex::new(scene));
        let shared: SharedScene = scene.clone();

        {
            let _guard = SnapshotGuard::capture(shared, &ids).unwrap();
            let mut locked = scene.lock().unwrap();
            locked
                .object_mut(ids[0])
                .unwrap()
                .override_materials(MaterialRef::Unlit(Rgb::new(255, 0, 0)))
                .unwrap();
        }

        let locked = scene.lock().unwrap();
        assert_eq!(
            locked.object(ids[0]).unwrap().materials()[0],
            MaterialRef::Asset("oak".to_string())
        );
    }
}
