use crate::error::SceneError;
use crate::pipeline::types::{PassKind, PassSpec};
use crate::scene::{MaterialRef, ObjectId, PostProcessSettings, Scene, SceneObject};
use crate::semantic::{SemanticClassRegistry, UNDEFINED_CLASS_COLOR};
use tracing::{debug, instrument};

/// Rewrites object materials in the live scene so the renderer produces one pass.
///
/// Geometry, animation and visibility are never touched. Every call must sit between a
/// snapshot capture and its restore.
pub struct PassMaterialMutator;

impl PassMaterialMutator {
    /// Applies `pass` to the listed objects. Returns how many objects were rewritten.
    #[instrument(skip(scene, object_ids, registry), fields(pass = pass.kind.name(), objects = object_ids.len()))]
    pub fn apply(
        pass: &PassSpec,
        scene: &mut dyn Scene,
        object_ids: &[ObjectId],
        registry: &SemanticClassRegistry,
    ) -> Result<usize, SceneError> {
        if pass.kind.is_data_pass() {
            scene.set_post_process(PostProcessSettings::exact());
        }

        let mut rewritten = 0;
        for &id in object_ids {
            let object = scene
                .object_mut(id)
                .ok_or(SceneError::UnknownObject(id))?;
            if Self::apply_to_object(pass.kind, object, registry)? {
                rewritten += 1;
            }
        }

        debug!("Rewrote {} object(s) for pass '{}'", rewritten, pass.kind.name());
        Ok(rewritten)
    }

    /// Paints objects outside the selection with the `Undefined` color, so every pixel of
    /// a segmentation image decodes to a class or the background.
    pub fn mask(scene: &mut dyn Scene, object_ids: &[ObjectId]) -> Result<usize, SceneError> {
        for &id in object_ids {
            scene
                .object_mut(id)
                .ok_or(SceneError::UnknownObject(id))?
                .override_materials(MaterialRef::Unlit(UNDEFINED_CLASS_COLOR))?;
        }
        if !object_ids.is_empty() {
            debug!("Masked {} unselected object(s)", object_ids.len());
        }
        Ok(object_ids.len())
    }

    fn apply_to_object(
        kind: PassKind,
        object: &mut dyn SceneObject,
        registry: &SemanticClassRegistry,
    ) -> Result<bool, SceneError> {
        let material = match kind {
            PassKind::Color => return Ok(false),
            PassKind::SemanticSegmentation => MaterialRef::Unlit(registry.resolve_color(object.id())),
            PassKind::Depth { .. } | PassKind::Normal | PassKind::OpticalFlow { .. } => {
                match kind.pass_material() {
                    Some(material) => MaterialRef::Pass(material),
                    None => return Ok(false),
                }
            }
        };
        object.override_materials(material)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::ImageFormat;
    use crate::scene::{Footprint, InMemoryScene, MeshObject, PassMaterial, Rgb};
    use crate::semantic::UNDEFINED_CLASS_COLOR;
    use std::path::Path;

    const RED: Rgb = Rgb::new(255, 0, 0);

    struct Fixture {
        scene: InMemoryScene,
        labeled: ObjectId,
        unlabeled: ObjectId,
        registry: SemanticClassRegistry,
    }

    fn fixture() -> Fixture {
        let mut scene = InMemoryScene::new();
        let labeled = scene.add_object(
            Box::new(MeshObject::new(
                "car",
                vec![
                    MaterialRef::Asset("paint".to_string()),
                    MaterialRef::Asset("glass".to_string()),
                ],
            )),
            Footprint::new(0.0, 0.0, 0.5, 0.5),
        );
        let unlabeled = scene.add_object(
            Box::new(MeshObject::new("rock", vec![MaterialRef::Asset("stone".to_string())]).hidden()),
            Footprint::new(0.5, 0.5, 0.5, 0.5),
        );

        let mut registry = SemanticClassRegistry::new();
        let vehicle = registry.define_class("vehicle", RED).unwrap();
        registry.assign(labeled, vehicle).unwrap();

        Fixture {
            scene,
            labeled,
            unlabeled,
            registry,
        }
    }

    fn spec(kind: PassKind) -> PassSpec {
        PassSpec::new(kind, Path::new("/out"), ImageFormat::Png)
    }

    #[test]
    fn test_color_pass_changes_nothing() {
        let mut f = fixture();
        let ids = [f.labeled, f.unlabeled];
        let settings = f.scene.post_process();

        let rewritten =
            PassMaterialMutator::apply(&spec(PassKind::Color), &mut f.scene, &ids, &f.registry)
                .unwrap();

        assert_eq!(rewritten, 0);
        assert_eq!(f.scene.post_process(), settings);
        assert_eq!(
            f.scene.object(f.labeled).unwrap().materials()[0],
            MaterialRef::Asset("paint".to_string())
        );
    }

    #[test]
    fn test_segmentation_paints_class_and_sentinel_colors() {
        let mut f = fixture();
        let ids = [f.labeled, f.unlabeled];

        PassMaterialMutator::apply(
            &spec(PassKind::SemanticSegmentation),
            &mut f.scene,
            &ids,
            &f.registry,
        )
        .unwrap();

        assert_eq!(
            f.scene.object(f.labeled).unwrap().materials(),
            vec![MaterialRef::Unlit(RED), MaterialRef::Unlit(RED)]
        );
        assert_eq!(
            f.scene.object(f.unlabeled).unwrap().materials(),
            vec![MaterialRef::Unlit(UNDEFINED_CLASS_COLOR)]
        );
        assert_eq!(f.scene.post_process(), PostProcessSettings::exact());
    }

    #[test]
    fn test_mask_paints_unselected_objects_undefined() {
        let mut f = fixture();

        PassMaterialMutator::apply(
            &spec(PassKind::SemanticSegmentation),
            &mut f.scene,
            &[f.unlabeled],
            &f.registry,
        )
        .unwrap();
        let masked = PassMaterialMutator::mask(&mut f.scene, &[f.labeled]).unwrap();

        assert_eq!(masked, 1);
        assert_eq!(
            f.scene.object(f.labeled).unwrap().materials(),
            vec![
                MaterialRef::Unlit(UNDEFINED_CLASS_COLOR),
                MaterialRef::Unlit(UNDEFINED_CLASS_COLOR)
            ]
        );
    }

    #[test]
    fn test_depth_pass_keeps_visibility() {
        let mut f = fixture();
        let ids = [f.labeled, f.unlabeled];

        PassMaterialMutator::apply(
            &spec(PassKind::Depth { range_meters: 50.0 }),
            &mut f.scene,
            &ids,
            &f.registry,
        )
        .unwrap();

        let rock = f.scene.object(f.unlabeled).unwrap();
        assert!(!rock.is_visible());
        assert_eq!(
            rock.materials(),
            vec![MaterialRef::Pass(PassMaterial::Depth { range_meters: 50.0 })]
        );
        assert!(f.scene.object(f.labeled).unwrap().is_visible());
    }

    #[test]
    fn test_unknown_object_is_an_error() {
        let mut f = fixture();
        let result = PassMaterialMutator::apply(
            &spec(PassKind::Normal),
            &mut f.scene,
            &[ObjectId::new()],
            &f.registry,
        );
        assert!(matches!(result, Err(SceneError::UnknownObject(_))));
    }
}
