use std::error::Error;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use synth_capture::config::Configuration;
use synth_capture::coordinator::ExportCoordinator;
use synth_capture::error::RegistryError;
use synth_capture::pipeline::orchestration::{CapturePipelineOrchestrator, ProgressLogger};
use synth_capture::pipeline::types::PassKind;
use synth_capture::render::{CameraRig, CameraTrack, ImageFormat, SoftwareRenderer};
use synth_capture::scene::{
    CameraMount, Footprint, InMemoryScene, LandscapeObject, LightObject, MaterialRef, MeshObject,
    ObjectId, Rgb, Scene, SharedScene,
};
use synth_capture::semantic::SemanticClassRegistry;
use tracing::{error, info, Level};

const DEMO_WIDTH: u32 = 320;
const DEMO_HEIGHT: u32 = 240;
const DEMO_FRAMES: i64 = 24;

fn init_logging(level: Level) {
    tracing_subscriber::fmt().with_max_level(level).init();
}

struct DemoScene {
    scene: Arc<Mutex<InMemoryScene>>,
    ground: ObjectId,
    cars: Vec<ObjectId>,
}

fn demo_scene() -> DemoScene {
    let mut scene = InMemoryScene::new();
    let ground = scene.add_object(
        Box::new(LandscapeObject::new(
            "ground",
            MaterialRef::Asset("asphalt".to_string()),
        )),
        Footprint::new(0.0, 0.6, 1.0, 0.4).with_depth(30.0),
    );
    let cars = (0..2)
        .map(|i| {
            let lane = 0.35 + 0.15 * i as f32;
            scene.add_object(
                Box::new(MeshObject::new(
                    format!("car_{}", i),
                    vec![
                        MaterialRef::Asset("paint".to_string()),
                        MaterialRef::Asset("glass".to_string()),
                    ],
                )),
                Footprint::new(0.1, lane, 0.2, 0.12)
                    .with_depth(8.0 + 6.0 * i as f32)
                    .with_velocity(0.02, 0.0),
            )
        })
        .collect();
    scene.add_object(
        Box::new(MeshObject::new("tree", vec![MaterialRef::Asset("bark".to_string())])),
        Footprint::new(0.75, 0.2, 0.1, 0.4).with_depth(20.0),
    );
    scene.add_light(LightObject::new("sun"));

    DemoScene {
        scene: Arc::new(Mutex::new(scene)),
        ground,
        cars,
    }
}

/// Stereo pair with a 12 cm baseline.
fn demo_rig() -> CameraRig {
    let forward = [1.0, 0.0, 0.0, 0.0];
    CameraRig::new()
        .with_camera("left", CameraMount::new([-0.06, 0.0, 0.0], forward, 90.0))
        .with_camera("right", CameraMount::new([0.06, 0.0, 0.0], forward, 90.0))
}

fn label_demo_objects(
    registry: &mut SemanticClassRegistry,
    demo: &DemoScene,
) -> Result<(), RegistryError> {
    let vehicle = match registry.class_by_name("vehicle") {
        Some(id) => id,
        None => registry.define_class("vehicle", Rgb::new(0, 0, 142))?,
    };
    let road = match registry.class_by_name("road") {
        Some(id) => id,
        None => registry.define_class("road", Rgb::new(128, 64, 128))?,
    };
    for &car in &demo.cars {
        registry.assign(car, vehicle)?;
    }
    registry.assign(demo.ground, road)?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let configuration = Configuration::load(config_path.as_deref())?;
    init_logging(configuration.tracing_level()?);

    let demo = demo_scene();
    let store = configuration.registry_store();
    let mut registry = store.load().await?;
    let pruned = {
        let scene = demo.scene.lock().unwrap_or_else(PoisonError::into_inner);
        registry.prune_objects(|id| scene.contains(id))
    };
    if pruned > 0 {
        info!("Dropped {} assignment(s) to objects no longer in the scene", pruned);
    }
    label_demo_objects(&mut registry, &demo)?;
    store.save(&registry).await?;

    let renderer = SoftwareRenderer::new(demo.scene.clone(), DEMO_WIDTH, DEMO_HEIGHT)
        .with_camera(CameraTrack::linear([0.0, 1.5, -10.0], [0.05, 0.0, 0.0]));
    let scene: SharedScene = demo.scene.clone();
    let orchestrator = CapturePipelineOrchestrator::builder(configuration.clone())
        .scene(scene)
        .registry(Arc::new(RwLock::new(registry)))
        .renderer(Arc::new(renderer))
        .add_observer(Box::new(ProgressLogger))
        .build()?;
    let coordinator = ExportCoordinator::new(Arc::new(orchestrator));

    let request = configuration
        .request_builder()
        .range(0, DEMO_FRAMES)
        .pass(PassKind::Color)
        .pass(configuration.depth_pass())
        .pass(PassKind::Normal)
        .pass(configuration.optical_flow_pass())
        .pass_with_format(PassKind::SemanticSegmentation, ImageFormat::Png)
        .camera_rig(demo_rig())
        .build();

    let handle = coordinator.start(request);
    let cancel = handle.cancel_token();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, cancelling export");
            cancel.cancel();
        }
    });

    let result = handle.wait().await;
    ctrl_c.abort();
    match result {
        Ok(summary) => {
            info!(
                "Exported {} pass(es) through {} camera(s), manifest at {}",
                summary.manifest.passes().count(),
                summary.manifest.cameras.len(),
                summary.manifest_path.display()
            );
            Ok(())
        }
        Err(failure) => {
            error!("Export failed: {}", failure);
            Err(failure.into())
        }
    }
}
