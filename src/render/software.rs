use super::{
    frame_file_name, CameraIntrinsics, CameraPose, FrameStream, RenderJob, RenderSubsystem,
    RenderedFrame,
};
use crate::error::RenderError;
use crate::scene::{
    lock_scene, CameraMount, Footprint, InMemoryScene, MaterialRef, PassMaterial,
    PostProcessSettings, Rgb, Scene, BACKGROUND_COLOR,
};
use async_trait::async_trait;
use image::{Rgb as Pixel, RgbImage};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, instrument};

/// Linear motion of the camera rig. The scene's camera mount sits on top of it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraTrack {
    pub origin: [f64; 3],
    pub velocity: [f64; 3],
}

impl CameraTrack {
    pub fn linear(origin: [f64; 3], velocity: [f64; 3]) -> Self {
        Self { origin, velocity }
    }

    /// Pose of a camera mounted on the track at `frame`. The track never rotates.
    pub fn pose(&self, frame: i64, mount: &CameraMount) -> CameraPose {
        let t = frame as f64;
        let axis = |i: usize| self.origin[i] + self.velocity[i] * t + mount.translation[i];
        CameraPose {
            position: [axis(0), axis(1), axis(2)],
            rotation: mount.rotation,
        }
    }
}

impl Default for CameraTrack {
    fn default() -> Self {
        Self::linear([0.0, 0.0, 0.0], [0.1, 0.0, 0.0])
    }
}

/// Flat-shaded rasterizer over an [`InMemoryScene`].
///
/// Every visible object is drawn as its footprint rectangle, one horizontal band per
/// material slot. Post-processing is emulated so that disabling it matters: anti-aliasing
/// blends rectangle borders with the background, tone mapping compresses every channel,
/// bloom brightens everything.
#[derive(Clone)]
pub struct SoftwareRenderer {
    scene: Arc<Mutex<InMemoryScene>>,
    width: u32,
    height: u32,
    camera: CameraTrack,
    fail_at: Option<i64>,
    frame_delay: Option<Duration>,
}

impl SoftwareRenderer {
    pub fn new(scene: Arc<Mutex<InMemoryScene>>, width: u32, height: u32) -> Self {
        Self {
            scene,
            width,
            height,
            camera: CameraTrack::default(),
            fail_at: None,
            frame_delay: None,
        }
    }

    pub fn with_camera(mut self, camera: CameraTrack) -> Self {
        self.camera = camera;
        self
    }

    /// Makes the given frame fail, simulating a device error.
    pub fn fail_at_frame(mut self, frame: i64) -> Self {
        self.fail_at = Some(frame);
        self
    }

    pub fn with_frame_delay(mut self, delay: Duration) -> Self {
        self.frame_delay = Some(delay);
        self
    }

    pub fn intrinsics(&self) -> CameraIntrinsics {
        let mount = lock_scene(&self.scene).camera_mount();
        CameraIntrinsics::from_fov(mount.fov_degrees, self.width, self.height)
    }

    /// Rasterizes the scene as it is right now.
    pub fn render_frame(&self, frame: i64) -> RgbImage {
        let scene = lock_scene(&self.scene);
        let post = scene.post_process();
        let mut image =
            RgbImage::from_pixel(self.width, self.height, Pixel(BACKGROUND_COLOR.to_array()));

        for (object, footprint) in scene.placements() {
            if !object.is_visible() {
                continue;
            }
            let materials = object.materials();
            if materials.is_empty() {
                continue;
            }
            self.draw_object(&mut image, &materials, footprint.at_frame(frame), post);
        }
        drop(scene);

        if post.tone_mapping || post.bloom {
            for pixel in image.pixels_mut() {
                for channel in pixel.0.iter_mut() {
                    let mut value = *channel;
                    if post.tone_mapping {
                        value = tone_map(value);
                    }
                    if post.bloom {
                        value = value.saturating_add(16);
                    }
                    *channel = value;
                }
            }
        }
        image
    }

    fn draw_object(
        &self,
        image: &mut RgbImage,
        materials: &[MaterialRef],
        footprint: Footprint,
        post: PostProcessSettings,
    ) {
        let (x0, x1) = span(footprint.x, footprint.width, self.width);
        let (y0, y1) = span(footprint.y, footprint.height, self.height);
        if x0 >= x1 || y0 >= y1 {
            return;
        }

        let band = ((y1 - y0) as usize).div_ceil(materials.len()).max(1) as u32;
        for y in y0..y1 {
            let slot = (((y - y0) / band) as usize).min(materials.len() - 1);
            let color = shade(&materials[slot], &footprint, self.width, self.height);
            for x in x0..x1 {
                let border = x == x0 || x == x1 - 1 || y == y0 || y == y1 - 1;
                let painted = if post.anti_aliasing && border {
                    blend(image.get_pixel(x, y).0, color.to_array())
                } else {
                    color.to_array()
                };
                image.put_pixel(x, y, Pixel(painted));
            }
        }
    }

    fn render_to_file(&self, frame: i64, job: &RenderJob) -> Result<RenderedFrame, RenderError> {
        if self.fail_at == Some(frame) {
            return Err(RenderError::FrameFailed {
                frame,
                message: "simulated device failure".to_string(),
            });
        }

        let image = self.render_frame(frame);
        let mount = lock_scene(&self.scene).camera_mount();
        let path = job.output_dir.join(frame_file_name(
            frame,
            job.frame_name_padding,
            job.format,
        ));
        image.save_with_format(&path, job.format.into())?;
        debug!("Rendered frame {} to {}", frame, path.display());

        Ok(RenderedFrame {
            frame_index: frame,
            image_path: path,
            pose: self.camera.pose(frame, &mount),
            intrinsics: CameraIntrinsics::from_fov(mount.fov_degrees, self.width, self.height),
        })
    }
}

#[async_trait]
impl RenderSubsystem for SoftwareRenderer {
    #[instrument(skip(self, job), fields(start = job.range.start, end = job.range.end))]
    async fn submit_range(&self, job: RenderJob) -> Result<FrameStream, RenderError> {
        tokio::fs::create_dir_all(&job.output_dir).await?;

        let renderer = self.clone();
        let stream = futures::stream::unfold(job.range.start, move |frame| {
            let renderer = renderer.clone();
            let job = job.clone();
            async move {
                if frame >= job.range.end {
                    return None;
                }
                if let Some(delay) = renderer.frame_delay {
                    tokio::time::sleep(delay).await;
                }
                Some((renderer.render_to_file(frame, &job), frame + 1))
            }
        });
        Ok(Box::pin(stream))
    }

    fn name(&self) -> &'static str {
        "software"
    }
}

fn span(offset: f32, size: f32, extent: u32) -> (u32, u32) {
    let to_px = |v: f32| (v * extent as f32).round().clamp(0.0, extent as f32) as u32;
    (to_px(offset), to_px(offset + size))
}

fn shade(material: &MaterialRef, footprint: &Footprint, width: u32, height: u32) -> Rgb {
    match material {
        MaterialRef::Unlit(color) => *color,
        MaterialRef::Asset(name) => asset_color(name),
        MaterialRef::Pass(PassMaterial::Depth { range_meters }) => {
            let near = 1.0 - (footprint.depth_meters / range_meters).clamp(0.0, 1.0);
            let v = (near * 255.0).round() as u8;
            Rgb::new(v, v, v)
        }
        MaterialRef::Pass(PassMaterial::Normal) => Rgb::new(128, 128, 255),
        MaterialRef::Pass(PassMaterial::OpticalFlow { scale }) => {
            let encode = |v: f32| (128.0 + v * scale).round().clamp(0.0, 255.0) as u8;
            Rgb::new(
                encode(footprint.velocity.0 * width as f32),
                encode(footprint.velocity.1 * height as f32),
                128,
            )
        }
    }
}

/// Deterministic stand-in color for a material asset.
fn asset_color(name: &str) -> Rgb {
    let mut hash: u32 = 0x811c_9dc5;
    for byte in name.bytes() {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    let [r, g, b, _] = hash.to_le_bytes();
    Rgb::new(r, g, b)
}

fn tone_map(value: u8) -> u8 {
    let x = f32::from(value) / 255.0;
    ((x / (1.0 + x)) * 1.8 * 255.0).round().clamp(0.0, 255.0) as u8
}

fn blend(under: [u8; 3], over: [u8; 3]) -> [u8; 3] {
    let mix = |a: u8, b: u8| ((u16::from(a) + u16::from(b)) / 2) as u8;
    [
        mix(under[0], over[0]),
        mix(under[1], over[1]),
        mix(under[2], over[2]),
    ]
}
