use crate::render::ImageFormat;
use crate::scene::PassMaterial;
use serde::{Deserialize, Serialize};
use std::mem::discriminant;
use std::path::{Path, PathBuf};

/// The image type a pass produces.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PassKind {
    /// Photorealistic render with the user's own materials
    Color,
    /// Linear depth, saturating at `range_meters`
    Depth { range_meters: f32 },
    /// World-space normals
    Normal,
    /// Screen-space motion between consecutive frames
    OpticalFlow { scale: f32 },
    /// Flat class colors, one per semantic class
    SemanticSegmentation,
}

impl PassKind {
    /// Display name, also used as the pass output directory name.
    pub fn name(&self) -> &'static str {
        match self {
            PassKind::Color => "color",
            PassKind::Depth { .. } => "depth",
            PassKind::Normal => "normal",
            PassKind::OpticalFlow { .. } => "optical_flow",
            PassKind::SemanticSegmentation => "semantic",
        }
    }

    /// Whether two kinds are the same pass, ignoring parameters.
    pub fn same_pass(&self, other: &PassKind) -> bool {
        discriminant(self) == discriminant(other)
    }

    /// Renderer-provided material that replaces every object material, if any.
    pub fn pass_material(&self) -> Option<PassMaterial> {
        match self {
            PassKind::Depth { range_meters } => Some(PassMaterial::Depth {
                range_meters: *range_meters,
            }),
            PassKind::Normal => Some(PassMaterial::Normal),
            PassKind::OpticalFlow { scale } => Some(PassMaterial::OpticalFlow { scale: *scale }),
            PassKind::Color | PassKind::SemanticSegmentation => None,
        }
    }

    /// Data passes encode values in pixels, so post-processing must not touch them.
    pub fn is_data_pass(&self) -> bool {
        !matches!(self, PassKind::Color)
    }

    /// Segmentation images must decode every pixel, so the pass paints every renderable
    /// object, selected or not.
    pub fn paints_every_object(&self) -> bool {
        matches!(self, PassKind::SemanticSegmentation)
    }

    /// Segmentation colors must decode with zero tolerance.
    pub fn requires_lossless(&self) -> bool {
        matches!(self, PassKind::SemanticSegmentation)
    }
}

/// A pass as requested for one export run. Immutable once the run starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassSpec {
    pub kind: PassKind,
    pub output_directory: PathBuf,
    pub format: ImageFormat,
}

impl PassSpec {
    /// Pass writing into `<output_root>/<pass name>/`.
    pub fn new(kind: PassKind, output_root: &Path, format: ImageFormat) -> Self {
        Self {
            kind,
            output_directory: output_root.join(kind.name()),
            format,
        }
    }
}
