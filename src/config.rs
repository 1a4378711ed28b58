use crate::error::ConfigError;
use crate::pipeline::types::{ExportRequestBuilder, PassKind};
use crate::render::ImageFormat;
use crate::semantic::RegistryStore;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::Level;

pub const ENV_PREFIX: &str = "SYNTH_CAPTURE";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Configuration {
    pub output_root: PathBuf,
    /// Directory holding project-scoped state such as the class registry.
    pub project_dir: PathBuf,
    pub image_format: ImageFormat,
    pub depth_range_meters: f32,
    pub optical_flow_scale: f32,
    pub frame_name_padding: usize,
    pub export_camera_poses_csv: bool,
    pub export_semantic_classes_csv: bool,
    pub log_level: String,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from("capture_output"),
            project_dir: PathBuf::from("."),
            image_format: ImageFormat::Png,
            depth_range_meters: 100.0,
            optical_flow_scale: 1.0,
            frame_name_padding: 6,
            export_camera_poses_csv: true,
            export_semantic_classes_csv: true,
            log_level: "info".to_string(),
        }
    }
}

impl Configuration {
    /// Defaults, overlaid by `file` when given, overlaid by `SYNTH_CAPTURE_*` variables.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let configuration: Configuration = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize()?;

        configuration.validate()?;
        Ok(configuration)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.depth_range_meters <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "depth_range_meters must be positive, got {}",
                self.depth_range_meters
            )));
        }
        if self.optical_flow_scale <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "optical_flow_scale must be positive, got {}",
                self.optical_flow_scale
            )));
        }
        if self.frame_name_padding == 0 {
            return Err(ConfigError::Invalid(
                "frame_name_padding must be at least 1".to_string(),
            ));
        }
        self.tracing_level()?;
        Ok(())
    }

    pub fn tracing_level(&self) -> Result<Level, ConfigError> {
        Level::from_str(&self.log_level)
            .map_err(|_| ConfigError::Invalid(format!("unknown log level '{}'", self.log_level)))
    }

    pub fn depth_pass(&self) -> PassKind {
        PassKind::Depth {
            range_meters: self.depth_range_meters,
        }
    }

    pub fn optical_flow_pass(&self) -> PassKind {
        PassKind::OpticalFlow {
            scale: self.optical_flow_scale,
        }
    }

    /// Request builder pre-filled with the configured output root and image format.
    pub fn request_builder(&self) -> ExportRequestBuilder {
        ExportRequestBuilder::new(&self.output_root).image_format(self.image_format)
    }

    pub fn registry_store(&self) -> RegistryStore {
        RegistryStore::new(&self.project_dir)
    }
}
