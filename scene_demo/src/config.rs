//! Demo configuration

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use vk_scene::prelude::*;

/// Initial state of the demo mesh
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshSetup {
    pub position: Vec3,
    /// Euler angles in degrees
    pub orientation: Vec3,
    pub scale: Vec3,
    pub origin: Vec3,
    pub material: MaterialSettings,
    /// Image file to sample; a white texel is used when absent
    pub texture: Option<PathBuf>,
    /// Strategy whose matrices are compared against the default one
    pub compare_strategy: RotationStrategy,
}

impl Default for MeshSetup {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, -5.0),
            orientation: Vec3::zeros(),
            scale: Vec3::new(1.0, 1.0, 1.0),
            origin: Vec3::zeros(),
            material: MaterialSettings::default(),
            texture: None,
            compare_strategy: RotationStrategy::EulerChain(AxisOrder::Xyz),
        }
    }
}

/// Everything the demo reads from its config file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    pub renderer: RendererConfig,
    pub mesh: MeshSetup,
    /// Number of simulated frames
    pub frames: u32,
    /// Yaw added every frame
    pub degrees_per_frame: f32,
    /// Offscreen target size
    pub framebuffer: (u32, u32),
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            renderer: RendererConfig::new("scene_demo").with_integrated_gpu(true),
            mesh: MeshSetup::default(),
            frames: 4,
            degrees_per_frame: 15.0,
            framebuffer: (640, 480),
        }
    }
}

impl Config for DemoConfig {}

impl DemoConfig {
    /// Check the renderer section and the demo's own fields
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.renderer.validate()?;
        if self.framebuffer.0 == 0 || self.framebuffer.1 == 0 {
            return Err(ConfigError::Invalid("Framebuffer size cannot be zero".to_string()));
        }
        if self.mesh.scale.iter().any(|s| *s == 0.0) {
            return Err(ConfigError::Invalid("Mesh scale cannot have a zero component".to_string()));
        }
        Ok(())
    }
}
