//! # vk_scene
//!
//! Scene elements and renderable meshes on top of thin RAII Vulkan wrappers.
//!
//! ## Features
//!
//! - **Scene Elements**: position, orientation, scale and pivot composed
//!   into cached model and view matrices
//! - **Meshes**: per-object model and material uniforms kept in sync with
//!   the transform through persistently mapped memory
//! - **Vulkan Wrappers**: device, buffers, images, textures, framebuffers
//!   and descriptor pools released on drop
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use vk_scene::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RendererConfig::default();
//!     let instance = Arc::new(VulkanInstance::new(&config)?);
//!     let device = Arc::new(Device::new(instance, &config)?);
//!
//!     let layout = mesh_descriptor_layout(device.clone())?;
//!     let pool = DescriptorPool::new(device.clone(), config.max_descriptor_sets)?;
//!     let triangle: [[f32; 3]; 3] = [[0.0, 0.5, 0.0], [-0.5, -0.5, 0.0], [0.5, -0.5, 0.0]];
//!     let geometry = Arc::new(GeometryBuffer::new(device.clone(), &triangle, None)?);
//!
//!     let mut mesh = Mesh::new(device, pool.handle(), layout.handle(), geometry)?;
//!     mesh.set_position(Vec3::new(0.0, 0.0, -5.0), true);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod config;
pub mod core;
pub mod foundation;
pub mod render;
pub mod scene;

pub use ash;

/// Common imports for library users
pub mod prelude {
    pub use crate::{
        core::{Config, ConfigError, RendererConfig},
        foundation::math::{Mat4, Point3, Quat, Vec3, Vec4},
        render::{
            vulkan::{
                mesh_descriptor_layout, texture_descriptor_layout, CommandPool, DescriptorPool, DescriptorSetLayout,
                Device, FrameBuffer, GeometryBuffer, RenderPass, TextureBuffer, VulkanError, VulkanInstance,
                VulkanResult, TEXTURE_BINDING,
            },
            MaterialSettings, Mesh, ResourceBackend, UniformMemory,
        },
        scene::{AxisOrder, RotationStrategy, SceneElement, SceneNode},
    };
}
