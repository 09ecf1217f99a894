//! Vulkan rendering backend
//!
//! RAII wrappers over `ash` objects. Every wrapper holds an `Arc<Device>`
//! so the logical device outlives everything allocated from it.

mod backend;
pub mod buffer;
pub mod commands;
pub mod context;
pub mod descriptor_set;
pub mod framebuffer;
pub mod image;
pub mod render_pass;
pub mod texture;

pub use buffer::{Buffer, GeometryBuffer, UniformBuffer};
pub use commands::CommandPool;
pub use context::{Device, PhysicalDeviceInfo, VulkanError, VulkanInstance, VulkanResult};
pub use descriptor_set::{
    mesh_descriptor_layout, texture_descriptor_layout, DescriptorPool, DescriptorSetLayout, DescriptorSetLayoutBuilder,
    TEXTURE_BINDING,
};
pub use framebuffer::{FrameBuffer, DEPTH_FORMAT_CANDIDATES};
pub use image::{Image, ImageInfo};
pub use render_pass::RenderPass;
pub use texture::{TextureBuffer, TEXTURE_FORMAT};
