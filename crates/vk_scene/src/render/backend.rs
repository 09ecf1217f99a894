//! Resource-layer seam used by meshes
//!
//! A [`Mesh`](crate::render::Mesh) never talks to Vulkan directly. It
//! allocates and binds through these traits, which the Vulkan device
//! implements for real rendering and a recording double implements in
//! tests.

use std::mem::size_of;
use std::sync::Arc;

use ash::vk;

use crate::render::vulkan::VulkanResult;

/// A uniform buffer that stays host-mapped for its whole lifetime.
///
/// Memory must be host-coherent so a write is visible to the next GPU
/// submission without a flush. Dropping the value unmaps and releases it.
pub trait UniformMemory {
    /// Native buffer handle, for descriptor writes
    fn buffer(&self) -> vk::Buffer;

    /// Allocated size in bytes (already alignment-padded)
    fn size(&self) -> vk::DeviceSize;

    /// Copy `bytes` to the start of the mapped region
    fn write(&mut self, bytes: &[u8]) -> VulkanResult<()>;
}

/// Allocation and binding operations a mesh depends on
pub trait ResourceBackend {
    /// Host-mapped uniform buffer type
    type Uniform: UniformMemory;
    /// Shared vertex/index data type
    type Geometry;
    /// Shared sampled texture type
    type Texture;

    /// Whether the underlying device can accept work
    fn is_ready(&self) -> bool;

    /// Round a uniform block size up to the device's dynamic offset alignment
    fn uniform_block_size(&self, size: vk::DeviceSize) -> vk::DeviceSize;

    /// Aligned uniform block size for a record type
    fn aligned_size_of<T>(&self) -> vk::DeviceSize {
        self.uniform_block_size(size_of::<T>() as vk::DeviceSize)
    }

    /// Allocate a host-visible, host-coherent uniform buffer and map it.
    ///
    /// Takes the shared handle so the buffer can keep its device alive.
    fn allocate_uniform_buffer(self: &Arc<Self>, size: vk::DeviceSize) -> VulkanResult<Self::Uniform>;

    /// Allocate one descriptor set from `pool`
    fn allocate_descriptor_set(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
    ) -> VulkanResult<vk::DescriptorSet>;

    /// Point `binding` of `set` at the whole of `uniform`
    fn bind_uniform_buffer(&self, set: vk::DescriptorSet, binding: u32, uniform: &Self::Uniform);

    /// Return a descriptor set to its pool
    fn free_descriptor_set(&self, pool: vk::DescriptorPool, set: vk::DescriptorSet) -> VulkanResult<()>;
}
