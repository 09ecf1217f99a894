//! `ResourceBackend` implementation over a live Vulkan device

use std::sync::Arc;

use ash::vk;

use crate::render::backend::ResourceBackend;
use crate::render::vulkan::descriptor_set::{allocate_set, free_set};
use crate::render::vulkan::{Device, GeometryBuffer, TextureBuffer, UniformBuffer, VulkanResult};

impl ResourceBackend for Device {
    type Uniform = UniformBuffer;
    type Geometry = GeometryBuffer;
    type Texture = TextureBuffer;

    fn is_ready(&self) -> bool {
        Device::is_ready(self)
    }

    fn uniform_block_size(&self, size: vk::DeviceSize) -> vk::DeviceSize {
        self.aligned_uniform_size(size)
    }

    fn allocate_uniform_buffer(self: &Arc<Self>, size: vk::DeviceSize) -> VulkanResult<UniformBuffer> {
        UniformBuffer::new(Arc::clone(self), size)
    }

    fn allocate_descriptor_set(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
    ) -> VulkanResult<vk::DescriptorSet> {
        self.ensure_ready("descriptor set allocation")?;
        allocate_set(self.raw(), pool, layout)
    }

    fn bind_uniform_buffer(&self, set: vk::DescriptorSet, binding: u32, uniform: &UniformBuffer) {
        let buffer_infos = [uniform.descriptor_info()];
        let write = vk::WriteDescriptorSet::builder()
            .dst_set(set)
            .dst_binding(binding)
            .dst_array_element(0)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .buffer_info(&buffer_infos)
            .build();

        unsafe { self.raw().update_descriptor_sets(&[write], &[]) };
    }

    fn free_descriptor_set(&self, pool: vk::DescriptorPool, set: vk::DescriptorSet) -> VulkanResult<()> {
        free_set(self.raw(), pool, set)
    }
}
