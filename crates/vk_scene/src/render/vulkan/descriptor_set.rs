//! Descriptor set layouts and pools
//!
//! Each mesh allocates one set from a shared pool using the layout from
//! [`mesh_descriptor_layout`]. Textures get their own set built from
//! [`texture_descriptor_layout`]. Pools are created with
//! `FREE_DESCRIPTOR_SET` so sets can be returned individually.

use std::sync::Arc;

use ash::vk;

use crate::render::uniforms::{MATERIAL_BINDING, MODEL_BINDING};
use crate::render::vulkan::{Device, TextureBuffer, VulkanError, VulkanResult};

/// Uniform buffer descriptors reserved per set
pub const UNIFORM_BUFFERS_PER_SET: u32 = 2;

/// Image sampler descriptors reserved per set
pub const SAMPLERS_PER_SET: u32 = 1;

/// Sampler slot in the texture set
pub const TEXTURE_BINDING: u32 = 0;

/// Descriptor set layout builder for creating reusable layouts
#[derive(Default)]
pub struct DescriptorSetLayoutBuilder {
    bindings: Vec<vk::DescriptorSetLayoutBinding>,
}

impl DescriptorSetLayoutBuilder {
    /// Create a new descriptor set layout builder
    pub fn new() -> Self {
        Self::default()
    }

    fn add(mut self, binding: u32, ty: vk::DescriptorType, stage_flags: vk::ShaderStageFlags) -> Self {
        self.bindings.push(
            vk::DescriptorSetLayoutBinding::builder()
                .binding(binding)
                .descriptor_type(ty)
                .descriptor_count(1)
                .stage_flags(stage_flags)
                .build(),
        );
        self
    }

    /// Add a uniform buffer binding
    pub fn add_uniform_buffer(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.add(binding, vk::DescriptorType::UNIFORM_BUFFER, stage_flags)
    }

    /// Add a combined image sampler binding
    pub fn add_combined_image_sampler(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.add(binding, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, stage_flags)
    }

    /// Bindings added so far
    pub fn bindings(&self) -> &[vk::DescriptorSetLayoutBinding] {
        &self.bindings
    }

    /// Build the descriptor set layout
    pub fn build(self, device: Arc<Device>) -> VulkanResult<DescriptorSetLayout> {
        device.ensure_ready("descriptor set layout creation")?;

        let mut seen = std::collections::HashSet::new();
        if let Some(duplicate) = self.bindings.iter().find(|b| !seen.insert(b.binding)) {
            return Err(VulkanError::InvalidOperation {
                reason: format!("binding {} declared twice", duplicate.binding),
            });
        }

        let layout_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&self.bindings);

        let layout = unsafe { device.raw().create_descriptor_set_layout(&layout_info, None) }
            .map_err(VulkanError::creating("descriptor set layout"))?;

        Ok(DescriptorSetLayout {
            layout,
            bindings: self.bindings,
            device,
        })
    }
}

/// Descriptor set layout wrapper with automatic cleanup
pub struct DescriptorSetLayout {
    layout: vk::DescriptorSetLayout,
    bindings: Vec<vk::DescriptorSetLayoutBinding>,
    device: Arc<Device>,
}

impl DescriptorSetLayout {
    /// Get the Vulkan descriptor set layout handle
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    /// Get the bindings used in this layout
    pub fn bindings(&self) -> &[vk::DescriptorSetLayoutBinding] {
        &self.bindings
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device.raw().destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

/// Layout binding the model matrix and material uniforms, visible to the
/// vertex and fragment stages
pub fn mesh_layout_builder() -> DescriptorSetLayoutBuilder {
    let stages = vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT;
    DescriptorSetLayoutBuilder::new()
        .add_uniform_buffer(MODEL_BINDING, stages)
        .add_uniform_buffer(MATERIAL_BINDING, stages)
}

/// Create the per-mesh descriptor set layout
pub fn mesh_descriptor_layout(device: Arc<Device>) -> VulkanResult<DescriptorSetLayout> {
    mesh_layout_builder().build(device)
}

/// Layout with a single sampled texture for the fragment stage
pub fn texture_layout_builder() -> DescriptorSetLayoutBuilder {
    DescriptorSetLayoutBuilder::new().add_combined_image_sampler(TEXTURE_BINDING, vk::ShaderStageFlags::FRAGMENT)
}

/// Create the texture descriptor set layout
pub fn texture_descriptor_layout(device: Arc<Device>) -> VulkanResult<DescriptorSetLayout> {
    texture_layout_builder().build(device)
}

fn pool_sizes(max_sets: u32) -> [vk::DescriptorPoolSize; 2] {
    [
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: max_sets.saturating_mul(UNIFORM_BUFFERS_PER_SET),
        },
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            descriptor_count: max_sets.saturating_mul(SAMPLERS_PER_SET),
        },
    ]
}

/// Descriptor pool whose sets can be freed individually
pub struct DescriptorPool {
    pool: vk::DescriptorPool,
    max_sets: u32,
    device: Arc<Device>,
}

impl DescriptorPool {
    /// Create a pool with room for `max_sets` mesh sets
    pub fn new(device: Arc<Device>, max_sets: u32) -> VulkanResult<Self> {
        device.ensure_ready("descriptor pool creation")?;
        if max_sets == 0 {
            return Err(VulkanError::InvalidOperation {
                reason: "descriptor pool needs at least one set".to_string(),
            });
        }

        let sizes = pool_sizes(max_sets);
        let pool_info = vk::DescriptorPoolCreateInfo::builder()
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
            .max_sets(max_sets)
            .pool_sizes(&sizes);

        let pool = unsafe { device.raw().create_descriptor_pool(&pool_info, None) }
            .map_err(VulkanError::creating("descriptor pool"))?;

        log::debug!("Created descriptor pool {:?} for {} sets", pool, max_sets);
        Ok(Self { pool, max_sets, device })
    }

    /// Allocate one set with `layout`
    pub fn allocate(&self, layout: vk::DescriptorSetLayout) -> VulkanResult<vk::DescriptorSet> {
        allocate_set(self.device.raw(), self.pool, layout)
    }

    /// Point the sampler at `binding` of `set` to `texture`
    pub fn bind_texture(&self, set: vk::DescriptorSet, binding: u32, texture: &TextureBuffer) -> VulkanResult<()> {
        if !texture.is_ready() {
            return Err(VulkanError::InvalidOperation {
                reason: "texture has no image view or sampler".to_string(),
            });
        }

        let image_infos = [texture.descriptor_info()];
        let write = vk::WriteDescriptorSet::builder()
            .dst_set(set)
            .dst_binding(binding)
            .dst_array_element(0)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .image_info(&image_infos)
            .build();

        unsafe { self.device.raw().update_descriptor_sets(&[write], &[]) };
        Ok(())
    }

    /// Return a set to the pool
    pub fn free(&self, set: vk::DescriptorSet) -> VulkanResult<()> {
        free_set(self.device.raw(), self.pool, set)
    }

    /// Get the pool handle
    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }

    /// Capacity in sets
    pub fn max_sets(&self) -> u32 {
        self.max_sets
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device.raw().destroy_descriptor_pool(self.pool, None);
        }
    }
}

pub(crate) fn allocate_set(
    device: &ash::Device,
    pool: vk::DescriptorPool,
    layout: vk::DescriptorSetLayout,
) -> VulkanResult<vk::DescriptorSet> {
    let layouts = [layout];
    let alloc_info = vk::DescriptorSetAllocateInfo::builder()
        .descriptor_pool(pool)
        .set_layouts(&layouts);

    unsafe { device.allocate_descriptor_sets(&alloc_info) }
        .map_err(VulkanError::creating("descriptor set"))?
        .into_iter()
        .next()
        .ok_or_else(|| VulkanError::InvalidOperation {
            reason: "driver returned no descriptor set".to_string(),
        })
}

pub(crate) fn free_set(device: &ash::Device, pool: vk::DescriptorPool, set: vk::DescriptorSet) -> VulkanResult<()> {
    unsafe { device.free_descriptor_sets(pool, &[set]) }.map_err(freeing_error)
}

fn freeing_error(result: vk::Result) -> VulkanError {
    VulkanError::from_result("descriptor set free", result)
}
