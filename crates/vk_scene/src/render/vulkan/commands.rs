//! Command buffer management
//!
//! Only one-time submissions are needed here: texture uploads and layout
//! transitions recorded, submitted and waited on in one call.

use std::sync::Arc;

use ash::vk;

use crate::render::vulkan::{Device, VulkanError, VulkanResult};

/// Command pool wrapper with RAII cleanup
pub struct CommandPool {
    command_pool: vk::CommandPool,
    device: Arc<Device>,
}

impl CommandPool {
    /// Create a transient pool on the device's graphics queue family
    pub fn new(device: Arc<Device>) -> VulkanResult<Self> {
        device.ensure_ready("command pool creation")?;

        let pool_create_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::TRANSIENT)
            .queue_family_index(device.graphics_family());

        let command_pool = unsafe { device.raw().create_command_pool(&pool_create_info, None) }
            .map_err(VulkanError::creating("command pool"))?;

        Ok(Self { command_pool, device })
    }

    /// Get the command pool handle
    pub fn handle(&self) -> vk::CommandPool {
        self.command_pool
    }

    /// Record with `record`, submit to the graphics queue and block until
    /// the work completes
    pub fn submit_once<F>(&self, record: F) -> VulkanResult<()>
    where
        F: FnOnce(&ash::Device, vk::CommandBuffer),
    {
        self.device.ensure_ready("command submission")?;
        let raw = self.device.raw();

        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let command_buffer = unsafe { raw.allocate_command_buffers(&alloc_info) }
            .map_err(VulkanError::creating("command buffer"))?
            .into_iter()
            .next()
            .ok_or_else(|| VulkanError::InvalidOperation {
                reason: "driver returned no command buffer".to_string(),
            })?;

        let result = self.record_and_submit(command_buffer, record);

        unsafe { raw.free_command_buffers(self.command_pool, &[command_buffer]) };
        result
    }

    fn record_and_submit<F>(&self, command_buffer: vk::CommandBuffer, record: F) -> VulkanResult<()>
    where
        F: FnOnce(&ash::Device, vk::CommandBuffer),
    {
        let raw = self.device.raw();
        let begin_info = vk::CommandBufferBeginInfo::builder().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        unsafe { raw.begin_command_buffer(command_buffer, &begin_info) }.map_err(VulkanError::Api)?;
        record(raw, command_buffer);
        unsafe { raw.end_command_buffer(command_buffer) }.map_err(VulkanError::Api)?;

        let fence = unsafe { raw.create_fence(&vk::FenceCreateInfo::default(), None) }
            .map_err(VulkanError::creating("fence"))?;

        let command_buffers = [command_buffer];
        let submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffers).build();

        let submitted = unsafe {
            raw.queue_submit(self.device.graphics_queue(), &[submit_info], fence)
                .and_then(|()| raw.wait_for_fences(&[fence], true, u64::MAX))
        };
        unsafe { raw.destroy_fence(fence, None) };

        submitted.map_err(|e| VulkanError::from_result("one-time submission", e))
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            self.device.raw().destroy_command_pool(self.command_pool, None);
        }
    }
}
