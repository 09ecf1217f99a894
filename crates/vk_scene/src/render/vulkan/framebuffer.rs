//! Offscreen framebuffer
//!
//! Owns its color and depth images; the `vk::Framebuffer` is destroyed
//! before either attachment.

use std::sync::Arc;

use ash::vk;

use crate::render::vulkan::{Device, Image, ImageInfo, RenderPass, VulkanError, VulkanResult};

/// Depth formats tried in order of preference
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// Framebuffer with owned color and depth attachments
pub struct FrameBuffer {
    framebuffer: vk::Framebuffer,
    color: Image,
    depth: Image,
    device: Arc<Device>,
}

impl FrameBuffer {
    /// Create attachments matching `render_pass` and the framebuffer over them
    pub fn new(device: Arc<Device>, render_pass: &RenderPass, extent: vk::Extent2D) -> VulkanResult<Self> {
        if extent.width == 0 || extent.height == 0 {
            return Err(VulkanError::InvalidOperation {
                reason: format!("framebuffer extent {}x{} is empty", extent.width, extent.height),
            });
        }

        let color = Image::new(
            device.clone(),
            ImageInfo::device_local(
                extent,
                render_pass.color_format(),
                vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_SRC,
            ),
        )?;
        let depth = Image::new(
            device.clone(),
            ImageInfo::device_local(
                extent,
                render_pass.depth_format(),
                vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            ),
        )?;

        let attachments = [color.view(), depth.view()];
        let create_info = vk::FramebufferCreateInfo::builder()
            .render_pass(render_pass.handle())
            .attachments(&attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        let framebuffer = unsafe { device.raw().create_framebuffer(&create_info, None) }
            .map_err(VulkanError::creating("framebuffer"))?;

        log::debug!("Created {}x{} framebuffer {:?}", extent.width, extent.height, framebuffer);

        Ok(Self {
            framebuffer,
            color,
            depth,
            device,
        })
    }

    /// Whether the framebuffer and both attachments are usable
    pub fn is_ready(&self) -> bool {
        self.framebuffer != vk::Framebuffer::null() && self.color.is_ready() && self.depth.is_ready()
    }

    /// Framebuffer handle
    pub fn handle(&self) -> vk::Framebuffer {
        self.framebuffer
    }

    /// Color attachment
    pub fn color_attachment(&self) -> &Image {
        &self.color
    }

    /// Depth attachment
    pub fn depth_attachment(&self) -> &Image {
        &self.depth
    }

    /// Size in pixels
    pub fn extent(&self) -> vk::Extent2D {
        self.color.extent()
    }
}

impl Drop for FrameBuffer {
    fn drop(&mut self) {
        unsafe {
            self.device.raw().destroy_framebuffer(self.framebuffer, None);
        }
    }
}
