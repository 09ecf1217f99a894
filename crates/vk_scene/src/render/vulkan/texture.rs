//! Sampled textures
//!
//! RGBA8 pixel data is copied into a staging buffer, transferred into a
//! device-local image with one-time commands and left in
//! `SHADER_READ_ONLY_OPTIMAL` layout.

use std::path::Path;
use std::sync::Arc;

use ash::vk;

use crate::render::vulkan::{
    Buffer, CommandPool, Device, Image, ImageInfo, VulkanError, VulkanResult,
};

/// Texture format used for all uploads
pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

const BYTES_PER_PIXEL: usize = 4;

/// Sampled image with its sampler
pub struct TextureBuffer {
    sampler: vk::Sampler,
    image: Image,
    device: Arc<Device>,
}

impl TextureBuffer {
    /// Upload tightly packed RGBA8 pixels
    pub fn from_rgba(
        device: Arc<Device>,
        command_pool: &CommandPool,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> VulkanResult<Self> {
        let expected = rgba_len(width, height)?;
        if pixels.len() != expected {
            return Err(VulkanError::InvalidOperation {
                reason: format!("{width}x{height} texture needs {expected} bytes, got {}", pixels.len()),
            });
        }

        let staging = Buffer::new(
            device.clone(),
            expected as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        staging.write_bytes(pixels)?;

        let extent = vk::Extent2D { width, height };
        let image = Image::new(
            device.clone(),
            ImageInfo::device_local(
                extent,
                TEXTURE_FORMAT,
                vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
            ),
        )?;

        command_pool.submit_once(|raw, command_buffer| {
            record_upload(raw, command_buffer, staging.handle(), image.handle(), extent);
        })?;

        let sampler = create_sampler(&device)?;

        log::debug!("Uploaded {width}x{height} texture {:?}", image.handle());
        Ok(Self { sampler, image, device })
    }

    /// 1x1 texture of a single color
    pub fn solid_color(device: Arc<Device>, command_pool: &CommandPool, rgba: [u8; 4]) -> VulkanResult<Self> {
        Self::from_rgba(device, command_pool, 1, 1, &rgba)
    }

    /// Decode an image file and upload it
    pub fn from_file(device: Arc<Device>, command_pool: &CommandPool, path: impl AsRef<Path>) -> VulkanResult<Self> {
        let path = path.as_ref();
        let decoded = image::open(path)
            .map_err(|e| VulkanError::InitializationFailed(format!("Failed to load texture {}: {e}", path.display())))?
            .to_rgba8();
        let (width, height) = decoded.dimensions();

        log::info!("Loaded texture {} ({width}x{height})", path.display());
        Self::from_rgba(device, command_pool, width, height, decoded.as_raw())
    }

    /// Whether the image, sampler and device are usable
    pub fn is_ready(&self) -> bool {
        self.sampler != vk::Sampler::null() && self.image.is_ready()
    }

    /// View over the texture image
    pub fn image_view(&self) -> vk::ImageView {
        self.image.view()
    }

    /// Sampler handle
    pub fn sampler(&self) -> vk::Sampler {
        self.sampler
    }

    /// Size in pixels
    pub fn extent(&self) -> vk::Extent2D {
        self.image.extent()
    }

    /// Descriptor info for a combined image sampler binding
    pub fn descriptor_info(&self) -> vk::DescriptorImageInfo {
        vk::DescriptorImageInfo {
            sampler: self.sampler,
            image_view: self.image.view(),
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }
    }
}

impl Drop for TextureBuffer {
    fn drop(&mut self) {
        unsafe { self.device.raw().destroy_sampler(self.sampler, None) };
    }
}

fn rgba_len(width: u32, height: u32) -> VulkanResult<usize> {
    if width == 0 || height == 0 {
        return Err(VulkanError::InvalidOperation {
            reason: format!("texture extent {width}x{height} is empty"),
        });
    }
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|pixels| pixels.checked_mul(BYTES_PER_PIXEL))
        .ok_or_else(|| VulkanError::InvalidOperation {
            reason: format!("texture extent {width}x{height} overflows"),
        })
}

fn color_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}

fn record_upload(
    device: &ash::Device,
    command_buffer: vk::CommandBuffer,
    staging: vk::Buffer,
    image: vk::Image,
    extent: vk::Extent2D,
) {
    let to_transfer = vk::ImageMemoryBarrier::builder()
        .old_layout(vk::ImageLayout::UNDEFINED)
        .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(color_range())
        .src_access_mask(vk::AccessFlags::empty())
        .dst_access_mask(vk::AccessFlags::TRANSFER_WRITE)
        .build();

    let region = vk::BufferImageCopy::builder()
        .buffer_offset(0)
        .buffer_row_length(0)
        .buffer_image_height(0)
        .image_subresource(vk::ImageSubresourceLayers {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_level: 0,
            base_array_layer: 0,
            layer_count: 1,
        })
        .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
        .image_extent(vk::Extent3D {
            width: extent.width,
            height: extent.height,
            depth: 1,
        })
        .build();

    let to_shader = vk::ImageMemoryBarrier::builder()
        .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
        .new_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(color_range())
        .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
        .dst_access_mask(vk::AccessFlags::SHADER_READ)
        .build();

    unsafe {
        device.cmd_pipeline_barrier(
            command_buffer,
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::PipelineStageFlags::TRANSFER,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[to_transfer],
        );
        device.cmd_copy_buffer_to_image(
            command_buffer,
            staging,
            image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &[region],
        );
        device.cmd_pipeline_barrier(
            command_buffer,
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[to_shader],
        );
    }
}

fn create_sampler(device: &Device) -> VulkanResult<vk::Sampler> {
    let anisotropy = device.physical().features.sampler_anisotropy == vk::TRUE;
    let max_anisotropy = if anisotropy {
        device.limits().max_sampler_anisotropy.min(16.0)
    } else {
        1.0
    };

    let sampler_info = vk::SamplerCreateInfo::builder()
        .mag_filter(vk::Filter::LINEAR)
        .min_filter(vk::Filter::LINEAR)
        .address_mode_u(vk::SamplerAddressMode::REPEAT)
        .address_mode_v(vk::SamplerAddressMode::REPEAT)
        .address_mode_w(vk::SamplerAddressMode::REPEAT)
        .anisotropy_enable(anisotropy)
        .max_anisotropy(max_anisotropy)
        .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
        .unnormalized_coordinates(false)
        .compare_enable(false)
        .compare_op(vk::CompareOp::ALWAYS)
        .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
        .min_lod(0.0)
        .max_lod(0.0);

    unsafe { device.raw().create_sampler(&sampler_info, None) }.map_err(VulkanError::creating("sampler"))
}
