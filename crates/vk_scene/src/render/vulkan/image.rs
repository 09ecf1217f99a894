//! Image, memory and view wrapper
//!
//! Used for texture storage and framebuffer attachments. Host-visible
//! images (linear tiling) can be mapped and written directly.

use std::ptr::NonNull;
use std::sync::Arc;

use ash::vk;

use crate::render::vulkan::{Device, VulkanError, VulkanResult};

/// Parameters of a 2D image
#[derive(Debug, Clone, Copy)]
pub struct ImageInfo {
    /// Size in pixels
    pub extent: vk::Extent2D,
    /// Pixel format
    pub format: vk::Format,
    /// How the image will be used
    pub usage: vk::ImageUsageFlags,
    /// Memory layout of texels
    pub tiling: vk::ImageTiling,
    /// Required memory properties
    pub memory: vk::MemoryPropertyFlags,
}

impl ImageInfo {
    /// Device-local, optimally tiled image
    pub fn device_local(extent: vk::Extent2D, format: vk::Format, usage: vk::ImageUsageFlags) -> Self {
        Self {
            extent,
            format,
            usage,
            tiling: vk::ImageTiling::OPTIMAL,
            memory: vk::MemoryPropertyFlags::DEVICE_LOCAL,
        }
    }

    /// Linearly tiled image the host can map
    pub fn host_visible(extent: vk::Extent2D, format: vk::Format, usage: vk::ImageUsageFlags) -> Self {
        Self {
            extent,
            format,
            usage,
            tiling: vk::ImageTiling::LINEAR,
            memory: vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        }
    }

    /// Fail unless the host can write texels directly: the memory must be
    /// host-visible and the tiling linear
    pub fn ensure_host_writable(&self) -> VulkanResult<()> {
        if !self.memory.contains(vk::MemoryPropertyFlags::HOST_VISIBLE) {
            return Err(VulkanError::InvalidOperation {
                reason: format!("{:?} image memory is not host-visible", self.format),
            });
        }
        if self.tiling != vk::ImageTiling::LINEAR {
            return Err(VulkanError::InvalidOperation {
                reason: format!("{:?} tiling has no host-addressable layout", self.tiling),
            });
        }
        Ok(())
    }

    /// View aspect implied by the format
    pub fn aspect(&self) -> vk::ImageAspectFlags {
        aspect_for_format(self.format)
    }
}

/// Aspect mask for a format: depth formats get the depth aspect
pub fn aspect_for_format(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D16_UNORM | vk::Format::D32_SFLOAT | vk::Format::X8_D24_UNORM_PACK32 => {
            vk::ImageAspectFlags::DEPTH
        }
        vk::Format::D16_UNORM_S8_UINT | vk::Format::D24_UNORM_S8_UINT | vk::Format::D32_SFLOAT_S8_UINT => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        _ => vk::ImageAspectFlags::COLOR,
    }
}

/// Format features an image with `usage` needs
pub fn required_format_features(usage: vk::ImageUsageFlags) -> vk::FormatFeatureFlags {
    let mut features = vk::FormatFeatureFlags::empty();
    if usage.contains(vk::ImageUsageFlags::SAMPLED) {
        features |= vk::FormatFeatureFlags::SAMPLED_IMAGE;
    }
    if usage.contains(vk::ImageUsageFlags::COLOR_ATTACHMENT) {
        features |= vk::FormatFeatureFlags::COLOR_ATTACHMENT;
    }
    if usage.contains(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT) {
        features |= vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT;
    }
    if usage.contains(vk::ImageUsageFlags::STORAGE) {
        features |= vk::FormatFeatureFlags::STORAGE_IMAGE;
    }
    features
}

/// 2D image with bound memory and a view
pub struct Image {
    image: vk::Image,
    memory: vk::DeviceMemory,
    view: vk::ImageView,
    info: ImageInfo,
    device: Arc<Device>,
}

impl Image {
    /// Create the image, allocate and bind its memory and create a view
    pub fn new(device: Arc<Device>, info: ImageInfo) -> VulkanResult<Self> {
        device.ensure_ready("image creation")?;

        let features = required_format_features(info.usage);
        if !device.supports_format_features(info.format, info.tiling, features) {
            return Err(VulkanError::FeatureUnsupported {
                feature: format!("{:?} with {:?} tiling for {:?}", info.format, info.tiling, info.usage),
            });
        }

        let raw = device.raw();
        let image_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: info.extent.width,
                height: info.extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .format(info.format)
            .tiling(info.tiling)
            .initial_layout(if info.tiling == vk::ImageTiling::LINEAR {
                vk::ImageLayout::PREINITIALIZED
            } else {
                vk::ImageLayout::UNDEFINED
            })
            .usage(info.usage)
            .samples(vk::SampleCountFlags::TYPE_1)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let image = unsafe { raw.create_image(&image_info, None) }.map_err(VulkanError::creating("image"))?;

        let memory = match Self::allocate_and_bind(&device, image, info.memory) {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { raw.destroy_image(image, None) };
                return Err(e);
            }
        };

        let view_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(info.format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: info.aspect(),
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });

        let view = match unsafe { raw.create_image_view(&view_info, None) } {
            Ok(view) => view,
            Err(e) => {
                unsafe {
                    raw.destroy_image(image, None);
                    raw.free_memory(memory, None);
                }
                return Err(VulkanError::from_result("image view", e));
            }
        };

        log::debug!(
            "Created {}x{} {:?} image {:?}",
            info.extent.width,
            info.extent.height,
            info.format,
            image
        );

        Ok(Self {
            image,
            memory,
            view,
            info,
            device,
        })
    }

    fn allocate_and_bind(
        device: &Device,
        image: vk::Image,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<vk::DeviceMemory> {
        let raw = device.raw();
        let requirements = unsafe { raw.get_image_memory_requirements(image) };
        let memory_type_index = device.find_memory_type(requirements.memory_type_bits, properties)?;

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);

        let memory =
            unsafe { raw.allocate_memory(&alloc_info, None) }.map_err(VulkanError::creating("image memory"))?;

        if let Err(e) = unsafe { raw.bind_image_memory(image, memory, 0) } {
            unsafe { raw.free_memory(memory, None) };
            return Err(VulkanError::from_result("image memory binding", e));
        }

        Ok(memory)
    }

    /// Whether the image and its device are usable
    pub fn is_ready(&self) -> bool {
        self.image != vk::Image::null() && self.view != vk::ImageView::null() && self.device.is_ready()
    }

    /// Whether the host can map this image
    pub fn is_host_visible(&self) -> bool {
        self.info.memory.contains(vk::MemoryPropertyFlags::HOST_VISIBLE)
    }

    /// Map the image memory
    pub fn map(&self) -> VulkanResult<NonNull<u8>> {
        if !self.is_host_visible() {
            return Err(VulkanError::InvalidOperation {
                reason: format!("image {:?} is not host-visible", self.image),
            });
        }

        let ptr = unsafe {
            self.device
                .raw()
                .map_memory(self.memory, 0, vk::WHOLE_SIZE, vk::MemoryMapFlags::empty())
        }
        .map_err(VulkanError::creating("image mapping"))?;

        NonNull::new(ptr.cast::<u8>()).ok_or_else(|| VulkanError::InvalidOperation {
            reason: "driver returned a null mapping".to_string(),
        })
    }

    /// Unmap the image memory
    pub fn unmap(&self) {
        unsafe { self.device.raw().unmap_memory(self.memory) };
    }

    /// Copy tightly packed rows into a linear host-visible image, honoring
    /// the driver's row pitch
    pub fn write_bytes(&self, bytes: &[u8], bytes_per_pixel: usize) -> VulkanResult<()> {
        self.info.ensure_host_writable()?;
        let row_len = self.info.extent.width as usize * bytes_per_pixel;
        let rows = self.info.extent.height as usize;
        if bytes.len() != row_len * rows {
            return Err(VulkanError::InvalidOperation {
                reason: format!("expected {} bytes of pixel data, got {}", row_len * rows, bytes.len()),
            });
        }

        let layout = unsafe {
            self.device.raw().get_image_subresource_layout(
                self.image,
                vk::ImageSubresource {
                    aspect_mask: self.info.aspect(),
                    mip_level: 0,
                    array_layer: 0,
                },
            )
        };

        let ptr = self.map()?;
        for (row, chunk) in bytes.chunks_exact(row_len).enumerate() {
            let offset = layout.offset as usize + row * layout.row_pitch as usize;
            unsafe { std::ptr::copy_nonoverlapping(chunk.as_ptr(), ptr.as_ptr().add(offset), row_len) };
        }
        self.unmap();
        Ok(())
    }

    /// Image handle
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    /// View handle
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    /// Creation parameters
    pub fn info(&self) -> &ImageInfo {
        &self.info
    }

    /// Size in pixels
    pub fn extent(&self) -> vk::Extent2D {
        self.info.extent
    }

    /// Pixel format
    pub fn format(&self) -> vk::Format {
        self.info.format
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        unsafe {
            let raw = self.device.raw();
            raw.destroy_image_view(self.view, None);
            raw.destroy_image(self.image, None);
            raw.free_memory(self.memory, None);
        }
    }
}
