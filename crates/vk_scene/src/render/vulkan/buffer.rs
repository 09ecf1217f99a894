//! Buffer management for geometry and uniforms
//!
//! Memory management following RAII patterns: every wrapper owns its buffer
//! and memory and releases them on drop.

use std::mem;
use std::ptr::NonNull;
use std::sync::Arc;

use ash::vk;
use bytemuck::Pod;

use crate::render::backend::UniformMemory;
use crate::render::vulkan::{Device, VulkanError, VulkanResult};

/// Buffer wrapper with memory management
pub struct Buffer {
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
    properties: vk::MemoryPropertyFlags,
    device: Arc<Device>,
}

impl Buffer {
    /// Create a new buffer with memory allocation
    pub fn new(
        device: Arc<Device>,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<Self> {
        device.ensure_ready("buffer creation")?;
        if size == 0 {
            return Err(VulkanError::InvalidOperation {
                reason: "zero-sized buffer".to_string(),
            });
        }

        let raw = device.raw();
        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { raw.create_buffer(&buffer_info, None) }.map_err(VulkanError::creating("buffer"))?;

        let memory = match Self::allocate_and_bind(&device, buffer, properties) {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { raw.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        log::debug!("Created {size} byte buffer {:?} ({:?})", buffer, usage);

        Ok(Self {
            buffer,
            memory,
            size,
            properties,
            device,
        })
    }

    fn allocate_and_bind(
        device: &Device,
        buffer: vk::Buffer,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<vk::DeviceMemory> {
        let raw = device.raw();
        let requirements = unsafe { raw.get_buffer_memory_requirements(buffer) };
        let memory_type_index = device.find_memory_type(requirements.memory_type_bits, properties)?;

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);

        let memory =
            unsafe { raw.allocate_memory(&alloc_info, None) }.map_err(VulkanError::creating("buffer memory"))?;

        if let Err(e) = unsafe { raw.bind_buffer_memory(buffer, memory, 0) } {
            unsafe { raw.free_memory(memory, None) };
            return Err(VulkanError::from_result("buffer memory binding", e));
        }

        Ok(memory)
    }

    /// Whether the host can map this buffer
    pub fn is_host_visible(&self) -> bool {
        self.properties.contains(vk::MemoryPropertyFlags::HOST_VISIBLE)
    }

    /// Map the whole buffer
    pub fn map_memory(&self) -> VulkanResult<NonNull<u8>> {
        if !self.is_host_visible() {
            return Err(VulkanError::InvalidOperation {
                reason: format!("buffer {:?} is not host-visible", self.buffer),
            });
        }

        let ptr = unsafe {
            self.device
                .raw()
                .map_memory(self.memory, 0, self.size, vk::MemoryMapFlags::empty())
        }
        .map_err(VulkanError::creating("buffer mapping"))?;

        NonNull::new(ptr.cast::<u8>()).ok_or_else(|| VulkanError::InvalidOperation {
            reason: "driver returned a null mapping".to_string(),
        })
    }

    /// Unmap memory
    pub fn unmap_memory(&self) {
        unsafe { self.device.raw().unmap_memory(self.memory) };
    }

    /// Copy bytes into the buffer through a temporary mapping
    pub fn write_bytes(&self, bytes: &[u8]) -> VulkanResult<()> {
        check_fits(bytes.len(), self.size)?;
        let ptr = self.map_memory()?;
        unsafe { std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.as_ptr(), bytes.len()) };
        self.unmap_memory();
        Ok(())
    }

    /// Get buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Get size
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Owning device
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            self.device.raw().destroy_buffer(self.buffer, None);
            self.device.raw().free_memory(self.memory, None);
        }
    }
}

fn check_fits(len: usize, capacity: vk::DeviceSize) -> VulkanResult<()> {
    if len as vk::DeviceSize > capacity {
        return Err(VulkanError::InvalidOperation {
            reason: format!("{len} byte write exceeds {capacity} byte buffer"),
        });
    }
    Ok(())
}

/// Uniform buffer that stays mapped until it is dropped
pub struct UniformBuffer {
    mapped: NonNull<u8>,
    buffer: Buffer,
}

impl UniformBuffer {
    /// Allocate a host-visible, host-coherent uniform buffer and map it
    pub fn new(device: Arc<Device>, size: vk::DeviceSize) -> VulkanResult<Self> {
        let buffer = Buffer::new(
            device,
            size,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        let mapped = buffer.map_memory()?;
        Ok(Self { mapped, buffer })
    }

    /// Descriptor info covering the whole buffer
    pub fn descriptor_info(&self) -> vk::DescriptorBufferInfo {
        vk::DescriptorBufferInfo {
            buffer: self.buffer.handle(),
            offset: 0,
            range: self.buffer.size(),
        }
    }
}

impl UniformMemory for UniformBuffer {
    fn buffer(&self) -> vk::Buffer {
        self.buffer.handle()
    }

    fn size(&self) -> vk::DeviceSize {
        self.buffer.size()
    }

    fn write(&mut self, bytes: &[u8]) -> VulkanResult<()> {
        check_fits(bytes.len(), self.buffer.size())?;
        // Coherent memory: visible to the next submission without a flush.
        unsafe { std::ptr::copy_nonoverlapping(bytes.as_ptr(), self.mapped.as_ptr(), bytes.len()) };
        Ok(())
    }
}

impl Drop for UniformBuffer {
    fn drop(&mut self) {
        self.buffer.unmap_memory();
    }
}

/// Vertex data with an optional index list
pub struct GeometryBuffer {
    vertices: Buffer,
    indices: Option<Buffer>,
    vertex_count: u32,
    index_count: u32,
}

impl GeometryBuffer {
    /// Upload vertices and optional `u32` indices into host-visible buffers
    pub fn new<V: Pod>(device: Arc<Device>, vertices: &[V], indices: Option<&[u32]>) -> VulkanResult<Self> {
        let vertex_count = count_u32(vertices.len())?;
        let vertex_bytes: &[u8] = bytemuck::cast_slice(vertices);
        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;

        let vertex_buffer = Buffer::new(
            device.clone(),
            vertex_bytes.len() as vk::DeviceSize,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            host,
        )?;
        vertex_buffer.write_bytes(vertex_bytes)?;

        let (index_buffer, index_count) = match indices {
            Some(indices) if !indices.is_empty() => {
                let index_bytes: &[u8] = bytemuck::cast_slice(indices);
                let buffer = Buffer::new(
                    device,
                    index_bytes.len() as vk::DeviceSize,
                    vk::BufferUsageFlags::INDEX_BUFFER,
                    host,
                )?;
                buffer.write_bytes(index_bytes)?;
                (Some(buffer), count_u32(indices.len())?)
            }
            _ => (None, 0),
        };

        log::debug!(
            "Uploaded geometry: {} vertices of {} bytes, {} indices",
            vertex_count,
            mem::size_of::<V>(),
            index_count
        );

        Ok(Self {
            vertices: vertex_buffer,
            indices: index_buffer,
            vertex_count,
            index_count,
        })
    }

    /// Vertex buffer handle
    pub fn vertex_buffer(&self) -> vk::Buffer {
        self.vertices.handle()
    }

    /// Index buffer handle, if the geometry is indexed
    pub fn index_buffer(&self) -> Option<vk::Buffer> {
        self.indices.as_ref().map(Buffer::handle)
    }

    /// Number of vertices
    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    /// Number of indices (0 when not indexed)
    pub fn index_count(&self) -> u32 {
        self.index_count
    }
}

fn count_u32(len: usize) -> VulkanResult<u32> {
    match u32::try_from(len) {
        Ok(0) => Err(VulkanError::InvalidOperation {
            reason: "geometry needs at least one element".to_string(),
        }),
        Ok(count) => Ok(count),
        Err(_) => Err(VulkanError::InvalidOperation {
            reason: format!("{len} elements exceed u32 range"),
        }),
    }
}
