//! Recording resource backend for GPU-free tests
//!
//! Hands out fake handles, keeps "mapped" memory in host vectors and logs
//! every allocation, bind, write and release in order.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use ash::vk::{self, Handle};

use crate::foundation::memory::align_up;
use crate::render::backend::{ResourceBackend, UniformMemory};
use crate::render::vulkan::{VulkanError, VulkanResult};

/// One observed resource operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceEvent {
    /// Uniform buffer allocated and mapped
    AllocateUniform { buffer: vk::Buffer, size: vk::DeviceSize },
    /// Bytes copied into mapped memory
    Write { buffer: vk::Buffer, len: usize },
    /// Uniform buffer unmapped and released
    ReleaseUniform(vk::Buffer),
    /// Descriptor set allocated
    AllocateSet(vk::DescriptorSet),
    /// Uniform bound to a descriptor slot
    Bind { set: vk::DescriptorSet, binding: u32, buffer: vk::Buffer },
    /// Descriptor set returned to its pool
    FreeSet(vk::DescriptorSet),
}

#[derive(Default)]
struct Recorder {
    next_handle: u64,
    events: Vec<ResourceEvent>,
    memory: HashMap<vk::Buffer, Vec<u8>>,
    writes: HashMap<vk::Buffer, usize>,
    live_sets: HashSet<vk::DescriptorSet>,
    uniforms_allocated: usize,
    fail_writes: bool,
}

impl Recorder {
    fn next(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }
}

type Shared = Arc<Mutex<Recorder>>;

fn lock(shared: &Shared) -> MutexGuard<'_, Recorder> {
    shared.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Test double standing in for the Vulkan device
pub struct RecordingBackend {
    shared: Shared,
    ready: bool,
    alignment: vk::DeviceSize,
    exhausted_pool: bool,
    uniform_limit: Option<usize>,
}

impl RecordingBackend {
    /// Ready backend with a 16-byte uniform alignment
    pub fn new() -> Self {
        Self {
            shared: Arc::default(),
            ready: true,
            alignment: 16,
            exhausted_pool: false,
            uniform_limit: None,
        }
    }

    /// Report the device as not ready
    pub fn not_ready(mut self) -> Self {
        self.ready = false;
        self
    }

    /// Use a different minimum uniform offset alignment
    pub fn with_alignment(mut self, alignment: vk::DeviceSize) -> Self {
        self.alignment = alignment;
        self
    }

    /// Refuse every descriptor set allocation
    pub fn with_exhausted_pool(mut self) -> Self {
        self.exhausted_pool = true;
        self
    }

    /// Refuse uniform allocations past `limit`
    pub fn with_uniform_limit(mut self, limit: usize) -> Self {
        self.uniform_limit = Some(limit);
        self
    }

    /// Refuse every uniform write from the start
    pub fn with_failing_writes(self) -> Self {
        self.set_failing_writes(true);
        self
    }

    /// Make uniform writes fail (or succeed again) from now on
    pub fn set_failing_writes(&self, fail: bool) {
        lock(&self.shared).fail_writes = fail;
    }

    /// Everything observed so far
    pub fn events(&self) -> Vec<ResourceEvent> {
        lock(&self.shared).events.clone()
    }

    /// Contents of a live mapped buffer, `None` once released
    pub fn mapped_bytes(&self, buffer: vk::Buffer) -> Option<Vec<u8>> {
        lock(&self.shared).memory.get(&buffer).cloned()
    }

    /// Number of writes a buffer received
    pub fn write_count(&self, buffer: vk::Buffer) -> usize {
        lock(&self.shared).writes.get(&buffer).copied().unwrap_or(0)
    }

    /// Descriptor sets not yet freed
    pub fn allocated_sets(&self) -> Vec<vk::DescriptorSet> {
        lock(&self.shared).live_sets.iter().copied().collect()
    }
}

impl Default for RecordingBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Uniform buffer backed by a host vector
pub struct RecordedUniform {
    buffer: vk::Buffer,
    size: vk::DeviceSize,
    shared: Shared,
}

impl UniformMemory for RecordedUniform {
    fn buffer(&self) -> vk::Buffer {
        self.buffer
    }

    fn size(&self) -> vk::DeviceSize {
        self.size
    }

    fn write(&mut self, bytes: &[u8]) -> VulkanResult<()> {
        let mut recorder = lock(&self.shared);
        if recorder.fail_writes {
            return Err(VulkanError::from_result("uniform write", vk::Result::ERROR_MEMORY_MAP_FAILED));
        }
        let memory = recorder
            .memory
            .get_mut(&self.buffer)
            .unwrap_or_else(|| panic!("write to released buffer {:?}", self.buffer));
        if bytes.len() > memory.len() {
            return Err(VulkanError::InvalidOperation {
                reason: format!("{} byte write into {} byte uniform", bytes.len(), memory.len()),
            });
        }
        memory[..bytes.len()].copy_from_slice(bytes);
        *recorder.writes.entry(self.buffer).or_default() += 1;
        recorder.events.push(ResourceEvent::Write { buffer: self.buffer, len: bytes.len() });
        Ok(())
    }
}

impl Drop for RecordedUniform {
    fn drop(&mut self) {
        let mut recorder = lock(&self.shared);
        assert!(recorder.memory.remove(&self.buffer).is_some(), "double release of {:?}", self.buffer);
        recorder.events.push(ResourceEvent::ReleaseUniform(self.buffer));
    }
}

impl ResourceBackend for RecordingBackend {
    type Uniform = RecordedUniform;
    type Geometry = ();
    type Texture = ();

    fn is_ready(&self) -> bool {
        self.ready
    }

    fn uniform_block_size(&self, size: vk::DeviceSize) -> vk::DeviceSize {
        align_up(size, self.alignment)
    }

    fn allocate_uniform_buffer(self: &Arc<Self>, size: vk::DeviceSize) -> VulkanResult<RecordedUniform> {
        let mut recorder = lock(&self.shared);
        if self.uniform_limit.is_some_and(|limit| recorder.uniforms_allocated >= limit) {
            return Err(VulkanError::from_result("uniform buffer memory", vk::Result::ERROR_OUT_OF_DEVICE_MEMORY));
        }

        let buffer = vk::Buffer::from_raw(recorder.next());
        let len = usize::try_from(size).expect("test uniform size fits in usize");
        recorder.memory.insert(buffer, vec![0; len]);
        recorder.uniforms_allocated += 1;
        recorder.events.push(ResourceEvent::AllocateUniform { buffer, size });

        Ok(RecordedUniform {
            buffer,
            size,
            shared: self.shared.clone(),
        })
    }

    fn allocate_descriptor_set(
        &self,
        _pool: vk::DescriptorPool,
        _layout: vk::DescriptorSetLayout,
    ) -> VulkanResult<vk::DescriptorSet> {
        if self.exhausted_pool {
            return Err(VulkanError::from_result("descriptor set", vk::Result::ERROR_OUT_OF_POOL_MEMORY));
        }

        let mut recorder = lock(&self.shared);
        let set = vk::DescriptorSet::from_raw(recorder.next());
        recorder.live_sets.insert(set);
        recorder.events.push(ResourceEvent::AllocateSet(set));
        Ok(set)
    }

    fn bind_uniform_buffer(&self, set: vk::DescriptorSet, binding: u32, uniform: &RecordedUniform) {
        lock(&self.shared).events.push(ResourceEvent::Bind {
            set,
            binding,
            buffer: uniform.buffer,
        });
    }

    fn free_descriptor_set(&self, _pool: vk::DescriptorPool, set: vk::DescriptorSet) -> VulkanResult<()> {
        let mut recorder = lock(&self.shared);
        assert!(recorder.live_sets.remove(&set), "descriptor set {set:?} freed twice");
        recorder.events.push(ResourceEvent::FreeSet(set));
        Ok(())
    }
}
