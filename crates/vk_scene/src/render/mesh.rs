//! Renderable mesh
//!
//! A mesh is a scene element whose model matrix and material live in two
//! host-mapped uniform buffers, bound through one descriptor set:
//! binding 0 holds the model matrix, binding 1 the material record.
//! Every recomputing transform setter copies the new model matrix into the
//! mapped buffer before returning, and every material change does the same
//! for the material buffer.

use std::sync::Arc;

use ash::vk;
use serde::{Deserialize, Serialize};

use crate::foundation::math::Vec3;
use crate::render::backend::{ResourceBackend, UniformMemory};
use crate::render::uniforms::{MaterialUniform, ModelUniform, MATERIAL_BINDING, MODEL_BINDING};
use crate::render::vulkan::{VulkanError, VulkanResult};
use crate::scene::{SceneElement, SceneNode};

/// Surface parameters of a mesh
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MaterialSettings {
    /// Base color
    pub albedo: Vec3,
    /// Metalness in `[0, 1]`
    pub metallic: f32,
    /// Roughness in `[0, 1]`
    pub roughness: f32,
}

impl Default for MaterialSettings {
    fn default() -> Self {
        Self {
            albedo: Vec3::new(1.0, 1.0, 1.0),
            metallic: 0.0,
            roughness: 0.5,
        }
    }
}

impl MaterialSettings {
    /// GPU record for these settings
    pub fn to_uniform(&self) -> MaterialUniform {
        MaterialUniform::new(self.albedo, self.metallic, self.roughness)
    }
}

/// Renderable geometry with per-object uniform state
pub struct Mesh<B: ResourceBackend> {
    // Field order is release order: after `Drop::drop` frees the descriptor
    // set, the model buffer goes first, then the material buffer, and the
    // backend handle last.
    model_uniform: B::Uniform,
    material_uniform: B::Uniform,
    descriptor_set: vk::DescriptorSet,
    descriptor_pool: vk::DescriptorPool,
    geometry: Arc<B::Geometry>,
    texture: Option<Arc<B::Texture>>,
    material: MaterialSettings,
    element: SceneElement,
    backend: Arc<B>,
}

impl<B: ResourceBackend> Mesh<B> {
    /// Create a mesh over shared geometry.
    ///
    /// Allocates both uniform buffers and a descriptor set from
    /// `descriptor_pool` using `descriptor_layout`, binds them and uploads
    /// the identity transform and default material. Anything acquired
    /// before a failure is released before the error is returned.
    pub fn new(
        backend: Arc<B>,
        descriptor_pool: vk::DescriptorPool,
        descriptor_layout: vk::DescriptorSetLayout,
        geometry: Arc<B::Geometry>,
    ) -> VulkanResult<Self> {
        if !backend.is_ready() {
            return Err(VulkanError::DeviceUnavailable {
                reason: "mesh creation on a device that is not ready".to_string(),
            });
        }

        let model_uniform = backend.allocate_uniform_buffer(backend.aligned_size_of::<ModelUniform>())?;
        let material_uniform = backend.allocate_uniform_buffer(backend.aligned_size_of::<MaterialUniform>())?;
        let descriptor_set = backend.allocate_descriptor_set(descriptor_pool, descriptor_layout)?;

        backend.bind_uniform_buffer(descriptor_set, MODEL_BINDING, &model_uniform);
        backend.bind_uniform_buffer(descriptor_set, MATERIAL_BINDING, &material_uniform);

        let mut mesh = Self {
            model_uniform,
            material_uniform,
            descriptor_set,
            descriptor_pool,
            geometry,
            texture: None,
            material: MaterialSettings::default(),
            element: SceneElement::new(),
            backend,
        };

        mesh.write_model_uniform()?;
        mesh.write_material_uniform()?;

        log::debug!("Created mesh with descriptor set {:?}", mesh.descriptor_set);
        Ok(mesh)
    }

    /// Attach a texture
    pub fn with_texture(mut self, texture: Arc<B::Texture>) -> Self {
        self.texture = Some(texture);
        self
    }

    /// Replace the texture
    pub fn set_texture(&mut self, texture: Option<Arc<B::Texture>>) {
        self.texture = texture;
    }

    /// Texture sampled by this mesh, if any
    pub fn texture(&self) -> Option<&Arc<B::Texture>> {
        self.texture.as_ref()
    }

    /// Shared geometry
    pub fn geometry(&self) -> &Arc<B::Geometry> {
        &self.geometry
    }

    /// Descriptor set binding both uniforms
    pub fn descriptor_set(&self) -> vk::DescriptorSet {
        self.descriptor_set
    }

    /// Model-matrix uniform buffer
    pub fn model_uniform(&self) -> &B::Uniform {
        &self.model_uniform
    }

    /// Material uniform buffer
    pub fn material_uniform(&self) -> &B::Uniform {
        &self.material_uniform
    }

    /// Current material
    pub fn material_settings(&self) -> &MaterialSettings {
        &self.material
    }

    /// Replace the material and upload it
    pub fn set_material_settings(&mut self, material: MaterialSettings) -> VulkanResult<()> {
        self.material = material;
        self.write_material_uniform()
    }

    /// Change the base color and upload the material
    pub fn set_albedo(&mut self, albedo: Vec3) -> VulkanResult<()> {
        self.material.albedo = albedo;
        self.write_material_uniform()
    }

    /// Change metalness and upload the material
    pub fn set_metallic(&mut self, metallic: f32) -> VulkanResult<()> {
        self.material.metallic = metallic;
        self.write_material_uniform()
    }

    /// Change roughness and upload the material
    pub fn set_roughness(&mut self, roughness: f32) -> VulkanResult<()> {
        self.material.roughness = roughness;
        self.write_material_uniform()
    }

    fn write_model_uniform(&mut self) -> VulkanResult<()> {
        let record = ModelUniform::from(self.element.model_matrix());
        self.model_uniform.write(bytemuck::bytes_of(&record))
    }

    fn write_material_uniform(&mut self) -> VulkanResult<()> {
        let record = self.material.to_uniform();
        self.material_uniform.write(bytemuck::bytes_of(&record))
    }
}

impl<B: ResourceBackend> SceneNode for Mesh<B> {
    fn element(&self) -> &SceneElement {
        &self.element
    }

    fn element_mut(&mut self) -> &mut SceneElement {
        &mut self.element
    }

    fn on_transform_changed(&mut self) {
        if let Err(e) = self.write_model_uniform() {
            log::error!("Failed to upload model matrix for {:?}: {}", self.descriptor_set, e);
        }
    }
}

impl<B: ResourceBackend> Drop for Mesh<B> {
    fn drop(&mut self) {
        if let Err(e) = self.backend.free_descriptor_set(self.descriptor_pool, self.descriptor_set) {
            log::warn!("Failed to free descriptor set {:?}: {}", self.descriptor_set, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{Mat4, Point3};
    use crate::render::testing::{RecordingBackend, ResourceEvent};
    use approx::assert_relative_eq;

    fn pool() -> vk::DescriptorPool {
        use ash::vk::Handle;
        vk::DescriptorPool::from_raw(0xD00D)
    }

    fn layout() -> vk::DescriptorSetLayout {
        use ash::vk::Handle;
        vk::DescriptorSetLayout::from_raw(0x1A70)
    }

    fn mesh(backend: &Arc<RecordingBackend>) -> Mesh<RecordingBackend> {
        Mesh::new(backend.clone(), pool(), layout(), Arc::new(())).unwrap()
    }

    #[test]
    fn test_construction_binds_both_uniforms() {
        let backend = Arc::new(RecordingBackend::new());
        let mesh = mesh(&backend);

        let set = mesh.descriptor_set();
        let model = mesh.model_uniform().buffer();
        let material = mesh.material_uniform().buffer();

        let events = backend.events();
        assert!(events.contains(&ResourceEvent::Bind { set, binding: 0, buffer: model }));
        assert!(events.contains(&ResourceEvent::Bind { set, binding: 1, buffer: material }));
        assert_eq!(backend.allocated_sets(), vec![set]);
    }

    #[test]
    fn test_uniform_sizes_are_dynamically_aligned() {
        let backend = Arc::new(RecordingBackend::new().with_alignment(256));
        let mesh = mesh(&backend);

        assert_eq!(mesh.model_uniform().size(), 256);
        assert_eq!(mesh.material_uniform().size(), 256);
    }

    #[test]
    fn test_initial_uniform_contents() {
        let backend = Arc::new(RecordingBackend::new());
        let mesh = mesh(&backend);

        let model = backend.mapped_bytes(mesh.model_uniform().buffer()).unwrap();
        assert_eq!(&model[..64], bytemuck::cast_slice::<f32, u8>(Mat4::identity().as_slice()));

        let material = backend.mapped_bytes(mesh.material_uniform().buffer()).unwrap();
        let expected = MaterialSettings::default().to_uniform();
        assert_eq!(&material[..32], bytemuck::bytes_of(&expected));
    }

    #[test]
    fn test_position_reaches_mapped_memory_bit_for_bit() {
        let backend = Arc::new(RecordingBackend::new());
        let mut mesh = mesh(&backend);

        mesh.set_position(Vec3::new(1.0, 0.0, 0.0), true);

        let bytes = backend.mapped_bytes(mesh.model_uniform().buffer()).unwrap();
        let uploaded: &[f32] = bytemuck::cast_slice(&bytes[..64]);
        let decoded = Mat4::from_column_slice(uploaded);

        assert_eq!(decoded, *mesh.model_matrix());
        assert_eq!(decoded, Mat4::new_translation(&Vec3::new(1.0, 0.0, 0.0)));
    }

    #[test]
    fn test_deferred_edit_does_not_upload() {
        let backend = Arc::new(RecordingBackend::new());
        let mut mesh = mesh(&backend);
        let buffer = mesh.model_uniform().buffer();
        let writes_before = backend.write_count(buffer);

        mesh.set_position(Vec3::new(4.0, 0.0, 0.0), false);
        mesh.set_scale(Vec3::new(2.0, 2.0, 2.0), false);
        assert_eq!(backend.write_count(buffer), writes_before);

        mesh.update_transform();
        assert_eq!(backend.write_count(buffer), writes_before + 1);

        let bytes = backend.mapped_bytes(buffer).unwrap();
        let decoded = Mat4::from_column_slice(bytemuck::cast_slice(&bytes[..64]));
        assert_eq!(decoded, *mesh.model_matrix());
    }

    #[test]
    fn test_orientation_rotates_into_negative_z() {
        let backend = Arc::new(RecordingBackend::new());
        let mut mesh = mesh(&backend);

        mesh.set_orientation(Vec3::new(0.0, 90.0, 0.0), true);

        let moved = mesh.model_matrix().transform_point(&Point3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(moved.coords, Vec3::new(0.0, 0.0, -1.0), epsilon = 1e-5);
    }

    #[test]
    fn test_material_changes_mirror_into_buffer() {
        let backend = Arc::new(RecordingBackend::new());
        let mut mesh = mesh(&backend);
        let buffer = mesh.material_uniform().buffer();

        let settings = MaterialSettings {
            albedo: Vec3::new(0.8, 0.7, 0.5),
            metallic: 0.1,
            roughness: 0.6,
        };
        mesh.set_material_settings(settings).unwrap();
        assert_eq!(&backend.mapped_bytes(buffer).unwrap()[..32], bytemuck::bytes_of(&settings.to_uniform()));

        mesh.set_roughness(0.2).unwrap();
        mesh.set_metallic(1.0).unwrap();
        mesh.set_albedo(Vec3::new(0.0, 0.0, 1.0)).unwrap();
        let expected = MaterialUniform::new(Vec3::new(0.0, 0.0, 1.0), 1.0, 0.2);
        assert_eq!(&backend.mapped_bytes(buffer).unwrap()[..32], bytemuck::bytes_of(&expected));
    }

    #[test]
    fn test_drop_frees_set_once_then_releases_buffers_in_order() {
        let backend = Arc::new(RecordingBackend::new());
        let mesh = mesh(&backend);
        let set = mesh.descriptor_set();
        let model = mesh.model_uniform().buffer();
        let material = mesh.material_uniform().buffer();

        drop(mesh);

        let events = backend.events();
        let frees = events.iter().filter(|e| matches!(e, ResourceEvent::FreeSet(_))).count();
        assert_eq!(frees, 1);

        let tail = events[events.len() - 3..].to_vec();
        assert_eq!(
            tail,
            vec![
                ResourceEvent::FreeSet(set),
                ResourceEvent::ReleaseUniform(model),
                ResourceEvent::ReleaseUniform(material),
            ]
        );

        // Nothing touched mapped memory after release.
        let release_at = events.iter().position(|e| *e == ResourceEvent::ReleaseUniform(model)).unwrap();
        assert!(events[release_at..].iter().all(|e| !matches!(e, ResourceEvent::Write { .. })));
        assert!(backend.mapped_bytes(model).is_none());
        assert!(backend.allocated_sets().is_empty());
    }

    #[test]
    fn test_geometry_is_shared_between_meshes() {
        let backend = Arc::new(RecordingBackend::new());
        let geometry = Arc::new(());

        let first = Mesh::new(backend.clone(), pool(), layout(), geometry.clone()).unwrap();
        let second = Mesh::new(backend.clone(), pool(), layout(), geometry.clone()).unwrap();
        assert_eq!(Arc::strong_count(&geometry), 3);
        assert_ne!(first.descriptor_set(), second.descriptor_set());

        drop(first);
        assert_eq!(Arc::strong_count(&geometry), 2);
        drop(second);
        assert_eq!(Arc::strong_count(&geometry), 1);
    }

    #[test]
    fn test_texture_is_optional_and_shared() {
        let backend = Arc::new(RecordingBackend::new());
        let texture = Arc::new(());

        let mut mesh = mesh(&backend).with_texture(texture.clone());
        assert!(mesh.texture().is_some());
        assert_eq!(Arc::strong_count(&texture), 2);

        mesh.set_texture(None);
        assert!(mesh.texture().is_none());
        assert_eq!(Arc::strong_count(&texture), 1);
    }

    #[test]
    fn test_not_ready_device_is_rejected() {
        let backend = Arc::new(RecordingBackend::new().not_ready());
        let result = Mesh::new(backend.clone(), pool(), layout(), Arc::new(()));

        assert!(matches!(result, Err(VulkanError::DeviceUnavailable { .. })));
        assert!(backend.events().is_empty());
    }

    #[test]
    fn test_exhausted_pool_unwinds_uniforms() {
        let backend = Arc::new(RecordingBackend::new().with_exhausted_pool());
        let result = Mesh::new(backend.clone(), pool(), layout(), Arc::new(()));

        assert!(matches!(result, Err(VulkanError::ResourceExhausted { .. })));

        let events = backend.events();
        let allocated = events.iter().filter(|e| matches!(e, ResourceEvent::AllocateUniform { .. })).count();
        let released = events.iter().filter(|e| matches!(e, ResourceEvent::ReleaseUniform(_))).count();
        assert_eq!(allocated, 2);
        assert_eq!(released, 2);
        assert!(!events.iter().any(|e| matches!(e, ResourceEvent::FreeSet(_))));
    }

    #[test]
    fn test_exhausted_memory_on_second_buffer_unwinds_first() {
        let backend = Arc::new(RecordingBackend::new().with_uniform_limit(1));
        let result = Mesh::new(backend.clone(), pool(), layout(), Arc::new(()));

        assert!(matches!(result, Err(VulkanError::ResourceExhausted { .. })));
        let events = backend.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], ResourceEvent::AllocateUniform { .. }));
        assert!(matches!(events[1], ResourceEvent::ReleaseUniform(_)));
    }

    #[test]
    fn test_failed_initial_upload_frees_set_and_buffers() {
        let backend = Arc::new(RecordingBackend::new().with_failing_writes());
        let result = Mesh::new(backend.clone(), pool(), layout(), Arc::new(()));

        assert!(matches!(result, Err(VulkanError::Api(vk::Result::ERROR_MEMORY_MAP_FAILED))));

        let events = backend.events();
        let set = events
            .iter()
            .find_map(|e| match e {
                ResourceEvent::AllocateSet(set) => Some(*set),
                _ => None,
            })
            .unwrap();
        let frees: Vec<_> = events.iter().filter(|e| matches!(e, ResourceEvent::FreeSet(_))).collect();
        assert_eq!(frees, vec![&ResourceEvent::FreeSet(set)]);

        let released = events.iter().filter(|e| matches!(e, ResourceEvent::ReleaseUniform(_))).count();
        assert_eq!(released, 2);
        assert!(!events.iter().any(|e| matches!(e, ResourceEvent::Write { .. })));
        assert!(backend.allocated_sets().is_empty());
    }

    #[test]
    fn test_failed_hook_upload_keeps_transform() {
        let backend = Arc::new(RecordingBackend::new());
        let mut mesh = mesh(&backend);
        let buffer = mesh.model_uniform().buffer();
        let before = backend.mapped_bytes(buffer).unwrap();

        backend.set_failing_writes(true);
        mesh.set_position(Vec3::new(0.0, 3.0, 0.0), true);

        assert_eq!(*mesh.model_matrix(), Mat4::new_translation(&Vec3::new(0.0, 3.0, 0.0)));
        assert_eq!(backend.mapped_bytes(buffer).unwrap(), before);

        backend.set_failing_writes(false);
        mesh.update_transform();
        let bytes = backend.mapped_bytes(buffer).unwrap();
        assert_eq!(Mat4::from_column_slice(bytemuck::cast_slice(&bytes[..64])), *mesh.model_matrix());
    }
}
