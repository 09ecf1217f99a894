//! Per-mesh uniform buffer records
//!
//! Byte layouts shared with the shaders. Both records follow std140:
//! the model matrix is 16 column-major floats, the material block is
//! padded to a multiple of 16 bytes.

use bytemuck::{Pod, Zeroable};

use crate::foundation::math::{Mat4, Vec3};

/// Descriptor binding of the model-matrix uniform
pub const MODEL_BINDING: u32 = 0;

/// Descriptor binding of the material uniform
pub const MATERIAL_BINDING: u32 = 1;

/// Model matrix as seen by the vertex shader
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ModelUniform {
    /// Model transformation matrix (4×4 column-major)
    pub model: [[f32; 4]; 4],
}

impl From<&Mat4> for ModelUniform {
    fn from(matrix: &Mat4) -> Self {
        Self { model: (*matrix).into() }
    }
}

impl ModelUniform {
    /// Rebuild the matrix from the stored columns
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from(self.model)
    }
}

/// Material parameters as seen by the fragment shader
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MaterialUniform {
    /// Base color
    pub albedo: [f32; 3],
    /// Metalness in `[0, 1]`
    pub metallic: f32,
    /// Roughness in `[0, 1]`
    pub roughness: f32,
    /// Pads the block to 32 bytes
    pub _padding: [f32; 3],
}

impl MaterialUniform {
    /// Build a record from individual parameters
    pub fn new(albedo: Vec3, metallic: f32, roughness: f32) -> Self {
        Self {
            albedo: albedo.into(),
            metallic,
            roughness,
            _padding: [0.0; 3],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{align_of, size_of};

    #[test]
    fn test_record_sizes_match_shader_blocks() {
        assert_eq!(size_of::<ModelUniform>(), 64);
        assert_eq!(size_of::<MaterialUniform>(), 32);
        assert_eq!(size_of::<MaterialUniform>() % 16, 0);
        assert_eq!(align_of::<MaterialUniform>(), 4);
    }

    #[test]
    fn test_model_uniform_is_column_major() {
        let matrix = Mat4::new_translation(&Vec3::new(1.0, 2.0, 3.0));
        let uniform = ModelUniform::from(&matrix);

        // Translation lives in the fourth column.
        assert_eq!(uniform.model[3], [1.0, 2.0, 3.0, 1.0]);
        assert_eq!(bytemuck::bytes_of(&uniform), bytemuck::cast_slice::<f32, u8>(matrix.as_slice()));
        assert_eq!(uniform.to_matrix(), matrix);
    }

    #[test]
    fn test_material_payload_offsets() {
        let record = MaterialUniform::new(Vec3::new(0.25, 0.5, 0.75), 0.9, 0.1);
        let floats: &[f32] = bytemuck::cast_slice(bytemuck::bytes_of(&record));

        assert_eq!(&floats[..5], &[0.25, 0.5, 0.75, 0.9, 0.1]);
        assert_eq!(&floats[5..], &[0.0, 0.0, 0.0]);
    }
}
