//! # Rendering
//!
//! Meshes and the resource layer they draw from.
//!
//! ## Architecture
//!
//! - **Mesh**: scene node owning per-object uniform buffers and a descriptor set
//! - **Backend seam**: `ResourceBackend` / `UniformMemory`, the only way a mesh
//!   reaches GPU memory
//! - **Vulkan**: `ash` wrappers implementing that seam

pub mod backend;
pub mod mesh;
pub mod uniforms;
pub mod vulkan;

#[cfg(test)]
pub(crate) mod testing;

pub use backend::{ResourceBackend, UniformMemory};
pub use mesh::{MaterialSettings, Mesh};
pub use uniforms::{MaterialUniform, ModelUniform, MATERIAL_BINDING, MODEL_BINDING};
