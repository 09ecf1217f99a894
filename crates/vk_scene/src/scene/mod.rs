//! # Scene
//!
//! Transform model shared by everything placed in the world.

pub mod element;
pub mod rotation;

pub use element::{SceneElement, SceneNode};
pub use rotation::{Axis, AxisOrder, RotationStrategy};
