//! Rotation builders for scene elements
//!
//! Orientation is stored as Euler angles in degrees and only converted to
//! radians here, when a matrix is built. Two builders are available:
//!
//! - [`RotationStrategy::Quaternion`] folds the three angles into a single
//!   quaternion (X applied first, then Y, then Z). This is the default.
//! - [`RotationStrategy::EulerChain`] multiplies three single-axis matrices
//!   in a caller-chosen order.
//!
//! Rotations are right-handed: `+90°` about Y takes `+X` to `-Z`.

use serde::{Deserialize, Serialize};

use crate::foundation::math::{utils, Mat4, Mat4Ext, Quat, Vec3};

/// A principal axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    /// X axis
    X,
    /// Y axis
    Y,
    /// Z axis
    Z,
}

impl Axis {
    /// Rotation about this axis by `radians`
    pub fn rotation(self, radians: f32) -> Mat4 {
        match self {
            Self::X => Mat4::rotation_x(radians),
            Self::Y => Mat4::rotation_y(radians),
            Self::Z => Mat4::rotation_z(radians),
        }
    }

    /// Pick this axis' component out of a vector
    pub fn component(self, v: &Vec3) -> f32 {
        match self {
            Self::X => v.x,
            Self::Y => v.y,
            Self::Z => v.z,
        }
    }
}

/// Order in which single-axis rotations are applied to a vector.
///
/// `Xyz` rotates about X first, so the composed matrix is `Rz * Ry * Rx`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AxisOrder {
    /// X, then Y, then Z
    #[default]
    Xyz,
    /// X, then Z, then Y
    Xzy,
    /// Y, then X, then Z
    Yxz,
    /// Y, then Z, then X
    Yzx,
    /// Z, then X, then Y
    Zxy,
    /// Z, then Y, then X
    Zyx,
}

impl AxisOrder {
    /// Axes in application order
    pub fn axes(self) -> [Axis; 3] {
        match self {
            Self::Xyz => [Axis::X, Axis::Y, Axis::Z],
            Self::Xzy => [Axis::X, Axis::Z, Axis::Y],
            Self::Yxz => [Axis::Y, Axis::X, Axis::Z],
            Self::Yzx => [Axis::Y, Axis::Z, Axis::X],
            Self::Zxy => [Axis::Z, Axis::X, Axis::Y],
            Self::Zyx => [Axis::Z, Axis::Y, Axis::X],
        }
    }
}

/// How a scene element turns its Euler angles into a rotation matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RotationStrategy {
    /// Single quaternion built from all three angles
    #[default]
    Quaternion,
    /// Three single-axis matrices composed in the given order
    EulerChain(AxisOrder),
}

impl RotationStrategy {
    /// Build the 4x4 rotation for an orientation given in degrees
    pub fn rotation_matrix(self, orientation_degrees: &Vec3) -> Mat4 {
        match self {
            Self::Quaternion => quaternion_rotation(orientation_degrees),
            Self::EulerChain(order) => euler_chain_rotation(orientation_degrees, order),
        }
    }
}

/// Quaternion for an orientation given in degrees
pub fn orientation_quaternion(orientation_degrees: &Vec3) -> Quat {
    let radians = utils::deg_to_rad_vec(orientation_degrees);
    Quat::from_euler_angles(radians.x, radians.y, radians.z)
}

/// Rotation matrix through the quaternion path
pub fn quaternion_rotation(orientation_degrees: &Vec3) -> Mat4 {
    orientation_quaternion(orientation_degrees).to_homogeneous()
}

/// Rotation matrix composed from single-axis rotations
pub fn euler_chain_rotation(orientation_degrees: &Vec3, order: AxisOrder) -> Mat4 {
    order.axes().iter().fold(Mat4::identity(), |acc, axis| {
        let radians = utils::deg_to_rad(axis.component(orientation_degrees));
        axis.rotation(radians) * acc
    })
}
