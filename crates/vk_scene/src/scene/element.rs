//! Scene element transform engine
//!
//! A [`SceneElement`] holds position, orientation (Euler degrees), scale and
//! a local pivot (`origin`), and caches two matrices derived from them:
//!
//! ```text
//! model = T(origin) * T(position) * R * S(scale) * T(-origin)
//! view  = inverse(T(origin) * T(position) * R * T(-origin))
//! ```
//!
//! Scale is left out of the inverted chain, so the view matrix is always
//! rigid.
//!
//! Types that need to react to transform changes implement [`SceneNode`]
//! and override [`SceneNode::on_transform_changed`]. The setters live on
//! the trait so every node gets the same recompute-then-notify behaviour.

use crate::foundation::math::{Mat4, Mat4Ext, Vec3};
use crate::scene::rotation::RotationStrategy;

/// Position, orientation, scale and pivot of an object, plus the matrices
/// derived from them
#[derive(Debug, Clone, PartialEq)]
pub struct SceneElement {
    position: Vec3,
    orientation: Vec3,
    scale: Vec3,
    origin: Vec3,
    rotation_strategy: RotationStrategy,
    model_matrix: Mat4,
    view_matrix: Mat4,
}

impl Default for SceneElement {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            orientation: Vec3::zeros(),
            scale: Vec3::new(1.0, 1.0, 1.0),
            origin: Vec3::zeros(),
            rotation_strategy: RotationStrategy::default(),
            model_matrix: Mat4::identity(),
            view_matrix: Mat4::identity(),
        }
    }
}

impl SceneElement {
    /// Create an element at the origin with identity matrices
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an element from a full transform and compute its matrices
    pub fn from_transform(position: Vec3, orientation: Vec3, scale: Vec3, origin: Vec3) -> Self {
        let mut element = Self {
            position,
            orientation,
            scale,
            origin,
            ..Self::default()
        };
        element.recompute();
        element
    }

    /// Position in parent space
    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Euler angles in degrees
    pub fn orientation(&self) -> Vec3 {
        self.orientation
    }

    /// Per-axis scale factors
    pub fn scale(&self) -> Vec3 {
        self.scale
    }

    /// Local pivot for rotation and scale
    pub fn origin(&self) -> Vec3 {
        self.origin
    }

    /// Rotation builder in use
    pub fn rotation_strategy(&self) -> RotationStrategy {
        self.rotation_strategy
    }

    /// Cached local-to-world matrix
    pub fn model_matrix(&self) -> &Mat4 {
        &self.model_matrix
    }

    /// Cached world-to-local matrix (rigid part only)
    pub fn view_matrix(&self) -> &Mat4 {
        &self.view_matrix
    }

    /// Rebuild both cached matrices from the current fields
    pub fn recompute(&mut self) {
        let rotation = self.rotation_strategy.rotation_matrix(&self.orientation);
        let to_pivot = Mat4::translation(&self.origin);
        let from_pivot = Mat4::translation(&-self.origin);

        self.model_matrix = to_pivot
            * Mat4::translation(&self.position)
            * rotation
            * Mat4::scaling(&self.scale)
            * from_pivot;

        // Closed-form inverse of T(origin) * T(position) * R * T(-origin).
        self.view_matrix = to_pivot * rotation.transpose() * Mat4::translation(&-self.position) * from_pivot;
    }

    /// The rigid chain the view matrix inverts
    pub fn rigid_matrix(&self) -> Mat4 {
        let rotation = self.rotation_strategy.rotation_matrix(&self.orientation);
        Mat4::translation(&self.origin)
            * Mat4::translation(&self.position)
            * rotation
            * Mat4::translation(&-self.origin)
    }
}

/// Capability: "owns a scene element and responds to its transform changes"
///
/// Setters replace one field. With `recompute` set they rebuild both
/// matrices and call [`on_transform_changed`](Self::on_transform_changed)
/// before returning; without it the matrices stay stale until the next
/// recomputing call or [`update_transform`](Self::update_transform), which
/// lets callers batch several edits.
pub trait SceneNode {
    /// The element holding this node's transform
    fn element(&self) -> &SceneElement;

    /// Mutable access to the element
    fn element_mut(&mut self) -> &mut SceneElement;

    /// Hook run after the matrices were rebuilt
    fn on_transform_changed(&mut self) {}

    /// Rebuild matrices and notify
    fn update_transform(&mut self) {
        self.element_mut().recompute();
        self.on_transform_changed();
    }

    /// Replace the position
    fn set_position(&mut self, position: Vec3, recompute: bool) {
        self.element_mut().position = position;
        if recompute {
            self.update_transform();
        }
    }

    /// Replace the orientation (Euler degrees)
    fn set_orientation(&mut self, orientation: Vec3, recompute: bool) {
        self.element_mut().orientation = orientation;
        if recompute {
            self.update_transform();
        }
    }

    /// Replace the scale
    fn set_scale(&mut self, scale: Vec3, recompute: bool) {
        self.element_mut().scale = scale;
        if recompute {
            self.update_transform();
        }
    }

    /// Replace the pivot
    fn set_origin(&mut self, origin: Vec3, recompute: bool) {
        self.element_mut().origin = origin;
        if recompute {
            self.update_transform();
        }
    }

    /// Switch rotation builder
    fn set_rotation_strategy(&mut self, strategy: RotationStrategy, recompute: bool) {
        self.element_mut().rotation_strategy = strategy;
        if recompute {
            self.update_transform();
        }
    }

    /// Position in parent space
    fn position(&self) -> Vec3 {
        self.element().position()
    }

    /// Euler angles in degrees
    fn orientation(&self) -> Vec3 {
        self.element().orientation()
    }

    /// Per-axis scale factors
    fn scale(&self) -> Vec3 {
        self.element().scale()
    }

    /// Local pivot
    fn origin(&self) -> Vec3 {
        self.element().origin()
    }

    /// Cached model matrix
    fn model_matrix(&self) -> &Mat4 {
        self.element().model_matrix()
    }

    /// Cached view matrix
    fn view_matrix(&self) -> &Mat4 {
        self.element().view_matrix()
    }
}

impl SceneNode for SceneElement {
    fn element(&self) -> &SceneElement {
        self
    }

    fn element_mut(&mut self) -> &mut SceneElement {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Point3;
    use crate::scene::rotation::{quaternion_rotation, AxisOrder};
    use approx::assert_relative_eq;

    const EPSILON: f32 = 1e-5;

    /// Counts hook invocations
    #[derive(Default)]
    struct Probe {
        element: SceneElement,
        notifications: usize,
        last_seen: Mat4,
    }

    impl SceneNode for Probe {
        fn element(&self) -> &SceneElement {
            &self.element
        }

        fn element_mut(&mut self) -> &mut SceneElement {
            &mut self.element
        }

        fn on_transform_changed(&mut self) {
            self.notifications += 1;
            self.last_seen = *self.element.model_matrix();
        }
    }

    #[test]
    fn test_default_element_is_identity() {
        let element = SceneElement::new();
        assert_eq!(*element.model_matrix(), Mat4::identity());
        assert_eq!(*element.view_matrix(), Mat4::identity());
        assert_eq!(element.scale(), Vec3::new(1.0, 1.0, 1.0));
        assert_eq!(element.rotation_strategy(), RotationStrategy::Quaternion);
    }

    #[test]
    fn test_position_only_is_pure_translation() {
        let positions = [
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(-0.7, -1.0, 0.3),
            Vec3::new(100.0, 25.0, -3.5),
        ];

        for position in positions {
            let mut element = SceneElement::new();
            element.set_position(position, true);
            assert_relative_eq!(*element.model_matrix(), Mat4::new_translation(&position), epsilon = EPSILON);
        }
    }

    #[test]
    fn test_orientation_only_matches_quaternion_rotation() {
        let orientation = Vec3::new(15.0, -40.0, 70.0);
        let mut element = SceneElement::new();
        element.set_orientation(orientation, true);

        let quat = crate::scene::rotation::orientation_quaternion(&orientation);
        for v in [Vec3::x(), Vec3::y(), Vec3::z(), Vec3::new(1.0, 2.0, 3.0)] {
            assert_relative_eq!(element.model_matrix().transform_vector(&v), quat * v, epsilon = EPSILON);
        }
    }

    #[test]
    fn test_origin_is_pivot() {
        let mut element = SceneElement::new();
        element.set_position(Vec3::new(2.0, 0.0, -1.0), false);
        element.set_orientation(Vec3::new(0.0, 90.0, 45.0), false);
        element.set_scale(Vec3::new(3.0, 3.0, 3.0), false);
        element.set_origin(Vec3::new(1.0, 1.0, 1.0), true);

        let pivot = Point3::from(element.origin());
        let moved = element.model_matrix().transform_point(&pivot);
        assert_relative_eq!(moved.coords, element.origin() + element.position(), epsilon = EPSILON);
    }

    #[test]
    fn test_view_matrix_ignores_scale() {
        let position = Vec3::new(3.0, -2.0, 5.0);
        let orientation = Vec3::new(10.0, 20.0, 30.0);
        let origin = Vec3::new(0.5, 0.0, -0.5);

        let unit = SceneElement::from_transform(position, orientation, Vec3::new(1.0, 1.0, 1.0), origin);
        let scaled = SceneElement::from_transform(position, orientation, Vec3::new(2.0, 2.0, 2.0), origin);

        assert_relative_eq!(*unit.view_matrix(), *scaled.view_matrix(), epsilon = EPSILON);
        assert!((unit.model_matrix() - scaled.model_matrix()).norm() > 1.0);
    }

    #[test]
    fn test_view_matrix_inverts_rigid_chain() {
        let element = SceneElement::from_transform(
            Vec3::new(-4.0, 1.0, 2.5),
            Vec3::new(33.0, -12.0, 190.0),
            Vec3::new(0.5, 4.0, 2.0),
            Vec3::new(1.0, -1.0, 0.25),
        );

        let inverse = element.rigid_matrix().try_inverse().unwrap();
        assert_relative_eq!(*element.view_matrix(), inverse, epsilon = 1e-4);
        assert_relative_eq!(element.view_matrix() * element.rigid_matrix(), Mat4::identity(), epsilon = 1e-4);
    }

    #[test]
    fn test_deferred_recompute_batches_edits() {
        let mut element = SceneElement::new();
        let before_model = *element.model_matrix();
        let before_view = *element.view_matrix();

        element.set_position(Vec3::new(5.0, 0.0, 0.0), false);
        element.set_scale(Vec3::new(2.0, 2.0, 2.0), false);
        assert_eq!(*element.model_matrix(), before_model);
        assert_eq!(*element.view_matrix(), before_view);

        element.set_orientation(Vec3::new(0.0, 0.0, 90.0), true);

        let expected = Mat4::new_translation(&Vec3::new(5.0, 0.0, 0.0))
            * quaternion_rotation(&Vec3::new(0.0, 0.0, 90.0))
            * Mat4::new_scaling(2.0);
        assert_relative_eq!(*element.model_matrix(), expected, epsilon = EPSILON);
    }

    #[test]
    fn test_hook_runs_only_on_recompute() {
        let mut probe = Probe::default();

        probe.set_position(Vec3::new(1.0, 2.0, 3.0), false);
        probe.set_scale(Vec3::new(2.0, 2.0, 2.0), false);
        assert_eq!(probe.notifications, 0);

        probe.set_origin(Vec3::zeros(), true);
        assert_eq!(probe.notifications, 1);
        assert_eq!(probe.last_seen, *probe.model_matrix());

        probe.update_transform();
        assert_eq!(probe.notifications, 2);
    }

    #[test]
    fn test_rotation_strategy_switch() {
        let mut element = SceneElement::new();
        element.set_orientation(Vec3::new(90.0, 90.0, 0.0), true);
        let quaternion_model = *element.model_matrix();

        element.set_rotation_strategy(RotationStrategy::EulerChain(AxisOrder::Xyz), true);
        assert_relative_eq!(*element.model_matrix(), quaternion_model, epsilon = EPSILON);

        element.set_rotation_strategy(RotationStrategy::EulerChain(AxisOrder::Yxz), true);
        assert_relative_eq!(element.model_matrix().transform_vector(&Vec3::y()), Vec3::z(), epsilon = EPSILON);
    }

    #[test]
    fn test_y_rotation_sign_convention() {
        let mut element = SceneElement::new();
        element.set_orientation(Vec3::new(0.0, 90.0, 0.0), true);

        let moved = element.model_matrix().transform_point(&Point3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(moved.coords, Vec3::new(0.0, 0.0, -1.0), epsilon = EPSILON);
    }
}
