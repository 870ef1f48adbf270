//! Transform capability and the plain transform node

use super::{Node, NodeBase};
use crate::managers::MatrixStack;
use glam::{Mat4, Quat, Vec3};

/// Position, axis-angle rotation and scale of a node.
///
/// Composed as translate, then rotate, then scale. Rotation is skipped when
/// the angle is zero and scaling when the scale is exactly one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation_axis: Vec3,
    /// Radians
    pub rotation_angle: f32,
    pub scale: Vec3,
    /// When false the node leaves the model matrix stack alone
    pub use_transform: bool,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation_axis: Vec3::Y,
            rotation_angle: 0.0,
            scale: Vec3::ONE,
            use_transform: true,
        }
    }
}

impl Transform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    pub fn from_position_scale(position: Vec3, scale: Vec3) -> Self {
        Self {
            position,
            scale,
            ..Default::default()
        }
    }

    pub fn from_components(position: Vec3, rotation_axis: Vec3, rotation_angle: f32, scale: Vec3) -> Self {
        Self {
            position,
            rotation_axis,
            rotation_angle,
            scale,
            use_transform: true,
        }
    }

    pub fn with_rotation(mut self, axis: Vec3, angle: f32) -> Self {
        self.rotation_axis = axis;
        self.rotation_angle = angle;
        self
    }

    pub fn has_rotation(&self) -> bool {
        self.rotation_angle != 0.0
    }

    pub fn has_scale(&self) -> bool {
        self.scale != Vec3::ONE
    }

    /// Rotation as a quaternion; identity for a zero axis or angle
    pub fn rotation(&self) -> Quat {
        match self.rotation_axis.try_normalize() {
            Some(axis) if self.has_rotation() => Quat::from_axis_angle(axis, self.rotation_angle),
            _ => Quat::IDENTITY,
        }
    }

    /// Local matrix of this transform
    pub fn matrix(&self) -> Mat4 {
        let mut stack = MatrixStack::new("local", 0);
        self.apply_to(&mut stack);
        stack.current()
    }

    /// Compose onto the current matrix of `stack`, without pushing
    pub fn apply_to(&self, stack: &mut MatrixStack) {
        stack.translate(self.position);
        if self.has_rotation() {
            stack.rotate(self.rotation_axis, self.rotation_angle);
        }
        if self.has_scale() {
            stack.scale(self.scale);
        }
    }

    pub fn translate(&mut self, offset: Vec3) {
        self.position += offset;
    }

    /// Rotate further around `axis`, composing with the current rotation
    pub fn rotate_axis(&mut self, axis: Vec3, angle: f32) {
        let Some(axis) = axis.try_normalize() else {
            return;
        };
        let (axis, angle) = (Quat::from_axis_angle(axis, angle) * self.rotation()).to_axis_angle();
        self.rotation_axis = axis;
        self.rotation_angle = angle;
    }

    /// Local -Z rotated into the parent frame
    pub fn forward(&self) -> Vec3 {
        self.rotation() * -Vec3::Z
    }

    pub fn right(&self) -> Vec3 {
        self.rotation() * Vec3::X
    }

    pub fn up(&self) -> Vec3 {
        self.rotation() * Vec3::Y
    }
}

/// A node that only positions itself. Drawing it moves the model matrix for
/// the duration of its own hooks; it has no geometry.
pub struct TransformNode {
    base: NodeBase,
    transform: Transform,
}

impl TransformNode {
    pub fn new() -> Self {
        Self::with_transform(Transform::default())
    }

    pub fn with_transform(transform: Transform) -> Self {
        Self {
            base: NodeBase::new(),
            transform,
        }
    }
}

impl Default for TransformNode {
    fn default() -> Self {
        Self::new()
    }
}

impl Node for TransformNode {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut NodeBase {
        &mut self.base
    }

    fn transform(&self) -> Option<&Transform> {
        Some(&self.transform)
    }

    fn transform_mut(&mut self) -> Option<&mut Transform> {
        Some(&mut self.transform)
    }

    fn type_name(&self) -> &'static str {
        "TransformNode"
    }

    fn is_drawable(&self) -> bool {
        false
    }
}
