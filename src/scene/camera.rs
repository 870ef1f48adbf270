//! Camera

use crate::managers::TransformManager;
use glam::{Mat4, Vec3};

/// Camera projection type
#[derive(Debug, Clone, Copy)]
pub enum Projection {
    Perspective {
        fov_y: f32,
        aspect: f32,
        near: f32,
        far: f32,
    },
    Orthographic {
        left: f32,
        right: f32,
        bottom: f32,
        top: f32,
        near: f32,
        far: f32,
    },
}

impl Default for Projection {
    fn default() -> Self {
        Projection::Perspective {
            fov_y: std::f32::consts::FRAC_PI_4,
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 1000.0,
        }
    }
}

impl Projection {
    pub fn perspective(fov_y_degrees: f32, aspect: f32, near: f32, far: f32) -> Self {
        Projection::Perspective {
            fov_y: fov_y_degrees.to_radians(),
            aspect,
            near,
            far,
        }
    }

    pub fn orthographic(width: f32, height: f32, near: f32, far: f32) -> Self {
        let (half_w, half_h) = (width / 2.0, height / 2.0);
        Projection::Orthographic {
            left: -half_w,
            right: half_w,
            bottom: -half_h,
            top: half_h,
            near,
            far,
        }
    }

    pub fn matrix(&self) -> Mat4 {
        match *self {
            Projection::Perspective {
                fov_y,
                aspect,
                near,
                far,
            } => Mat4::perspective_rh(fov_y, aspect, near, far),
            Projection::Orthographic {
                left,
                right,
                bottom,
                top,
                near,
                far,
            } => Mat4::orthographic_rh(left, right, bottom, top, near, far),
        }
    }

    pub fn set_aspect(&mut self, aspect: f32) {
        match self {
            Projection::Perspective { aspect: a, .. } => *a = aspect,
            // keep the height, stretch the width
            Projection::Orthographic {
                left, right, bottom, top, ..
            } => {
                let half_w = (*top - *bottom) * 0.5 * aspect;
                let center = (*left + *right) * 0.5;
                *left = center - half_w;
                *right = center + half_w;
            }
        }
    }
}

/// Look-at camera feeding the view and projection matrices of a
/// [`TransformManager`]
#[derive(Debug, Clone)]
pub struct Camera {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    pub projection: Projection,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 2.0, 5.0),
            target: Vec3::ZERO,
            up: Vec3::Y,
            projection: Projection::default(),
        }
    }
}

impl Camera {
    pub fn new(position: Vec3, target: Vec3) -> Self {
        Self {
            position,
            target,
            ..Default::default()
        }
    }

    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = projection;
        self
    }

    pub fn look_at(&mut self, target: Vec3) {
        self.target = target;
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        self.projection.matrix()
    }

    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    pub fn forward(&self) -> Vec3 {
        (self.target - self.position).normalize_or_zero()
    }

    pub fn right(&self) -> Vec3 {
        self.forward().cross(self.up).normalize_or_zero()
    }

    /// Orbit around the target by yaw (around `up`) and pitch (around
    /// `right`), in radians. Pitch stops short of the poles.
    pub fn orbit(&mut self, yaw: f32, pitch: f32) {
        let offset = self.position - self.target;
        let distance = offset.length();
        if distance == 0.0 {
            return;
        }
        let current_pitch = (offset.dot(self.up) / distance).clamp(-1.0, 1.0).asin();
        let limit = std::f32::consts::FRAC_PI_2 - 0.01;
        let pitch = (current_pitch + pitch).clamp(-limit, limit) - current_pitch;

        let rotation = glam::Quat::from_axis_angle(self.up, yaw) * glam::Quat::from_axis_angle(self.right(), -pitch);
        self.position = self.target + rotation * offset;
    }

    /// Move toward the target by `factor` of the current distance
    pub fn zoom(&mut self, factor: f32) {
        let offset = self.position - self.target;
        self.position = self.target + offset * (1.0 - factor).max(0.01);
    }

    pub fn set_aspect(&mut self, width: f32, height: f32) {
        if height > 0.0 {
            self.projection.set_aspect(width / height);
        }
    }

    /// Load view and projection into the transform manager
    pub fn apply(&self, transform: &mut TransformManager) {
        transform.set_view(self.view_matrix());
        transform.set_projection(self.projection_matrix());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_loads_matrices() {
        let camera = Camera::new(Vec3::new(0.0, 0.0, 3.0), Vec3::ZERO);
        let mut transform = TransformManager::default();
        camera.apply(&mut transform);
        assert_eq!(transform.view(), camera.view_matrix());
        assert_eq!(transform.projection(), camera.projection_matrix());
    }

    #[test]
    fn test_orbit_keeps_distance() {
        let mut camera = Camera::new(Vec3::new(0.0, 0.0, 4.0), Vec3::ZERO);
        camera.orbit(0.7, 0.3);
        assert!((camera.position.length() - 4.0).abs() < 1e-4);
    }

    #[test]
    fn test_zoom() {
        let mut camera = Camera::new(Vec3::new(0.0, 0.0, 4.0), Vec3::ZERO);
        camera.zoom(0.5);
        assert!(camera.position.abs_diff_eq(Vec3::new(0.0, 0.0, 2.0), 1e-6));
    }
}
