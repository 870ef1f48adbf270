//! Phong material definitions

use crate::managers::LightManager;
use glam::{Vec3, Vec4};

/// Phong surface description applied through the light manager
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: String,
    pub diffuse: Vec4,
    pub ambient: Vec4,
    pub specular: Vec4,
    pub emissive: Vec4,
    pub shininess: f32,
    pub alpha: f32,
    /// Take the base color from per-vertex colors instead of `diffuse`
    pub use_vertex_color: bool,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            diffuse: Vec4::new(0.8, 0.8, 0.8, 1.0),
            ambient: Vec4::new(0.2, 0.2, 0.2, 1.0),
            specular: Vec4::ZERO,
            emissive: Vec4::ZERO,
            shininess: 32.0,
            alpha: 1.0,
            use_vertex_color: false,
        }
    }
}

impl Material {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_diffuse(mut self, color: Vec4) -> Self {
        self.diffuse = color;
        self
    }

    pub fn with_ambient(mut self, color: Vec4) -> Self {
        self.ambient = color;
        self
    }

    pub fn with_specular(mut self, color: Vec4, shininess: f32) -> Self {
        self.specular = color;
        self.shininess = shininess;
        self
    }

    pub fn with_emissive(mut self, color: Vec3) -> Self {
        self.emissive = color.extend(1.0);
        self
    }

    pub fn with_alpha(mut self, alpha: f32) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_vertex_color(mut self, enabled: bool) -> Self {
        self.use_vertex_color = enabled;
        self
    }

    /// Make this the current material of the light manager. Lighting and
    /// texture flags are left alone.
    pub fn apply(&self, light: &mut LightManager) {
        light.set_diffuse(self.diffuse);
        light.set_ambient(self.ambient);
        light.set_specular(self.specular);
        light.set_emissive(self.emissive);
        light.set_shininess(self.shininess);
        light.set_alpha(self.alpha);
        light.set_use_vertex_color(self.use_vertex_color);
    }

    // Preset materials

    pub fn plastic(color: Vec3) -> Self {
        Self::new("plastic")
            .with_diffuse(color.extend(1.0))
            .with_specular(Vec4::splat(0.5), 32.0)
    }

    pub fn metal(color: Vec3, shininess: f32) -> Self {
        Self::new("metal")
            .with_diffuse(color.extend(1.0) * 0.6)
            .with_specular(color.extend(1.0), shininess)
    }

    pub fn gold() -> Self {
        Self::metal(Vec3::new(1.0, 0.766, 0.336), 51.2)
    }

    pub fn silver() -> Self {
        Self::metal(Vec3::new(0.972, 0.960, 0.915), 89.6)
    }

    pub fn copper() -> Self {
        Self::metal(Vec3::new(0.955, 0.637, 0.538), 12.8)
    }

    pub fn rubber(color: Vec3) -> Self {
        Self::new("rubber")
            .with_diffuse(color.extend(1.0))
            .with_specular(Vec4::splat(0.05), 10.0)
    }

    pub fn glass() -> Self {
        Self::new("glass")
            .with_diffuse(Vec4::new(1.0, 1.0, 1.0, 1.0))
            .with_specular(Vec4::ONE, 96.0)
            .with_alpha(0.3)
    }

    pub fn emissive(color: Vec3) -> Self {
        Self::new("emissive").with_emissive(color)
    }

    /// Per-vertex colors, no specular
    pub fn vertex_colored() -> Self {
        Self::new("vertex_colored").with_vertex_color(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_keeps_lighting_flags() {
        let mut light = LightManager::default();
        light.enable_lighting(false);
        light.set_use_texture(true);

        Material::gold().apply(&mut light);

        assert!(!light.is_lighting_enabled());
        assert!(light.use_texture());
        assert_eq!(light.state().shininess, 51.2);
        assert_eq!(light.state().specular, Vec4::new(1.0, 0.766, 0.336, 1.0));
    }
}
