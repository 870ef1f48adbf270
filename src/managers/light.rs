//! Lighting and material state

use crate::backend::GraphicsBackend;
use crate::scene::Light;
use crate::shaders::uniforms;
use glam::Vec4;

/// Everything the light manager snapshots on `save_state`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightState {
    pub lighting_enabled: bool,
    pub use_vertex_color: bool,
    pub use_texture: bool,
    pub diffuse: Vec4,
    pub ambient: Vec4,
    pub specular: Vec4,
    pub emissive: Vec4,
    pub shininess: f32,
    pub alpha: f32,
}

impl Default for LightState {
    fn default() -> Self {
        Self {
            lighting_enabled: true,
            use_vertex_color: false,
            use_texture: false,
            diffuse: Vec4::new(0.8, 0.8, 0.8, 1.0),
            ambient: Vec4::new(0.2, 0.2, 0.2, 1.0),
            specular: Vec4::ZERO,
            emissive: Vec4::ZERO,
            shininess: 32.0,
            alpha: 1.0,
        }
    }
}

/// Current lighting flags, material colors and active lights.
///
/// `save_state`/`restore_state` hold exactly one snapshot: a second save
/// before the matching restore overwrites the first.
pub struct LightManager {
    state: LightState,
    saved: Option<LightState>,
    lights: Vec<Option<Light>>,
    max_lights: usize,
}

impl LightManager {
    pub fn new(max_lights: usize) -> Self {
        Self {
            state: LightState::default(),
            saved: None,
            lights: Vec::new(),
            max_lights,
        }
    }

    pub fn state(&self) -> &LightState {
        &self.state
    }

    pub fn set_state(&mut self, state: LightState) {
        self.state = state;
    }

    pub fn is_lighting_enabled(&self) -> bool {
        self.state.lighting_enabled
    }

    pub fn enable_lighting(&mut self, enabled: bool) {
        self.state.lighting_enabled = enabled;
    }

    pub fn use_vertex_color(&self) -> bool {
        self.state.use_vertex_color
    }

    pub fn set_use_vertex_color(&mut self, enabled: bool) {
        self.state.use_vertex_color = enabled;
    }

    pub fn use_texture(&self) -> bool {
        self.state.use_texture
    }

    pub fn set_use_texture(&mut self, enabled: bool) {
        self.state.use_texture = enabled;
    }

    pub fn set_diffuse(&mut self, color: Vec4) {
        self.state.diffuse = color;
    }

    pub fn set_ambient(&mut self, color: Vec4) {
        self.state.ambient = color;
    }

    pub fn set_specular(&mut self, color: Vec4) {
        self.state.specular = color;
    }

    pub fn set_emissive(&mut self, color: Vec4) {
        self.state.emissive = color;
    }

    pub fn set_shininess(&mut self, shininess: f32) {
        self.state.shininess = shininess;
    }

    pub fn set_alpha(&mut self, alpha: f32) {
        self.state.alpha = alpha;
    }

    /// Put back the material part of `previous` (colors, shininess, alpha
    /// and the vertex-color flag). Lighting and texture flags are left alone.
    pub fn restore_material(&mut self, previous: &LightState) {
        let s = &mut self.state;
        s.use_vertex_color = previous.use_vertex_color;
        s.diffuse = previous.diffuse;
        s.ambient = previous.ambient;
        s.specular = previous.specular;
        s.emissive = previous.emissive;
        s.shininess = previous.shininess;
        s.alpha = previous.alpha;
    }

    pub fn save_state(&mut self) {
        if self.saved.is_some() {
            log::debug!("LightManager: overwriting an unrestored snapshot");
        }
        self.saved = Some(self.state);
    }

    /// Restore the snapshot taken by the last `save_state`. Without a
    /// snapshot this is a no-op.
    pub fn restore_state(&mut self) {
        match self.saved {
            Some(state) => self.state = state,
            None => log::warn!("LightManager: restore_state without save_state"),
        }
    }

    pub fn has_saved_state(&self) -> bool {
        self.saved.is_some()
    }

    pub fn max_lights(&self) -> usize {
        self.max_lights
    }

    /// Append a light in the first free slot. Returns false when full.
    pub fn add_light(&mut self, light: impl Into<Light>) -> bool {
        let light = light.into();
        if let Some(slot) = self.lights.iter_mut().find(|l| l.is_none()) {
            *slot = Some(light);
            return true;
        }
        if self.lights.len() >= self.max_lights {
            return false;
        }
        self.lights.push(Some(light));
        true
    }

    /// Store a light in a fixed slot. Returns false past the light limit.
    pub fn set_light(&mut self, slot: usize, light: Light) -> bool {
        if slot >= self.max_lights {
            return false;
        }
        if self.lights.len() <= slot {
            self.lights.resize(slot + 1, None);
        }
        self.lights[slot] = Some(light);
        true
    }

    pub fn remove_light(&mut self, slot: usize) -> Option<Light> {
        self.lights.get_mut(slot).and_then(Option::take)
    }

    pub fn light(&self, slot: usize) -> Option<&Light> {
        self.lights.get(slot).and_then(Option::as_ref)
    }

    pub fn lights(&self) -> impl Iterator<Item = &Light> {
        self.lights.iter().flatten()
    }

    pub fn light_count(&self) -> usize {
        self.lights().count()
    }

    pub fn clear_lights(&mut self) {
        self.lights.clear();
    }

    /// Upload flags and material colors to the current program
    pub fn apply_material(&self, backend: &mut dyn GraphicsBackend) {
        let s = &self.state;
        backend.set_uniform(uniforms::LIGHTING_ENABLED, s.lighting_enabled.into());
        backend.set_uniform(uniforms::USE_VERTEX_COLOR, s.use_vertex_color.into());
        backend.set_uniform(uniforms::USE_TEXTURE, s.use_texture.into());
        backend.set_uniform(uniforms::DIFFUSE_COLOR, s.diffuse.into());
        backend.set_uniform(uniforms::AMBIENT_COLOR, s.ambient.into());
        backend.set_uniform(uniforms::SPECULAR_COLOR, s.specular.into());
        backend.set_uniform(uniforms::EMISSIVE_COLOR, s.emissive.into());
        backend.set_uniform(uniforms::SHININESS, s.shininess.into());
        backend.set_uniform(uniforms::ALPHA, s.alpha.into());
    }

    /// Upload the active lights as packed uniform arrays
    pub fn apply_lights(&self, backend: &mut dyn GraphicsBackend) {
        let mut count = 0u32;
        for (index, light) in self.lights().enumerate() {
            let data = light.to_gpu_data();
            backend.set_uniform(&uniforms::indexed(uniforms::LIGHT_POSITION, index), data.position.into());
            backend.set_uniform(&uniforms::indexed(uniforms::LIGHT_COLOR, index), data.color_intensity.into());
            backend.set_uniform(&uniforms::indexed(uniforms::LIGHT_DIRECTION, index), data.direction_type.into());
            backend.set_uniform(&uniforms::indexed(uniforms::LIGHT_PARAMS, index), data.spot_params.into());
            count += 1;
        }
        backend.set_uniform(uniforms::LIGHT_COUNT, count.into());
    }

    pub fn apply(&self, backend: &mut dyn GraphicsBackend) {
        self.apply_material(backend);
        self.apply_lights(backend);
    }
}

impl Default for LightManager {
    fn default() -> Self {
        Self::new(8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{GraphicsBackend, HeadlessBackend, ProgramDescriptor, UniformValue};
    use crate::scene::{DirectionalLight, PointLight};
    use glam::Vec3;

    #[test]
    fn test_save_mutate_restore_round_trip() {
        let mut manager = LightManager::default();
        manager.set_diffuse(Vec4::new(1.0, 0.0, 0.0, 1.0));
        let before = *manager.state();

        manager.save_state();
        manager.enable_lighting(false);
        manager.set_use_texture(true);
        manager.set_diffuse(Vec4::ONE);
        manager.set_shininess(2.0);
        manager.restore_state();

        assert_eq!(*manager.state(), before);
    }

    #[test]
    fn test_single_slot_loses_outer_snapshot() {
        let mut manager = LightManager::default();
        manager.save_state();
        manager.enable_lighting(false);
        manager.save_state();
        manager.enable_lighting(true);
        manager.restore_state();
        // the inner snapshot (lighting off) won
        assert!(!manager.is_lighting_enabled());
    }

    #[test]
    fn test_restore_without_save_is_noop() {
        let mut manager = LightManager::default();
        manager.enable_lighting(false);
        manager.restore_state();
        assert!(!manager.is_lighting_enabled());
        assert!(!manager.has_saved_state());
    }

    #[test]
    fn test_restore_material_keeps_flags_and_slot() {
        let mut manager = LightManager::default();
        let before = *manager.state();
        manager.save_state();

        manager.set_diffuse(Vec4::new(1.0, 0.0, 0.0, 1.0));
        manager.set_shininess(4.0);
        manager.enable_lighting(false);
        manager.restore_material(&before);

        assert_eq!(manager.state().diffuse, before.diffuse);
        assert_eq!(manager.state().shininess, before.shininess);
        assert!(!manager.is_lighting_enabled());
        assert!(manager.has_saved_state());
    }

    #[test]
    fn test_light_limit() {
        let mut manager = LightManager::new(2);
        assert!(manager.add_light(PointLight::default()));
        assert!(manager.add_light(DirectionalLight::default()));
        assert!(!manager.add_light(PointLight::default()));
        assert!(!manager.set_light(2, PointLight::default().into()));

        manager.remove_light(0);
        assert_eq!(manager.light_count(), 1);
        assert!(manager.add_light(PointLight::default()));
    }

    #[test]
    fn test_apply_writes_uniforms() {
        let mut backend = HeadlessBackend::default();
        let program = backend
            .create_program(&ProgramDescriptor {
                name: "basic".into(),
                vertex_source: crate::shaders::DEFAULT_PROGRAM.into(),
                fragment_source: None,
            })
            .unwrap();
        backend.use_program(program);

        let mut manager = LightManager::default();
        manager.enable_lighting(false);
        manager.add_light(PointLight::new(Vec3::new(1.0, 2.0, 3.0), Vec3::ONE, 1.0, 4.0));
        manager.apply(&mut backend);

        assert_eq!(
            backend.current_uniform(uniforms::LIGHTING_ENABLED),
            Some(UniformValue::Bool(false))
        );
        assert_eq!(
            backend.current_uniform(uniforms::LIGHT_COUNT),
            Some(UniformValue::UInt(1))
        );
        assert_eq!(
            backend.current_uniform("lightPosition[0]"),
            Some(UniformValue::Vec4(Vec4::new(1.0, 2.0, 3.0, 4.0)))
        );
    }
}
