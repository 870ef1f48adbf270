//! Light types for the scene

use super::{Node, NodeBase, Transform};
use crate::context::RenderContext;
use crate::error::SceneResult;
use glam::{Vec3, Vec4};

/// Omnidirectional light with linear falloff to zero at `radius`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointLight {
    pub position: Vec3,
    pub color: Vec3,
    pub intensity: f32,
    pub radius: f32,
}

impl Default for PointLight {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            color: Vec3::ONE,
            intensity: 1.0,
            radius: 10.0,
        }
    }
}

impl PointLight {
    pub fn new(position: Vec3, color: Vec3, intensity: f32, radius: f32) -> Self {
        Self {
            position,
            color,
            intensity,
            radius,
        }
    }
}

/// Cone light
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpotLight {
    pub position: Vec3,
    pub direction: Vec3,
    pub color: Vec3,
    pub intensity: f32,
    pub radius: f32,
    pub inner_angle: f32, // radians
    pub outer_angle: f32, // radians
}

impl Default for SpotLight {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            direction: -Vec3::Y,
            color: Vec3::ONE,
            intensity: 1.0,
            radius: 10.0,
            inner_angle: 0.3,
            outer_angle: 0.5,
        }
    }
}

impl SpotLight {
    pub fn new(
        position: Vec3,
        direction: Vec3,
        color: Vec3,
        intensity: f32,
        radius: f32,
        inner_angle: f32,
        outer_angle: f32,
    ) -> Self {
        Self {
            position,
            direction: direction.normalize_or_zero(),
            color,
            intensity,
            radius,
            inner_angle,
            outer_angle,
        }
    }
}

/// Directional light (like the sun)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLight {
    pub direction: Vec3,
    pub color: Vec3,
    pub intensity: f32,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            direction: Vec3::new(-0.5, -1.0, -0.5).normalize(),
            color: Vec3::ONE,
            intensity: 1.0,
        }
    }
}

impl DirectionalLight {
    pub fn new(direction: Vec3, color: Vec3, intensity: f32) -> Self {
        Self {
            direction: direction.normalize_or_zero(),
            color,
            intensity,
        }
    }
}

/// Any light the light manager can hold
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Light {
    Point(PointLight),
    Spot(SpotLight),
    Directional(DirectionalLight),
}

impl Light {
    /// Pack into the four vectors of one entry of the light uniform arrays
    pub fn to_gpu_data(&self) -> GpuLightData {
        match self {
            Light::Point(l) => GpuLightData {
                position: l.position.extend(l.radius),
                color_intensity: l.color.extend(l.intensity),
                direction_type: Vec4::ZERO, // type 0 = point
                spot_params: Vec4::ZERO,
            },
            Light::Spot(l) => GpuLightData {
                position: l.position.extend(l.radius),
                color_intensity: l.color.extend(l.intensity),
                direction_type: l.direction.extend(1.0), // type 1 = spot
                spot_params: Vec4::new(l.inner_angle.cos(), l.outer_angle.cos(), 0.0, 0.0),
            },
            Light::Directional(l) => GpuLightData {
                position: Vec4::new(0.0, 0.0, 0.0, f32::MAX),
                color_intensity: l.color.extend(l.intensity),
                direction_type: l.direction.extend(2.0), // type 2 = directional
                spot_params: Vec4::ZERO,
            },
        }
    }

    /// Same light moved to a world-space placement. Directional lights ignore
    /// the position.
    pub fn placed(&self, position: Vec3, direction: Vec3) -> Light {
        match *self {
            Light::Point(l) => Light::Point(PointLight { position, ..l }),
            Light::Spot(l) => Light::Spot(SpotLight {
                position,
                direction: direction.normalize_or_zero(),
                ..l
            }),
            Light::Directional(l) => Light::Directional(DirectionalLight {
                direction: direction.normalize_or_zero(),
                ..l
            }),
        }
    }

    /// Local direction, `None` for point lights
    pub fn direction(&self) -> Option<Vec3> {
        match self {
            Light::Point(_) => None,
            Light::Spot(l) => Some(l.direction),
            Light::Directional(l) => Some(l.direction),
        }
    }
}

impl From<PointLight> for Light {
    fn from(light: PointLight) -> Self {
        Light::Point(light)
    }
}

impl From<SpotLight> for Light {
    fn from(light: SpotLight) -> Self {
        Light::Spot(light)
    }
}

impl From<DirectionalLight> for Light {
    fn from(light: DirectionalLight) -> Self {
        Light::Directional(light)
    }
}

/// Light data as written to the shader's light arrays
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpuLightData {
    /// xyz = position, w = radius
    pub position: Vec4,
    /// xyz = color, w = intensity
    pub color_intensity: Vec4,
    /// xyz = direction, w = light type (0=point, 1=spot, 2=directional)
    pub direction_type: Vec4,
    /// x = cos(inner_angle), y = cos(outer_angle), zw = unused
    pub spot_params: Vec4,
}

/// Places a light in the scene graph.
///
/// When drawn, the light is moved to the node's world position (and its
/// direction rotated into world space) and stored in the light manager
/// slot `slot`, so every node drawn after it is lit by it.
///
/// The slot stays filled between frames. Hiding the node empties it on the
/// next draw; a node taken out of the graph must be [`LightNode::detach`]ed.
pub struct LightNode {
    base: NodeBase,
    transform: Transform,
    light: Light,
    slot: usize,
}

impl LightNode {
    pub fn new(light: impl Into<Light>, slot: usize) -> Self {
        Self {
            base: NodeBase::new(),
            transform: Transform::default(),
            light: light.into(),
            slot,
        }
    }

    pub fn light(&self) -> &Light {
        &self.light
    }

    pub fn set_light(&mut self, light: impl Into<Light>) {
        self.light = light.into();
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Empty this node's light slot
    pub fn detach(&self, ctx: &mut RenderContext) {
        if ctx.light.remove_light(self.slot).is_some() {
            log::debug!("LightNode: slot {} cleared", self.slot);
            ctx.light.apply_lights(ctx.backend.as_mut());
        }
    }
}

impl Node for LightNode {
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
        "LightNode"
    }

    fn is_drawable(&self) -> bool {
        false
    }

    fn do_pre_draw(&mut self, ctx: &mut RenderContext) -> SceneResult<()> {
        if !self.base.is_visible() {
            self.detach(ctx);
        }
        Ok(())
    }

    fn do_draw(&mut self, ctx: &mut RenderContext) -> SceneResult<()> {
        let model = ctx.transform.model_matrix();
        let position = model.transform_point3(Vec3::ZERO);
        let direction = self
            .light
            .direction()
            .map(|d| model.transform_vector3(d))
            .unwrap_or(Vec3::ZERO);
        let placed = self.light.placed(position, direction);

        if ctx.light.set_light(self.slot, placed) {
            ctx.light.apply_lights(ctx.backend.as_mut());
        } else {
            log::warn!(
                "LightNode: slot {} exceeds the light limit of {}",
                self.slot,
                ctx.light.max_lights()
            );
        }
        Ok(())
    }
}
