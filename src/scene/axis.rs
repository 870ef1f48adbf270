//! Colored coordinate axes

use super::{Mesh, MeshVertex, Node, NodeBase, Transform};
use crate::backend::PrimitiveTopology;
use crate::bounding_box::BoundingBox;
use crate::context::RenderContext;
use crate::error::SceneResult;
use glam::{Vec2, Vec3, Vec4};

/// X, Y and Z axes drawn as red, green and blue lines from the origin.
///
/// Lines are unlit: lighting is switched off around the draw through the
/// light manager's save/restore slot, so the parent's lighting state is back
/// in place for the next sibling.
pub struct Axis {
    base: NodeBase,
    transform: Transform,
    mesh: Mesh,
}

impl Axis {
    pub fn new(length: f32) -> Self {
        let mut mesh = Mesh::new("axis", PrimitiveTopology::LineList);
        let mut colors = Vec::with_capacity(6);
        for (index, direction) in [Vec3::X, Vec3::Y, Vec3::Z].into_iter().enumerate() {
            mesh.push_vertex(MeshVertex::new(Vec3::ZERO, direction, Vec2::ZERO));
            mesh.push_vertex(MeshVertex::new(direction * length, direction, Vec2::ONE));
            let first = index as u32 * 2;
            mesh.push_indices(&[first, first + 1]);
            colors.extend([Self::line_color(index); 2]);
        }
        mesh.set_colors(&colors);

        let mut base = NodeBase::new();
        base.set_name("axis");
        Self {
            base,
            transform: Transform::default(),
            mesh,
        }
    }

    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    pub fn line_color(axis: usize) -> Vec4 {
        match axis {
            0 => Vec4::new(1.0, 0.0, 0.0, 1.0),
            1 => Vec4::new(0.0, 1.0, 0.0, 1.0),
            _ => Vec4::new(0.0, 0.0, 1.0, 1.0),
        }
    }
}

impl Default for Axis {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl Node for Axis {
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

    fn local_extent(&self) -> BoundingBox {
        self.mesh.bounding_box()
    }

    fn type_name(&self) -> &'static str {
        "Axis"
    }

    fn do_setup(&mut self, ctx: &mut RenderContext) -> SceneResult<()> {
        if self.mesh.is_uploaded() {
            return Ok(());
        }
        self.mesh.set_release_queue(ctx.release_queue());
        self.mesh.upload(ctx.backend.as_mut(), ctx.mesh.usage_hint())
    }

    fn do_draw(&mut self, ctx: &mut RenderContext) -> SceneResult<()> {
        if !self.mesh.is_uploaded() {
            self.do_setup(ctx)?;
        }

        ctx.light.save_state();
        ctx.light.enable_lighting(false);
        ctx.light.set_use_vertex_color(true);
        ctx.light.apply_material(ctx.backend.as_mut());

        self.mesh.draw(ctx.backend.as_mut());

        ctx.light.restore_state();
        ctx.light.apply_material(ctx.backend.as_mut());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HeadlessBackend;
    use crate::scene::node_ref;
    use crate::RenderConfig;

    #[test]
    fn test_axis_geometry() {
        let axis = Axis::new(2.0);
        assert_eq!(axis.mesh().vertex_count(), 6);
        assert_eq!(axis.mesh().index_count(), 6);
        assert_eq!(axis.local_extent().max(), Some(Vec3::splat(2.0)));
        let colors = axis.mesh().colors().unwrap();
        assert_eq!(colors.row(2), Some(&Axis::line_color(1).to_array()[..]));
    }

    #[test]
    fn test_axis_draws_unlit_and_restores_lighting() {
        let mut ctx = RenderContext::headless(&RenderConfig::default()).unwrap();
        let node = node_ref(Axis::default());
        node.borrow_mut().draw(&mut ctx).unwrap();

        assert!(ctx.light.is_lighting_enabled());
        assert!(!ctx.light.use_vertex_color());
        let headless = ctx.backend_as::<HeadlessBackend>().unwrap();
        assert_eq!(headless.draws().len(), 1);
        assert!(!headless.draws()[0].lighting_enabled);
        assert_eq!(headless.draws()[0].topology, PrimitiveTopology::LineList);
    }
}
