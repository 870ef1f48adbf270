//! Object-id picking through an offscreen framebuffer

use crate::backend::FramebufferHandle;
use crate::context::RenderContext;
use crate::error::{SceneError, SceneResult};
use crate::scene::visitor::MapVisitor;
use crate::scene::{enumerate_ids, NodeRef};
use crate::shaders::SELECTION_PROGRAM_NAME;
use std::collections::HashMap;

/// Renders a hierarchy with each node's picking id as its color and reads
/// ids back per pixel.
///
/// Ids follow enumeration order, so [`BufferSelection::rebuild`] must run
/// after nodes are added, removed or hidden. Pixel coordinates have their
/// origin at the top-left corner.
pub struct BufferSelection {
    root: NodeRef,
    framebuffer: Option<FramebufferHandle>,
    width: u32,
    height: u32,
    ids: HashMap<u32, NodeRef>,
}

impl BufferSelection {
    pub fn new(root: NodeRef) -> Self {
        Self {
            root,
            framebuffer: None,
            width: 0,
            height: 0,
            ids: HashMap::new(),
        }
    }

    pub fn root(&self) -> &NodeRef {
        &self.root
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn is_initialized(&self) -> bool {
        self.framebuffer.is_some()
    }

    /// Create the id framebuffer and enumerate the hierarchy
    pub fn initialize(&mut self, ctx: &mut RenderContext, width: u32, height: u32) -> SceneResult<()> {
        self.release(ctx);
        self.framebuffer = Some(ctx.backend.create_framebuffer(width.max(1), height.max(1))?);
        self.width = width.max(1);
        self.height = height.max(1);
        log::debug!("BufferSelection: {}x{} id buffer", self.width, self.height);
        self.rebuild();
        Ok(())
    }

    /// Recreate the framebuffer at a new size and re-enumerate
    pub fn resize(&mut self, ctx: &mut RenderContext, width: u32, height: u32) -> SceneResult<()> {
        if self.is_initialized() && (width.max(1), height.max(1)) == (self.width, self.height) {
            self.rebuild();
            return Ok(());
        }
        self.initialize(ctx, width, height)
    }

    /// Re-assign ids and rebuild the id lookup
    pub fn rebuild(&mut self) {
        let next = enumerate_ids(&self.root, 1);
        let mut visitor = MapVisitor::build(&self.root);
        if visitor.collisions() > 0 {
            log::warn!("BufferSelection: {} id collisions", visitor.collisions());
        }
        self.ids = visitor.take_map();
        log::debug!("BufferSelection: {} pickable nodes, next id {}", self.ids.len(), next);
    }

    /// Draw the hierarchy into the id framebuffer. The current program,
    /// the selection state and the previously bound target are restored
    /// afterwards.
    pub fn render(&mut self, ctx: &mut RenderContext) -> SceneResult<()> {
        let framebuffer = self.framebuffer.ok_or(SceneError::SelectionNotInitialized)?;
        let previous = ctx.shader.current_name().map(str::to_string);
        let previous_target = ctx.backend.bound_framebuffer();

        ctx.selection.save_state();
        ctx.selection.set_selection_rendering(true);
        ctx.backend.bind_framebuffer(Some(framebuffer));
        ctx.backend.clear([0.0; 4], 1.0);

        let mut result = ctx.use_program(SELECTION_PROGRAM_NAME);
        if result.is_ok() {
            result = self.root.borrow_mut().draw(ctx);
        }

        ctx.backend.bind_framebuffer(previous_target);
        ctx.selection.restore_state();
        ctx.selection.apply(ctx.backend.as_mut());
        if let Some(name) = previous {
            let restored = ctx.use_program(&name);
            result = result.and(restored);
        }
        result
    }

    /// Id under a pixel of the last [`BufferSelection::render`]; 0 for
    /// background and for pixels outside the buffer.
    pub fn id_at_pixel(&self, ctx: &mut RenderContext, x: u32, y: u32) -> SceneResult<u32> {
        let framebuffer = self.framebuffer.ok_or(SceneError::SelectionNotInitialized)?;
        if x >= self.width || y >= self.height {
            return Ok(0);
        }
        Ok(ctx.backend.read_pixel_id(framebuffer, x, y)?)
    }

    pub fn node_from_id(&self, id: u32) -> Option<NodeRef> {
        self.ids.get(&id).cloned()
    }

    /// Render the id buffer and resolve the node under a pixel
    pub fn node_at_pixel(&mut self, ctx: &mut RenderContext, x: u32, y: u32) -> SceneResult<Option<NodeRef>> {
        self.render(ctx)?;
        let id = self.id_at_pixel(ctx, x, y)?;
        Ok(self.node_from_id(id))
    }

    pub fn release(&mut self, ctx: &mut RenderContext) {
        if let Some(framebuffer) = self.framebuffer.take() {
            ctx.backend.destroy_framebuffer(framebuffer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HeadlessBackend;
    use crate::scene::{node_ref, same_node, CompositeNode, MeshNode, MeshVertex, VecGeometry};
    use crate::shaders::DEFAULT_PROGRAM_NAME;
    use crate::RenderConfig;
    use glam::{Vec2, Vec3};

    /// Quad covering the x range [x0, x1] of clip space
    fn strip(x0: f32, x1: f32) -> NodeRef {
        let v = |x: f32, y: f32| MeshVertex::new(Vec3::new(x, y, 0.0), Vec3::Z, Vec2::ZERO);
        let geometry = VecGeometry::new(
            vec![v(x0, -1.0), v(x1, -1.0), v(x1, 1.0), v(x0, 1.0)],
            vec![[0, 1, 2], [0, 2, 3]],
        );
        node_ref(MeshNode::from_source("strip", geometry))
    }

    #[test]
    fn test_requires_initialize() {
        let mut ctx = RenderContext::headless(&RenderConfig::default()).unwrap();
        let mut selection = BufferSelection::new(node_ref(CompositeNode::new()));
        assert!(matches!(
            selection.render(&mut ctx),
            Err(SceneError::SelectionNotInitialized)
        ));
    }

    #[test]
    fn test_pick_left_and_right() {
        let mut ctx = RenderContext::headless(&RenderConfig::default()).unwrap();
        let left = strip(-1.0, 0.0);
        let right = strip(0.0, 1.0);
        let mut root = CompositeNode::new();
        root.add(left.clone());
        root.add(right.clone());

        let mut selection = BufferSelection::new(node_ref(root));
        selection.initialize(&mut ctx, 8, 8).unwrap();

        let picked = selection.node_at_pixel(&mut ctx, 1, 4).unwrap().unwrap();
        assert!(same_node(&picked, &left));
        let picked = selection.node_at_pixel(&mut ctx, 6, 4).unwrap().unwrap();
        assert!(same_node(&picked, &right));

        assert_eq!(selection.id_at_pixel(&mut ctx, 100, 100).unwrap(), 0);
        assert_eq!(ctx.shader.current_name(), Some(DEFAULT_PROGRAM_NAME));
        assert!(!ctx.selection.is_selection_rendering());
        assert_eq!(ctx.backend.bound_framebuffer(), None);
    }

    #[test]
    fn test_render_keeps_offscreen_target() {
        let mut ctx = RenderContext::headless(&RenderConfig::default()).unwrap();
        let offscreen = ctx.backend.create_framebuffer(8, 8).unwrap();
        ctx.backend.bind_framebuffer(Some(offscreen));

        let mut selection = BufferSelection::new(strip(-1.0, 1.0));
        selection.initialize(&mut ctx, 8, 8).unwrap();
        selection.render(&mut ctx).unwrap();

        assert_eq!(ctx.backend.bound_framebuffer(), Some(offscreen));
    }

    #[test]
    fn test_rebuild_after_hide() {
        let mut ctx = RenderContext::headless(&RenderConfig::default()).unwrap();
        let only = strip(-1.0, 1.0);
        let mut root = CompositeNode::new();
        root.add(only.clone());
        let mut selection = BufferSelection::new(node_ref(root));
        selection.initialize(&mut ctx, 4, 4).unwrap();
        assert!(selection.node_from_id(1).is_some());

        only.borrow_mut().base_mut().set_visible(false);
        selection.rebuild();
        assert!(selection.node_from_id(1).is_none());
        assert!(selection.node_at_pixel(&mut ctx, 2, 2).unwrap().is_none());
    }

    #[test]
    fn test_resize_replaces_framebuffer() {
        let mut ctx = RenderContext::headless(&RenderConfig::default()).unwrap();
        let mut selection = BufferSelection::new(node_ref(CompositeNode::new()));
        selection.initialize(&mut ctx, 4, 4).unwrap();
        selection.resize(&mut ctx, 16, 8).unwrap();
        assert_eq!(selection.size(), (16, 8));
        assert_eq!(ctx.backend_as::<HeadlessBackend>().unwrap().live_framebuffers(), 1);
        selection.release(&mut ctx);
        assert_eq!(ctx.backend_as::<HeadlessBackend>().unwrap().live_framebuffers(), 0);
    }
}
