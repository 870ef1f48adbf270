//! Scene graph nodes and traversal
//!
//! Every node implements [`Node`] and is shared as a [`NodeRef`], so one
//! node can sit under several composites (instancing). Drawing always goes
//! through the fixed template on `dyn Node`: base pre-draw (selection id,
//! material, texture), transform push, the node's own hooks, transform pop,
//! base post-draw. Only the hooks are overridable.

mod axis;
mod camera;
mod composite;
mod light;
mod mesh_node;
mod primitives;
mod transform;
pub mod visitor;

pub use axis::*;
pub use camera::*;
pub use composite::*;
pub use light::*;
pub use mesh_node::*;
pub use primitives::*;
pub use transform::*;

use crate::backend::TextureHandle;
use crate::base::{GlBase, ObjectIdentity};
use crate::bounding_box::BoundingBox;
use crate::context::RenderContext;
use crate::error::SceneResult;
use crate::managers::LightState;
use crate::resources::{Material, Texture};
use std::any::Any;
use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

/// Shared, single-threaded handle to a node
pub type NodeRef = Rc<RefCell<dyn Node>>;

/// Wrap a node into a [`NodeRef`]
pub fn node_ref<N: Node>(node: N) -> NodeRef {
    Rc::new(RefCell::new(node))
}

/// Whether two handles point at the same node
pub fn same_node(a: &NodeRef, b: &NodeRef) -> bool {
    node_addr(a) == node_addr(b)
}

fn node_addr(node: &NodeRef) -> *const () {
    Rc::as_ptr(node) as *const ()
}

/// Downcasting support for nodes
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// State every node carries: name, visibility, material and texture slots
/// and the picking id.
pub struct NodeBase {
    identity: ObjectIdentity,
    name: String,
    pub visible: bool,
    pub use_material: bool,
    pub use_texture: bool,
    material: Option<Rc<Material>>,
    texture: Option<Rc<RefCell<Texture>>>,
    object_id: u32,
}

impl NodeBase {
    pub fn new() -> Self {
        Self {
            identity: ObjectIdentity::next(),
            name: String::new(),
            visible: true,
            use_material: true,
            use_texture: true,
            material: None,
            texture: None,
            object_id: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub fn material(&self) -> Option<&Rc<Material>> {
        self.material.as_ref()
    }

    pub fn set_material(&mut self, material: Option<Rc<Material>>) {
        self.material = material;
    }

    pub fn texture(&self) -> Option<&Rc<RefCell<Texture>>> {
        self.texture.as_ref()
    }

    pub fn set_texture(&mut self, texture: Option<Rc<RefCell<Texture>>>) {
        self.texture = texture;
    }

    /// Picking id; 0 means "no object"
    pub fn object_id(&self) -> u32 {
        self.object_id
    }

    pub fn set_object_id(&mut self, id: u32) {
        self.object_id = id;
    }
}

impl Default for NodeBase {
    fn default() -> Self {
        Self::new()
    }
}

impl GlBase for NodeBase {
    fn identity(&self) -> ObjectIdentity {
        self.identity
    }
}

/// A drawable unit of the scene graph.
///
/// Capabilities are optional: a node with a [`Transform`] moves the model
/// matrix around its hooks, a node with children is traversed by visitors
/// and id enumeration. Drawing is done with [`draw`] or `<dyn Node>::draw`.
pub trait Node: AsAny {
    fn base(&self) -> &NodeBase;
    fn base_mut(&mut self) -> &mut NodeBase;

    fn transform(&self) -> Option<&Transform> {
        None
    }

    fn transform_mut(&mut self) -> Option<&mut Transform> {
        None
    }

    fn children(&self) -> Option<&[NodeRef]> {
        None
    }

    /// Whether the whole subtree shares this node's picking id
    fn single_object_id(&self) -> bool {
        false
    }

    /// Whether the node produces geometry and so takes its own picking id
    fn is_drawable(&self) -> bool {
        true
    }

    /// Extent of the node's own geometry in local coordinates
    fn local_extent(&self) -> BoundingBox {
        BoundingBox::new()
    }

    fn type_name(&self) -> &'static str;

    /// Build GPU resources. Called once through [`setup`], and again by
    /// nodes whose data changes.
    fn do_setup(&mut self, _ctx: &mut RenderContext) -> SceneResult<()> {
        Ok(())
    }

    fn do_pre_draw(&mut self, _ctx: &mut RenderContext) -> SceneResult<()> {
        Ok(())
    }

    fn do_draw(&mut self, _ctx: &mut RenderContext) -> SceneResult<()> {
        Ok(())
    }

    fn do_post_draw(&mut self, _ctx: &mut RenderContext) -> SceneResult<()> {
        Ok(())
    }
}

/// What the base pre-draw changed and the post-draw has to undo
struct BaseDrawState {
    /// Light state before the node's material was applied
    material: Option<LightState>,
    texture: Option<TextureRestore>,
}

/// Texture unit 0 and the texture flag as they were before the node's bind
struct TextureRestore {
    previous: Option<TextureHandle>,
    use_texture: bool,
}

impl dyn Node {
    /// Draw this node (and, through `do_draw`, its subtree).
    ///
    /// The matrix stack depth and the texture state are the same before and
    /// after the call, also when the node is invisible or a hook fails. The
    /// first error is returned.
    pub fn draw(&mut self, ctx: &mut RenderContext) -> SceneResult<()> {
        let state = self.base_pre_draw(ctx);
        let result = self.draw_transformed(ctx);
        self.base_post_draw(ctx, state);
        result
    }

    pub fn name(&self) -> &str {
        self.base().name()
    }

    pub fn object_id(&self) -> u32 {
        self.base().object_id()
    }

    pub fn is_visible(&self) -> bool {
        self.base().is_visible()
    }

    pub fn downcast_ref<T: Node>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    pub fn downcast_mut<T: Node>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut::<T>()
    }

    fn base_pre_draw(&mut self, ctx: &mut RenderContext) -> BaseDrawState {
        if ctx.selection.is_selection_rendering() {
            ctx.selection.set_object_id(self.base().object_id());
            ctx.selection.apply(ctx.backend.as_mut());
        }

        let base = self.base();
        let mut material = None;
        if base.use_material {
            if let Some(node_material) = base.material() {
                material = Some(*ctx.light.state());
                node_material.apply(&mut ctx.light);
                ctx.light.apply_material(ctx.backend.as_mut());
            }
        }

        let mut texture = None;
        if base.use_texture {
            if let Some(node_texture) = base.texture() {
                let previous = ctx.backend.bound_texture(0);
                let mut node_texture = node_texture.borrow_mut();
                node_texture.attach_release_queue(&ctx.release_queue());
                if node_texture.bind(ctx.backend.as_mut(), 0) {
                    texture = Some(TextureRestore {
                        previous,
                        use_texture: ctx.light.use_texture(),
                    });
                    ctx.light.set_use_texture(true);
                    ctx.light.apply_material(ctx.backend.as_mut());
                }
            }
        }
        BaseDrawState { material, texture }
    }

    fn base_post_draw(&mut self, ctx: &mut RenderContext, state: BaseDrawState) {
        // nothing to undo unless pre-draw changed something
        if state.material.is_none() && state.texture.is_none() {
            return;
        }
        if let Some(previous) = &state.material {
            ctx.light.restore_material(previous);
        }
        if let Some(texture) = state.texture {
            match texture.previous {
                Some(handle) => ctx.backend.bind_texture(0, handle),
                None => ctx.backend.unbind_texture(0),
            }
            ctx.light.set_use_texture(texture.use_texture);
        }
        ctx.light.apply_material(ctx.backend.as_mut());
    }

    fn draw_transformed(&mut self, ctx: &mut RenderContext) -> SceneResult<()> {
        // the push decision is taken once and reused for the pop
        let transform = self.transform().filter(|t| t.use_transform).copied();
        if let Some(transform) = &transform {
            ctx.transform.push()?;
            transform.apply_to(ctx.transform.model_stack_mut());
            ctx.transform.apply_model(ctx.backend.as_mut());
        }

        let result = self.run_hooks(ctx);

        if transform.is_some() {
            let popped = ctx.transform.pop();
            ctx.transform.apply_model(ctx.backend.as_mut());
            return result.and(popped);
        }
        result
    }

    fn run_hooks(&mut self, ctx: &mut RenderContext) -> SceneResult<()> {
        let mut result = self.do_pre_draw(ctx);
        if result.is_ok() && self.base().is_visible() {
            result = self.do_draw(ctx);
        }
        let post = self.do_post_draw(ctx);
        result.and(post)
    }
}

/// Draw a shared node
pub fn draw(node: &NodeRef, ctx: &mut RenderContext) -> SceneResult<()> {
    node.borrow_mut().draw(ctx)
}

/// Run `do_setup` on every node of the tree, each shared node once.
pub fn setup(root: &NodeRef, ctx: &mut RenderContext) -> SceneResult<()> {
    fn walk(node: &NodeRef, ctx: &mut RenderContext, seen: &mut HashSet<*const ()>) -> SceneResult<()> {
        if !seen.insert(node_addr(node)) {
            return Ok(());
        }
        node.borrow_mut().do_setup(ctx)?;
        let children = node.borrow().children().map(<[NodeRef]>::to_vec);
        for child in children.iter().flatten() {
            walk(child, ctx, seen)?;
        }
        Ok(())
    }
    walk(root, ctx, &mut HashSet::new())
}

/// Assign picking ids in pre-order, starting at `first_id` (at least 1),
/// and return the next unused id.
///
/// Visible drawable nodes get their own id. A node under an invisible
/// ancestor, or invisible itself, gets 0. A composite with
/// `single_object_id` takes one id shared by its whole subtree; other
/// composites and pure transform nodes get 0. A node reachable through
/// several parents keeps the id of its first occurrence.
pub fn enumerate_ids(root: &NodeRef, first_id: u32) -> u32 {
    struct Enumerator {
        next: u32,
        seen: HashSet<*const ()>,
    }

    impl Enumerator {
        fn walk(&mut self, node: &NodeRef, inherited: Option<u32>) {
            if !self.seen.insert(node_addr(node)) {
                return;
            }
            let (visible, drawable, single, children) = {
                let n = node.borrow();
                (
                    n.is_visible(),
                    n.is_drawable(),
                    n.single_object_id(),
                    n.children().map(<[NodeRef]>::to_vec),
                )
            };

            let (id, for_children) = match inherited {
                Some(id) => (id, Some(id)),
                None if !visible => (0, Some(0)),
                None if single => {
                    let id = self.take();
                    (id, Some(id))
                }
                None if drawable && children.is_none() => (self.take(), None),
                None => (0, None),
            };
            node.borrow_mut().base_mut().set_object_id(id);

            for child in children.iter().flatten() {
                self.walk(child, for_children);
            }
        }

        fn take(&mut self) -> u32 {
            let id = self.next;
            self.next += 1;
            id
        }
    }

    let mut enumerator = Enumerator {
        next: first_id.max(1),
        seen: HashSet::new(),
    };
    enumerator.walk(root, None);
    log::debug!("enumerate_ids: assigned ids {}..{}", first_id.max(1), enumerator.next);
    enumerator.next
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{GraphicsBackend, HeadlessBackend};
    use crate::resources::TextureData;
    use crate::RenderConfig;
    use glam::{Vec3, Vec4};

    fn headless() -> RenderContext {
        RenderContext::headless(&RenderConfig::default().with_size(64, 64)).unwrap()
    }

    /// Leaf that records its draws into a shared trace
    struct Tracer {
        base: NodeBase,
        label: &'static str,
        trace: Rc<RefCell<Vec<&'static str>>>,
    }

    impl Node for Tracer {
        fn base(&self) -> &NodeBase {
            &self.base
        }

        fn base_mut(&mut self) -> &mut NodeBase {
            &mut self.base
        }

        fn type_name(&self) -> &'static str {
            "Tracer"
        }

        fn do_draw(&mut self, _ctx: &mut RenderContext) -> SceneResult<()> {
            self.trace.borrow_mut().push(self.label);
            Ok(())
        }
    }

    #[test]
    fn test_invisible_node_skips_do_draw() {
        let trace = Rc::new(RefCell::new(Vec::new()));
        let mut tracer = Tracer {
            base: NodeBase::new(),
            label: "tracer",
            trace: trace.clone(),
        };
        tracer.base.set_visible(false);
        let node = node_ref(tracer);

        let mut ctx = headless();
        draw(&node, &mut ctx).unwrap();
        assert!(trace.borrow().is_empty());
    }

    #[test]
    fn test_transform_is_balanced() {
        let node = node_ref(TransformNode::with_transform(Transform::from_position(Vec3::X)));
        let mut ctx = headless();
        draw(&node, &mut ctx).unwrap();
        assert_eq!(ctx.transform.depth(), 0);
        assert_eq!(ctx.transform.model_matrix(), glam::Mat4::IDENTITY);
    }

    #[test]
    fn test_stack_overflow_surfaces() {
        let config = RenderConfig::default().with_matrix_stack_limit(0);
        let mut ctx = RenderContext::headless(&config).unwrap();
        let node = node_ref(TransformNode::new());
        assert!(draw(&node, &mut ctx).is_err());
        assert_eq!(ctx.transform.depth(), 0);
    }

    #[test]
    fn test_no_texture_no_unbind() {
        let node = node_ref(TransformNode::new());
        let mut ctx = headless();
        draw(&node, &mut ctx).unwrap();
        let stats = ctx.backend_as::<HeadlessBackend>().unwrap().stats();
        assert_eq!(stats.texture_unbinds, 0);
        assert_eq!(stats.empty_unbinds, 0);
    }

    #[test]
    fn test_texture_bind_is_undone() {
        let mut ctx = headless();
        let texture = Rc::new(RefCell::new(Texture::new(TextureData::white())));
        let mut node = TransformNode::new();
        node.base_mut().set_texture(Some(texture));
        let node = node_ref(node);

        draw(&node, &mut ctx).unwrap();
        assert!(!ctx.light.use_texture());
        let headless = ctx.backend_as::<HeadlessBackend>().unwrap();
        assert_eq!(headless.stats().texture_binds, 1);
        assert_eq!(headless.stats().texture_unbinds, 1);
        assert_eq!(headless.bound_texture(0), None);
    }

    /// Leaf with an optional transform that records the matrix state seen
    /// by `do_draw`
    struct MatrixSpy {
        base: NodeBase,
        transform: Transform,
        disable_transform_in_pre_draw: bool,
        seen: Vec<(usize, glam::Mat4, Vec4)>,
    }

    impl MatrixSpy {
        fn new(transform: Transform) -> Self {
            Self {
                base: NodeBase::new(),
                transform,
                disable_transform_in_pre_draw: false,
                seen: Vec::new(),
            }
        }
    }

    impl Node for MatrixSpy {
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
            "MatrixSpy"
        }

        fn do_pre_draw(&mut self, _ctx: &mut RenderContext) -> SceneResult<()> {
            if self.disable_transform_in_pre_draw {
                if let Some(transform) = self.transform_mut() {
                    transform.use_transform = false;
                }
            }
            Ok(())
        }

        fn do_draw(&mut self, ctx: &mut RenderContext) -> SceneResult<()> {
            self.seen
                .push((ctx.transform.depth(), ctx.transform.model_matrix(), ctx.light.state().diffuse));
            Ok(())
        }
    }

    fn spy(node: &NodeRef) -> Vec<(usize, glam::Mat4, Vec4)> {
        node.borrow().downcast_ref::<MatrixSpy>().unwrap().seen.clone()
    }

    #[test]
    fn test_transform_disabled_in_pre_draw_still_pops() {
        let mut node = MatrixSpy::new(Transform::from_position(Vec3::new(1.0, 2.0, 3.0)));
        node.disable_transform_in_pre_draw = true;
        let node = node_ref(node);

        let mut ctx = headless();
        draw(&node, &mut ctx).unwrap();

        // pushed before the hook changed the flag, so the draw saw the push
        let seen = spy(&node);
        assert_eq!(seen[0].0, 1);
        assert_eq!(ctx.transform.depth(), 0);
        assert_eq!(ctx.transform.model_matrix(), glam::Mat4::IDENTITY);
        assert!(!node.borrow().transform().unwrap().use_transform);
    }

    #[test]
    fn test_disabled_transform_does_not_push() {
        let mut node = MatrixSpy::new(Transform::from_position(Vec3::new(5.0, 0.0, 0.0)));
        node.transform.use_transform = false;
        let node = node_ref(node);

        let mut ctx = headless();
        ctx.transform.translate(Vec3::Y);
        let before = ctx.transform.model_matrix();
        draw(&node, &mut ctx).unwrap();

        assert_eq!(spy(&node)[0].0, 0);
        assert_eq!(spy(&node)[0].1, before);
        assert_eq!(ctx.transform.depth(), 0);
        assert_eq!(ctx.transform.model_matrix(), before);
    }

    #[test]
    fn test_material_does_not_leak_to_sibling() {
        let default_diffuse = LightState::default().diffuse;
        let mut red = TransformNode::new();
        red.base_mut()
            .set_material(Some(Rc::new(Material::plastic(Vec3::new(1.0, 0.0, 0.0)))));
        let red = node_ref(red);
        let plain = node_ref(MatrixSpy::new(Transform::new()));

        let mut group = CompositeNode::new();
        group.add(red);
        group.add(plain.clone());
        let group = node_ref(group);

        let mut ctx = headless();
        draw(&group, &mut ctx).unwrap();

        assert_eq!(spy(&plain)[0].2, default_diffuse);
        assert_eq!(ctx.light.state().diffuse, default_diffuse);
    }

    #[test]
    fn test_nested_texture_is_rebound_for_sibling() {
        let outer = Rc::new(RefCell::new(Texture::new(TextureData::white())));
        let inner = Rc::new(RefCell::new(Texture::new(TextureData::solid_color(
            [255, 0, 0, 255],
            "red",
        ))));

        let mut textured_child = CompositeNode::new();
        textured_child.base_mut().set_texture(Some(inner));
        textured_child.add(node_ref(MeshNode::from_source("inner", CubeGeometry::default())));

        let mut parent = CompositeNode::new();
        parent.base_mut().set_texture(Some(outer.clone()));
        parent.add(node_ref(textured_child));
        parent.add(node_ref(MeshNode::from_source("sibling", CubeGeometry::default())));
        let parent = node_ref(parent);

        let mut ctx = headless();
        draw(&parent, &mut ctx).unwrap();

        let outer_handle = outer.borrow().handle();
        assert!(outer_handle.is_some());
        let headless = ctx.backend_as::<HeadlessBackend>().unwrap();
        let sibling = headless.draws().last().unwrap();
        assert_eq!(sibling.texture, outer_handle);
        assert!(sibling.use_texture);
        assert_eq!(headless.bound_texture(0), None);
        assert!(!ctx.light.use_texture());
    }

    #[test]
    fn test_same_node() {
        let a = node_ref(TransformNode::new());
        let b = node_ref(TransformNode::new());
        assert!(same_node(&a, &a.clone()));
        assert!(!same_node(&a, &b));
    }

    #[test]
    fn test_downcast() {
        let node = node_ref(TransformNode::new());
        assert!(node.borrow().downcast_ref::<TransformNode>().is_some());
        assert!(node.borrow().downcast_ref::<CompositeNode>().is_none());
    }
}
