use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use glam::{Mat4, Vec2, Vec3, Vec4};
use graphics_scenegraph::backend::HeadlessBackend;
use graphics_scenegraph::managers::{LightManager, SelectionManager};
use graphics_scenegraph::resources::{Texture, TextureData};
use graphics_scenegraph::scene::visitor::{accept, ExtentVisitor, MapVisitor};
use graphics_scenegraph::scene::{
    draw, enumerate_ids, node_ref, same_node, Axis, CompositeNode, CubeGeometry, MeshNode, MeshVertex, Node,
    NodeBase, NodeRef, Transform, VecGeometry,
};
use graphics_scenegraph::{RenderConfig, RenderContext, SceneError, SceneResult};

fn context() -> RenderContext {
    RenderContext::headless(&RenderConfig::default().with_size(32, 32)).unwrap()
}

/// Leaf recording every `do_draw` into a shared trace
struct Recorder {
    base: NodeBase,
    trace: Rc<RefCell<Vec<String>>>,
}

impl Recorder {
    fn new(name: &str, trace: &Rc<RefCell<Vec<String>>>) -> NodeRef {
        let mut base = NodeBase::new();
        base.set_name(name);
        node_ref(Recorder {
            base,
            trace: trace.clone(),
        })
    }
}

impl Node for Recorder {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut NodeBase {
        &mut self.base
    }

    fn type_name(&self) -> &'static str {
        "Recorder"
    }

    fn do_draw(&mut self, _ctx: &mut RenderContext) -> SceneResult<()> {
        self.trace.borrow_mut().push(self.base.name().to_string());
        Ok(())
    }
}

fn nested(depth: usize, leaf: NodeRef) -> NodeRef {
    (0..depth).fold(leaf, |child, level| {
        let mut group = CompositeNode::with_transform(
            Transform::from_position(Vec3::new(level as f32, 1.0, 0.0)).with_rotation(Vec3::Z, 0.3),
        );
        group.add(child);
        node_ref(group)
    })
}

// ---------------------------------------------------------------------------
// Matrix stack balance
// ---------------------------------------------------------------------------

#[test]
fn stack_depth_is_restored_for_any_depth() {
    for depth in 0..8 {
        let mut ctx = context();
        ctx.transform.translate(Vec3::new(0.0, 0.0, -3.0));
        let before = (ctx.transform.depth(), ctx.transform.model_matrix());

        let root = nested(depth, node_ref(MeshNode::from_source("cube", CubeGeometry::default())));
        draw(&root, &mut ctx).unwrap();

        assert_eq!((ctx.transform.depth(), ctx.transform.model_matrix()), before, "depth {}", depth);
    }
}

#[test]
fn stack_is_balanced_when_nodes_are_hidden() {
    let mut ctx = context();
    let leaf = node_ref(MeshNode::from_source("cube", CubeGeometry::default()));
    let root = nested(3, leaf.clone());
    leaf.borrow_mut().base_mut().set_visible(false);
    root.borrow_mut().base_mut().set_visible(false);

    draw(&root, &mut ctx).unwrap();
    assert_eq!(ctx.transform.depth(), 0);
    assert!(ctx.backend_as::<HeadlessBackend>().unwrap().draws().is_empty());
}

#[test]
fn unmatched_pop_is_reported() {
    let mut ctx = context();
    assert!(matches!(
        ctx.transform.pop(),
        Err(SceneError::MatrixStackUnderflow { .. })
    ));
}

// ---------------------------------------------------------------------------
// Draw order
// ---------------------------------------------------------------------------

#[test]
fn children_draw_in_insertion_order() {
    let trace = Rc::new(RefCell::new(Vec::new()));
    let mut root = CompositeNode::new();
    for name in ["A", "B", "C"] {
        root.add(Recorder::new(name, &trace));
    }
    let root = node_ref(root);

    let mut ctx = context();
    for _ in 0..3 {
        trace.borrow_mut().clear();
        draw(&root, &mut ctx).unwrap();
        assert_eq!(*trace.borrow(), vec!["A", "B", "C"]);
    }
}

#[test]
fn removal_keeps_remaining_order() {
    let trace = Rc::new(RefCell::new(Vec::new()));
    let b = Recorder::new("B", &trace);
    let mut root = CompositeNode::new();
    root.add(Recorder::new("A", &trace));
    root.add(b.clone());
    root.add(Recorder::new("C", &trace));
    root.add(Recorder::new("D", &trace));
    assert!(root.remove(&b));
    let root = node_ref(root);

    draw(&root, &mut context()).unwrap();
    assert_eq!(*trace.borrow(), vec!["A", "C", "D"]);
}

// ---------------------------------------------------------------------------
// Instancing
// ---------------------------------------------------------------------------

#[test]
fn shared_child_gets_each_parents_transform() {
    let cube = node_ref(MeshNode::from_source("cube", CubeGeometry::default()));
    let mut left = CompositeNode::with_transform(Transform::from_position(Vec3::new(-2.0, 0.0, 0.0)));
    left.add(cube.clone());
    let mut right = CompositeNode::with_transform(Transform::from_position_scale(Vec3::new(2.0, 0.0, 0.0), Vec3::splat(3.0)));
    right.add(cube.clone());

    let mut root = CompositeNode::new();
    root.add(node_ref(left));
    root.add(node_ref(right));
    let root = node_ref(root);

    let mut ctx = context();
    draw(&root, &mut ctx).unwrap();

    let draws = ctx.backend_as::<HeadlessBackend>().unwrap().draws();
    assert_eq!(draws.len(), 2);
    assert_eq!(draws[0].model, Mat4::from_translation(Vec3::new(-2.0, 0.0, 0.0)));
    assert_eq!(
        draws[1].model,
        Mat4::from_translation(Vec3::new(2.0, 0.0, 0.0)) * Mat4::from_scale(Vec3::splat(3.0))
    );
}

// ---------------------------------------------------------------------------
// Single-slot save/restore
// ---------------------------------------------------------------------------

#[test]
fn light_state_round_trips_through_save_restore() {
    let mut light = LightManager::default();
    light.set_diffuse(Vec4::new(0.1, 0.2, 0.3, 1.0));
    let before = *light.state();

    light.save_state();
    light.enable_lighting(false);
    light.set_use_texture(true);
    light.set_diffuse(Vec4::ONE);
    light.restore_state();

    assert_eq!(*light.state(), before);
}

#[test]
fn selection_state_round_trips_through_save_restore() {
    let mut selection = SelectionManager::new();
    selection.set_object_id(4);
    let before = selection.state();

    selection.save_state();
    selection.set_object_id(99);
    selection.set_selection_rendering(true);
    selection.restore_state();

    assert_eq!(selection.state(), before);
}

#[test]
fn second_save_overwrites_the_first() {
    let mut light = LightManager::default();
    light.save_state();
    light.enable_lighting(false);
    light.save_state();
    light.restore_state();
    assert!(!light.is_lighting_enabled());
}

#[test]
fn axis_leaves_sibling_lighting_alone() {
    let mut ctx = context();
    let mut root = CompositeNode::new();
    root.add(node_ref(Axis::default()));
    root.add(node_ref(MeshNode::from_source("cube", CubeGeometry::default())));
    let root = node_ref(root);

    draw(&root, &mut ctx).unwrap();
    let draws = ctx.backend_as::<HeadlessBackend>().unwrap().draws();
    assert!(!draws[0].lighting_enabled);
    assert!(draws[1].lighting_enabled);
}

// ---------------------------------------------------------------------------
// Picking ids
// ---------------------------------------------------------------------------

#[test]
fn visible_leaves_get_distinct_ids() {
    let mut root = CompositeNode::new();
    let mut leaves = Vec::new();
    for i in 0..3 {
        let mut group = CompositeNode::new();
        for j in 0..2 {
            let leaf = node_ref(
                MeshNode::from_source("cube", CubeGeometry::default())
                    .with_transform(Transform::from_position(Vec3::new(i as f32, j as f32, 0.0))),
            );
            group.add(leaf.clone());
            leaves.push(leaf);
        }
        root.add(node_ref(group));
    }
    let root = node_ref(root);

    let next = enumerate_ids(&root, 1);
    let k = leaves.len() as u32;
    assert_eq!(next, k + 1);

    let ids: HashSet<u32> = leaves.iter().map(|leaf| leaf.borrow().object_id()).collect();
    assert_eq!(ids, (1..=k).collect());

    let visitor = MapVisitor::build(&root);
    assert_eq!(visitor.collisions(), 0);
    for leaf in &leaves {
        let id = leaf.borrow().object_id();
        assert!(same_node(&visitor.map()[&id], leaf));
    }
}

#[test]
fn ids_are_rendered_into_the_selection_pass() {
    let v = |x: f32, y: f32| MeshVertex::new(Vec3::new(x, y, 0.0), Vec3::Z, Vec2::ZERO);
    let quad = VecGeometry::new(vec![v(-1.0, -1.0), v(1.0, -1.0), v(1.0, 1.0), v(-1.0, 1.0)], vec![[0, 1, 2], [0, 2, 3]]);
    let node = node_ref(MeshNode::from_source("quad", quad));
    let mut root = CompositeNode::new();
    root.add(node.clone());

    let mut ctx = context();
    let mut selection = graphics_scenegraph::BufferSelection::new(node_ref(root));
    selection.initialize(&mut ctx, 16, 16).unwrap();
    selection.render(&mut ctx).unwrap();

    assert_eq!(selection.id_at_pixel(&mut ctx, 8, 8).unwrap(), 1);
    let picked = selection.node_at_pixel(&mut ctx, 3, 12).unwrap().unwrap();
    assert!(same_node(&picked, &node));
}

// ---------------------------------------------------------------------------
// Extents
// ---------------------------------------------------------------------------

#[test]
fn empty_composite_has_empty_extent() {
    let root = node_ref(CompositeNode::new());
    let bounds = ExtentVisitor::compute(&root);
    assert!(bounds.is_empty());
}

#[test]
fn extent_follows_node_position() {
    let geometry = VecGeometry::new(
        vec![
            MeshVertex::new(Vec3::ZERO, Vec3::Y, Vec2::ZERO),
            MeshVertex::new(Vec3::new(1.0, 2.0, 3.0), Vec3::Y, Vec2::ONE),
        ],
        Vec::new(),
    );
    let node = MeshNode::from_source("points", geometry).with_transform(Transform::from_position(Vec3::new(5.0, 0.0, 0.0)));
    let mut root = CompositeNode::new();
    root.add(node_ref(node));
    let root = node_ref(root);

    let mut visitor = ExtentVisitor::new();
    accept(&root, &mut visitor);
    let bounds = visitor.bounding_box();
    assert_eq!(bounds.min(), Some(Vec3::new(5.0, 0.0, 0.0)));
    assert_eq!(bounds.max(), Some(Vec3::new(6.0, 2.0, 3.0)));
}

// ---------------------------------------------------------------------------
// GPU resource lifetime
// ---------------------------------------------------------------------------

#[test]
fn dropped_scene_releases_gpu_resources() {
    let mut ctx = context();
    let texture = Rc::new(RefCell::new(Texture::new(TextureData::white())));
    let mut root = CompositeNode::new();
    root.base_mut().set_texture(Some(texture));
    root.add(node_ref(MeshNode::from_source("cube", CubeGeometry::default())));
    root.add(node_ref(Axis::default()));
    let root = node_ref(root);

    draw(&root, &mut ctx).unwrap();
    {
        let headless = ctx.backend_as::<HeadlessBackend>().unwrap();
        assert!(headless.live_buffers() > 0);
        assert_eq!(headless.live_textures(), 1);
    }

    drop(root);
    ctx.begin_frame().unwrap();
    let headless = ctx.backend_as::<HeadlessBackend>().unwrap();
    assert_eq!(headless.live_buffers(), 0);
    assert_eq!(headless.live_textures(), 0);
}

#[test]
fn draw_log_covers_one_frame() {
    let mut ctx = context();
    let root = node_ref(MeshNode::from_source("cube", CubeGeometry::default()));
    for _ in 0..3 {
        ctx.begin_frame().unwrap();
        draw(&root, &mut ctx).unwrap();
        ctx.end_frame().unwrap();
    }
    assert_eq!(ctx.backend_as::<HeadlessBackend>().unwrap().draws().len(), 1);
}
