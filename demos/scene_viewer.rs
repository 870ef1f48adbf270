//! Scene viewer demo
//!
//! Right-drag orbits the camera, the wheel zooms, a left click picks the
//! node under the cursor through the id buffer.
//!
//! Run with: cargo run --example scene_viewer

use glam::Vec3;
use graphics_scenegraph::resources::{Material, Texture, TextureData};
use graphics_scenegraph::scene::visitor::{accept, ExtentVisitor, PrintVisitor};
use graphics_scenegraph::scene::{
    self, node_ref, Axis, Camera, CompositeNode, CubeGeometry, CylinderGeometry, DirectionalLight, LightNode, MeshNode,
    Node, NodeRef, PlaneGeometry, PointLight, SphereGeometry, Transform,
};
use graphics_scenegraph::{window, BufferSelection, RenderConfig, RenderContext, SceneResult};
use std::cell::RefCell;
use std::rc::Rc;

struct Viewer {
    ctx: RenderContext,
    selection: BufferSelection,
}

struct DemoScene {
    root: NodeRef,
    spinner: NodeRef,
}

fn with_material(mut node: MeshNode, material: Material) -> MeshNode {
    node.base_mut().set_material(Some(Rc::new(material)));
    node
}

fn build_scene() -> DemoScene {
    let mut root = CompositeNode::named("root");

    root.add(node_ref(LightNode::new(
        DirectionalLight::new(Vec3::new(-0.4, -1.0, -0.3), Vec3::ONE, 0.8),
        0,
    )));
    let mut lamp = LightNode::new(PointLight::new(Vec3::ZERO, Vec3::new(1.0, 0.9, 0.7), 2.0, 10.0), 1);
    if let Some(transform) = lamp.transform_mut() {
        transform.position = Vec3::new(2.0, 3.0, 2.0);
    }
    root.add(node_ref(lamp));

    let mut floor = with_material(
        MeshNode::from_source("floor", PlaneGeometry::new(10.0, 10.0, 4)),
        Material::rubber(Vec3::splat(0.6)),
    );
    let checker = TextureData::checkerboard(64, [220, 220, 220, 255], [90, 90, 90, 255]);
    floor.base_mut().set_texture(Some(Rc::new(RefCell::new(Texture::new(checker)))));
    root.add(node_ref(floor));

    // one cube instanced three times
    let cube = node_ref(with_material(
        MeshNode::from_source("cube", CubeGeometry::new(1.0)),
        Material::plastic(Vec3::new(0.8, 0.2, 0.2)),
    ));
    let mut row = CompositeNode::with_transform(Transform::from_position(Vec3::new(0.0, 0.5, -2.0)));
    row.base_mut().set_name("cube row");
    for x in [-2.0, 0.0, 2.0] {
        let mut slot = CompositeNode::with_transform(Transform::from_position(Vec3::new(x, 0.0, 0.0)));
        slot.add(cube.clone());
        row.add(node_ref(slot));
    }
    root.add(node_ref(row));

    let spinner = node_ref(
        with_material(
            MeshNode::from_source("sphere", SphereGeometry::new(0.6, 32, 16)),
            Material::gold(),
        )
        .with_transform(Transform::from_position(Vec3::new(-1.5, 0.6, 1.0))),
    );
    root.add(spinner.clone());

    let mut pillar = CompositeNode::with_transform(Transform::from_position(Vec3::new(1.5, 0.75, 1.0)));
    pillar.base_mut().set_name("pillar");
    pillar.set_single_object_id(true);
    pillar.add(node_ref(with_material(
        MeshNode::from_source("shaft", CylinderGeometry::new(0.3, 1.5, 24)),
        Material::silver(),
    )));
    pillar.add(node_ref(
        with_material(MeshNode::from_source("cap", CubeGeometry::new(0.8)), Material::copper())
            .with_transform(Transform::from_position(Vec3::new(0.0, 0.85, 0.0))),
    ));
    root.add(node_ref(pillar));

    root.add(node_ref(Axis::new(1.5)));

    DemoScene {
        root: node_ref(root),
        spinner,
    }
}

fn start(config: &RenderConfig, window: &window::Window, root: &NodeRef) -> SceneResult<Viewer> {
    let backend = RenderContext::create_backend(config, Some(window.window_arc()))?;
    let mut ctx = RenderContext::new(backend, config);
    ctx.load_default_programs()?;
    scene::setup(root, &mut ctx)?;

    let (width, height) = window.dimensions();
    let mut selection = BufferSelection::new(root.clone());
    selection.initialize(&mut ctx, width, height)?;

    let mut printer = PrintVisitor::to_log();
    accept(root, &mut printer);
    Ok(Viewer { ctx, selection })
}

fn main() {
    graphics_scenegraph::init_logging();

    let config = RenderConfig::default()
        .with_title("Scene Graph Viewer")
        .with_size(1280, 720)
        .with_clear_color([0.08, 0.08, 0.1, 1.0]);

    let demo = build_scene();
    let bounds = ExtentVisitor::compute(&demo.root);
    log::info!("scene bounds: {:?} .. {:?}", bounds.min(), bounds.max());

    let mut camera = Camera::new(Vec3::new(0.0, 4.0, 9.0), bounds.center().unwrap_or(Vec3::ZERO));
    let mut viewer: Option<Viewer> = None;
    let run_config = config.clone();

    let result = window::run(&run_config, move |window| {
        if viewer.is_none() {
            viewer = Some(start(&config, window, &demo.root)?);
        }
        let Some(Viewer { ctx, selection }) = viewer.as_mut() else {
            return Ok(());
        };

        if window.was_resized() {
            let (width, height) = window.dimensions();
            ctx.resize(width, height);
            selection.resize(ctx, width, height)?;
            window.clear_resize_flag();
        }

        let (dx, dy) = window.take_drag();
        if dx != 0.0 || dy != 0.0 {
            camera.orbit(-dx * 0.01, dy * 0.01);
        }
        let scroll = window.take_scroll();
        if scroll != 0.0 {
            camera.zoom(scroll * 0.1);
        }
        let (width, height) = window.dimensions();
        camera.set_aspect(width as f32, height as f32);
        camera.apply(&mut ctx.transform);

        if let Some(transform) = demo.spinner.borrow_mut().transform_mut() {
            transform.rotate_axis(Vec3::Y, 0.01);
        }

        if let Some((x, y)) = window.take_click() {
            match selection.node_at_pixel(ctx, x, y)? {
                Some(node) => {
                    let node = node.borrow();
                    log::info!("picked {} '{}' (id {})", node.type_name(), node.name(), node.object_id());
                }
                None => log::info!("picked nothing at ({}, {})", x, y),
            }
        }

        ctx.render(&demo.root)
    });

    if let Err(e) = result {
        log::error!("scene viewer: {}", e);
        std::process::exit(1);
    }
}
