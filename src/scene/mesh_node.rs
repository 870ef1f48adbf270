//! Field-backed meshes and the node that draws them

use super::{Node, NodeBase, Transform};
use crate::backend::{
    BackendError, BufferDescriptor, BufferHandle, BufferUsage, BufferUsageHint, DrawCall, GpuResource, GraphicsBackend,
    PrimitiveTopology, ReleaseQueue,
};
use crate::bounding_box::BoundingBox;
use crate::context::RenderContext;
use crate::error::SceneResult;
use crate::field::{FloatField, UIntField};
use glam::{Vec2, Vec3, Vec4};

/// One vertex as produced by a geometry source
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshVertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub tex_coord: Vec2,
}

impl MeshVertex {
    pub fn new(position: Vec3, normal: Vec3, tex_coord: Vec2) -> Self {
        Self {
            position,
            normal,
            tex_coord,
        }
    }
}

/// Producer of vertex and triangle data for a [`Mesh`].
///
/// Both sequences are consumed once per build; indices refer to the
/// position of a vertex in `vertices()`.
pub trait GeometrySource {
    fn vertices(&self) -> Box<dyn Iterator<Item = MeshVertex> + '_>;
    fn triangles(&self) -> Box<dyn Iterator<Item = [u32; 3]> + '_>;
}

/// Geometry given as explicit vertex and triangle lists
#[derive(Debug, Clone, Default)]
pub struct VecGeometry {
    pub vertices: Vec<MeshVertex>,
    pub triangles: Vec<[u32; 3]>,
}

impl VecGeometry {
    pub fn new(vertices: Vec<MeshVertex>, triangles: Vec<[u32; 3]>) -> Self {
        Self { vertices, triangles }
    }
}

impl GeometrySource for VecGeometry {
    fn vertices(&self) -> Box<dyn Iterator<Item = MeshVertex> + '_> {
        Box::new(self.vertices.iter().copied())
    }

    fn triangles(&self) -> Box<dyn Iterator<Item = [u32; 3]> + '_> {
        Box::new(self.triangles.iter().copied())
    }
}

struct MeshBuffers {
    positions: BufferHandle,
    normals: BufferHandle,
    tex_coords: BufferHandle,
    colors: Option<BufferHandle>,
    indices: Option<BufferHandle>,
    hint: BufferUsageHint,
}

impl MeshBuffers {
    fn handles(&self) -> impl Iterator<Item = BufferHandle> {
        [Some(self.positions), Some(self.normals), Some(self.tex_coords), self.colors, self.indices]
            .into_iter()
            .flatten()
    }
}

/// CPU geometry in [`FloatField`]s plus the GPU buffers built from it.
///
/// Buffers are destroyed by [`Mesh::release`]. A mesh dropped while still
/// uploaded hands its buffers to its [`ReleaseQueue`], if it was given one.
pub struct Mesh {
    label: String,
    topology: PrimitiveTopology,
    positions: FloatField,
    normals: FloatField,
    tex_coords: FloatField,
    colors: Option<FloatField>,
    indices: UIntField,
    buffers: Option<MeshBuffers>,
    release_queue: Option<ReleaseQueue>,
}

fn index_cols(topology: PrimitiveTopology) -> usize {
    match topology {
        PrimitiveTopology::TriangleList => 3,
        PrimitiveTopology::LineList => 2,
        _ => 1,
    }
}

impl Mesh {
    pub fn new(label: &str, topology: PrimitiveTopology) -> Self {
        Self {
            label: label.to_string(),
            topology,
            positions: FloatField::with_cols(3),
            normals: FloatField::with_cols(3),
            tex_coords: FloatField::with_cols(2),
            colors: None,
            indices: UIntField::with_cols(index_cols(topology)),
            buffers: None,
            release_queue: None,
        }
    }

    /// Triangle mesh read from `source`
    pub fn from_source(label: &str, source: &dyn GeometrySource) -> Self {
        let mut mesh = Self::new(label, PrimitiveTopology::TriangleList);
        mesh.load(source);
        mesh
    }

    /// Replace the CPU data with one pass over `source`. GPU buffers are
    /// left as they are until the next upload.
    pub fn load(&mut self, source: &dyn GeometrySource) {
        self.topology = PrimitiveTopology::TriangleList;
        self.positions = FloatField::with_cols(3);
        self.normals = FloatField::with_cols(3);
        self.tex_coords = FloatField::with_cols(2);
        self.colors = None;
        self.indices = UIntField::with_cols(3);

        for vertex in source.vertices() {
            self.push_vertex(vertex);
        }
        for triangle in source.triangles() {
            self.indices.push_row(&triangle);
        }
    }

    pub fn push_vertex(&mut self, vertex: MeshVertex) {
        self.positions.push_row(&vertex.position.to_array());
        self.normals.push_row(&vertex.normal.to_array());
        self.tex_coords.push_row(&vertex.tex_coord.to_array());
    }

    /// Append one primitive worth of indices (3 for triangles, 2 for lines)
    pub fn push_indices(&mut self, indices: &[u32]) -> bool {
        self.indices.push_row(indices)
    }

    /// Per-vertex colors. Ignored unless there is one color per vertex.
    pub fn set_colors(&mut self, colors: &[Vec4]) -> bool {
        if colors.len() != self.vertex_count() {
            log::warn!(
                "Mesh '{}': {} colors for {} vertices",
                self.label,
                colors.len(),
                self.vertex_count()
            );
            return false;
        }
        let mut field = FloatField::with_cols(4);
        for color in colors {
            field.push_row(&color.to_array());
        }
        self.colors = Some(field);
        true
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn topology(&self) -> PrimitiveTopology {
        self.topology
    }

    pub fn positions(&self) -> &FloatField {
        &self.positions
    }

    pub fn normals(&self) -> &FloatField {
        &self.normals
    }

    pub fn tex_coords(&self) -> &FloatField {
        &self.tex_coords
    }

    pub fn colors(&self) -> Option<&FloatField> {
        self.colors.as_ref()
    }

    pub fn indices(&self) -> &UIntField {
        &self.indices
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.rows()
    }

    pub fn index_count(&self) -> usize {
        self.indices.size()
    }

    pub fn is_uploaded(&self) -> bool {
        self.buffers.is_some()
    }

    /// Queue that receives the buffers if the mesh is dropped while uploaded
    pub fn set_release_queue(&mut self, queue: ReleaseQueue) {
        self.release_queue = Some(queue);
    }

    /// Usage hint the current GPU buffers were created with
    pub fn usage_hint(&self) -> Option<BufferUsageHint> {
        self.buffers.as_ref().map(|b| b.hint)
    }

    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::from_points((0..self.vertex_count()).filter_map(|row| self.positions.vec3(row)))
    }

    /// Create GPU buffers from the fields, replacing any existing ones.
    /// An empty mesh creates nothing.
    pub fn upload(&mut self, backend: &mut dyn GraphicsBackend, hint: BufferUsageHint) -> SceneResult<()> {
        self.release(backend);
        if self.positions.is_empty() {
            return Ok(());
        }

        let vertex_usage = BufferUsage::VERTEX | BufferUsage::COPY_DST;
        let index_usage = BufferUsage::INDEX | BufferUsage::COPY_DST;
        let mut created = Vec::with_capacity(5);
        let mut create = |name: &str, bytes: &[u8], usage: BufferUsage| {
            let desc = BufferDescriptor {
                label: Some(format!("{} {}", self.label, name)),
                size: bytes.len() as u64,
                usage,
                hint,
            };
            let handle = backend.create_buffer(&desc, bytes)?;
            created.push(handle);
            Ok::<_, BackendError>(handle)
        };

        let result: Result<MeshBuffers, BackendError> = (|| {
            let positions = create("positions", self.positions.as_bytes(), vertex_usage)?;
            let normals = create("normals", self.normals.as_bytes(), vertex_usage)?;
            let tex_coords = create("tex_coords", self.tex_coords.as_bytes(), vertex_usage)?;
            let colors = match &self.colors {
                Some(colors) => Some(create("colors", colors.as_bytes(), vertex_usage)?),
                None => None,
            };
            let indices = if self.indices.is_empty() {
                None
            } else {
                Some(create("indices", self.indices.as_bytes(), index_usage)?)
            };
            Ok(MeshBuffers {
                positions,
                normals,
                tex_coords,
                colors,
                indices,
                hint,
            })
        })();

        let buffers = match result {
            Ok(buffers) => buffers,
            Err(e) => {
                // keep the backend free of half-built meshes
                for handle in created {
                    backend.destroy_buffer(handle);
                }
                log::error!("Mesh '{}': upload failed: {}", self.label, e);
                return Err(e.into());
            }
        };

        log::debug!(
            "Mesh '{}': uploaded {} vertices, {} indices ({:?})",
            self.label,
            self.vertex_count(),
            self.index_count(),
            hint
        );
        self.buffers = Some(buffers);
        Ok(())
    }

    /// Destroy the GPU buffers; the CPU data is kept
    pub fn release(&mut self, backend: &mut dyn GraphicsBackend) {
        if let Some(buffers) = self.buffers.take() {
            for handle in buffers.handles() {
                backend.destroy_buffer(handle);
            }
        }
    }

    /// Submit the mesh with whatever state is current. Does nothing before
    /// the first upload.
    pub fn draw(&self, backend: &mut dyn GraphicsBackend) {
        let Some(buffers) = &self.buffers else {
            return;
        };
        backend.draw_mesh(&DrawCall {
            topology: self.topology,
            positions: buffers.positions,
            normals: Some(buffers.normals),
            tex_coords: Some(buffers.tex_coords),
            colors: buffers.colors,
            indices: buffers.indices,
            vertex_count: self.vertex_count() as u32,
            index_count: self.index_count() as u32,
        });
    }
}

impl Drop for Mesh {
    fn drop(&mut self) {
        let Some(buffers) = self.buffers.take() else {
            return;
        };
        match &self.release_queue {
            Some(queue) => buffers.handles().for_each(|h| queue.push(GpuResource::Buffer(h))),
            None => log::warn!("Mesh '{}': dropped with live GPU buffers", self.label),
        }
    }
}

/// Draws a [`Mesh`], building it from a [`GeometrySource`] when given one
pub struct MeshNode {
    base: NodeBase,
    transform: Transform,
    mesh: Mesh,
    source: Option<Box<dyn GeometrySource>>,
}

impl MeshNode {
    pub fn new(mesh: Mesh) -> Self {
        Self {
            base: NodeBase::new(),
            transform: Transform::default(),
            mesh,
            source: None,
        }
    }

    pub fn from_source(label: &str, source: impl GeometrySource + 'static) -> Self {
        let mesh = Mesh::from_source(label, &source);
        let mut node = Self::new(mesh);
        node.base.set_name(label);
        node.source = Some(Box::new(source));
        node
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    pub fn mesh_mut(&mut self) -> &mut Mesh {
        &mut self.mesh
    }

    /// Swap the geometry source; takes effect on the next [`MeshNode::refresh`]
    pub fn set_source(&mut self, source: impl GeometrySource + 'static) {
        self.source = Some(Box::new(source));
    }

    /// Re-read the geometry source (if any) and rebuild the GPU buffers
    /// with the current usage hint of the mesh manager.
    pub fn refresh(&mut self, ctx: &mut RenderContext) -> SceneResult<()> {
        if let Some(source) = &self.source {
            self.mesh.load(source.as_ref());
        }
        self.mesh.set_release_queue(ctx.release_queue());
        self.mesh.upload(ctx.backend.as_mut(), ctx.mesh.usage_hint())
    }

    /// Destroy the GPU buffers
    pub fn release(&mut self, ctx: &mut RenderContext) {
        self.mesh.release(ctx.backend.as_mut());
    }
}

impl Node for MeshNode {
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
        "MeshNode"
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
        self.mesh.draw(ctx.backend.as_mut());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HeadlessBackend;

    fn triangle() -> VecGeometry {
        VecGeometry::new(
            vec![
                MeshVertex::new(Vec3::ZERO, Vec3::Z, Vec2::ZERO),
                MeshVertex::new(Vec3::X, Vec3::Z, Vec2::X),
                MeshVertex::new(Vec3::Y, Vec3::Z, Vec2::Y),
            ],
            vec![[0, 1, 2]],
        )
    }

    #[test]
    fn test_from_source_fills_fields() {
        let mesh = Mesh::from_source("tri", &triangle());
        assert_eq!(mesh.vertex_count(), 3);
        assert_eq!(mesh.index_count(), 3);
        assert_eq!(mesh.positions().vec3(1), Some(Vec3::X));
        assert_eq!(mesh.tex_coords().get(2, 1), 1.0);
        assert_eq!(mesh.indices().row(0), Some(&[0u32, 1, 2][..]));
    }

    #[test]
    fn test_bounding_box() {
        let mesh = Mesh::from_source("tri", &triangle());
        let bounds = mesh.bounding_box();
        assert_eq!(bounds.min(), Some(Vec3::ZERO));
        assert_eq!(bounds.max(), Some(Vec3::new(1.0, 1.0, 0.0)));
        assert!(Mesh::new("empty", PrimitiveTopology::TriangleList).bounding_box().is_empty());
    }

    #[test]
    fn test_upload_and_release() {
        let mut backend = HeadlessBackend::default();
        let mut mesh = Mesh::from_source("tri", &triangle());
        mesh.upload(&mut backend, BufferUsageHint::Dynamic).unwrap();
        assert!(mesh.is_uploaded());
        assert_eq!(mesh.usage_hint(), Some(BufferUsageHint::Dynamic));
        // positions, normals, tex coords, indices
        assert_eq!(backend.live_buffers(), 4);

        mesh.draw(&mut backend);
        assert_eq!(backend.draws().len(), 1);
        assert_eq!(backend.draws()[0].element_count, 3);

        mesh.release(&mut backend);
        assert_eq!(backend.live_buffers(), 0);
    }

    #[test]
    fn test_failed_upload_destroys_created_buffers() {
        let mut backend = HeadlessBackend::default();
        // room for positions and normals only
        backend.set_buffer_limit(Some(2));
        let mut mesh = Mesh::from_source("tri", &triangle());

        assert!(mesh.upload(&mut backend, BufferUsageHint::Static).is_err());
        assert!(!mesh.is_uploaded());
        assert_eq!(backend.live_buffers(), 0);
    }

    #[test]
    fn test_drop_queues_buffers() {
        let mut backend = HeadlessBackend::default();
        let queue = ReleaseQueue::new();
        let mut mesh = Mesh::from_source("tri", &triangle());
        mesh.set_release_queue(queue.clone());
        mesh.upload(&mut backend, BufferUsageHint::Static).unwrap();

        drop(mesh);
        assert_eq!(queue.len(), 4);
        assert_eq!(queue.drain(&mut backend), 4);
        assert_eq!(backend.live_buffers(), 0);
    }

    #[test]
    fn test_colors_must_match_vertices() {
        let mut mesh = Mesh::from_source("tri", &triangle());
        assert!(!mesh.set_colors(&[Vec4::ONE]));
        assert!(mesh.set_colors(&[Vec4::ONE; 3]));
        assert_eq!(mesh.colors().map(|c| c.rows()), Some(3));
    }

    #[test]
    fn test_empty_mesh_uploads_nothing() {
        let mut backend = HeadlessBackend::default();
        let mut mesh = Mesh::new("empty", PrimitiveTopology::TriangleList);
        mesh.upload(&mut backend, BufferUsageHint::Static).unwrap();
        assert!(!mesh.is_uploaded());
        assert_eq!(backend.live_buffers(), 0);
    }
}
