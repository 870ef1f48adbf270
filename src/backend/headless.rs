//! Headless CPU backend for testing and offscreen use.
//!
//! Performs no GPU work. Resources live in hash maps, every draw is recorded
//! with the uniform state it was issued under, and triangle draws into a
//! bound framebuffer are rasterised on the CPU so object-id picking works
//! without GPU hardware.

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::shaders::uniforms;
use glam::{Mat4, Vec2, Vec3, Vec4};
use std::collections::HashMap;

/// Snapshot of one draw call and the state it was issued under.
#[derive(Debug, Clone)]
pub struct DrawRecord {
    pub program: Option<ProgramHandle>,
    pub program_name: Option<String>,
    pub framebuffer: Option<FramebufferHandle>,
    pub topology: PrimitiveTopology,
    pub element_count: u32,
    pub model: Mat4,
    pub object_id: u32,
    pub selection_rendering: bool,
    pub lighting_enabled: bool,
    pub use_texture: bool,
    pub texture: Option<TextureHandle>,
}

/// Counters for state changes, for asserting bind/unbind balance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommandStats {
    pub texture_binds: usize,
    pub texture_unbinds: usize,
    /// Unbinds of a unit that had nothing bound
    pub empty_unbinds: usize,
    pub program_switches: usize,
    pub clears: usize,
    pub frames: usize,
}

struct HeadlessProgram {
    name: String,
    uniforms: HashMap<String, UniformValue>,
}

struct HeadlessFramebuffer {
    width: u32,
    height: u32,
    ids: Vec<u32>,
    depth: Vec<f32>,
}

/// Headless backend implementation
pub struct HeadlessBackend {
    width: u32,
    height: u32,

    buffers: HashMap<u64, Vec<u8>>,
    textures: HashMap<u64, TextureDescriptor>,
    programs: HashMap<u64, HeadlessProgram>,
    framebuffers: HashMap<u64, HeadlessFramebuffer>,
    next_id: u64,

    current_program: Option<ProgramHandle>,
    bound_textures: HashMap<u32, TextureHandle>,
    bound_framebuffer: Option<FramebufferHandle>,

    draws: Vec<DrawRecord>,
    stats: CommandStats,
    buffer_limit: Option<usize>,
}

impl HeadlessBackend {
    pub fn new(width: u32, height: u32) -> Self {
        log::info!("HeadlessBackend: created {}x{} surface", width, height);
        Self {
            width: width.max(1),
            height: height.max(1),
            buffers: HashMap::new(),
            textures: HashMap::new(),
            programs: HashMap::new(),
            framebuffers: HashMap::new(),
            next_id: 1,
            current_program: None,
            bound_textures: HashMap::new(),
            bound_framebuffer: None,
            draws: Vec::new(),
            stats: CommandStats::default(),
            buffer_limit: None,
        }
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Draws recorded in the current frame. `begin_frame` and
    /// [`HeadlessBackend::clear_draws`] empty the list.
    pub fn draws(&self) -> &[DrawRecord] {
        &self.draws
    }

    pub fn clear_draws(&mut self) {
        self.draws.clear();
    }

    pub fn stats(&self) -> CommandStats {
        self.stats
    }

    /// Cap the number of live buffers; creating one more fails with
    /// `OutOfMemory`. `None` removes the cap.
    pub fn set_buffer_limit(&mut self, limit: Option<usize>) {
        self.buffer_limit = limit;
    }

    /// Last value written to a uniform of the given program.
    pub fn uniform(&self, program: ProgramHandle, name: &str) -> Option<UniformValue> {
        self.programs
            .get(&program.0)
            .and_then(|p| p.uniforms.get(name))
            .copied()
    }

    /// Last value written to a uniform of the current program.
    pub fn current_uniform(&self, name: &str) -> Option<UniformValue> {
        self.current_program.and_then(|p| self.uniform(p, name))
    }

    pub fn buffer_data(&self, buffer: BufferHandle) -> Option<&[u8]> {
        self.buffers.get(&buffer.0).map(Vec::as_slice)
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    pub fn live_framebuffers(&self) -> usize {
        self.framebuffers.len()
    }

    fn current_uniform_mat4(&self, name: &str) -> Mat4 {
        self.current_uniform(name)
            .and_then(|v| v.as_mat4())
            .unwrap_or(Mat4::IDENTITY)
    }

    fn current_uniform_bool(&self, name: &str) -> bool {
        self.current_uniform(name)
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    fn read_f32s(&self, buffer: BufferHandle) -> Vec<f32> {
        self.buffers
            .get(&buffer.0)
            .map(|bytes| {
                bytes
                    .chunks_exact(4)
                    .map(bytemuck::pod_read_unaligned::<f32>)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn read_u32s(&self, buffer: BufferHandle) -> Vec<u32> {
        self.buffers
            .get(&buffer.0)
            .map(|bytes| {
                bytes
                    .chunks_exact(4)
                    .map(bytemuck::pod_read_unaligned::<u32>)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Rasterise a triangle list into the bound framebuffer, writing the
    /// current object id with a less-than depth test.
    fn rasterize(&mut self, call: &DrawCall, object_id: u32) {
        let Some(fb_handle) = self.bound_framebuffer else {
            return;
        };
        if call.topology != PrimitiveTopology::TriangleList {
            return;
        }

        let mvp = self.current_uniform_mat4(uniforms::PROJECTION_MATRIX)
            * self.current_uniform_mat4(uniforms::VIEW_MATRIX)
            * self.current_uniform_mat4(uniforms::MODEL_MATRIX);

        let positions: Vec<Vec3> = self
            .read_f32s(call.positions)
            .chunks_exact(3)
            .map(|p| Vec3::new(p[0], p[1], p[2]))
            .collect();
        let indices: Vec<u32> = match call.indices {
            Some(buffer) if call.index_count > 0 => self
                .read_u32s(buffer)
                .into_iter()
                .take(call.index_count as usize)
                .collect(),
            _ => (0..call.vertex_count.min(positions.len() as u32)).collect(),
        };

        let Some(fb) = self.framebuffers.get_mut(&fb_handle.0) else {
            return;
        };
        let size = Vec2::new(fb.width as f32, fb.height as f32);

        // clip space -> (pixel x, pixel y, depth), or None behind the eye
        let project = |p: Vec3| -> Option<Vec3> {
            let clip: Vec4 = mvp * p.extend(1.0);
            if clip.w <= f32::EPSILON {
                return None;
            }
            let ndc = clip.truncate() / clip.w;
            Some(Vec3::new(
                (ndc.x * 0.5 + 0.5) * size.x,
                (0.5 - ndc.y * 0.5) * size.y,
                ndc.z,
            ))
        };

        for tri in indices.chunks_exact(3) {
            let corners: Option<Vec<Vec3>> = tri
                .iter()
                .map(|&i| positions.get(i as usize).copied().and_then(project))
                .collect();
            let Some(corners) = corners else {
                continue;
            };
            let (a, b, c) = (corners[0], corners[1], corners[2]);
            let area = edge(a, b, c);
            if area.abs() <= f32::EPSILON {
                continue;
            }

            let min_x = a.x.min(b.x).min(c.x).floor().max(0.0) as u32;
            let min_y = a.y.min(b.y).min(c.y).floor().max(0.0) as u32;
            let max_x = (a.x.max(b.x).max(c.x).ceil() as u32).min(fb.width);
            let max_y = (a.y.max(b.y).max(c.y).ceil() as u32).min(fb.height);

            for y in min_y..max_y {
                for x in min_x..max_x {
                    let p = Vec3::new(x as f32 + 0.5, y as f32 + 0.5, 0.0);
                    let w0 = edge(b, c, p) / area;
                    let w1 = edge(c, a, p) / area;
                    let w2 = edge(a, b, p) / area;
                    if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                        continue;
                    }
                    let depth = w0 * a.z + w1 * b.z + w2 * c.z;
                    let index = (y * fb.width + x) as usize;
                    if depth < fb.depth[index] {
                        fb.depth[index] = depth;
                        fb.ids[index] = object_id;
                    }
                }
            }
        }
    }
}

/// Signed area of the parallelogram spanned by `a->b` and `a->p` in the xy plane.
fn edge(a: Vec3, b: Vec3, p: Vec3) -> f32 {
    (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x)
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new(800, 600)
    }
}

impl GraphicsBackend for HeadlessBackend {
    fn name(&self) -> &'static str {
        "Headless Backend"
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.width = width;
            self.height = height;
        }
    }

    fn surface_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn begin_frame(&mut self) -> BackendResult<()> {
        self.stats.frames += 1;
        self.draws.clear();
        log::trace!("HeadlessBackend: begin frame {}", self.stats.frames);
        Ok(())
    }

    fn create_buffer(&mut self, desc: &BufferDescriptor, data: &[u8]) -> BackendResult<BufferHandle> {
        if data.len() as u64 > desc.size {
            return Err(BackendError::BufferCreationFailed(format!(
                "{:?}: {} bytes of data for a {} byte buffer",
                desc.label,
                data.len(),
                desc.size
            )));
        }
        if self.buffer_limit.is_some_and(|limit| self.buffers.len() >= limit) {
            return Err(BackendError::OutOfMemory);
        }
        log::trace!(
            "HeadlessBackend: creating buffer {:?} (size: {}, {:?})",
            desc.label,
            desc.size,
            desc.hint
        );
        let mut contents = vec![0u8; desc.size as usize];
        contents[..data.len()].copy_from_slice(data);
        let id = self.allocate_id();
        self.buffers.insert(id, contents);
        Ok(BufferHandle(id))
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) {
        log::trace!(
            "HeadlessBackend: write_buffer {:?} offset={} len={}",
            buffer,
            offset,
            data.len()
        );
        match self.buffers.get_mut(&buffer.0) {
            Some(contents) => {
                let start = offset as usize;
                let end = start + data.len();
                if end > contents.len() {
                    contents.resize(end, 0);
                }
                contents[start..end].copy_from_slice(data);
            }
            None => log::warn!("HeadlessBackend: write to unknown buffer {:?}", buffer),
        }
    }

    fn create_texture(&mut self, desc: &TextureDescriptor, data: &[u8]) -> BackendResult<TextureHandle> {
        let expected = (desc.width * desc.height * desc.format.bytes_per_pixel()) as usize;
        if data.len() != expected {
            return Err(BackendError::TextureCreationFailed(format!(
                "{:?}: expected {} bytes, got {}",
                desc.label,
                expected,
                data.len()
            )));
        }
        log::trace!(
            "HeadlessBackend: creating texture {:?} ({}x{})",
            desc.label,
            desc.width,
            desc.height
        );
        let id = self.allocate_id();
        self.textures.insert(id, desc.clone());
        Ok(TextureHandle(id))
    }

    fn create_program(&mut self, desc: &ProgramDescriptor) -> BackendResult<ProgramHandle> {
        // Stand-in for compilation: both entry points must be present.
        let fragment = desc.fragment_source.as_deref().unwrap_or(&desc.vertex_source);
        if !desc.vertex_source.contains("fn vs_main") || !fragment.contains("fn fs_main") {
            return Err(BackendError::ProgramCreationFailed(format!(
                "{}: missing vs_main/fs_main entry point",
                desc.name
            )));
        }
        log::trace!("HeadlessBackend: creating program '{}'", desc.name);
        let id = self.allocate_id();
        self.programs.insert(
            id,
            HeadlessProgram {
                name: desc.name.clone(),
                uniforms: HashMap::new(),
            },
        );
        Ok(ProgramHandle(id))
    }

    fn create_framebuffer(&mut self, width: u32, height: u32) -> BackendResult<FramebufferHandle> {
        if width == 0 || height == 0 {
            return Err(BackendError::FramebufferCreationFailed(format!(
                "invalid size {}x{}",
                width, height
            )));
        }
        log::trace!("HeadlessBackend: creating framebuffer ({}x{})", width, height);
        let pixels = (width * height) as usize;
        let id = self.allocate_id();
        self.framebuffers.insert(
            id,
            HeadlessFramebuffer {
                width,
                height,
                ids: vec![0; pixels],
                depth: vec![1.0; pixels],
            },
        );
        Ok(FramebufferHandle(id))
    }

    fn use_program(&mut self, program: ProgramHandle) {
        log::trace!("HeadlessBackend: use program {:?}", program);
        if self.current_program != Some(program) {
            self.stats.program_switches += 1;
        }
        self.current_program = Some(program);
    }

    fn current_program(&self) -> Option<ProgramHandle> {
        self.current_program
    }

    fn set_uniform(&mut self, name: &str, value: UniformValue) {
        let Some(program) = self.current_program.and_then(|p| self.programs.get_mut(&p.0)) else {
            log::trace!("HeadlessBackend: uniform '{}' set without a program", name);
            return;
        };
        program.uniforms.insert(name.to_string(), value);
    }

    fn bind_texture(&mut self, unit: u32, texture: TextureHandle) {
        log::trace!("HeadlessBackend: bind texture {:?} to unit {}", texture, unit);
        self.stats.texture_binds += 1;
        self.bound_textures.insert(unit, texture);
    }

    fn unbind_texture(&mut self, unit: u32) {
        if self.bound_textures.remove(&unit).is_some() {
            self.stats.texture_unbinds += 1;
        } else {
            self.stats.empty_unbinds += 1;
            log::warn!("HeadlessBackend: unbind of empty texture unit {}", unit);
        }
    }

    fn bound_texture(&self, unit: u32) -> Option<TextureHandle> {
        self.bound_textures.get(&unit).copied()
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferHandle>) {
        log::trace!("HeadlessBackend: bind framebuffer {:?}", framebuffer);
        self.bound_framebuffer = framebuffer;
    }

    fn bound_framebuffer(&self) -> Option<FramebufferHandle> {
        self.bound_framebuffer
    }

    fn clear(&mut self, _color: [f32; 4], depth: f32) {
        self.stats.clears += 1;
        if let Some(fb) = self
            .bound_framebuffer
            .and_then(|h| self.framebuffers.get_mut(&h.0))
        {
            fb.ids.fill(0);
            fb.depth.fill(depth);
        }
    }

    fn draw_mesh(&mut self, call: &DrawCall) {
        let object_id = self
            .current_uniform(uniforms::OBJECT_ID)
            .and_then(|v| v.as_u32())
            .unwrap_or(0);

        let record = DrawRecord {
            program: self.current_program,
            program_name: self
                .current_program
                .and_then(|p| self.programs.get(&p.0))
                .map(|p| p.name.clone()),
            framebuffer: self.bound_framebuffer,
            topology: call.topology,
            element_count: call.element_count(),
            model: self.current_uniform_mat4(uniforms::MODEL_MATRIX),
            object_id,
            selection_rendering: self.current_uniform_bool(uniforms::SELECTION_RENDERING),
            lighting_enabled: self.current_uniform_bool(uniforms::LIGHTING_ENABLED),
            use_texture: self.current_uniform_bool(uniforms::USE_TEXTURE),
            texture: self.bound_texture(0),
        };
        log::trace!("HeadlessBackend: draw {:?}", record);
        self.draws.push(record);

        self.rasterize(call, object_id);
    }

    fn read_pixel_id(&mut self, framebuffer: FramebufferHandle, x: u32, y: u32) -> BackendResult<u32> {
        let fb = self
            .framebuffers
            .get(&framebuffer.0)
            .ok_or(BackendError::InvalidHandle {
                kind: "framebuffer",
                id: framebuffer.0,
            })?;
        if x >= fb.width || y >= fb.height {
            return Err(BackendError::ReadbackFailed(format!(
                "pixel ({}, {}) outside {}x{} framebuffer",
                x, y, fb.width, fb.height
            )));
        }
        Ok(fb.ids[(y * fb.width + x) as usize])
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        log::trace!("HeadlessBackend: destroying buffer {:?}", buffer);
        self.buffers.remove(&buffer.0);
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        log::trace!("HeadlessBackend: destroying texture {:?}", texture);
        self.textures.remove(&texture.0);
        self.bound_textures.retain(|_, bound| *bound != texture);
    }

    fn destroy_program(&mut self, program: ProgramHandle) {
        log::trace!("HeadlessBackend: destroying program {:?}", program);
        self.programs.remove(&program.0);
        if self.current_program == Some(program) {
            self.current_program = None;
        }
    }

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferHandle) {
        log::trace!("HeadlessBackend: destroying framebuffer {:?}", framebuffer);
        self.framebuffers.remove(&framebuffer.0);
        if self.bound_framebuffer == Some(framebuffer) {
            self.bound_framebuffer = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn program(backend: &mut HeadlessBackend) -> ProgramHandle {
        backend
            .create_program(&ProgramDescriptor {
                name: "test".into(),
                vertex_source: crate::shaders::DEFAULT_PROGRAM.into(),
                fragment_source: None,
            })
            .unwrap()
    }

    fn buffer(backend: &mut HeadlessBackend, data: &[u8]) -> BufferHandle {
        backend
            .create_buffer(
                &BufferDescriptor {
                    label: None,
                    size: data.len() as u64,
                    usage: BufferUsage::VERTEX,
                    hint: BufferUsageHint::Static,
                },
                data,
            )
            .unwrap()
    }

    #[test]
    fn test_program_requires_entry_points() {
        let mut backend = HeadlessBackend::default();
        let result = backend.create_program(&ProgramDescriptor {
            name: "broken".into(),
            vertex_source: "fn main() {}".into(),
            fragment_source: None,
        });
        assert!(matches!(result, Err(BackendError::ProgramCreationFailed(_))));
    }

    #[test]
    fn test_uniforms_are_per_program() {
        let mut backend = HeadlessBackend::default();
        let a = program(&mut backend);
        let b = program(&mut backend);

        backend.use_program(a);
        backend.set_uniform("objectId", UniformValue::UInt(3));
        backend.use_program(b);
        backend.set_uniform("objectId", UniformValue::UInt(9));

        assert_eq!(backend.uniform(a, "objectId"), Some(UniformValue::UInt(3)));
        assert_eq!(backend.uniform(b, "objectId"), Some(UniformValue::UInt(9)));
        assert_eq!(backend.stats().program_switches, 2);
    }

    #[test]
    fn test_unbind_empty_unit_is_counted_not_fatal() {
        let mut backend = HeadlessBackend::default();
        backend.unbind_texture(0);
        assert_eq!(backend.stats().empty_unbinds, 1);
        assert_eq!(backend.stats().texture_unbinds, 0);
    }

    #[test]
    fn test_texture_size_is_validated() {
        let mut backend = HeadlessBackend::default();
        let desc = TextureDescriptor {
            width: 2,
            height: 2,
            ..Default::default()
        };
        assert!(backend.create_texture(&desc, &[0u8; 4]).is_err());
        assert!(backend.create_texture(&desc, &[0u8; 16]).is_ok());
    }

    #[test]
    fn test_rasterize_writes_object_id() {
        let mut backend = HeadlessBackend::new(4, 4);
        let p = program(&mut backend);
        backend.use_program(p);
        backend.set_uniform(uniforms::OBJECT_ID, UniformValue::UInt(7));

        // Two triangles covering the whole clip-space square
        let positions: [f32; 12] = [
            -1.0, -1.0, 0.5, 1.0, -1.0, 0.5, 1.0, 1.0, 0.5, -1.0, 1.0, 0.5,
        ];
        let indices: [u32; 6] = [0, 1, 2, 0, 2, 3];
        let positions = buffer(&mut backend, bytemuck::cast_slice(&positions));
        let indices = buffer(&mut backend, bytemuck::cast_slice(&indices));

        let fb = backend.create_framebuffer(4, 4).unwrap();
        backend.bind_framebuffer(Some(fb));
        backend.clear([0.0; 4], 1.0);
        backend.draw_mesh(&DrawCall {
            topology: PrimitiveTopology::TriangleList,
            positions,
            normals: None,
            tex_coords: None,
            colors: None,
            indices: Some(indices),
            vertex_count: 4,
            index_count: 6,
        });

        for (x, y) in [(0, 0), (3, 0), (0, 3), (2, 2)] {
            assert_eq!(backend.read_pixel_id(fb, x, y).unwrap(), 7);
        }
        assert!(backend.read_pixel_id(fb, 4, 0).is_err());
        assert_eq!(backend.draws().len(), 1);
        assert_eq!(backend.draws()[0].object_id, 7);
    }

    #[test]
    fn test_begin_frame_clears_draw_log() {
        let mut backend = HeadlessBackend::new(4, 4);
        let p = program(&mut backend);
        backend.use_program(p);
        let positions = buffer(&mut backend, &[0u8; 36]);
        let call = DrawCall {
            topology: PrimitiveTopology::TriangleList,
            positions,
            normals: None,
            tex_coords: None,
            colors: None,
            indices: None,
            vertex_count: 3,
            index_count: 0,
        };

        for _ in 0..3 {
            backend.begin_frame().unwrap();
            backend.draw_mesh(&call);
            backend.draw_mesh(&call);
            backend.end_frame().unwrap();
        }
        assert_eq!(backend.draws().len(), 2);
        assert_eq!(backend.stats().frames, 3);
    }

    #[test]
    fn test_buffer_limit() {
        let mut backend = HeadlessBackend::default();
        backend.set_buffer_limit(Some(1));
        buffer(&mut backend, &[0u8; 4]);
        let desc = BufferDescriptor {
            label: None,
            size: 4,
            usage: BufferUsage::VERTEX,
            hint: BufferUsageHint::Static,
        };
        assert!(matches!(
            backend.create_buffer(&desc, &[0u8; 4]),
            Err(BackendError::OutOfMemory)
        ));

        backend.set_buffer_limit(None);
        assert!(backend.create_buffer(&desc, &[0u8; 4]).is_ok());
    }

    #[test]
    fn test_default_backend() {
        let backend = HeadlessBackend::default();
        assert_eq!(backend.name(), "Headless Backend");
        assert_eq!(backend.surface_size(), (800, 600));
        assert_eq!(backend.bound_framebuffer(), None);
        assert_eq!(backend.live_buffers(), 0);
    }
}
