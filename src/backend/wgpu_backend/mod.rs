//! wgpu backend implementation
//!
//! Uniform writes land in a fixed [`StandardUniforms`] block per program.
//! Draws are buffered per render target together with a snapshot of that
//! block and replayed in one render pass when the target changes, on
//! readback, or at the end of the frame.

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::shaders::{uniforms, MAX_SHADER_LIGHTS};
use bytemuck::{Pod, Zeroable};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::num::NonZeroU64;
use std::sync::Arc;
use wgpu::util::DeviceExt;

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
const OBJECT_ID_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R32Uint;

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct GpuLight {
    /// xyz = position, w = radius
    position: [f32; 4],
    /// rgb = color, w = intensity
    color: [f32; 4],
    /// xyz = direction, w = type (0 point, 1 spot, 2 directional)
    direction: [f32; 4],
    /// x = cos inner cone, y = cos outer cone
    params: [f32; 4],
}

/// CPU mirror of the `Uniforms` struct in the built-in WGSL programs.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct StandardUniforms {
    model: [[f32; 4]; 4],
    view: [[f32; 4]; 4],
    projection: [[f32; 4]; 4],
    diffuse: [f32; 4],
    ambient: [f32; 4],
    specular: [f32; 4],
    emissive: [f32; 4],
    material: [f32; 4],
    flags: [u32; 4],
    ids: [u32; 4],
    lights: [GpuLight; MAX_SHADER_LIGHTS],
}

impl Default for StandardUniforms {
    fn default() -> Self {
        let identity = glam::Mat4::IDENTITY.to_cols_array_2d();
        Self {
            model: identity,
            view: identity,
            projection: identity,
            diffuse: [1.0; 4],
            ambient: [0.2, 0.2, 0.2, 1.0],
            specular: [0.0; 4],
            emissive: [0.0; 4],
            material: [32.0, 1.0, 0.0, 0.0],
            flags: [0; 4],
            ids: [0; 4],
            lights: [GpuLight::zeroed(); MAX_SHADER_LIGHTS],
        }
    }
}

/// Split `lightColor[3]` into `("lightColor", Some(3))`.
fn split_indexed(name: &str) -> (&str, Option<usize>) {
    if let Some(stripped) = name.strip_suffix(']') {
        if let Some((base, index)) = stripped.split_once('[') {
            return (base, index.parse().ok());
        }
    }
    (name, None)
}

impl StandardUniforms {
    /// Store a named uniform. Returns false for names the block has no slot for.
    fn apply(&mut self, name: &str, value: UniformValue) -> bool {
        let flag = |v: UniformValue| v.as_bool().unwrap_or(false) as u32;
        let vec4 = |v: UniformValue| v.as_vec4().map(|v| v.to_array());

        match split_indexed(name) {
            (uniforms::MODEL_MATRIX, None) => value.as_mat4().map(|m| self.model = m.to_cols_array_2d()).is_some(),
            (uniforms::VIEW_MATRIX, None) => value.as_mat4().map(|m| self.view = m.to_cols_array_2d()).is_some(),
            (uniforms::PROJECTION_MATRIX, None) => {
                value.as_mat4().map(|m| self.projection = m.to_cols_array_2d()).is_some()
            }
            (uniforms::DIFFUSE_COLOR, None) => vec4(value).map(|v| self.diffuse = v).is_some(),
            (uniforms::AMBIENT_COLOR, None) => vec4(value).map(|v| self.ambient = v).is_some(),
            (uniforms::SPECULAR_COLOR, None) => vec4(value).map(|v| self.specular = v).is_some(),
            (uniforms::EMISSIVE_COLOR, None) => vec4(value).map(|v| self.emissive = v).is_some(),
            (uniforms::SHININESS, None) => value.as_f32().map(|v| self.material[0] = v).is_some(),
            (uniforms::ALPHA, None) => value.as_f32().map(|v| self.material[1] = v).is_some(),
            (uniforms::LIGHTING_ENABLED, None) => {
                self.flags[0] = flag(value);
                true
            }
            (uniforms::USE_VERTEX_COLOR, None) => {
                self.flags[1] = flag(value);
                true
            }
            (uniforms::USE_TEXTURE, None) => {
                self.flags[2] = flag(value);
                true
            }
            (uniforms::SELECTION_RENDERING, None) => {
                self.flags[3] = flag(value);
                true
            }
            (uniforms::OBJECT_ID, None) => value.as_u32().map(|v| self.ids[0] = v).is_some(),
            (uniforms::LIGHT_COUNT, None) => value
                .as_u32()
                .map(|v| self.ids[1] = v.min(MAX_SHADER_LIGHTS as u32))
                .is_some(),
            (base, Some(index)) if index < MAX_SHADER_LIGHTS => {
                let Some(v) = vec4(value) else {
                    return false;
                };
                let light = &mut self.lights[index];
                match base {
                    uniforms::LIGHT_POSITION => light.position = v,
                    uniforms::LIGHT_COLOR => light.color = v,
                    uniforms::LIGHT_DIRECTION => light.direction = v,
                    uniforms::LIGHT_PARAMS => light.params = v,
                    _ => return false,
                }
                true
            }
            _ => false,
        }
    }
}

fn vertex_attribute(location: u32, format: wgpu::VertexFormat) -> wgpu::VertexAttribute {
    wgpu::VertexAttribute {
        format,
        offset: 0,
        shader_location: location,
    }
}

fn vertex_layout(stride: u64, attributes: &[wgpu::VertexAttribute]) -> wgpu::VertexBufferLayout<'_> {
    wgpu::VertexBufferLayout {
        array_stride: stride,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RenderTarget {
    Surface,
    Framebuffer(u64),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum TargetKind {
    Surface,
    ObjectId,
}

impl RenderTarget {
    fn kind(&self) -> TargetKind {
        match self {
            RenderTarget::Surface => TargetKind::Surface,
            RenderTarget::Framebuffer(_) => TargetKind::ObjectId,
        }
    }
}

/// Buffered draw with the uniform state it was issued under
struct PendingDraw {
    program: u64,
    uniforms: StandardUniforms,
    texture: Option<u64>,
    call: DrawCall,
}

/// Pending render pass with buffered draws
struct PendingPass {
    target: RenderTarget,
    clear: Option<([f32; 4], f32)>,
    draws: Vec<PendingDraw>,
}

struct WgpuProgram {
    name: String,
    vertex: wgpu::ShaderModule,
    fragment: Option<wgpu::ShaderModule>,
    uniforms: StandardUniforms,
}

struct WgpuTexture {
    #[allow(dead_code)]
    texture: wgpu::Texture,
    bind_group: wgpu::BindGroup,
}

struct WgpuFramebuffer {
    width: u32,
    height: u32,
    color: wgpu::Texture,
    color_view: wgpu::TextureView,
    depth_view: wgpu::TextureView,
}

/// wgpu backend implementation
pub struct WgpuBackend {
    #[allow(dead_code)]
    instance: wgpu::Instance,
    surface: wgpu::Surface<'static>,
    #[allow(dead_code)]
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface_config: wgpu::SurfaceConfiguration,
    surface_depth_view: wgpu::TextureView,
    current_texture: Option<wgpu::SurfaceTexture>,

    uniform_layout: wgpu::BindGroupLayout,
    texture_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    uniform_stride: u64,
    default_texture: WgpuTexture,
    zero_buffer: wgpu::Buffer,

    // Resource storage
    buffers: HashMap<u64, wgpu::Buffer>,
    textures: HashMap<u64, WgpuTexture>,
    programs: HashMap<u64, WgpuProgram>,
    framebuffers: HashMap<u64, WgpuFramebuffer>,
    pipelines: HashMap<(u64, PrimitiveTopology, TargetKind), wgpu::RenderPipeline>,
    next_id: u64,

    // Bound state
    current_program: Option<ProgramHandle>,
    bound_texture: Option<u64>,
    target: RenderTarget,

    pending: Option<PendingPass>,
}

impl WgpuBackend {
    fn convert_texture_format(format: TextureFormat) -> wgpu::TextureFormat {
        match format {
            TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
            TextureFormat::Rgba8UnormSrgb => wgpu::TextureFormat::Rgba8UnormSrgb,
            TextureFormat::Bgra8Unorm => wgpu::TextureFormat::Bgra8Unorm,
            TextureFormat::Bgra8UnormSrgb => wgpu::TextureFormat::Bgra8UnormSrgb,
            TextureFormat::Depth32Float => wgpu::TextureFormat::Depth32Float,
            TextureFormat::R32Uint => wgpu::TextureFormat::R32Uint,
        }
    }

    fn convert_buffer_usage(usage: BufferUsage) -> wgpu::BufferUsages {
        let mut result = wgpu::BufferUsages::empty();
        if usage.contains(BufferUsage::MAP_READ) {
            result |= wgpu::BufferUsages::MAP_READ;
        }
        if usage.contains(BufferUsage::COPY_SRC) {
            result |= wgpu::BufferUsages::COPY_SRC;
        }
        if usage.contains(BufferUsage::COPY_DST) {
            result |= wgpu::BufferUsages::COPY_DST;
        }
        if usage.contains(BufferUsage::INDEX) {
            result |= wgpu::BufferUsages::INDEX;
        }
        if usage.contains(BufferUsage::VERTEX) {
            result |= wgpu::BufferUsages::VERTEX;
        }
        if usage.contains(BufferUsage::UNIFORM) {
            result |= wgpu::BufferUsages::UNIFORM;
        }
        result
    }

    fn convert_topology(topology: PrimitiveTopology) -> wgpu::PrimitiveTopology {
        match topology {
            PrimitiveTopology::PointList => wgpu::PrimitiveTopology::PointList,
            PrimitiveTopology::LineList => wgpu::PrimitiveTopology::LineList,
            PrimitiveTopology::LineStrip => wgpu::PrimitiveTopology::LineStrip,
            PrimitiveTopology::TriangleList => wgpu::PrimitiveTopology::TriangleList,
            PrimitiveTopology::TriangleStrip => wgpu::PrimitiveTopology::TriangleStrip,
        }
    }

    fn convert_filter_mode(mode: FilterMode) -> wgpu::FilterMode {
        match mode {
            FilterMode::Nearest => wgpu::FilterMode::Nearest,
            FilterMode::Linear => wgpu::FilterMode::Linear,
        }
    }

    fn convert_address_mode(mode: AddressMode) -> wgpu::AddressMode {
        match mode {
            AddressMode::ClampToEdge => wgpu::AddressMode::ClampToEdge,
            AddressMode::Repeat => wgpu::AddressMode::Repeat,
            AddressMode::MirrorRepeat => wgpu::AddressMode::MirrorRepeat,
        }
    }

    /// Clamp a requested size to device limits while maintaining aspect ratio
    fn clamp_size(device: &wgpu::Device, width: u32, height: u32) -> (u32, u32) {
        let max_size = device.limits().max_texture_dimension_2d;
        if width > max_size || height > max_size {
            let scale = (max_size as f32 / width as f32).min(max_size as f32 / height as f32);
            (
                ((width as f32 * scale) as u32).max(1),
                ((height as f32 * scale) as u32).max(1),
            )
        } else {
            (width.max(1), height.max(1))
        }
    }

    fn create_depth_view(device: &wgpu::Device, width: u32, height: u32) -> wgpu::TextureView {
        device
            .create_texture(&wgpu::TextureDescriptor {
                label: Some("Depth Texture"),
                size: wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: DEPTH_FORMAT,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                view_formats: &[],
            })
            .create_view(&wgpu::TextureViewDescriptor::default())
    }

    /// Upload RGBA texels and build the sampling bind group.
    fn upload_texture(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layout: &wgpu::BindGroupLayout,
        desc: &TextureDescriptor,
        data: &[u8],
    ) -> WgpuTexture {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: desc.label.as_deref(),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::convert_texture_format(desc.format),
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(desc.width * desc.format.bytes_per_pixel()),
                rows_per_image: Some(desc.height),
            },
            wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let address_mode = Self::convert_address_mode(desc.address_mode);
        let filter = Self::convert_filter_mode(desc.filter);
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: desc.label.as_deref(),
            address_mode_u: address_mode,
            address_mode_v: address_mode,
            address_mode_w: address_mode,
            mag_filter: filter,
            min_filter: filter,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: desc.label.as_deref(),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&sampler),
                },
            ],
        });

        WgpuTexture { texture, bind_group }
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

impl WgpuBackend {
    /// Create the backend for a window, blocking on adapter and device requests
    #[cfg(not(target_arch = "wasm32"))]
    pub fn new(window: Arc<winit::window::Window>, vsync: bool) -> BackendResult<Self> {
        pollster::block_on(Self::new_async(window, vsync))
    }

    pub async fn new_async(window: Arc<winit::window::Window>, vsync: bool) -> BackendResult<Self> {
        let (instance, surface, adapter, device, queue) = Self::init_native(window.clone()).await?;

        let size = window.inner_size();
        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .ok_or_else(|| BackendError::SurfaceCreationFailed("Surface reports no formats".into()))?;

        let present_mode = if vsync {
            wgpu::PresentMode::AutoVsync
        } else {
            wgpu::PresentMode::AutoNoVsync
        };

        let (width, height) = Self::clamp_size(&device, size.width, size.height);

        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width,
            height,
            present_mode,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };

        surface.configure(&device, &surface_config);
        let surface_depth_view = Self::create_depth_view(&device, width, height);

        let uniform_size = std::mem::size_of::<StandardUniforms>() as u64;
        let alignment = device.limits().min_uniform_buffer_offset_alignment as u64;
        let uniform_stride = uniform_size.div_ceil(alignment) * alignment;

        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Uniforms Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: NonZeroU64::new(uniform_size),
                },
                count: None,
            }],
        });

        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Texture Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Scene Pipeline Layout"),
            bind_group_layouts: &[&uniform_layout, &texture_layout],
            push_constant_ranges: &[],
        });

        // Sampled when no texture is bound so the bind group is always valid
        let default_texture = Self::upload_texture(
            &device,
            &queue,
            &texture_layout,
            &TextureDescriptor {
                label: Some("White Texture".into()),
                format: TextureFormat::Rgba8Unorm,
                ..Default::default()
            },
            &[255; 4],
        );

        let zero_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Zero Attributes"),
            size: 16 * 1024,
            usage: wgpu::BufferUsages::VERTEX,
            mapped_at_creation: false,
        });

        Ok(Self {
            instance,
            surface,
            adapter,
            device,
            queue,
            surface_config,
            surface_depth_view,
            current_texture: None,
            uniform_layout,
            texture_layout,
            pipeline_layout,
            uniform_stride,
            default_texture,
            zero_buffer,
            buffers: HashMap::new(),
            textures: HashMap::new(),
            programs: HashMap::new(),
            framebuffers: HashMap::new(),
            pipelines: HashMap::new(),
            next_id: 1,
            current_program: None,
            bound_texture: None,
            target: RenderTarget::Surface,
            pending: None,
        })
    }

    /// Native initialization
    async fn init_native(
        window: Arc<winit::window::Window>,
    ) -> BackendResult<(
        wgpu::Instance,
        wgpu::Surface<'static>,
        wgpu::Adapter,
        wgpu::Device,
        wgpu::Queue,
    )> {
        // On Windows, try Vulkan first to avoid D3D12 debug layer validation errors
        let backends = if std::env::var("WGPU_BACKEND").is_ok() {
            wgpu::Backends::all()
        } else {
            #[cfg(target_os = "windows")]
            {
                wgpu::Backends::VULKAN
            }
            #[cfg(not(target_os = "windows"))]
            {
                wgpu::Backends::all()
            }
        };

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends,
            ..Default::default()
        });

        let surface = instance
            .create_surface(window.clone())
            .map_err(|e| BackendError::SurfaceCreationFailed(e.to_string()))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await;

        // If no adapter found with preferred backend, try with all backends
        let (instance, surface, adapter) = if adapter.is_none() && backends != wgpu::Backends::all() {
            log::warn!("Preferred backend not available, falling back to all backends");
            let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
                backends: wgpu::Backends::all(),
                ..Default::default()
            });
            let surface = instance
                .create_surface(window.clone())
                .map_err(|e| BackendError::SurfaceCreationFailed(e.to_string()))?;
            let adapter = instance
                .request_adapter(&wgpu::RequestAdapterOptions {
                    power_preference: wgpu::PowerPreference::HighPerformance,
                    compatible_surface: Some(&surface),
                    force_fallback_adapter: false,
                })
                .await
                .ok_or_else(|| BackendError::InitializationFailed("No suitable adapter found".into()))?;
            (instance, surface, adapter)
        } else {
            let adapter = adapter
                .ok_or_else(|| BackendError::InitializationFailed("No suitable adapter found".into()))?;
            (instance, surface, adapter)
        };

        let adapter_info = adapter.get_info();
        log::info!(
            "Selected GPU: {} ({:?} backend)",
            adapter_info.name,
            adapter_info.backend
        );

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Scene Graph Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                },
                None,
            )
            .await
            .map_err(|e| BackendError::DeviceCreationFailed(e.to_string()))?;

        Ok((instance, surface, adapter, device, queue))
    }

    /// Get reference to the wgpu device
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// Get reference to the wgpu queue
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    fn ensure_pipeline(&mut self, program: u64, topology: PrimitiveTopology, kind: TargetKind) {
        let key = (program, topology, kind);
        if self.pipelines.contains_key(&key) {
            return;
        }
        let Some(prog) = self.programs.get(&program) else {
            return;
        };

        let (format, blend) = match kind {
            TargetKind::Surface => (self.surface_config.format, Some(wgpu::BlendState::ALPHA_BLENDING)),
            TargetKind::ObjectId => (OBJECT_ID_FORMAT, None),
        };

        let position = [vertex_attribute(attribute::POSITION, wgpu::VertexFormat::Float32x3)];
        let normal = [vertex_attribute(attribute::NORMAL, wgpu::VertexFormat::Float32x3)];
        let tex_coord = [vertex_attribute(attribute::TEX_COORD, wgpu::VertexFormat::Float32x2)];
        let color = [vertex_attribute(attribute::COLOR, wgpu::VertexFormat::Float32x4)];
        // One buffer per attribute
        let vertex_buffers = [
            vertex_layout(12, &position),
            vertex_layout(12, &normal),
            vertex_layout(8, &tex_coord),
            vertex_layout(16, &color),
        ];
        let targets = [Some(wgpu::ColorTargetState {
            format,
            blend,
            write_mask: wgpu::ColorWrites::ALL,
        })];

        let pipeline = self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(prog.name.as_str()),
            layout: Some(&self.pipeline_layout),
            vertex: wgpu::VertexState {
                module: &prog.vertex,
                entry_point: "vs_main",
                buffers: &vertex_buffers,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: prog.fragment.as_ref().unwrap_or(&prog.vertex),
                entry_point: "fs_main",
                targets: &targets,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: Self::convert_topology(topology),
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
        });

        log::debug!("WgpuBackend: built pipeline for '{}' ({:?}, {:?})", prog.name, topology, kind);
        self.pipelines.insert(key, pipeline);
    }

    /// Grow the zero-filled buffer that stands in for missing attributes
    fn ensure_zero_buffer(&mut self, vertex_count: u32) {
        let needed = vertex_count as u64 * 16;
        if needed > self.zero_buffer.size() {
            self.zero_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Zero Attributes"),
                size: needed.next_power_of_two(),
                usage: wgpu::BufferUsages::VERTEX,
                mapped_at_creation: false,
            });
        }
    }

    /// Record and submit the buffered pass
    fn flush(&mut self) {
        let Some(pass) = self.pending.take() else {
            return;
        };
        if pass.draws.is_empty() && pass.clear.is_none() {
            return;
        }

        let kind = pass.target.kind();
        for draw in &pass.draws {
            self.ensure_pipeline(draw.program, draw.call.topology, kind);
        }
        let max_vertices = pass.draws.iter().map(|d| d.call.vertex_count).max().unwrap_or(0);
        self.ensure_zero_buffer(max_vertices);

        let uniform_size = std::mem::size_of::<StandardUniforms>();
        let stride = self.uniform_stride as usize;
        let mut uniform_bytes = vec![0u8; stride * pass.draws.len().max(1)];
        for (i, draw) in pass.draws.iter().enumerate() {
            let offset = i * stride;
            uniform_bytes[offset..offset + uniform_size].copy_from_slice(bytemuck::bytes_of(&draw.uniforms));
        }
        let uniform_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Draw Uniforms"),
            contents: &uniform_bytes,
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let uniform_bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Draw Uniforms"),
            layout: &self.uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &uniform_buffer,
                    offset: 0,
                    size: NonZeroU64::new(uniform_size as u64),
                }),
            }],
        });

        let surface_view: wgpu::TextureView;
        let (color_view, depth_view) = match pass.target {
            RenderTarget::Surface => {
                let Some(texture) = self.current_texture.as_ref() else {
                    log::warn!(
                        "WgpuBackend: dropping {} draws to the surface outside a frame",
                        pass.draws.len()
                    );
                    return;
                };
                surface_view = texture.texture.create_view(&wgpu::TextureViewDescriptor::default());
                (&surface_view, &self.surface_depth_view)
            }
            RenderTarget::Framebuffer(id) => {
                let Some(fb) = self.framebuffers.get(&id) else {
                    log::warn!("WgpuBackend: dropping draws to destroyed framebuffer {}", id);
                    return;
                };
                (&fb.color_view, &fb.depth_view)
            }
        };

        let (color_load, depth_load) = match pass.clear {
            Some((color, depth)) => {
                // object-id targets always clear to "no object"
                let color = match kind {
                    TargetKind::Surface => wgpu::Color {
                        r: color[0] as f64,
                        g: color[1] as f64,
                        b: color[2] as f64,
                        a: color[3] as f64,
                    },
                    TargetKind::ObjectId => wgpu::Color::TRANSPARENT,
                };
                (wgpu::LoadOp::Clear(color), wgpu::LoadOp::Clear(depth))
            }
            None => (wgpu::LoadOp::Load, wgpu::LoadOp::Load),
        };

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Scene Encoder"),
        });

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Scene Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: color_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: color_load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: depth_load,
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            for (i, draw) in pass.draws.iter().enumerate() {
                let key = (draw.program, draw.call.topology, kind);
                let Some(pipeline) = self.pipelines.get(&key) else {
                    continue;
                };
                let Some(positions) = self.buffers.get(&draw.call.positions.0) else {
                    continue;
                };

                render_pass.set_pipeline(pipeline);
                render_pass.set_bind_group(0, &uniform_bind_group, &[(i * stride) as u32]);
                let texture_group = draw
                    .texture
                    .and_then(|t| self.textures.get(&t))
                    .map(|t| &t.bind_group)
                    .unwrap_or(&self.default_texture.bind_group);
                render_pass.set_bind_group(1, texture_group, &[]);

                render_pass.set_vertex_buffer(attribute::POSITION, positions.slice(..));
                for (slot, buffer) in [
                    (attribute::NORMAL, draw.call.normals),
                    (attribute::TEX_COORD, draw.call.tex_coords),
                    (attribute::COLOR, draw.call.colors),
                ] {
                    let buffer = buffer
                        .and_then(|b| self.buffers.get(&b.0))
                        .unwrap_or(&self.zero_buffer);
                    render_pass.set_vertex_buffer(slot, buffer.slice(..));
                }

                match draw.call.indices.and_then(|b| self.buffers.get(&b.0)) {
                    Some(indices) if draw.call.index_count > 0 => {
                        render_pass.set_index_buffer(indices.slice(..), wgpu::IndexFormat::Uint32);
                        render_pass.draw_indexed(0..draw.call.index_count, 0, 0..1);
                    }
                    _ => render_pass.draw(0..draw.call.vertex_count, 0..1),
                }
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
    }
}

impl GraphicsBackend for WgpuBackend {
    fn name(&self) -> &'static str {
        "wgpu Backend"
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.flush();
            let (width, height) = Self::clamp_size(&self.device, width, height);
            self.surface_config.width = width;
            self.surface_config.height = height;
            self.surface.configure(&self.device, &self.surface_config);
            self.surface_depth_view = Self::create_depth_view(&self.device, width, height);
        }
    }

    fn surface_size(&self) -> (u32, u32) {
        (self.surface_config.width, self.surface_config.height)
    }

    fn begin_frame(&mut self) -> BackendResult<()> {
        let output = self.surface.get_current_texture().map_err(|e| match e {
            wgpu::SurfaceError::Lost => BackendError::SurfaceLost,
            wgpu::SurfaceError::OutOfMemory => BackendError::OutOfMemory,
            _ => BackendError::AcquireImageFailed(e.to_string()),
        })?;
        self.current_texture = Some(output);
        Ok(())
    }

    fn end_frame(&mut self) -> BackendResult<()> {
        self.flush();
        if let Some(texture) = self.current_texture.take() {
            texture.present();
        }
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
        // Rewritable buffers need COPY_DST for queue writes
        let mut usage = Self::convert_buffer_usage(desc.usage);
        if desc.hint != BufferUsageHint::Static {
            usage |= wgpu::BufferUsages::COPY_DST;
        }
        let mut contents = data.to_vec();
        contents.resize(desc.size as usize, 0);
        let buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: desc.label.as_deref(),
            contents: &contents,
            usage,
        });

        let id = self.allocate_id();
        self.buffers.insert(id, buffer);
        Ok(BufferHandle(id))
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) {
        // Buffered draws must see the old contents
        self.flush();
        if let Some(buf) = self.buffers.get(&buffer.0) {
            self.queue.write_buffer(buf, offset, data);
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
        let texture = Self::upload_texture(&self.device, &self.queue, &self.texture_layout, desc, data);
        let id = self.allocate_id();
        self.textures.insert(id, texture);
        Ok(TextureHandle(id))
    }

    fn create_program(&mut self, desc: &ProgramDescriptor) -> BackendResult<ProgramHandle> {
        let fragment_source = desc.fragment_source.as_deref().unwrap_or(&desc.vertex_source);
        if !desc.vertex_source.contains("fn vs_main") || !fragment_source.contains("fn fs_main") {
            return Err(BackendError::ProgramCreationFailed(format!(
                "{}: missing vs_main/fs_main entry point",
                desc.name
            )));
        }

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let vertex = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(desc.name.as_str()),
            source: wgpu::ShaderSource::Wgsl(desc.vertex_source.as_str().into()),
        });
        let fragment = desc.fragment_source.as_ref().map(|source| {
            self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(desc.name.as_str()),
                source: wgpu::ShaderSource::Wgsl(source.as_str().into()),
            })
        });
        #[cfg(not(target_arch = "wasm32"))]
        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(BackendError::ProgramCreationFailed(format!("{}: {}", desc.name, error)));
        }

        let id = self.allocate_id();
        self.programs.insert(
            id,
            WgpuProgram {
                name: desc.name.clone(),
                vertex,
                fragment,
                uniforms: StandardUniforms::default(),
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
        let color = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Object Id Target"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: OBJECT_ID_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let color_view = color.create_view(&wgpu::TextureViewDescriptor::default());
        let depth_view = Self::create_depth_view(&self.device, width, height);

        let id = self.allocate_id();
        self.framebuffers.insert(
            id,
            WgpuFramebuffer {
                width,
                height,
                color,
                color_view,
                depth_view,
            },
        );
        Ok(FramebufferHandle(id))
    }

    fn use_program(&mut self, program: ProgramHandle) {
        if self.programs.contains_key(&program.0) {
            self.current_program = Some(program);
        } else {
            log::warn!("WgpuBackend: use of unknown program {:?}", program);
        }
    }

    fn current_program(&self) -> Option<ProgramHandle> {
        self.current_program
    }

    fn set_uniform(&mut self, name: &str, value: UniformValue) {
        let Some(program) = self.current_program.and_then(|p| self.programs.get_mut(&p.0)) else {
            return;
        };
        if !program.uniforms.apply(name, value) {
            log::trace!("WgpuBackend: program '{}' has no uniform '{}'", program.name, name);
        }
    }

    fn bind_texture(&mut self, unit: u32, texture: TextureHandle) {
        if unit == 0 {
            self.bound_texture = Some(texture.0);
        } else {
            log::debug!("WgpuBackend: only texture unit 0 is sampled, ignoring unit {}", unit);
        }
    }

    fn unbind_texture(&mut self, unit: u32) {
        if unit == 0 {
            self.bound_texture = None;
        }
    }

    fn bound_texture(&self, unit: u32) -> Option<TextureHandle> {
        if unit == 0 {
            self.bound_texture.map(TextureHandle)
        } else {
            None
        }
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferHandle>) {
        let target = framebuffer
            .map(|fb| RenderTarget::Framebuffer(fb.0))
            .unwrap_or(RenderTarget::Surface);
        if target != self.target {
            self.flush();
            self.target = target;
        }
    }

    fn bound_framebuffer(&self) -> Option<FramebufferHandle> {
        match self.target {
            RenderTarget::Surface => None,
            RenderTarget::Framebuffer(id) => Some(FramebufferHandle(id)),
        }
    }

    fn clear(&mut self, color: [f32; 4], depth: f32) {
        if self.pending.as_ref().is_some_and(|p| !p.draws.is_empty()) {
            self.flush();
        }
        self.pending = Some(PendingPass {
            target: self.target,
            clear: Some((color, depth)),
            draws: Vec::new(),
        });
    }

    fn draw_mesh(&mut self, call: &DrawCall) {
        let Some(program) = self.current_program else {
            log::warn!("WgpuBackend: draw without a program");
            return;
        };
        let Some(state) = self.programs.get(&program.0) else {
            return;
        };
        let draw = PendingDraw {
            program: program.0,
            uniforms: state.uniforms,
            texture: self.bound_texture,
            call: call.clone(),
        };
        let target = self.target;
        self.pending
            .get_or_insert_with(|| PendingPass {
                target,
                clear: None,
                draws: Vec::new(),
            })
            .draws
            .push(draw);
    }

    fn read_pixel_id(&mut self, framebuffer: FramebufferHandle, x: u32, y: u32) -> BackendResult<u32> {
        self.flush();

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

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Pick Readback"),
            size: wgpu::COPY_BYTES_PER_ROW_ALIGNMENT as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Pick Encoder"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &fb.color,
                mip_level: 0,
                origin: wgpu::Origin3d { x, y, z: 0 },
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &staging,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT),
                    rows_per_image: Some(1),
                },
            },
            wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let status = Arc::new(Mutex::new(None));
        let sink = status.clone();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            *sink.lock() = Some(result);
        });
        let _ = self.device.poll(wgpu::Maintain::Wait);

        match status.lock().take() {
            Some(Ok(())) => {}
            Some(Err(e)) => return Err(BackendError::ReadbackFailed(e.to_string())),
            None => return Err(BackendError::ReadbackFailed("map callback did not run".into())),
        }

        let id = {
            let data = slice.get_mapped_range();
            bytemuck::pod_read_unaligned::<u32>(&data[..4])
        };
        staging.unmap();
        Ok(id)
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        self.flush();
        self.buffers.remove(&buffer.0);
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        self.flush();
        self.textures.remove(&texture.0);
        if self.bound_texture == Some(texture.0) {
            self.bound_texture = None;
        }
    }

    fn destroy_program(&mut self, program: ProgramHandle) {
        self.flush();
        self.programs.remove(&program.0);
        self.pipelines.retain(|(id, _, _), _| *id != program.0);
        if self.current_program == Some(program) {
            self.current_program = None;
        }
    }

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferHandle) {
        self.flush();
        self.framebuffers.remove(&framebuffer.0);
        if self.target == RenderTarget::Framebuffer(framebuffer.0) {
            self.target = RenderTarget::Surface;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Mat4, Vec3, Vec4};

    #[test]
    fn test_uniform_block_is_aligned() {
        assert_eq!(std::mem::size_of::<StandardUniforms>() % 16, 0);
        assert_eq!(std::mem::size_of::<GpuLight>(), 64);
    }

    #[test]
    fn test_split_indexed() {
        assert_eq!(split_indexed("lightColor[3]"), ("lightColor", Some(3)));
        assert_eq!(split_indexed("modelMatrix"), ("modelMatrix", None));
    }

    #[test]
    fn test_apply_uniforms() {
        let mut block = StandardUniforms::default();
        let model = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));

        assert!(block.apply(uniforms::MODEL_MATRIX, model.into()));
        assert!(block.apply(uniforms::OBJECT_ID, UniformValue::UInt(42)));
        assert!(block.apply(uniforms::LIGHTING_ENABLED, true.into()));
        assert!(block.apply(
            &uniforms::indexed(uniforms::LIGHT_COLOR, 2),
            Vec4::new(1.0, 0.5, 0.25, 2.0).into()
        ));

        assert_eq!(block.model, model.to_cols_array_2d());
        assert_eq!(block.ids[0], 42);
        assert_eq!(block.flags[0], 1);
        assert_eq!(block.lights[2].color, [1.0, 0.5, 0.25, 2.0]);
    }

    #[test]
    fn test_apply_rejects_unknown_and_out_of_range() {
        let mut block = StandardUniforms::default();
        assert!(!block.apply("customThing", 1.0.into()));
        assert!(!block.apply(
            &uniforms::indexed(uniforms::LIGHT_COLOR, MAX_SHADER_LIGHTS),
            Vec4::ONE.into()
        ));
        assert!(!block.apply(uniforms::MODEL_MATRIX, 1.0.into()));
    }
}
