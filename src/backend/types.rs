//! Common types shared between backends

use super::traits::BufferHandle;
use glam::{Mat4, Vec3, Vec4};

/// Texture format enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Bgra8Unorm,
    Bgra8UnormSrgb,
    Depth32Float,
    R32Uint,
}

impl TextureFormat {
    pub fn is_depth(&self) -> bool {
        matches!(self, TextureFormat::Depth32Float)
    }

    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            TextureFormat::Rgba8Unorm
            | TextureFormat::Rgba8UnormSrgb
            | TextureFormat::Bgra8Unorm
            | TextureFormat::Bgra8UnormSrgb
            | TextureFormat::Depth32Float
            | TextureFormat::R32Uint => 4,
        }
    }
}

/// Buffer usage flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferUsage(u32);

impl BufferUsage {
    pub const MAP_READ: Self = Self(1 << 0);
    pub const COPY_SRC: Self = Self(1 << 2);
    pub const COPY_DST: Self = Self(1 << 3);
    pub const INDEX: Self = Self(1 << 4);
    pub const VERTEX: Self = Self(1 << 5);
    pub const UNIFORM: Self = Self(1 << 6);

    pub fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    pub fn bits(&self) -> u32 {
        self.0
    }
}

impl std::ops::BitOr for BufferUsage {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// How often a buffer's contents are expected to change after creation.
///
/// Backends use this to pick memory placement; geometry constructors read
/// the current default from the mesh manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BufferUsageHint {
    /// Written once, drawn many times
    #[default]
    Static,
    /// Rewritten occasionally
    Dynamic,
    /// Rewritten every frame
    Stream,
}

/// Buffer descriptor
#[derive(Debug, Clone)]
pub struct BufferDescriptor {
    pub label: Option<String>,
    pub size: u64,
    pub usage: BufferUsage,
    pub hint: BufferUsageHint,
}

/// Filter mode for texture sampling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterMode {
    Nearest,
    #[default]
    Linear,
}

/// Address mode for texture sampling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddressMode {
    ClampToEdge,
    #[default]
    Repeat,
    MirrorRepeat,
}

/// Texture descriptor
#[derive(Debug, Clone)]
pub struct TextureDescriptor {
    pub label: Option<String>,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub filter: FilterMode,
    pub address_mode: AddressMode,
}

impl Default for TextureDescriptor {
    fn default() -> Self {
        Self {
            label: None,
            width: 1,
            height: 1,
            format: TextureFormat::Rgba8UnormSrgb,
            filter: FilterMode::Linear,
            address_mode: AddressMode::Repeat,
        }
    }
}

/// Shader program descriptor. Both stages may live in one WGSL module, in
/// which case `fragment_source` is `None` and `vs_main`/`fs_main` are used.
#[derive(Debug, Clone)]
pub struct ProgramDescriptor {
    pub name: String,
    pub vertex_source: String,
    pub fragment_source: Option<String>,
}

/// Primitive topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveTopology {
    PointList,
    LineList,
    LineStrip,
    #[default]
    TriangleList,
    TriangleStrip,
}

/// Vertex attribute slots. Every attribute lives in its own buffer, matching
/// the one-field-per-attribute layout of mesh data.
pub mod attribute {
    pub const POSITION: u32 = 0;
    pub const NORMAL: u32 = 1;
    pub const TEX_COORD: u32 = 2;
    pub const COLOR: u32 = 3;
}

/// One draw submitted through the backend. Uses whatever program, uniforms
/// and textures are current at the time of the call.
#[derive(Debug, Clone)]
pub struct DrawCall {
    pub topology: PrimitiveTopology,
    /// `vec3<f32>` per vertex
    pub positions: BufferHandle,
    /// `vec3<f32>` per vertex
    pub normals: Option<BufferHandle>,
    /// `vec2<f32>` per vertex
    pub tex_coords: Option<BufferHandle>,
    /// `vec4<f32>` per vertex
    pub colors: Option<BufferHandle>,
    /// `u32` indices
    pub indices: Option<BufferHandle>,
    pub vertex_count: u32,
    pub index_count: u32,
}

impl DrawCall {
    pub fn is_indexed(&self) -> bool {
        self.indices.is_some() && self.index_count > 0
    }

    /// Number of elements the draw consumes.
    pub fn element_count(&self) -> u32 {
        if self.is_indexed() {
            self.index_count
        } else {
            self.vertex_count
        }
    }
}

/// A value written to a shader uniform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Int(i32),
    UInt(u32),
    Bool(bool),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat4(Mat4),
}

impl UniformValue {
    pub fn as_mat4(&self) -> Option<Mat4> {
        match self {
            UniformValue::Mat4(m) => Some(*m),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            UniformValue::UInt(v) => Some(*v),
            UniformValue::Int(v) => u32::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            UniformValue::Bool(v) => Some(*v),
            UniformValue::Int(v) => Some(*v != 0),
            UniformValue::UInt(v) => Some(*v != 0),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            UniformValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_vec4(&self) -> Option<Vec4> {
        match self {
            UniformValue::Vec4(v) => Some(*v),
            UniformValue::Vec3(v) => Some(v.extend(1.0)),
            _ => None,
        }
    }
}

impl From<f32> for UniformValue {
    fn from(value: f32) -> Self {
        UniformValue::Float(value)
    }
}

impl From<i32> for UniformValue {
    fn from(value: i32) -> Self {
        UniformValue::Int(value)
    }
}

impl From<u32> for UniformValue {
    fn from(value: u32) -> Self {
        UniformValue::UInt(value)
    }
}

impl From<bool> for UniformValue {
    fn from(value: bool) -> Self {
        UniformValue::Bool(value)
    }
}

impl From<Vec3> for UniformValue {
    fn from(value: Vec3) -> Self {
        UniformValue::Vec3(value)
    }
}

impl From<Vec4> for UniformValue {
    fn from(value: Vec4) -> Self {
        UniformValue::Vec4(value)
    }
}

impl From<Mat4> for UniformValue {
    fn from(value: Mat4) -> Self {
        UniformValue::Mat4(value)
    }
}
