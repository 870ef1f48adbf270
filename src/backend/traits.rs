//! Core backend abstraction traits
//!
//! The scene graph only ever talks to the GPU through [`GraphicsBackend`]:
//! resources are opaque handles, a program is a write-only uniform sink, and
//! textures are bound to numbered units.

use crate::backend::types::*;
use std::any::Any;
use thiserror::Error;

/// Backend error type
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Failed to initialize backend: {0}")]
    InitializationFailed(String),
    #[error("Failed to create surface: {0}")]
    SurfaceCreationFailed(String),
    #[error("Failed to create device: {0}")]
    DeviceCreationFailed(String),
    #[error("Failed to acquire next image: {0}")]
    AcquireImageFailed(String),
    #[error("Failed to create buffer: {0}")]
    BufferCreationFailed(String),
    #[error("Failed to create texture: {0}")]
    TextureCreationFailed(String),
    #[error("Failed to create shader program: {0}")]
    ProgramCreationFailed(String),
    #[error("Failed to create framebuffer: {0}")]
    FramebufferCreationFailed(String),
    #[error("Failed to read back pixel: {0}")]
    ReadbackFailed(String),
    #[error("Unknown {kind} handle {id}")]
    InvalidHandle { kind: &'static str, id: u64 },
    #[error("Surface lost")]
    SurfaceLost,
    #[error("Out of memory")]
    OutOfMemory,
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Handle to a GPU buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub(crate) u64);

/// Handle to a GPU texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub(crate) u64);

/// Handle to a linked shader program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramHandle(pub(crate) u64);

/// Handle to an offscreen framebuffer (object-id color target plus depth)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FramebufferHandle(pub(crate) u64);

macro_rules! raw_handle {
    ($($name:ident),*) => {
        $(
            impl $name {
                /// Wrap a raw id, for backends implemented outside this crate.
                pub fn from_raw(id: u64) -> Self {
                    Self(id)
                }

                pub fn raw(&self) -> u64 {
                    self.0
                }
            }
        )*
    };
}

raw_handle!(BufferHandle, TextureHandle, ProgramHandle, FramebufferHandle);

/// Main graphics backend trait
///
/// Object safe; the render context owns a `Box<dyn GraphicsBackend>`.
/// Commands may be buffered, only [`GraphicsBackend::read_pixel_id`] and
/// [`GraphicsBackend::end_frame`] are required to flush.
pub trait GraphicsBackend {
    /// Human-readable backend name
    fn name(&self) -> &'static str;

    /// Access to the concrete backend, for inspection in tests and tools
    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Resize the presentation surface
    fn resize(&mut self, width: u32, height: u32);

    /// Get the actual surface size (may be clamped by device limits)
    fn surface_size(&self) -> (u32, u32);

    /// Begin a new frame
    fn begin_frame(&mut self) -> BackendResult<()> {
        Ok(())
    }

    /// End and present the frame
    fn end_frame(&mut self) -> BackendResult<()> {
        Ok(())
    }

    // Resource creation

    /// Create a buffer with initial data
    fn create_buffer(&mut self, desc: &BufferDescriptor, data: &[u8]) -> BackendResult<BufferHandle>;

    /// Write data to a buffer
    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]);

    /// Create a 2D texture with initial texel data
    fn create_texture(&mut self, desc: &TextureDescriptor, data: &[u8]) -> BackendResult<TextureHandle>;

    /// Compile and link a shader program
    fn create_program(&mut self, desc: &ProgramDescriptor) -> BackendResult<ProgramHandle>;

    /// Create an offscreen framebuffer
    fn create_framebuffer(&mut self, width: u32, height: u32) -> BackendResult<FramebufferHandle>;

    // State

    /// Make a program current. Uniform writes go to the current program.
    fn use_program(&mut self, program: ProgramHandle);

    /// Currently bound program, if any
    fn current_program(&self) -> Option<ProgramHandle>;

    /// Write a uniform of the current program. Unknown names are ignored.
    fn set_uniform(&mut self, name: &str, value: UniformValue);

    /// Bind a texture to a texture unit
    fn bind_texture(&mut self, unit: u32, texture: TextureHandle);

    /// Unbind a texture unit. Unbinding an empty unit is a no-op.
    fn unbind_texture(&mut self, unit: u32);

    /// Texture currently bound to a unit
    fn bound_texture(&self, unit: u32) -> Option<TextureHandle>;

    /// Direct draws to a framebuffer, or to the surface with `None`
    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferHandle>);

    /// Framebuffer draws currently go to; `None` is the surface
    fn bound_framebuffer(&self) -> Option<FramebufferHandle>;

    /// Clear the bound target
    fn clear(&mut self, color: [f32; 4], depth: f32);

    // Drawing

    /// Draw a mesh with the current program, uniforms and textures
    fn draw_mesh(&mut self, call: &DrawCall);

    /// Read the object id stored at a framebuffer pixel. `(0, 0)` is the
    /// top-left corner.
    fn read_pixel_id(&mut self, framebuffer: FramebufferHandle, x: u32, y: u32) -> BackendResult<u32>;

    // Resource cleanup

    /// Destroy a buffer
    fn destroy_buffer(&mut self, buffer: BufferHandle);

    /// Destroy a texture
    fn destroy_texture(&mut self, texture: TextureHandle);

    /// Destroy a program
    fn destroy_program(&mut self, program: ProgramHandle);

    /// Destroy a framebuffer
    fn destroy_framebuffer(&mut self, framebuffer: FramebufferHandle);
}
