//! Render context: the backend plus every state manager
//!
//! One context is created per surface and passed `&mut` through a draw
//! traversal. Contexts are independent of each other, so several scenes
//! (or tests) can render in the same process.

use crate::backend::{GraphicsBackend, HeadlessBackend, ReleaseQueue};
use crate::error::{SceneError, SceneResult};
use crate::managers::{LightManager, MeshManager, SelectionManager, ShaderManager, TransformManager};
use crate::scene::NodeRef;
use crate::shaders::{DEFAULT_PROGRAM, DEFAULT_PROGRAM_NAME, SELECTION_PROGRAM, SELECTION_PROGRAM_NAME};
use crate::{BackendType, RenderConfig};
use std::sync::Arc;

pub struct RenderContext {
    pub backend: Box<dyn GraphicsBackend>,
    pub transform: TransformManager,
    pub light: LightManager,
    pub shader: ShaderManager,
    pub selection: SelectionManager,
    pub mesh: MeshManager,
    clear_color: [f32; 4],
    release_queue: ReleaseQueue,
}

impl RenderContext {
    /// Wrap a backend. No programs are loaded; see
    /// [`RenderContext::load_default_programs`].
    pub fn new(backend: Box<dyn GraphicsBackend>, config: &RenderConfig) -> Self {
        log::info!("RenderContext: using {}", backend.name());
        Self {
            backend,
            transform: TransformManager::new(config.matrix_stack_limit),
            light: LightManager::new(config.max_lights),
            shader: ShaderManager::new(),
            selection: SelectionManager::new(),
            mesh: MeshManager::new(config.usage_stack_limit),
            clear_color: config.clear_color,
            release_queue: ReleaseQueue::new(),
        }
    }

    /// Headless context with the built-in programs loaded and current
    pub fn headless(config: &RenderConfig) -> SceneResult<Self> {
        let backend = Box::new(HeadlessBackend::new(config.width, config.height));
        let mut ctx = Self::new(backend, config);
        ctx.load_default_programs()?;
        Ok(ctx)
    }

    /// Build the backend named by `config.backend`. The wgpu backend needs
    /// a window.
    pub fn create_backend(
        config: &RenderConfig,
        window: Option<Arc<winit::window::Window>>,
    ) -> SceneResult<Box<dyn GraphicsBackend>> {
        match (config.backend, window) {
            (BackendType::Headless, _) => Ok(Box::new(HeadlessBackend::new(config.width, config.height))),
            #[cfg(not(target_arch = "wasm32"))]
            (BackendType::Wgpu, Some(window)) => {
                Ok(Box::new(crate::backend::wgpu_backend::WgpuBackend::new(window, config.vsync)?))
            }
            (BackendType::Wgpu, _) => Err(SceneError::Backend(crate::backend::BackendError::InitializationFailed(
                "the wgpu backend needs a window".into(),
            ))),
        }
    }

    /// Register the built-in Phong and selection programs and make the
    /// Phong program current.
    pub fn load_default_programs(&mut self) -> SceneResult<()> {
        for (name, source) in [
            (DEFAULT_PROGRAM_NAME, DEFAULT_PROGRAM),
            (SELECTION_PROGRAM_NAME, SELECTION_PROGRAM),
        ] {
            self.shader
                .load_program_from_source(self.backend.as_mut(), name, source, None)
                .ok_or_else(|| SceneError::ProgramNotFound(name.to_string()))?;
        }
        self.use_program(DEFAULT_PROGRAM_NAME)
    }

    /// Make a registered program current and push the whole state into it
    pub fn use_program(&mut self, name: &str) -> SceneResult<()> {
        self.shader.use_program(self.backend.as_mut(), name)?;
        self.apply_frame()
    }

    /// Push matrices, lighting and selection state into the current program.
    pub fn apply_frame(&mut self) -> SceneResult<()> {
        if self.shader.current().is_none() {
            return Err(SceneError::NoActiveProgram);
        }
        let backend = self.backend.as_mut();
        self.transform.apply(backend);
        self.light.apply(backend);
        self.selection.apply(backend);
        Ok(())
    }

    pub fn clear_color(&self) -> [f32; 4] {
        self.clear_color
    }

    pub fn set_clear_color(&mut self, color: [f32; 4]) {
        self.clear_color = color;
    }

    /// Queue shared with the meshes and textures uploaded through this
    /// context; their handles land here when they are dropped.
    pub fn release_queue(&self) -> ReleaseQueue {
        self.release_queue.clone()
    }

    /// Destroy the GPU objects of dropped meshes and textures. Runs at the
    /// start of every frame and on shutdown.
    pub fn collect_released(&mut self) -> usize {
        self.release_queue.drain(self.backend.as_mut())
    }

    /// Start a frame on the surface: clear it and upload the frame state
    pub fn begin_frame(&mut self) -> SceneResult<()> {
        self.collect_released();
        self.backend.begin_frame()?;
        self.backend.bind_framebuffer(None);
        self.backend.clear(self.clear_color, 1.0);
        self.apply_frame()
    }

    pub fn end_frame(&mut self) -> SceneResult<()> {
        self.backend.end_frame()?;
        Ok(())
    }

    /// Draw one frame of `root` to the surface
    pub fn render(&mut self, root: &NodeRef) -> SceneResult<()> {
        self.begin_frame()?;
        root.borrow_mut().draw(self)?;
        self.end_frame()
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.backend.resize(width, height);
    }

    /// Downcast the backend, e.g. to inspect a [`HeadlessBackend`]
    pub fn backend_as<T: 'static>(&self) -> Option<&T> {
        self.backend.as_any().downcast_ref::<T>()
    }

    pub fn backend_as_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.backend.as_any_mut().downcast_mut::<T>()
    }

    /// Destroy queued resources and release every program owned by the
    /// shader manager. The context can still be used after loading programs
    /// again.
    pub fn shutdown(&mut self) {
        log::info!("RenderContext: shutting down");
        self.collect_released();
        self.shader.release_all(self.backend.as_mut());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::UniformValue;
    use crate::shaders::uniforms;
    use glam::{Mat4, Vec3};

    #[test]
    fn test_headless_context_has_programs() {
        let ctx = RenderContext::headless(&RenderConfig::default()).unwrap();
        assert!(ctx.shader.contains(DEFAULT_PROGRAM_NAME));
        assert!(ctx.shader.contains(SELECTION_PROGRAM_NAME));
        assert_eq!(ctx.shader.current_name(), Some(DEFAULT_PROGRAM_NAME));
    }

    #[test]
    fn test_apply_frame_requires_program() {
        let backend = Box::new(HeadlessBackend::default());
        let mut ctx = RenderContext::new(backend, &RenderConfig::default());
        assert!(matches!(ctx.apply_frame(), Err(SceneError::NoActiveProgram)));
    }

    #[test]
    fn test_apply_frame_uploads_matrices() {
        let mut ctx = RenderContext::headless(&RenderConfig::default()).unwrap();
        let view = Mat4::look_at_rh(Vec3::Z, Vec3::ZERO, Vec3::Y);
        ctx.transform.set_view(view);
        ctx.apply_frame().unwrap();

        let headless = ctx.backend_as::<HeadlessBackend>().unwrap();
        assert_eq!(
            headless.current_uniform(uniforms::VIEW_MATRIX),
            Some(UniformValue::Mat4(view))
        );
    }

    #[test]
    fn test_shutdown_releases_programs() {
        let mut ctx = RenderContext::headless(&RenderConfig::default()).unwrap();
        ctx.shutdown();
        assert!(ctx.shader.is_empty());
        assert_eq!(ctx.backend_as::<HeadlessBackend>().unwrap().live_programs(), 0);
    }

    #[test]
    fn test_create_backend_without_window() {
        let config = RenderConfig::default();
        assert!(RenderContext::create_backend(&config, None).is_err());
        let headless = config.with_backend(BackendType::Headless);
        assert!(RenderContext::create_backend(&headless, None).is_ok());
    }
}
