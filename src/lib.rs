//! Graphics Scene Graph - a retained-mode scene graph over a small GPU backend contract
//!
//! A scene is a tree of shared [`Node`](scene::Node)s drawn depth-first in
//! insertion order. Cumulative state (model matrix stack, lighting and
//! material, current program, picking id) lives in a [`RenderContext`] that
//! is passed through the traversal.
//!
//! # Features
//! - Transform, composite, mesh, axis and light nodes with instancing
//! - Object-id picking through an offscreen framebuffer ([`BufferSelection`])
//! - Visitors for debug printing, id lookup and bounding boxes
//! - A wgpu backend for windows and a headless backend for tests

pub mod backend;
pub mod base;
pub mod bounding_box;
pub mod context;
pub mod error;
pub mod field;
pub mod managers;
pub mod resources;
pub mod scene;
pub mod selection;
pub mod shaders;
pub mod window;

pub use backend::wgpu_backend::WgpuBackend;
pub use backend::{GraphicsBackend, HeadlessBackend};
pub use bounding_box::BoundingBox;
pub use context::RenderContext;
pub use error::{SceneError, SceneResult};
pub use scene::{CompositeNode, Node, NodeRef, TransformNode};
pub use selection::BufferSelection;
pub use window::Window;

/// Backend selection for the render context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendType {
    /// wgpu backend - renders to a window
    #[default]
    Wgpu,
    /// CPU backend - no window, records draws, rasterises object ids
    Headless,
}

/// Configuration for a render context and its window
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Window title
    pub title: String,
    /// Initial window width
    pub width: u32,
    /// Initial window height
    pub height: u32,
    /// Which backend to use
    pub backend: BackendType,
    /// Enable vsync
    pub vsync: bool,
    /// Color the surface is cleared to each frame
    pub clear_color: [f32; 4],
    /// Maximum number of lights held by the light manager
    pub max_lights: usize,
    /// Maximum depth of the model matrix stack
    pub matrix_stack_limit: usize,
    /// Maximum depth of the mesh usage-hint stack
    pub usage_stack_limit: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            title: "Scene Graph".to_string(),
            width: 1280,
            height: 720,
            backend: BackendType::Wgpu,
            vsync: true,
            clear_color: [0.1, 0.1, 0.12, 1.0],
            max_lights: shaders::MAX_SHADER_LIGHTS,
            matrix_stack_limit: 64,
            usage_stack_limit: 16,
        }
    }
}

impl RenderConfig {
    pub fn with_title(mut self, title: &str) -> Self {
        self.title = title.to_string();
        self
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_backend(mut self, backend: BackendType) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }

    pub fn with_clear_color(mut self, color: [f32; 4]) -> Self {
        self.clear_color = color;
        self
    }

    pub fn with_max_lights(mut self, max_lights: usize) -> Self {
        self.max_lights = max_lights;
        self
    }

    pub fn with_matrix_stack_limit(mut self, limit: usize) -> Self {
        self.matrix_stack_limit = limit;
        self
    }

    pub fn with_usage_stack_limit(mut self, limit: usize) -> Self {
        self.usage_stack_limit = limit;
        self
    }
}

/// Install `env_logger` with an `info` default filter. Safe to call more
/// than once.
#[cfg(not(target_arch = "wasm32"))]
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = RenderConfig::default()
            .with_title("test")
            .with_size(320, 240)
            .with_backend(BackendType::Headless)
            .with_matrix_stack_limit(4);
        assert_eq!(config.title, "test");
        assert_eq!((config.width, config.height), (320, 240));
        assert_eq!(config.backend, BackendType::Headless);
        assert_eq!(config.matrix_stack_limit, 4);
        assert_eq!(config.max_lights, 8);
    }
}
