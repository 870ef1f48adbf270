//! Backend abstraction layer
//!
//! Provides the [`GraphicsBackend`] trait plus two implementations: a wgpu
//! backend for on-screen rendering and a headless CPU backend for tests.

pub mod headless;
pub mod release;
pub mod traits;
pub mod types;
pub mod wgpu_backend;

pub use headless::HeadlessBackend;
pub use release::{GpuResource, ReleaseQueue};
pub use traits::*;
pub use types::*;
