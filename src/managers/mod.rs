//! State managers consulted during a draw traversal
//!
//! Each manager owns one slice of "current state" (matrices, lighting,
//! programs, picking, buffer usage). They live inside a
//! [`RenderContext`](crate::context::RenderContext) and nodes go through
//! them instead of caching state locally.

mod light;
mod mesh;
mod selection;
mod shader;
mod transform;

pub use light::*;
pub use mesh::*;
pub use selection::*;
pub use shader::*;
pub use transform::*;
