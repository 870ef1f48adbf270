//! Resource management
//!
//! Materials and textures that nodes reference.

mod material;
mod texture;

pub use material::*;
pub use texture::*;
