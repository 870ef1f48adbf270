//! Deferred destruction of GPU resources
//!
//! Meshes and textures do not hold the backend, so dropping one cannot
//! destroy its handles directly. Instead they push the handles into a
//! [`ReleaseQueue`] shared with the render context, which destroys them at
//! the start of the next frame or on shutdown.

use crate::backend::traits::{BufferHandle, GraphicsBackend, TextureHandle};
use std::cell::RefCell;
use std::rc::Rc;

/// A GPU object waiting for destruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpuResource {
    Buffer(BufferHandle),
    Texture(TextureHandle),
}

/// Shared, single-threaded list of handles whose owners were dropped
#[derive(Debug, Clone, Default)]
pub struct ReleaseQueue {
    pending: Rc<RefCell<Vec<GpuResource>>>,
}

impl ReleaseQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, resource: GpuResource) {
        self.pending.borrow_mut().push(resource);
    }

    pub fn len(&self) -> usize {
        self.pending.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.borrow().is_empty()
    }

    /// Destroy every queued handle. Returns how many were destroyed.
    pub fn drain(&self, backend: &mut dyn GraphicsBackend) -> usize {
        let pending = std::mem::take(&mut *self.pending.borrow_mut());
        for resource in &pending {
            match *resource {
                GpuResource::Buffer(buffer) => backend.destroy_buffer(buffer),
                GpuResource::Texture(texture) => backend.destroy_texture(texture),
            }
        }
        if !pending.is_empty() {
            log::debug!("ReleaseQueue: destroyed {} resources", pending.len());
        }
        pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BufferDescriptor, BufferUsage, BufferUsageHint, HeadlessBackend};

    #[test]
    fn test_drain_destroys_queued_buffers() {
        let mut backend = HeadlessBackend::default();
        let buffer = backend
            .create_buffer(
                &BufferDescriptor {
                    label: None,
                    size: 4,
                    usage: BufferUsage::VERTEX,
                    hint: BufferUsageHint::Static,
                },
                &[0; 4],
            )
            .unwrap();

        let queue = ReleaseQueue::new();
        queue.clone().push(GpuResource::Buffer(buffer));
        assert_eq!(queue.len(), 1);

        assert_eq!(queue.drain(&mut backend), 1);
        assert!(queue.is_empty());
        assert_eq!(backend.live_buffers(), 0);
    }
}
