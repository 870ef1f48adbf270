//! Default buffer usage for newly built meshes

use crate::backend::BufferUsageHint;
use std::collections::VecDeque;

/// Current default [`BufferUsageHint`] plus a bounded stack of earlier
/// defaults. When the stack is full the oldest entry is dropped.
#[derive(Debug)]
pub struct MeshManager {
    current: BufferUsageHint,
    saved: VecDeque<BufferUsageHint>,
    limit: usize,
}

impl MeshManager {
    pub fn new(limit: usize) -> Self {
        Self {
            current: BufferUsageHint::default(),
            saved: VecDeque::with_capacity(limit),
            limit,
        }
    }

    pub fn usage_hint(&self) -> BufferUsageHint {
        self.current
    }

    pub fn set_usage_hint(&mut self, hint: BufferUsageHint) {
        self.current = hint;
    }

    /// Save the current hint and switch to `hint`.
    pub fn push_usage_hint(&mut self, hint: BufferUsageHint) {
        if self.limit == 0 {
            log::warn!("MeshManager: usage hint stack has no capacity");
        } else {
            if self.saved.len() >= self.limit {
                let dropped = self.saved.pop_front();
                log::warn!("MeshManager: usage hint stack full, dropping oldest {:?}", dropped);
            }
            self.saved.push_back(self.current);
        }
        self.current = hint;
    }

    /// Return to the previously pushed hint. Returns false if nothing is saved.
    pub fn pop_usage_hint(&mut self) -> bool {
        match self.saved.pop_back() {
            Some(hint) => {
                self.current = hint;
                true
            }
            None => false,
        }
    }

    pub fn depth(&self) -> usize {
        self.saved.len()
    }
}

impl Default for MeshManager {
    fn default() -> Self {
        Self::new(16)
    }
}
