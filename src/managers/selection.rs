//! Picking state

use crate::backend::GraphicsBackend;
use crate::shaders::uniforms;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SelectionState {
    /// Object id written by the next draw; 0 means "no object"
    pub object_id: u32,
    pub selection_rendering: bool,
}

/// Current picking object id and selection-rendering flag, mirrored into
/// the program uniforms on every `apply`. Save/restore is single-slot.
#[derive(Debug, Default)]
pub struct SelectionManager {
    state: SelectionState,
    saved: Option<SelectionState>,
}

impl SelectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SelectionState {
        self.state
    }

    pub fn object_id(&self) -> u32 {
        self.state.object_id
    }

    pub fn set_object_id(&mut self, id: u32) {
        self.state.object_id = id;
    }

    pub fn is_selection_rendering(&self) -> bool {
        self.state.selection_rendering
    }

    pub fn set_selection_rendering(&mut self, enabled: bool) {
        self.state.selection_rendering = enabled;
    }

    pub fn save_state(&mut self) {
        self.saved = Some(self.state);
    }

    pub fn restore_state(&mut self) {
        match self.saved {
            Some(state) => self.state = state,
            None => log::warn!("SelectionManager: restore_state without save_state"),
        }
    }

    pub fn apply(&self, backend: &mut dyn GraphicsBackend) {
        backend.set_uniform(uniforms::OBJECT_ID, self.state.object_id.into());
        backend.set_uniform(uniforms::SELECTION_RENDERING, self.state.selection_rendering.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_object_id_then_restore() {
        let mut manager = SelectionManager::new();
        manager.set_object_id(4);
        manager.set_selection_rendering(true);

        manager.save_state();
        manager.set_object_id(99);
        manager.set_selection_rendering(false);
        manager.restore_state();

        assert_eq!(manager.object_id(), 4);
        assert!(manager.is_selection_rendering());
    }

    #[test]
    fn test_restore_without_save_keeps_state() {
        let mut manager = SelectionManager::new();
        manager.set_object_id(7);
        manager.restore_state();
        assert_eq!(manager.object_id(), 7);
    }
}
