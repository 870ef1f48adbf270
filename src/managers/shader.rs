//! Shader program registry

use crate::backend::{GraphicsBackend, ProgramDescriptor, ProgramHandle};
use crate::error::{SceneError, SceneResult};
use std::collections::HashMap;
use std::path::Path;

/// Programs by name plus the one that is current.
#[derive(Debug, Default)]
pub struct ShaderManager {
    programs: HashMap<String, ProgramHandle>,
    current: Option<String>,
}

fn read_source(path: &Path) -> SceneResult<String> {
    std::fs::read_to_string(path).map_err(|source| SceneError::ShaderSource {
        path: path.to_path_buf(),
        source,
    })
}

impl ShaderManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile a program and register it under `name`, replacing (and
    /// destroying) any program already registered under that name.
    ///
    /// Compile failures are logged and yield `None`; the registry is left
    /// unchanged in that case.
    pub fn load_program_from_source(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        name: &str,
        vertex_source: &str,
        fragment_source: Option<&str>,
    ) -> Option<ProgramHandle> {
        let desc = ProgramDescriptor {
            name: name.to_string(),
            vertex_source: vertex_source.to_string(),
            fragment_source: fragment_source.map(str::to_string),
        };
        let handle = match backend.create_program(&desc) {
            Ok(handle) => handle,
            Err(e) => {
                log::error!("ShaderManager: failed to build program '{}': {}", name, e);
                return None;
            }
        };

        if let Some(old) = self.programs.insert(name.to_string(), handle) {
            log::debug!("ShaderManager: replacing program '{}'", name);
            backend.destroy_program(old);
            // keep "current" pointing at the live program
            if self.current.as_deref() == Some(name) {
                backend.use_program(handle);
            }
        }
        log::info!("ShaderManager: loaded program '{}'", name);
        Some(handle)
    }

    /// Read sources from disk and register the program. A missing or
    /// unreadable file is logged and yields `None`.
    pub fn load_program_from_files(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        name: &str,
        vertex_path: impl AsRef<Path>,
        fragment_path: Option<&Path>,
    ) -> Option<ProgramHandle> {
        let sources = read_source(vertex_path.as_ref()).and_then(|vertex| {
            let fragment = fragment_path.map(read_source).transpose()?;
            Ok((vertex, fragment))
        });
        match sources {
            Ok((vertex, fragment)) => {
                self.load_program_from_source(backend, name, &vertex, fragment.as_deref())
            }
            Err(e) => {
                log::error!("ShaderManager: {}", e);
                None
            }
        }
    }

    /// Make a registered program current
    pub fn use_program(&mut self, backend: &mut dyn GraphicsBackend, name: &str) -> SceneResult<ProgramHandle> {
        let handle = *self
            .programs
            .get(name)
            .ok_or_else(|| SceneError::ProgramNotFound(name.to_string()))?;
        if self.current.as_deref() != Some(name) {
            log::debug!("ShaderManager: switching to program '{}'", name);
            self.current = Some(name.to_string());
        }
        backend.use_program(handle);
        Ok(handle)
    }

    pub fn current(&self) -> Option<ProgramHandle> {
        self.current.as_deref().and_then(|name| self.get(name))
    }

    pub fn current_name(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn get(&self, name: &str) -> Option<ProgramHandle> {
        self.programs.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.programs.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.programs.keys().map(String::as_str)
    }

    /// Destroy and unregister one program
    pub fn remove(&mut self, backend: &mut dyn GraphicsBackend, name: &str) -> bool {
        match self.programs.remove(name) {
            Some(handle) => {
                backend.destroy_program(handle);
                if self.current.as_deref() == Some(name) {
                    self.current = None;
                }
                true
            }
            None => false,
        }
    }

    /// Destroy every registered program
    pub fn release_all(&mut self, backend: &mut dyn GraphicsBackend) {
        for (name, handle) in self.programs.drain() {
            log::debug!("ShaderManager: releasing program '{}'", name);
            backend.destroy_program(handle);
        }
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HeadlessBackend;
    use crate::shaders::{DEFAULT_PROGRAM, SELECTION_PROGRAM};

    #[test]
    fn test_reload_same_name_replaces() {
        let mut backend = HeadlessBackend::default();
        let mut shaders = ShaderManager::new();

        let first = shaders
            .load_program_from_source(&mut backend, "basic", DEFAULT_PROGRAM, None)
            .unwrap();
        shaders.use_program(&mut backend, "basic").unwrap();
        let second = shaders
            .load_program_from_source(&mut backend, "basic", SELECTION_PROGRAM, None)
            .unwrap();

        assert_ne!(first, second);
        assert_eq!(shaders.len(), 1);
        assert_eq!(backend.live_programs(), 1);
        assert_eq!(shaders.current(), Some(second));
        assert_eq!(backend.current_program(), Some(second));
    }

    #[test]
    fn test_failed_compile_yields_none() {
        let mut backend = HeadlessBackend::default();
        let mut shaders = ShaderManager::new();
        assert!(shaders
            .load_program_from_source(&mut backend, "broken", "not wgsl", None)
            .is_none());
        assert!(shaders.is_empty());
    }

    #[test]
    fn test_missing_file_yields_none() {
        let mut backend = HeadlessBackend::default();
        let mut shaders = ShaderManager::new();
        let result = shaders.load_program_from_files(
            &mut backend,
            "missing",
            "/nonexistent/shader.wgsl",
            None,
        );
        assert!(result.is_none());
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("scenegraph_shader_{}.wgsl", std::process::id()));
        std::fs::write(&path, DEFAULT_PROGRAM).unwrap();

        let mut backend = HeadlessBackend::default();
        let mut shaders = ShaderManager::new();
        let handle = shaders.load_program_from_files(&mut backend, "disk", &path, None);
        std::fs::remove_file(&path).ok();

        assert!(handle.is_some());
        assert!(shaders.contains("disk"));
    }

    #[test]
    fn test_use_unknown_program() {
        let mut backend = HeadlessBackend::default();
        let mut shaders = ShaderManager::new();
        assert!(matches!(
            shaders.use_program(&mut backend, "nope"),
            Err(SceneError::ProgramNotFound(_))
        ));
    }

    #[test]
    fn test_release_all() {
        let mut backend = HeadlessBackend::default();
        let mut shaders = ShaderManager::new();
        shaders.load_program_from_source(&mut backend, "a", DEFAULT_PROGRAM, None);
        shaders.load_program_from_source(&mut backend, "b", SELECTION_PROGRAM, None);
        shaders.use_program(&mut backend, "a").unwrap();

        shaders.release_all(&mut backend);
        assert!(shaders.is_empty());
        assert!(shaders.current().is_none());
        assert_eq!(backend.live_programs(), 0);
    }
}
