//! Scene graph error types

use crate::backend::BackendError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while building or traversing a scene.
#[derive(Error, Debug)]
pub enum SceneError {
    /// A matrix pop without a matching push. Every transform after this
    /// point would be wrong, so traversal stops here.
    #[error("matrix stack underflow on the {stack} stack")]
    MatrixStackUnderflow { stack: &'static str },
    #[error("matrix stack exceeded its limit of {depth} entries")]
    MatrixStackOverflow { depth: usize },
    #[error("shader program '{0}' is not registered")]
    ProgramNotFound(String),
    #[error("no shader program is active")]
    NoActiveProgram,
    #[error("buffer selection used before initialize()")]
    SelectionNotInitialized,
    #[error("failed to read shader source {path:?}: {source}")]
    ShaderSource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to load texture: {0}")]
    TextureLoad(String),
    #[error("window system error: {0}")]
    Window(String),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

pub type SceneResult<T> = Result<T, SceneError>;
