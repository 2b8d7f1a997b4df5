//! Error types for scene, clone, CSG and persistence operations.

use std::path::PathBuf;

use thiserror::Error;

/// Two nodes in a subtree share an id; the subtree cannot be cloned safely.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("duplicate node id in subtree: {id}")]
pub struct DuplicateIdentityError {
    pub id: String,
}

/// Errors raised by boolean operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CsgError {
    /// The cancellation token was signalled between participant operations.
    #[error("operation cancelled")]
    Cancelled,

    /// The boolean kernel rejected its input.
    #[error("boolean kernel failure: {0}")]
    Kernel(String),
}

/// Errors raised by scene editing operations.
#[derive(Debug, Error)]
pub enum SceneError {
    /// Selection refers to a node that is not attached to the scene.
    #[error("item is not part of the scene: {0}")]
    ItemNotInScene(String),

    /// A replace command needs every node to share one parent.
    #[error("nodes do not share a parent")]
    NoSharedParent,

    /// The node must be attached to a parent for this operation.
    #[error("node has no parent: {0}")]
    Detached(String),

    /// Operation needs a selection but nothing is selected.
    #[error("nothing selected")]
    NothingSelected,

    #[error(transparent)]
    DuplicateIdentity(#[from] DuplicateIdentityError),

    #[error(transparent)]
    Csg(#[from] CsgError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// Errors raised while loading or saving documents and mesh assets.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Document nests deeper than the configured maximum.
    #[error("document exceeds maximum depth of {max}")]
    DepthExceeded { max: usize },

    #[error("unsupported file type: {}", .0.display())]
    UnsupportedExtension(PathBuf),

    #[error("invalid STL data: {0}")]
    InvalidStl(String),

    #[error(transparent)]
    DuplicateIdentity(#[from] DuplicateIdentityError),
}
