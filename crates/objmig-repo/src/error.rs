use std::path::PathBuf;

use objmig_store::StoreError;

/// Errors from the repository layer.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    /// No catalog entry for the node.
    #[error("node not found: {0}")]
    NodeNotFound(String),

    /// The node is already in the catalog.
    #[error("node already present in catalog: {0}")]
    DuplicateNode(String),

    /// A node UUID that is not 36 characters of UUID text.
    #[error("invalid node uuid: {0}")]
    InvalidNodeUuid(String),

    #[error("{0} not found")]
    PathNotFound(String),

    #[error("{0} is not a file")]
    NotAFile(String),

    #[error("{0} is not a directory")]
    NotADirectory(String),

    /// Paths must be relative and must not leave the node folder.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// The export destination already exists.
    #[error("destination already exists: {0}")]
    DestinationExists(PathBuf),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias for repository results.
pub type RepoResult<T> = Result<T, RepoError>;
