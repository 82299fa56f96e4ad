use std::path::PathBuf;

use objmig_types::ObjectId;

/// Errors from object store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested object is not in the store.
    #[error("object not found: {0}")]
    NotFound(ObjectId),

    /// A stream was used after it had already been consumed.
    #[error("stream for {0} is no longer available")]
    StreamUnavailable(ObjectId),

    /// The bytes yielded by a stream disagree with its declared size.
    #[error("size mismatch for {id}: declared {declared}, read {actual}")]
    SizeMismatch {
        id: ObjectId,
        declared: u64,
        actual: u64,
    },

    /// Stored bytes no longer match the checksum recorded in the index.
    #[error("CRC32 mismatch for object {id}")]
    CrcMismatch { id: ObjectId },

    /// The pack data of an object cannot be decoded.
    #[error("corrupt object {id}: {reason}")]
    CorruptObject { id: ObjectId, reason: String },

    #[error("pack index corrupted: {0}")]
    IndexCorrupted(String),

    #[error("invalid magic: expected {expected}, got {actual}")]
    InvalidMagic { expected: String, actual: String },

    #[error("unsupported format version: {0}")]
    UnsupportedVersion(u32),

    #[error("container not initialised at {}", .0.display())]
    NotInitialised(PathBuf),

    #[error("container already initialised at {}", .0.display())]
    AlreadyInitialised(PathBuf),

    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
