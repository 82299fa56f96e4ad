//! Pack-based object storage for objmig.
//!
//! This crate defines the two collaborators a migration talks to and ships
//! two backends that implement both of them.
//!
//! # Traits
//!
//! - [`StreamSource`] -- single-pass, scoped iteration over object streams
//! - [`PackWriter`] -- ordered batch writes returning one id per stream
//! - [`ObjectSizes`] -- size lookup used for post-migration verification
//!
//! # Backends
//!
//! - [`Container`] -- on-disk store appending objects into numbered pack files
//! - [`InMemoryContainer`] -- `HashMap`-based store for tests and embedding
//!
//! # Design Rules
//!
//! 1. Objects are immutable once written and addressed by a domain-separated
//!    BLAKE3 hash of their uncompressed content.
//! 2. A stream handed to a visitor is borrowed for that call only.
//! 3. A batch is indexed only after every stream in it has been written.
//! 4. All I/O errors are propagated, never silently ignored.

pub mod config;
pub mod container;
pub mod error;
pub mod hasher;
pub mod index;
pub mod memory;
pub mod traits;

pub use config::ContainerConfig;
pub use container::{Container, CountInfo, SizeInfo};
pub use error::{StoreError, StoreResult};
pub use hasher::{ContentHasher, CrcWriter, HashingReader};
pub use index::{IndexRecord, PackIndex, PackLocation};
pub use memory::InMemoryContainer;
pub use traits::{CheckedReader, ObjectSizes, PackWriter, StreamSource, StreamedObject};
