//! Foundation types for objmig.
//!
//! Every other objmig crate depends on `objmig-types`.
//!
//! # Key Types
//!
//! - [`ObjectId`]: Content-addressed identifier (BLAKE3 hash)
//! - [`OldHashkey`]: Identifier of an object in the store being migrated from
//! - [`NewHashkey`]: Identifier of the same object in the store migrated to
//! - [`ObjectMeta`]: Metadata yielded alongside an object stream

pub mod error;
pub mod hashkey;
pub mod object;

pub use error::TypeError;
pub use hashkey::{NewHashkey, OldHashkey};
pub use object::{ObjectId, ObjectMeta};
