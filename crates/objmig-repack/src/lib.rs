//! Bounded-memory repack engine.
//!
//! Moves already-identified objects from one pack store to another and
//! builds the mapping from old to new hashkeys, while keeping the bytes held
//! in memory under a fixed budget regardless of how many objects there are
//! or how large any single one is.
//!
//! # Pipeline
//!
//! ```text
//! BatchPlanner -> Group -> RepackDriver <-> BoundedCache -> PackWriter
//!                               |
//!                               v
//!                     HashkeyMappingBuilder -> HashkeyMapping
//! ```
//!
//! - [`BatchPlanner`] partitions the keys into disjoint [`Group`]s.
//! - [`RepackDriver`] streams one group once, deciding per object between a
//!   direct write, a flush followed by buffering, or plain buffering.
//! - [`BoundedCache`] holds small objects until the next batched write.
//! - [`HashkeyMappingBuilder`] accumulates `(old, new)` pairs across groups
//!   and rejects duplicates.
//! - [`Migration`] runs all groups, sequentially or on worker threads.
//! - [`verify_sizes`] checks every remapped object kept its size.

pub mod cache;
pub mod config;
pub mod driver;
pub mod error;
pub mod mapping;
pub mod migration;
pub mod planner;
pub mod verify;

#[cfg(test)]
mod testing;

pub use cache::{BoundedCache, BufferedObject};
pub use config::{MigrationConfig, RepackConfig};
pub use driver::{GroupReport, RepackDriver};
pub use error::{RepackError, RepackResult};
pub use mapping::{HashkeyMapping, HashkeyMappingBuilder, MappingSink, SharedMappingBuilder};
pub use migration::{Migration, MigrationReport};
pub use planner::{BatchPlanner, Group};
pub use verify::{verify_sizes, VerificationReport};
