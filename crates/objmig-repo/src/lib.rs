//! Node repositories on top of an objmig container.
//!
//! A node's files live as objects in a pack [`Container`](objmig_store::Container);
//! the directory structure lives in a [`FolderMeta`] JSON tree that the
//! [`NodeCatalog`] stores per node UUID.
//!
//! - [`legacy`]: discovery of node folders in a sharded legacy repository.
//! - [`Repository`]: bulk import of node folders and access to the catalog.
//! - [`NodeRepository`]: read access to one node's tree.
//! - [`extract`]: re-creation of the legacy layout from a repository.
//! - [`compare`]: recursive comparison of two directory trees.

pub mod catalog;
pub mod compare;
pub mod error;
pub mod extract;
pub mod folder;
pub mod lazy;
pub mod legacy;
pub mod repository;

pub use catalog::{JsonCatalog, NodeCatalog};
pub use compare::{compare_trees, TreeDifference};
pub use error::{RepoError, RepoResult};
pub use extract::{export_to_legacy, ExtractReport};
pub use folder::{FileType, FolderEntry, FolderMeta, RepoObject};
pub use lazy::LazyFile;
pub use legacy::{legacy_node_folder, list_legacy_nodes};
pub use repository::{ImportReport, NodeRepository, Repository};
