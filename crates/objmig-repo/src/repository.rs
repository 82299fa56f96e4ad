use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use objmig_store::{Container, ContainerConfig};
use objmig_types::ObjectId;
use serde::Serialize;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::catalog::{JsonCatalog, NodeCatalog};
use crate::error::{RepoError, RepoResult};
use crate::folder::{FolderMeta, RepoObject};
use crate::lazy::LazyFile;

/// File name of the node catalog inside a repository folder.
pub const CATALOG_FILE: &str = "catalog.json";

/// Timings and counts of a bulk node import.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub nodes: usize,
    /// Nodes with at least one file.
    pub nodes_with_files: usize,
    pub files: usize,
    /// Time to walk the node folders.
    pub list_time: Duration,
    /// Time to stream every file into packs.
    pub store_time: Duration,
    /// Time to commit the folder metadata.
    pub commit_time: Duration,
}

/// A pack container plus the catalog of node trees stored in it.
pub struct Repository {
    container: Container,
    catalog: JsonCatalog,
}

impl Repository {
    /// Open the repository in `folder`, initialising the container with
    /// `config` if there is none yet.
    pub fn open(folder: &Path, config: ContainerConfig) -> RepoResult<Self> {
        let container = Container::open_or_init(folder, config)?;
        let catalog = JsonCatalog::open(&folder.join(CATALOG_FILE))?;
        Ok(Self { container, catalog })
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn catalog(&self) -> &JsonCatalog {
        &self.catalog
    }

    /// Forget every node. Objects stay in the container.
    pub fn drop_catalog(&mut self) -> RepoResult<()> {
        self.catalog.clear()
    }

    /// Forget every node, remove every object and re-initialise the
    /// container with `config`.
    pub fn clear(&mut self, config: ContainerConfig) -> RepoResult<()> {
        self.catalog.clear()?;
        self.container.reset(config)?;
        Ok(())
    }

    /// Import the node folders in `folder_paths` (node UUID -> folder).
    ///
    /// All files of all nodes are written to packs as a single batch; each
    /// file is opened only while it is being copied. The folder metadata of
    /// every node is then committed to the catalog at once, so a failure
    /// while storing leaves the catalog untouched.
    pub fn create_repo_for_nodes(
        &mut self,
        folder_paths: &BTreeMap<String, PathBuf>,
        compress: bool,
    ) -> RepoResult<ImportReport> {
        let mut report = ImportReport {
            nodes: folder_paths.len(),
            ..ImportReport::default()
        };
        if let Some(uuid) = folder_paths
            .keys()
            .find(|uuid| self.catalog.folder_meta(uuid).is_ok())
        {
            return Err(RepoError::DuplicateNode(uuid.clone()));
        }

        let start = Instant::now();
        let mut metas: BTreeMap<String, FolderMeta> = BTreeMap::new();
        let mut targets: Vec<(&str, String)> = Vec::new();
        let mut files: Vec<LazyFile> = Vec::new();
        for (uuid, folder) in folder_paths {
            let meta = metas.entry(uuid.clone()).or_default();
            for entry in WalkDir::new(folder).min_depth(1).sort_by_file_name() {
                let entry = entry?;
                let relative = relative_key(folder, entry.path())?;
                if entry.file_type().is_dir() {
                    meta.add_directory(&relative)?;
                } else if entry.file_type().is_file() {
                    targets.push((uuid.as_str(), relative));
                    files.push(LazyFile::new(entry.path()));
                } else {
                    warn!(path = %entry.path().display(), "skipping entry that is neither file nor directory");
                }
            }
        }
        report.list_time = start.elapsed();
        info!(
            nodes = report.nodes,
            files = files.len(),
            "listed files to import in {:.3} s",
            report.list_time.as_secs_f64()
        );

        let start = Instant::now();
        let mut streams: Vec<&mut dyn Read> = files.iter_mut().map(|f| f as &mut dyn Read).collect();
        let ids = self.container.add_streamed_objects_to_pack(&mut streams, compress)?;
        report.store_time = start.elapsed();
        report.files = ids.len();
        info!(
            files = ids.len(),
            "stored files directly to packs in {:.3} s",
            report.store_time.as_secs_f64()
        );

        let start = Instant::now();
        for ((uuid, relative), id) in targets.into_iter().zip(ids) {
            if let Some(meta) = metas.get_mut(uuid) {
                meta.set_object(&relative, id)?;
            }
        }
        report.nodes_with_files = metas.values().filter(|m| m.file_count() > 0).count();
        self.catalog.insert_many(metas)?;
        report.commit_time = start.elapsed();
        info!(
            nodes = report.nodes,
            with_files = report.nodes_with_files,
            "committed folder metadata in {:.3} s",
            report.commit_time.as_secs_f64()
        );
        Ok(report)
    }

    pub fn get_node_repository(&self, node_uuid: &str) -> RepoResult<NodeRepository<'_>> {
        Ok(NodeRepository {
            node_uuid: node_uuid.to_string(),
            container: &self.container,
            folder_meta: self.catalog.folder_meta(node_uuid)?,
        })
    }

    /// Node repositories in the order of `node_uuids`.
    pub fn get_node_repositories(&self, node_uuids: &[String]) -> RepoResult<Vec<NodeRepository<'_>>> {
        let mut metas = self.catalog.folder_metas(node_uuids)?;
        node_uuids
            .iter()
            .map(|uuid| {
                let folder_meta = metas
                    .remove(uuid)
                    .map_or_else(|| self.catalog.folder_meta(uuid), Ok)?;
                Ok(NodeRepository {
                    node_uuid: uuid.clone(),
                    container: &self.container,
                    folder_meta,
                })
            })
            .collect()
    }

    pub fn get_all_node_uuids(&self) -> RepoResult<Vec<String>> {
        self.catalog.all_node_uuids()
    }

    /// Object ids referenced by the listed nodes, node by node. An object
    /// referenced several times appears several times.
    pub fn object_ids_for_nodes(&self, node_uuids: &[String]) -> RepoResult<Vec<ObjectId>> {
        Ok(self
            .get_node_repositories(node_uuids)?
            .iter()
            .flat_map(NodeRepository::get_all_object_ids)
            .collect())
    }
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("folder", &self.container.folder())
            .field("nodes", &self.catalog.len())
            .finish()
    }
}

/// Read access to the tree of one node.
#[derive(Debug)]
pub struct NodeRepository<'r> {
    node_uuid: String,
    container: &'r Container,
    folder_meta: FolderMeta,
}

impl NodeRepository<'_> {
    pub fn node_uuid(&self) -> &str {
        &self.node_uuid
    }

    pub fn folder_meta(&self) -> &FolderMeta {
        &self.folder_meta
    }

    pub fn list_objects(&self, path: &str) -> RepoResult<Vec<RepoObject>> {
        self.folder_meta.list_objects(path)
    }

    pub fn list_object_names(&self, path: &str) -> RepoResult<Vec<String>> {
        Ok(self.list_objects(path)?.into_iter().map(|o| o.name).collect())
    }

    pub fn get_object(&self, path: &str) -> RepoResult<RepoObject> {
        self.folder_meta.get_object(path)
    }

    pub fn get_object_content(&self, path: &str) -> RepoResult<Vec<u8>> {
        let id = self.folder_meta.object_id(path)?;
        Ok(self.container.get_object_content(&id)?)
    }

    pub fn get_all_object_ids(&self) -> Vec<ObjectId> {
        self.folder_meta.all_object_ids()
    }
}

/// `/`-separated key of `path` relative to `root`.
fn relative_key(root: &Path, path: &Path) -> RepoResult<String> {
    let relative = path
        .strip_prefix(root)
        .map_err(|_| RepoError::InvalidPath(path.display().to_string()))?;
    let pieces = relative
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| RepoError::InvalidPath(path.display().to_string()))?;
    Ok(pieces.join("/"))
}
