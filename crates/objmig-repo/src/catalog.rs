use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{RepoError, RepoResult};
use crate::folder::FolderMeta;

/// Per-node storage of folder metadata.
pub trait NodeCatalog {
    /// Add the folder metadata of several nodes in one commit. Fails without
    /// adding anything if one of the nodes is already present.
    fn insert_many(&mut self, metas: BTreeMap<String, FolderMeta>) -> RepoResult<()>;

    fn folder_meta(&self, node_uuid: &str) -> RepoResult<FolderMeta>;

    /// Folder metadata of every listed node. Fails on the first unknown one.
    fn folder_metas(&self, node_uuids: &[String]) -> RepoResult<BTreeMap<String, FolderMeta>>;

    fn all_node_uuids(&self) -> RepoResult<Vec<String>>;

    /// Remove every node.
    fn clear(&mut self) -> RepoResult<()>;
}

const CATALOG_VERSION: u32 = 1;

#[derive(Default, Serialize, Deserialize)]
struct CatalogFile {
    version: u32,
    nodes: BTreeMap<String, FolderMeta>,
}

/// A catalog kept in memory and persisted as one JSON document.
///
/// Every mutation rewrites the whole file through a temporary file and a
/// rename, so the file on disk is always a complete commit.
#[derive(Debug)]
pub struct JsonCatalog {
    path: PathBuf,
    nodes: BTreeMap<String, FolderMeta>,
}

impl JsonCatalog {
    /// Open the catalog at `path`, starting empty if the file does not exist.
    pub fn open(path: &Path) -> RepoResult<Self> {
        let nodes = if path.exists() {
            let data = fs::read(path)?;
            let file: CatalogFile = serde_json::from_slice(&data)
                .map_err(|e| RepoError::Serialization(e.to_string()))?;
            if file.version != CATALOG_VERSION {
                return Err(RepoError::Serialization(format!(
                    "unsupported catalog version {}",
                    file.version
                )));
            }
            file.nodes
        } else {
            BTreeMap::new()
        };
        debug!(path = %path.display(), nodes = nodes.len(), "opened catalog");
        Ok(Self {
            path: path.to_path_buf(),
            nodes,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn persist(&self, nodes: &BTreeMap<String, FolderMeta>) -> RepoResult<()> {
        #[derive(Serialize)]
        struct CatalogRef<'a> {
            version: u32,
            nodes: &'a BTreeMap<String, FolderMeta>,
        }
        let data = serde_json::to_vec(&CatalogRef {
            version: CATALOG_VERSION,
            nodes,
        })
        .map_err(|e| RepoError::Serialization(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, data)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl NodeCatalog for JsonCatalog {
    fn insert_many(&mut self, metas: BTreeMap<String, FolderMeta>) -> RepoResult<()> {
        if let Some(existing) = metas.keys().find(|uuid| self.nodes.contains_key(*uuid)) {
            return Err(RepoError::DuplicateNode(existing.clone()));
        }
        let mut nodes = self.nodes.clone();
        nodes.extend(metas);
        self.persist(&nodes)?;
        self.nodes = nodes;
        Ok(())
    }

    fn folder_meta(&self, node_uuid: &str) -> RepoResult<FolderMeta> {
        self.nodes
            .get(node_uuid)
            .cloned()
            .ok_or_else(|| RepoError::NodeNotFound(node_uuid.to_string()))
    }

    fn folder_metas(&self, node_uuids: &[String]) -> RepoResult<BTreeMap<String, FolderMeta>> {
        node_uuids
            .iter()
            .map(|uuid| Ok((uuid.clone(), self.folder_meta(uuid)?)))
            .collect()
    }

    fn all_node_uuids(&self) -> RepoResult<Vec<String>> {
        Ok(self.nodes.keys().cloned().collect())
    }

    fn clear(&mut self) -> RepoResult<()> {
        self.persist(&BTreeMap::new())?;
        self.nodes.clear();
        Ok(())
    }
}
