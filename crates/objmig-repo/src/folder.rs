//! Folder metadata: the directory tree of one node.
//!
//! Serialized as nested JSON, where a directory is `{"dir": {name: entry}}`
//! and a file is `{"obj": "<object id hex>"}`:
//!
//! ```json
//! {"dir": {"aiida.in": {"obj": "4f2c..."}, "out": {"dir": {}}}}
//! ```

use std::collections::BTreeMap;

use objmig_types::ObjectId;
use serde::{Deserialize, Serialize};

use crate::error::{RepoError, RepoResult};

/// Kind of an entry in a node tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FileType {
    Directory,
    File,
}

/// A named entry as returned by listings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RepoObject {
    pub name: String,
    pub file_type: FileType,
}

/// One node of the folder tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FolderEntry {
    #[serde(rename = "dir")]
    Dir(BTreeMap<String, FolderEntry>),
    #[serde(rename = "obj")]
    Obj(ObjectId),
}

impl FolderEntry {
    pub fn file_type(&self) -> FileType {
        match self {
            Self::Dir(_) => FileType::Directory,
            Self::Obj(_) => FileType::File,
        }
    }
}

/// Directory tree of a node, mapping relative paths to object ids.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderMeta {
    dir: BTreeMap<String, FolderEntry>,
}

impl FolderMeta {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an (empty) directory at `path`, creating missing parents.
    pub fn add_directory(&mut self, path: &str) -> RepoResult<()> {
        let pieces = split_path(path)?;
        self.dir_mut(&pieces, path)?;
        Ok(())
    }

    /// Record the object stored for the file at `path`, creating missing
    /// parent directories. Replaces a previous object at the same path.
    pub fn set_object(&mut self, path: &str, id: ObjectId) -> RepoResult<()> {
        let mut pieces = split_path(path)?;
        let name = pieces
            .pop()
            .ok_or_else(|| RepoError::InvalidPath(path.to_string()))?;
        let parent = self.dir_mut(&pieces, path)?;
        if let Some(FolderEntry::Dir(_)) = parent.get(name) {
            return Err(RepoError::NotAFile(path.to_string()));
        }
        parent.insert(name.to_string(), FolderEntry::Obj(id));
        Ok(())
    }

    /// Entries of the directory at `path` (the root for `""`), by name.
    pub fn list_objects(&self, path: &str) -> RepoResult<Vec<RepoObject>> {
        let entries = match self.lookup(path)? {
            Some(FolderEntry::Dir(entries)) => entries,
            None => &self.dir,
            Some(FolderEntry::Obj(_)) => return Err(RepoError::NotADirectory(path.to_string())),
        };
        Ok(entries
            .iter()
            .map(|(name, entry)| RepoObject {
                name: name.clone(),
                file_type: entry.file_type(),
            })
            .collect())
    }

    /// The entry at `path`. The root is reported as a directory named `/`.
    pub fn get_object(&self, path: &str) -> RepoResult<RepoObject> {
        let pieces = split_path(path)?;
        match (self.lookup(path)?, pieces.last()) {
            (Some(entry), Some(name)) => Ok(RepoObject {
                name: (*name).to_string(),
                file_type: entry.file_type(),
            }),
            _ => Ok(RepoObject {
                name: "/".to_string(),
                file_type: FileType::Directory,
            }),
        }
    }

    /// Object id of the file at `path`.
    pub fn object_id(&self, path: &str) -> RepoResult<ObjectId> {
        match self.lookup(path)? {
            Some(FolderEntry::Obj(id)) => Ok(*id),
            _ => Err(RepoError::NotAFile(path.to_string())),
        }
    }

    /// Object ids of every file, depth first in name order. An id appears
    /// once per file referencing it.
    pub fn all_object_ids(&self) -> Vec<ObjectId> {
        fn collect(entries: &BTreeMap<String, FolderEntry>, out: &mut Vec<ObjectId>) {
            for entry in entries.values() {
                match entry {
                    FolderEntry::Obj(id) => out.push(*id),
                    FolderEntry::Dir(children) => collect(children, out),
                }
            }
        }
        let mut ids = Vec::new();
        collect(&self.dir, &mut ids);
        ids
    }

    /// Number of files in the tree.
    pub fn file_count(&self) -> usize {
        self.all_object_ids().len()
    }

    pub fn is_empty(&self) -> bool {
        self.dir.is_empty()
    }

    /// `None` means the root.
    fn lookup(&self, path: &str) -> RepoResult<Option<&FolderEntry>> {
        let pieces = split_path(path)?;
        let Some((last, parents)) = pieces.split_last() else {
            return Ok(None);
        };
        let mut current = &self.dir;
        for piece in parents {
            current = match current.get(*piece) {
                Some(FolderEntry::Dir(children)) => children,
                Some(FolderEntry::Obj(_)) => return Err(RepoError::NotADirectory(path.to_string())),
                None => return Err(RepoError::PathNotFound(path.to_string())),
            };
        }
        current
            .get(*last)
            .map(Some)
            .ok_or_else(|| RepoError::PathNotFound(path.to_string()))
    }

    fn dir_mut(
        &mut self,
        pieces: &[&str],
        path: &str,
    ) -> RepoResult<&mut BTreeMap<String, FolderEntry>> {
        let mut current = &mut self.dir;
        for piece in pieces {
            let entry = current
                .entry((*piece).to_string())
                .or_insert_with(|| FolderEntry::Dir(BTreeMap::new()));
            current = match entry {
                FolderEntry::Dir(children) => children,
                FolderEntry::Obj(_) => return Err(RepoError::NotADirectory(path.to_string())),
            };
        }
        Ok(current)
    }
}

/// Split a relative `/`-separated path, dropping empty and `.` components.
fn split_path(path: &str) -> RepoResult<Vec<&str>> {
    let mut pieces = Vec::new();
    for piece in path.split('/') {
        match piece {
            "" | "." => continue,
            ".." => return Err(RepoError::InvalidPath(path.to_string())),
            other => pieces.push(other),
        }
    }
    Ok(pieces)
}
