//! Legacy repository layout.
//!
//! Node folders are sharded by UUID: `ab/cd/ef01...` holds the files of node
//! `abcdef01...`, the first two levels being two lowercase hex characters
//! each and the leaf the remaining 32 characters of the 36-character UUID.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::error::{RepoError, RepoResult};

const UUID_LEN: usize = 36;

/// Find every node folder below `node_folder`, keyed by node UUID.
///
/// Entries that do not fit the sharded layout are skipped.
pub fn list_legacy_nodes(node_folder: &Path) -> RepoResult<BTreeMap<String, PathBuf>> {
    let mut nodes = BTreeMap::new();
    let walker = WalkDir::new(node_folder)
        .min_depth(1)
        .max_depth(3)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            matches!(entry.depth(), 0 | 3) || is_shard(entry.file_name().to_str())
        });

    for entry in walker {
        let entry = entry?;
        if entry.depth() < 3 {
            if !entry.file_type().is_dir() {
                debug!(path = %entry.path().display(), "skipping non-directory shard");
            }
            continue;
        }
        let path = entry.path();
        if !entry.file_type().is_dir() {
            warn!(path = %path.display(), "skipping file in place of a node folder");
            continue;
        }
        let Some(uuid) = node_uuid_from_path(node_folder, path) else {
            warn!(path = %path.display(), "skipping entry that is not a node folder");
            continue;
        };
        nodes.insert(uuid, path.to_path_buf());
    }
    debug!(nodes = nodes.len(), folder = %node_folder.display(), "listed legacy nodes");
    Ok(nodes)
}

/// Folder of `node_uuid` below a legacy `root`. The UUID must be in its
/// hyphenated 36-character form.
pub fn legacy_node_folder(root: &Path, node_uuid: &str) -> RepoResult<PathBuf> {
    if node_uuid.len() != UUID_LEN || Uuid::try_parse(node_uuid).is_err() {
        return Err(RepoError::InvalidNodeUuid(node_uuid.to_string()));
    }
    Ok(root
        .join(&node_uuid[..2])
        .join(&node_uuid[2..4])
        .join(&node_uuid[4..]))
}

fn is_shard(name: Option<&str>) -> bool {
    name.is_some_and(|name| {
        name.len() == 2 && name.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    })
}

fn node_uuid_from_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let uuid: String = relative
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<Vec<_>>>()?
        .concat();
    (uuid.len() == UUID_LEN).then_some(uuid)
}
