use std::fs;
use std::path::Path;

use serde::Serialize;
use tracing::debug;

use crate::error::{RepoError, RepoResult};
use crate::folder::FileType;
use crate::legacy::legacy_node_folder;
use crate::repository::NodeRepository;

/// Counts of a legacy export.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ExtractReport {
    pub nodes: usize,
    pub files: usize,
    pub bytes: u64,
}

/// Recreate the sharded legacy layout of `node_repos` under `dest`.
///
/// `dest` is created and must not exist yet.
pub fn export_to_legacy(node_repos: &[NodeRepository<'_>], dest: &Path) -> RepoResult<ExtractReport> {
    if dest.exists() {
        return Err(RepoError::DestinationExists(dest.to_path_buf()));
    }
    fs::create_dir_all(dest)?;
    let mut report = ExtractReport::default();
    for node in node_repos {
        let folder = legacy_node_folder(dest, node.node_uuid())?;
        fs::create_dir_all(&folder)?;
        write_folder(node, &folder, "", &mut report)?;
        report.nodes += 1;
    }
    debug!(nodes = report.nodes, files = report.files, dest = %dest.display(), "exported to legacy layout");
    Ok(report)
}

fn write_folder(
    node: &NodeRepository<'_>,
    base: &Path,
    relative: &str,
    report: &mut ExtractReport,
) -> RepoResult<()> {
    for object in node.list_objects(relative)? {
        let path = if relative.is_empty() {
            object.name.clone()
        } else {
            format!("{relative}/{}", object.name)
        };
        match object.file_type {
            FileType::Directory => {
                fs::create_dir(base.join(&path))?;
                write_folder(node, base, &path, report)?;
            }
            FileType::File => {
                let content = node.get_object_content(&path)?;
                fs::write(base.join(&path), &content)?;
                report.files += 1;
                report.bytes += content.len() as u64;
            }
        }
    }
    Ok(())
}
