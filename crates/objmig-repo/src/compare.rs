//! Recursive directory comparison, reporting what `diff -rq` would.

use std::collections::BTreeSet;
use std::fmt;
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use crate::error::RepoResult;

/// One difference between two trees. Paths are relative to the compared
/// roots.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TreeDifference {
    OnlyInLeft(PathBuf),
    OnlyInRight(PathBuf),
    /// A directory on one side, something else on the other.
    TypeDiffers(PathBuf),
    ContentDiffers(PathBuf),
}

impl TreeDifference {
    pub fn path(&self) -> &Path {
        match self {
            Self::OnlyInLeft(p) | Self::OnlyInRight(p) | Self::TypeDiffers(p) | Self::ContentDiffers(p) => p,
        }
    }
}

impl fmt::Display for TreeDifference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OnlyInLeft(p) => write!(f, "only in left: {}", p.display()),
            Self::OnlyInRight(p) => write!(f, "only in right: {}", p.display()),
            Self::TypeDiffers(p) => write!(f, "file types differ: {}", p.display()),
            Self::ContentDiffers(p) => write!(f, "files differ: {}", p.display()),
        }
    }
}

/// Compare the trees under `left` and `right`, in path order.
///
/// Symbolic links are followed. An entry only present on one side is
/// reported once, without descending into it.
pub fn compare_trees(left: &Path, right: &Path) -> RepoResult<Vec<TreeDifference>> {
    let mut differences = Vec::new();
    compare_dirs(left, right, Path::new(""), &mut differences)?;
    Ok(differences)
}

fn compare_dirs(
    left: &Path,
    right: &Path,
    relative: &Path,
    out: &mut Vec<TreeDifference>,
) -> RepoResult<()> {
    let left_names = entry_names(&left.join(relative))?;
    let right_names = entry_names(&right.join(relative))?;

    for name in left_names.union(&right_names) {
        let path = relative.join(name);
        match (left_names.contains(name), right_names.contains(name)) {
            (true, false) => out.push(TreeDifference::OnlyInLeft(path)),
            (false, true) => out.push(TreeDifference::OnlyInRight(path)),
            _ => {
                let l = fs::metadata(left.join(&path))?;
                let r = fs::metadata(right.join(&path))?;
                match (l.is_dir(), r.is_dir()) {
                    (true, true) => compare_dirs(left, right, &path, out)?,
                    (false, false) => {
                        if l.len() != r.len()
                            || !same_content(&left.join(&path), &right.join(&path))?
                        {
                            out.push(TreeDifference::ContentDiffers(path));
                        }
                    }
                    _ => out.push(TreeDifference::TypeDiffers(path)),
                }
            }
        }
    }
    Ok(())
}

fn entry_names(dir: &Path) -> RepoResult<BTreeSet<std::ffi::OsString>> {
    let mut names = BTreeSet::new();
    for entry in fs::read_dir(dir)? {
        names.insert(entry?.file_name());
    }
    Ok(names)
}

fn same_content(a: &Path, b: &Path) -> RepoResult<bool> {
    const CHUNK: usize = 64 * 1024;
    let mut a = BufReader::new(File::open(a)?);
    let mut b = BufReader::new(File::open(b)?);
    let mut buf_a = vec![0u8; CHUNK];
    let mut buf_b = vec![0u8; CHUNK];
    loop {
        let n = read_full(&mut a, &mut buf_a)?;
        let m = read_full(&mut b, &mut buf_b)?;
        if n != m || buf_a[..n] != buf_b[..m] {
            return Ok(false);
        }
        if n == 0 {
            return Ok(true);
        }
    }
}

/// Fill `buf` as far as the reader allows; short only at end of file.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}
