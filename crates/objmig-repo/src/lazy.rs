use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

/// A file reader that opens its file on the first read and closes it at
/// end of file.
///
/// Lets a whole import be handed to a pack writer as one batch of streams
/// while at most one file descriptor is open at a time.
#[derive(Debug)]
pub struct LazyFile {
    path: PathBuf,
    file: Option<File>,
    done: bool,
}

impl LazyFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: None,
            done: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }
}

impl Read for LazyFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.done {
            return Ok(0);
        }
        let file = match &mut self.file {
            Some(file) => file,
            slot => slot.insert(File::open(&self.path)?),
        };
        let n = file.read(buf)?;
        if n == 0 && !buf.is_empty() {
            self.file = None;
            self.done = true;
        }
        Ok(n)
    }
}
