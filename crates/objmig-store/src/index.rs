use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use objmig_types::ObjectId;

use crate::error::{StoreError, StoreResult};

const INDEX_MAGIC: &[u8; 4] = b"OMGI";
const INDEX_VERSION: u32 = 1;
const HEADER_LEN: usize = 8;

/// Fixed record size: id + pack id + offset + length + size + flags + crc32.
pub const RECORD_LEN: usize = 32 + 4 + 8 + 8 + 8 + 1 + 4;

const FLAG_COMPRESSED: u8 = 0b0000_0001;

/// Where an object lives inside a container's packs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PackLocation {
    pub pack_id: u32,
    /// Byte offset of the stored bytes inside the pack file.
    pub offset: u64,
    /// Number of stored (possibly compressed) bytes.
    pub length: u64,
    /// Uncompressed content size.
    pub size: u64,
    pub compressed: bool,
    /// CRC32 of the stored bytes.
    pub crc32: u32,
}

/// One entry of the on-disk index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndexRecord {
    pub id: ObjectId,
    pub location: PackLocation,
}

impl IndexRecord {
    fn encode(&self, buf: &mut Vec<u8>) {
        let loc = &self.location;
        buf.extend_from_slice(self.id.as_bytes());
        buf.extend_from_slice(&loc.pack_id.to_be_bytes());
        buf.extend_from_slice(&loc.offset.to_be_bytes());
        buf.extend_from_slice(&loc.length.to_be_bytes());
        buf.extend_from_slice(&loc.size.to_be_bytes());
        buf.push(if loc.compressed { FLAG_COMPRESSED } else { 0 });
        buf.extend_from_slice(&loc.crc32.to_be_bytes());
    }

    fn decode(chunk: &[u8]) -> StoreResult<Self> {
        if chunk.len() != RECORD_LEN {
            return Err(StoreError::IndexCorrupted(format!(
                "record of {} bytes, expected {RECORD_LEN}",
                chunk.len()
            )));
        }
        let mut id = [0u8; 32];
        id.copy_from_slice(&chunk[0..32]);
        let flags = chunk[60];
        if flags & !FLAG_COMPRESSED != 0 {
            return Err(StoreError::IndexCorrupted(format!("unknown flags {flags:#04x}")));
        }
        Ok(Self {
            id: ObjectId::from_hash(id),
            location: PackLocation {
                pack_id: u32::from_be_bytes(be_array(&chunk[32..36])),
                offset: u64::from_be_bytes(be_array(&chunk[36..44])),
                length: u64::from_be_bytes(be_array(&chunk[44..52])),
                size: u64::from_be_bytes(be_array(&chunk[52..60])),
                compressed: flags & FLAG_COMPRESSED != 0,
                crc32: u32::from_be_bytes(be_array(&chunk[61..65])),
            },
        })
    }
}

fn be_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut arr = [0u8; N];
    arr.copy_from_slice(bytes);
    arr
}

/// Append-only index of a container, mirrored in memory.
///
/// Layout: magic `OMGI`, big-endian version, then fixed-size records. New
/// records are appended after their pack bytes are on disk, so a crash
/// mid-batch leaves unindexed pack bytes but never a dangling record.
#[derive(Debug)]
pub struct PackIndex {
    path: PathBuf,
    entries: HashMap<ObjectId, PackLocation>,
}

impl PackIndex {
    /// Create an empty index file, replacing any existing one.
    pub fn create(path: &Path) -> StoreResult<Self> {
        let mut file = File::create(path)?;
        file.write_all(&header())?;
        file.sync_all()?;
        Ok(Self {
            path: path.to_path_buf(),
            entries: HashMap::new(),
        })
    }

    /// Load an index file from disk.
    pub fn load(path: &Path) -> StoreResult<Self> {
        let data = std::fs::read(path)?;
        let entries = Self::parse(&data)?;
        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    fn parse(data: &[u8]) -> StoreResult<HashMap<ObjectId, PackLocation>> {
        if data.len() < HEADER_LEN {
            return Err(StoreError::IndexCorrupted("too short".into()));
        }
        if &data[0..4] != INDEX_MAGIC {
            return Err(StoreError::InvalidMagic {
                expected: "OMGI".into(),
                actual: String::from_utf8_lossy(&data[0..4]).into(),
            });
        }
        let version = u32::from_be_bytes(be_array(&data[4..8]));
        if version != INDEX_VERSION {
            return Err(StoreError::UnsupportedVersion(version));
        }
        let body = &data[HEADER_LEN..];
        if body.len() % RECORD_LEN != 0 {
            return Err(StoreError::IndexCorrupted(format!(
                "trailing {} bytes after last record",
                body.len() % RECORD_LEN
            )));
        }
        let mut entries = HashMap::with_capacity(body.len() / RECORD_LEN);
        for chunk in body.chunks_exact(RECORD_LEN) {
            let record = IndexRecord::decode(chunk)?;
            entries.insert(record.id, record.location);
        }
        Ok(entries)
    }

    /// Persist records and make them visible to lookups.
    pub fn append(&mut self, records: &[IndexRecord]) -> StoreResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        let mut buf = Vec::with_capacity(records.len() * RECORD_LEN);
        for record in records {
            record.encode(&mut buf);
        }
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        file.write_all(&buf)?;
        file.sync_data()?;
        for record in records {
            self.entries.insert(record.id, record.location);
        }
        Ok(())
    }

    pub fn lookup(&self, id: &ObjectId) -> Option<PackLocation> {
        self.entries.get(id).copied()
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn object_count(&self) -> usize {
        self.entries.len()
    }

    /// Sum of the uncompressed sizes of all indexed objects.
    pub fn total_size(&self) -> u64 {
        self.entries.values().map(|loc| loc.size).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ObjectId, &PackLocation)> {
        self.entries.iter()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn header() -> [u8; HEADER_LEN] {
    let mut buf = [0u8; HEADER_LEN];
    buf[0..4].copy_from_slice(INDEX_MAGIC);
    buf[4..8].copy_from_slice(&INDEX_VERSION.to_be_bytes());
    buf
}
