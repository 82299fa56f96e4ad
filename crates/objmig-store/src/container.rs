use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use objmig_types::{ObjectId, ObjectMeta};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::ContainerConfig;
use crate::error::{StoreError, StoreResult};
use crate::hasher::{ContentHasher, CrcWriter, HashingReader};
use crate::index::{IndexRecord, PackIndex, PackLocation};
use crate::traits::{ObjectSizes, PackWriter, StreamSource, StreamedObject};

const CONFIG_FILE: &str = "config.json";
const PACKS_DIR: &str = "packs";
const INDEX_FILE: &str = "packs.idx";
const CONTAINER_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct PersistedConfig {
    container_version: u32,
    container_id: Uuid,
    #[serde(flatten)]
    config: ContainerConfig,
}

/// Space used by a container, for reporting.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SizeInfo {
    /// Sum of the uncompressed sizes of all packed objects.
    pub total_size_packed: u64,
    /// Bytes used by pack files on disk, including unindexed bytes.
    pub total_size_packed_on_disk: u64,
    pub total_size_packindexes_on_disk: u64,
}

impl SizeInfo {
    /// `(name, value)` rows sorted by name.
    pub fn rows(&self) -> Vec<(&'static str, u64)> {
        vec![
            ("total_size_packed", self.total_size_packed),
            ("total_size_packed_on_disk", self.total_size_packed_on_disk),
            (
                "total_size_packindexes_on_disk",
                self.total_size_packindexes_on_disk,
            ),
        ]
    }
}

/// Object and pack counts of a container, for reporting.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CountInfo {
    pub pack_files: usize,
    pub packed: usize,
}

impl CountInfo {
    pub fn rows(&self) -> Vec<(&'static str, u64)> {
        vec![
            ("pack_files", self.pack_files as u64),
            ("packed", self.packed as u64),
        ]
    }
}

/// Pack file currently receiving writes.
struct ActivePack {
    pack_id: u32,
    file: Option<File>,
}

impl ActivePack {
    /// The pack to write the next object into, rolling over to a fresh pack
    /// once the current one has reached `target` bytes.
    fn file_for_write(&mut self, packs_dir: &Path, target: u64) -> StoreResult<(u32, &mut File)> {
        if let Some(file) = &self.file {
            let len = file.metadata()?.len();
            if len > 0 && len >= target {
                self.file = None;
                self.pack_id += 1;
            }
        }
        let file = match self.file.take() {
            Some(file) => file,
            None => open_for_append(&pack_path(packs_dir, self.pack_id))?,
        };
        Ok((self.pack_id, self.file.insert(file)))
    }

    fn sync(&mut self) -> StoreResult<()> {
        if let Some(file) = &self.file {
            file.sync_data()?;
        }
        Ok(())
    }
}

/// On-disk, pack-based object store.
///
/// Objects are appended to numbered pack files under `packs/` and located
/// through an append-only index (`packs.idx`). Writers are serialized by an
/// internal lock; readers open their own file handles, so reads may proceed
/// while a batch is being written.
pub struct Container {
    folder: PathBuf,
    config: ContainerConfig,
    container_id: Uuid,
    index: RwLock<PackIndex>,
    writer: Mutex<ActivePack>,
}

impl Container {
    /// Returns `true` if `folder` holds an initialised container.
    pub fn is_initialised(folder: &Path) -> bool {
        folder.join(CONFIG_FILE).is_file()
    }

    /// Initialise a new container in `folder` (created if missing).
    pub fn init(folder: &Path, config: ContainerConfig) -> StoreResult<Self> {
        if Self::is_initialised(folder) {
            return Err(StoreError::AlreadyInitialised(folder.to_path_buf()));
        }
        std::fs::create_dir_all(folder.join(PACKS_DIR))?;
        let persisted = PersistedConfig {
            container_version: CONTAINER_VERSION,
            container_id: Uuid::now_v7(),
            config,
        };
        let data = serde_json::to_vec_pretty(&persisted)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        PackIndex::create(&folder.join(INDEX_FILE))?;
        std::fs::write(folder.join(CONFIG_FILE), data)?;
        tracing::debug!(folder = %folder.display(), id = %persisted.container_id, "initialised container");
        Self::open(folder)
    }

    /// Open an existing container.
    pub fn open(folder: &Path) -> StoreResult<Self> {
        if !Self::is_initialised(folder) {
            return Err(StoreError::NotInitialised(folder.to_path_buf()));
        }
        let data = std::fs::read(folder.join(CONFIG_FILE))?;
        let persisted: PersistedConfig = serde_json::from_slice(&data)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        if persisted.container_version != CONTAINER_VERSION {
            return Err(StoreError::UnsupportedVersion(persisted.container_version));
        }
        let index = PackIndex::load(&folder.join(INDEX_FILE))?;
        let pack_id = active_pack_id(&folder.join(PACKS_DIR), persisted.config.pack_size_target)?;
        Ok(Self {
            folder: folder.to_path_buf(),
            config: persisted.config,
            container_id: persisted.container_id,
            index: RwLock::new(index),
            writer: Mutex::new(ActivePack {
                pack_id,
                file: None,
            }),
        })
    }

    /// Open the container in `folder`, initialising it first if needed.
    pub fn open_or_init(folder: &Path, config: ContainerConfig) -> StoreResult<Self> {
        if Self::is_initialised(folder) {
            Self::open(folder)
        } else {
            Self::init(folder, config)
        }
    }

    /// Remove every object and pack, keeping the configuration.
    pub fn clear(&self) -> StoreResult<()> {
        let mut active = self.writer.lock().expect("lock poisoned");
        let mut index = self.index.write().expect("lock poisoned");
        active.file = None;
        active.pack_id = 0;
        let packs_dir = self.packs_dir();
        if packs_dir.exists() {
            std::fs::remove_dir_all(&packs_dir)?;
        }
        std::fs::create_dir_all(&packs_dir)?;
        *index = PackIndex::create(&self.folder.join(INDEX_FILE))?;
        Ok(())
    }

    /// Remove every object and pack, and replace the configuration with
    /// `config`. The container id is kept.
    pub fn reset(&mut self, config: ContainerConfig) -> StoreResult<()> {
        self.clear()?;
        let persisted = PersistedConfig {
            container_version: CONTAINER_VERSION,
            container_id: self.container_id,
            config,
        };
        let data = serde_json::to_vec_pretty(&persisted)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        std::fs::write(self.folder.join(CONFIG_FILE), data)?;
        tracing::debug!(
            folder = %self.folder.display(),
            pack_size_target = persisted.config.pack_size_target,
            "reset container"
        );
        self.config = persisted.config;
        Ok(())
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn config(&self) -> &ContainerConfig {
        &self.config
    }

    pub fn container_id(&self) -> Uuid {
        self.container_id
    }

    fn packs_dir(&self) -> PathBuf {
        self.folder.join(PACKS_DIR)
    }

    /// Store in-memory contents. See [`add_streamed_objects_to_pack`](Self::add_streamed_objects_to_pack).
    pub fn add_objects_to_pack(&self, contents: &[&[u8]], compress: bool) -> StoreResult<Vec<ObjectId>> {
        let mut slices: Vec<&[u8]> = contents.to_vec();
        let mut streams: Vec<&mut dyn Read> =
            slices.iter_mut().map(|s| s as &mut dyn Read).collect();
        self.add_streamed_objects_to_pack(&mut streams, compress)
    }

    /// Stream objects into the active pack, returning one id per stream.
    ///
    /// Content is hashed while it is copied, so no object is ever held in
    /// memory. Content already present in the container (or earlier in the
    /// same batch) is truncated back out of the pack and its existing id is
    /// returned. The batch is indexed only once every stream has been
    /// written; on error nothing of the batch becomes visible.
    pub fn add_streamed_objects_to_pack(
        &self,
        streams: &mut [&mut dyn Read],
        compress: bool,
    ) -> StoreResult<Vec<ObjectId>> {
        if streams.is_empty() {
            return Ok(Vec::new());
        }
        let packs_dir = self.packs_dir();
        let mut active = self.writer.lock().expect("lock poisoned");
        let mut ids = Vec::with_capacity(streams.len());
        let mut pending: Vec<IndexRecord> = Vec::new();
        let mut pending_ids: HashSet<ObjectId> = HashSet::new();

        for stream in streams.iter_mut() {
            let (pack_id, file) = active.file_for_write(&packs_dir, self.config.pack_size_target)?;
            let offset = file.seek(SeekFrom::End(0))?;
            let mut source = HashingReader::new(&mut **stream, &ContentHasher::OBJECT);
            let mut sink = CrcWriter::new(&mut *file);
            if compress {
                let mut encoder = zstd::stream::write::Encoder::new(&mut sink, self.config.compression_level)?;
                io::copy(&mut source, &mut encoder)?;
                encoder.finish()?;
            } else {
                io::copy(&mut source, &mut sink)?;
            }
            let crc32 = sink.finish();
            let end = file.stream_position()?;
            let (id, size) = source.finish();

            let known = pending_ids.contains(&id)
                || self.index.read().expect("lock poisoned").contains(&id);
            if known {
                file.set_len(offset)?;
            } else {
                pending.push(IndexRecord {
                    id,
                    location: PackLocation {
                        pack_id,
                        offset,
                        length: end - offset,
                        size,
                        compressed: compress,
                        crc32,
                    },
                });
                pending_ids.insert(id);
            }
            ids.push(id);
        }

        active.sync()?;
        self.index.write().expect("lock poisoned").append(&pending)?;
        tracing::debug!(
            objects = ids.len(),
            new = pending.len(),
            compress,
            "wrote batch to pack"
        );
        Ok(ids)
    }

    pub fn has_object(&self, id: &ObjectId) -> bool {
        self.index.read().expect("lock poisoned").contains(id)
    }

    pub fn get_object_meta(&self, id: &ObjectId) -> StoreResult<ObjectMeta> {
        self.locate(id).map(|loc| ObjectMeta::new(loc.size))
    }

    /// Read, checksum and decompress a whole object.
    pub fn get_object_content(&self, id: &ObjectId) -> StoreResult<Vec<u8>> {
        let loc = self.locate(id)?;
        let mut file = File::open(pack_path(&self.packs_dir(), loc.pack_id))?;
        file.seek(SeekFrom::Start(loc.offset))?;
        let mut stored = vec![0u8; usize::try_from(loc.length).unwrap_or(0)];
        file.read_exact(&mut stored)?;
        if crc32fast::hash(&stored) != loc.crc32 {
            return Err(StoreError::CrcMismatch { id: *id });
        }
        let content = if loc.compressed {
            zstd::decode_all(stored.as_slice()).map_err(|e| StoreError::CorruptObject {
                id: *id,
                reason: format!("decompression failed: {e}"),
            })?
        } else {
            stored
        };
        if content.len() as u64 != loc.size {
            return Err(StoreError::CorruptObject {
                id: *id,
                reason: format!("size mismatch: expected {}, got {}", loc.size, content.len()),
            });
        }
        Ok(content)
    }

    fn locate(&self, id: &ObjectId) -> StoreResult<PackLocation> {
        self.index
            .read()
            .expect("lock poisoned")
            .lookup(id)
            .ok_or(StoreError::NotFound(*id))
    }

    /// All object ids in the container, sorted.
    pub fn all_ids(&self) -> Vec<ObjectId> {
        let index = self.index.read().expect("lock poisoned");
        let mut ids: Vec<ObjectId> = index.iter().map(|(id, _)| *id).collect();
        ids.sort();
        ids
    }

    pub fn get_total_size(&self) -> StoreResult<SizeInfo> {
        let index = self.index.read().expect("lock poisoned");
        let mut on_disk = 0;
        for pack_id in list_pack_ids(&self.packs_dir())? {
            on_disk += std::fs::metadata(pack_path(&self.packs_dir(), pack_id))?.len();
        }
        Ok(SizeInfo {
            total_size_packed: index.total_size(),
            total_size_packed_on_disk: on_disk,
            total_size_packindexes_on_disk: std::fs::metadata(index.path())?.len(),
        })
    }

    pub fn count_objects(&self) -> StoreResult<CountInfo> {
        Ok(CountInfo {
            pack_files: list_pack_ids(&self.packs_dir())?.len(),
            packed: self.index.read().expect("lock poisoned").object_count(),
        })
    }
}

impl StreamSource for Container {
    /// Objects are visited grouped by pack and in offset order, so each pack
    /// is opened once and read front to back.
    fn stream_objects<E, F>(&self, ids: &[ObjectId], mut visit: F) -> Result<(), E>
    where
        E: From<StoreError>,
        F: FnMut(StreamedObject<'_>) -> Result<(), E>,
    {
        let mut located = Vec::with_capacity(ids.len());
        {
            let index = self.index.read().expect("lock poisoned");
            let mut seen = HashSet::with_capacity(ids.len());
            for id in ids {
                if !seen.insert(*id) {
                    continue;
                }
                let loc = index.lookup(id).ok_or(StoreError::NotFound(*id))?;
                located.push((*id, loc));
            }
        }
        located.sort_by_key(|(_, loc)| (loc.pack_id, loc.offset));

        let packs_dir = self.packs_dir();
        let mut open: Option<(u32, File)> = None;
        for (id, loc) in located {
            let mut file = match open.take() {
                Some((pack_id, file)) if pack_id == loc.pack_id => file,
                _ => File::open(pack_path(&packs_dir, loc.pack_id)).map_err(StoreError::from)?,
            };
            file.seek(SeekFrom::Start(loc.offset)).map_err(StoreError::from)?;
            {
                let raw = Read::by_ref(&mut file).take(loc.length);
                let mut reader: Box<dyn Read + '_> = if loc.compressed {
                    Box::new(zstd::stream::read::Decoder::new(raw).map_err(StoreError::from)?)
                } else {
                    Box::new(raw)
                };
                visit(StreamedObject::new(id, ObjectMeta::new(loc.size), &mut *reader))?;
            }
            open = Some((loc.pack_id, file));
        }
        Ok(())
    }
}

impl PackWriter for Container {
    fn write_batch(&self, streams: &mut [&mut dyn Read], compress: bool) -> StoreResult<Vec<ObjectId>> {
        self.add_streamed_objects_to_pack(streams, compress)
    }
}

impl ObjectSizes for Container {
    fn object_size(&self, id: &ObjectId) -> StoreResult<Option<u64>> {
        Ok(self
            .index
            .read()
            .expect("lock poisoned")
            .lookup(id)
            .map(|loc| loc.size))
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("folder", &self.folder)
            .field("container_id", &self.container_id)
            .finish()
    }
}

fn pack_path(packs_dir: &Path, pack_id: u32) -> PathBuf {
    packs_dir.join(pack_id.to_string())
}

fn open_for_append(path: &Path) -> StoreResult<File> {
    Ok(OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)?)
}

/// Numeric pack file names present in `packs_dir`, sorted. Other files are ignored.
fn list_pack_ids(packs_dir: &Path) -> StoreResult<Vec<u32>> {
    let mut ids = Vec::new();
    if !packs_dir.exists() {
        return Ok(ids);
    }
    for entry in std::fs::read_dir(packs_dir)? {
        let entry = entry?;
        if let Some(id) = entry.file_name().to_str().and_then(|n| n.parse::<u32>().ok()) {
            ids.push(id);
        }
    }
    ids.sort_unstable();
    Ok(ids)
}

/// The pack to resume writing into when a container is opened.
fn active_pack_id(packs_dir: &Path, target: u64) -> StoreResult<u32> {
    let Some(&last) = list_pack_ids(packs_dir)?.last() else {
        return Ok(0);
    };
    let len = std::fs::metadata(pack_path(packs_dir, last))?.len();
    Ok(if len > 0 && len >= target { last + 1 } else { last })
}
