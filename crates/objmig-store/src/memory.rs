use std::collections::{HashMap, HashSet};
use std::io::{Cursor, Read};
use std::sync::RwLock;

use objmig_types::{ObjectId, ObjectMeta};

use crate::error::{StoreError, StoreResult};
use crate::hasher::ContentHasher;
use crate::traits::{ObjectSizes, PackWriter, StreamSource, StreamedObject};

/// In-memory, HashMap-based object store.
///
/// Intended for tests and embedding. Implements the same traits as the
/// on-disk [`Container`](crate::Container) and additionally counts how often
/// each object was streamed.
pub struct InMemoryContainer {
    objects: RwLock<HashMap<ObjectId, Vec<u8>>>,
    streamed: RwLock<HashMap<ObjectId, usize>>,
}

impl InMemoryContainer {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            streamed: RwLock::new(HashMap::new()),
        }
    }

    /// Store `content` and return its id.
    pub fn insert(&self, content: &[u8]) -> ObjectId {
        let id = ContentHasher::OBJECT.hash(content);
        self.objects
            .write()
            .expect("lock poisoned")
            .entry(id)
            .or_insert_with(|| content.to_vec());
        id
    }

    pub fn content(&self, id: &ObjectId) -> Option<Vec<u8>> {
        self.objects.read().expect("lock poisoned").get(id).cloned()
    }

    /// Number of objects currently stored.
    pub fn len(&self) -> usize {
        self.objects.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.objects.read().expect("lock poisoned").is_empty()
    }

    /// Total bytes across all stored objects.
    pub fn total_bytes(&self) -> u64 {
        self.objects
            .read()
            .expect("lock poisoned")
            .values()
            .map(|data| data.len() as u64)
            .sum()
    }

    /// How many times `id` has been handed to a stream visitor.
    pub fn times_streamed(&self, id: &ObjectId) -> usize {
        self.streamed
            .read()
            .expect("lock poisoned")
            .get(id)
            .copied()
            .unwrap_or(0)
    }
}

impl Default for InMemoryContainer {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamSource for InMemoryContainer {
    /// Objects are visited in request order. Content is cloned out of the
    /// map before each visit, so a visitor may write into the same store.
    fn stream_objects<E, F>(&self, ids: &[ObjectId], mut visit: F) -> Result<(), E>
    where
        E: From<StoreError>,
        F: FnMut(StreamedObject<'_>) -> Result<(), E>,
    {
        let mut seen = HashSet::with_capacity(ids.len());
        for id in ids {
            if !seen.insert(*id) {
                continue;
            }
            let content = self.content(id).ok_or(StoreError::NotFound(*id))?;
            *self
                .streamed
                .write()
                .expect("lock poisoned")
                .entry(*id)
                .or_insert(0) += 1;
            let meta = ObjectMeta::new(content.len() as u64);
            let mut reader = Cursor::new(content);
            visit(StreamedObject::new(*id, meta, &mut reader))?;
        }
        Ok(())
    }
}

impl PackWriter for InMemoryContainer {
    fn write_batch(&self, streams: &mut [&mut dyn Read], _compress: bool) -> StoreResult<Vec<ObjectId>> {
        let mut ids = Vec::with_capacity(streams.len());
        for stream in streams.iter_mut() {
            let mut data = Vec::new();
            stream.read_to_end(&mut data)?;
            ids.push(self.insert(&data));
        }
        Ok(ids)
    }
}

impl ObjectSizes for InMemoryContainer {
    fn object_size(&self, id: &ObjectId) -> StoreResult<Option<u64>> {
        Ok(self
            .objects
            .read()
            .expect("lock poisoned")
            .get(id)
            .map(|data| data.len() as u64))
    }
}

impl std::fmt::Debug for InMemoryContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.len();
        f.debug_struct("InMemoryContainer")
            .field("object_count", &count)
            .finish()
    }
}
