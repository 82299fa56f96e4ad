//! Test doubles shared by the repack tests.

use std::collections::HashMap;
use std::io::{self, Read};
use std::sync::Mutex;

use objmig_store::{
    InMemoryContainer, ObjectSizes, PackWriter, StoreError, StoreResult, StreamSource, StreamedObject,
};
use objmig_types::{ObjectId, ObjectMeta, OldHashkey};

/// Pack writer that records every batch and answers with synthetic ids
/// derived from the call number and the position inside the batch.
#[derive(Default)]
pub struct RecordingWriter {
    batches: Mutex<Vec<Vec<Vec<u8>>>>,
    sizes: Mutex<HashMap<ObjectId, u64>>,
    fail_on_call: Option<usize>,
    drop_last_id: bool,
}

impl RecordingWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the `call`-th batch (0-based) with an I/O error.
    pub fn failing_on(call: usize) -> Self {
        Self {
            fail_on_call: Some(call),
            ..Self::default()
        }
    }

    /// Return one id fewer than the number of streams.
    pub fn short_results() -> Self {
        Self {
            drop_last_id: true,
            ..Self::default()
        }
    }

    pub fn synthetic_id(call: usize, pos: usize) -> ObjectId {
        ObjectId::from_bytes(format!("new-{call}-{pos}").as_bytes())
    }

    /// Contents of every batch, in call order.
    pub fn batches(&self) -> Vec<Vec<Vec<u8>>> {
        self.batches.lock().expect("lock poisoned").clone()
    }

    pub fn calls(&self) -> usize {
        self.batches.lock().expect("lock poisoned").len()
    }

    /// Forget the size of a written object, as if it had been lost.
    pub fn forget(&self, id: &ObjectId) {
        self.sizes.lock().expect("lock poisoned").remove(id);
    }

    /// Pretend a written object has a different size.
    pub fn corrupt_size(&self, id: &ObjectId, size: u64) {
        self.sizes.lock().expect("lock poisoned").insert(*id, size);
    }
}

impl PackWriter for RecordingWriter {
    fn write_batch(&self, streams: &mut [&mut dyn Read], _compress: bool) -> StoreResult<Vec<ObjectId>> {
        let mut batches = self.batches.lock().expect("lock poisoned");
        let call = batches.len();
        if self.fail_on_call == Some(call) {
            return Err(StoreError::Io(std::io::Error::other("disk full")));
        }
        let mut contents = Vec::with_capacity(streams.len());
        let mut ids = Vec::with_capacity(streams.len());
        let mut sizes = self.sizes.lock().expect("lock poisoned");
        for (pos, stream) in streams.iter_mut().enumerate() {
            let mut data = Vec::new();
            stream.read_to_end(&mut data)?;
            let id = Self::synthetic_id(call, pos);
            sizes.insert(id, data.len() as u64);
            ids.push(id);
            contents.push(data);
        }
        batches.push(contents);
        if self.drop_last_id {
            ids.pop();
        }
        Ok(ids)
    }
}

impl ObjectSizes for RecordingWriter {
    fn object_size(&self, id: &ObjectId) -> StoreResult<Option<u64>> {
        Ok(self.sizes.lock().expect("lock poisoned").get(id).copied())
    }
}

/// Content of the `index`-th test object. Distinct per index below 256 for
/// any non-zero size.
pub fn content(index: usize, size: usize) -> Vec<u8> {
    let tag = (index as u64).to_le_bytes();
    (0..size).map(|i| tag[i % 8].wrapping_add((i / 8) as u8)).collect()
}

/// Source holding one object per entry of `sizes`, keyed in the same order.
pub fn source_with_sizes(sizes: &[usize]) -> (InMemoryContainer, Vec<OldHashkey>) {
    let source = InMemoryContainer::new();
    let keys = sizes
        .iter()
        .enumerate()
        .map(|(index, size)| OldHashkey::new(source.insert(&content(index, *size))))
        .collect();
    (source, keys)
}

/// What a [`ScriptedSource`] stream yields.
#[derive(Clone)]
pub enum Yield {
    Bytes(Vec<u8>),
    /// These bytes, then an I/O error.
    FailAfter(Vec<u8>),
    /// A stream whose reader was already taken before the visit.
    Consumed,
}

struct FailingReader {
    prefix: io::Cursor<Vec<u8>>,
}

impl Read for FailingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.prefix.read(buf)? {
            0 => Err(io::Error::other("source disk gone")),
            n => Ok(n),
        }
    }
}

/// Source whose declared sizes and stream contents are chosen by the test,
/// so they may disagree. Objects are yielded in request order.
#[derive(Default)]
pub struct ScriptedSource {
    objects: HashMap<ObjectId, (u64, Yield)>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: &str, declared: u64, yields: Yield) -> OldHashkey {
        let id = ObjectId::from_bytes(name.as_bytes());
        self.objects.insert(id, (declared, yields));
        OldHashkey::new(id)
    }
}

impl StreamSource for ScriptedSource {
    fn stream_objects<E, F>(&self, ids: &[ObjectId], mut visit: F) -> Result<(), E>
    where
        E: From<StoreError>,
        F: FnMut(StreamedObject<'_>) -> Result<(), E>,
    {
        for id in ids {
            let (declared, yields) = self.objects.get(id).ok_or(StoreError::NotFound(*id))?;
            let meta = ObjectMeta::new(*declared);
            match yields.clone() {
                Yield::Bytes(data) => {
                    let mut reader = io::Cursor::new(data);
                    visit(StreamedObject::new(*id, meta, &mut reader))?;
                }
                Yield::FailAfter(data) => {
                    let mut reader = FailingReader {
                        prefix: io::Cursor::new(data),
                    };
                    visit(StreamedObject::new(*id, meta, &mut reader))?;
                }
                Yield::Consumed => {
                    let mut reader = io::empty();
                    let mut obj = StreamedObject::new(*id, meta, &mut reader);
                    obj.take_reader()?;
                    visit(obj)?;
                }
            }
        }
        Ok(())
    }
}
