use std::io::{self, Read};

use objmig_types::{ObjectId, ObjectMeta};

use crate::error::{StoreError, StoreResult};

/// One object yielded by a [`StreamSource`].
///
/// The handle borrows the source's reader for the duration of a single
/// visitor call and cannot outlive it. Content needed after the call must be
/// copied out with [`read_to_vec`](Self::read_to_vec); alternatively the
/// reader itself can be handed to a writer with
/// [`take_reader`](Self::take_reader). Either consumes the stream.
pub struct StreamedObject<'a> {
    id: ObjectId,
    meta: ObjectMeta,
    reader: Option<&'a mut dyn Read>,
}

impl<'a> StreamedObject<'a> {
    pub fn new(id: ObjectId, meta: ObjectMeta, reader: &'a mut dyn Read) -> Self {
        Self {
            id,
            meta,
            reader: Some(reader),
        }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn meta(&self) -> ObjectMeta {
        self.meta
    }

    /// Declared size of the object's content.
    pub fn size(&self) -> u64 {
        self.meta.size
    }

    /// Returns `true` once the stream has been read or handed out.
    pub fn is_consumed(&self) -> bool {
        self.reader.is_none()
    }

    /// Take the underlying reader, e.g. to pass it straight to a
    /// [`PackWriter`]. Fails with `StreamUnavailable` on a second call.
    pub fn take_reader(&mut self) -> StoreResult<&'a mut dyn Read> {
        self.reader
            .take()
            .ok_or(StoreError::StreamUnavailable(self.id))
    }

    /// Take the reader wrapped in a [`CheckedReader`], which fails once the
    /// stream yields fewer or more bytes than declared. Fails with
    /// `StreamUnavailable` if the stream was already consumed.
    pub fn checked_reader(&mut self) -> StoreResult<CheckedReader<'a>> {
        Ok(CheckedReader {
            id: self.id,
            declared: self.meta.size,
            read: 0,
            inner: self.take_reader()?,
            failure: None,
        })
    }

    /// Copy the whole stream into an owned buffer.
    ///
    /// Reads at most one byte past the declared size, so a stream that
    /// yields more than it declared cannot grow the buffer unboundedly.
    pub fn read_to_vec(&mut self) -> StoreResult<Vec<u8>> {
        let declared = self.meta.size;
        let reader = self.take_reader()?;
        let mut buf = Vec::with_capacity(usize::try_from(declared).unwrap_or(0));
        reader.take(declared.saturating_add(1)).read_to_end(&mut buf)?;
        let actual = buf.len() as u64;
        if actual != declared {
            return Err(StoreError::SizeMismatch {
                id: self.id,
                declared,
                actual,
            });
        }
        Ok(buf)
    }
}

impl std::fmt::Debug for StreamedObject<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamedObject")
            .field("id", &self.id)
            .field("size", &self.meta.size)
            .field("consumed", &self.is_consumed())
            .finish()
    }
}

/// Reader over a [`StreamedObject`] that enforces its declared size.
///
/// A consumer such as a [`PackWriter`] only sees an `io::Error`; the
/// original source-side error is kept and can be recovered with
/// [`into_failure`](Self::into_failure) to tell a failing source apart from
/// a failing writer.
pub struct CheckedReader<'a> {
    id: ObjectId,
    declared: u64,
    read: u64,
    inner: &'a mut dyn Read,
    failure: Option<StoreError>,
}

impl CheckedReader<'_> {
    pub fn bytes_read(&self) -> u64 {
        self.read
    }

    /// The source-side error seen while reading, if any.
    pub fn into_failure(self) -> Option<StoreError> {
        self.failure
    }

    /// Succeeds only if the whole declared size was read without error.
    pub fn finish(self) -> StoreResult<u64> {
        if let Some(failure) = self.failure {
            return Err(failure);
        }
        if self.read != self.declared {
            return Err(StoreError::SizeMismatch {
                id: self.id,
                declared: self.declared,
                actual: self.read,
            });
        }
        Ok(self.read)
    }

    fn fail(&mut self, failure: StoreError) -> io::Error {
        let err = io::Error::new(io::ErrorKind::InvalidData, failure.to_string());
        self.failure = Some(failure);
        err
    }
}

impl Read for CheckedReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if let Some(failure) = &self.failure {
            return Err(io::Error::other(failure.to_string()));
        }
        let n = match self.inner.read(buf) {
            Ok(n) => n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => return Err(err),
            Err(err) => {
                let echo = io::Error::new(err.kind(), err.to_string());
                self.failure = Some(StoreError::Io(err));
                return Err(echo);
            }
        };
        let total = self.read + n as u64;
        let ended_short = n == 0 && !buf.is_empty() && total < self.declared;
        if ended_short || total > self.declared {
            return Err(self.fail(StoreError::SizeMismatch {
                id: self.id,
                declared: self.declared,
                actual: total,
            }));
        }
        self.read = total;
        Ok(n)
    }
}

impl std::fmt::Debug for CheckedReader<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckedReader")
            .field("id", &self.id)
            .field("declared", &self.declared)
            .field("read", &self.read)
            .field("failed", &self.failure.is_some())
            .finish()
    }
}

/// Single-pass, scoped access to object streams.
///
/// Implementations must satisfy these invariants:
/// - Every distinct requested id is yielded exactly once; duplicates in the
///   request are yielded once. The order is the source's choice.
/// - Unknown ids fail with `StoreError::NotFound`.
/// - Resources opened to serve the streams are released before the call
///   returns, including when the visitor returns an error, which stops the
///   iteration and is returned unchanged.
pub trait StreamSource {
    fn stream_objects<E, F>(&self, ids: &[ObjectId], visit: F) -> Result<(), E>
    where
        E: From<StoreError>,
        F: FnMut(StreamedObject<'_>) -> Result<(), E>;
}

/// Batched writer into a pack store.
///
/// The returned ids correspond positionally to the input streams and have the
/// same length. Each stream is consumed exactly once. An empty batch returns
/// an empty list without touching storage. Independent batches may be
/// submitted concurrently.
pub trait PackWriter: Send + Sync {
    fn write_batch(&self, streams: &mut [&mut dyn Read], compress: bool)
        -> StoreResult<Vec<ObjectId>>;
}

/// Size lookup for stored objects.
pub trait ObjectSizes {
    /// Returns `Ok(None)` if the object does not exist.
    fn object_size(&self, id: &ObjectId) -> StoreResult<Option<u64>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id() -> ObjectId {
        ObjectId::from_bytes(b"streamed")
    }

    #[test]
    fn read_to_vec_copies_content() {
        let mut data: &[u8] = b"abcdef";
        let mut obj = StreamedObject::new(id(), ObjectMeta::new(6), &mut data);
        assert_eq!(obj.read_to_vec().unwrap(), b"abcdef");
        assert!(obj.is_consumed());
    }

    #[test]
    fn second_read_is_unavailable() {
        let mut data: &[u8] = b"abc";
        let mut obj = StreamedObject::new(id(), ObjectMeta::new(3), &mut data);
        obj.read_to_vec().unwrap();
        let err = obj.read_to_vec().unwrap_err();
        assert!(matches!(err, StoreError::StreamUnavailable(i) if i == id()));
    }

    #[test]
    fn take_after_take_is_unavailable() {
        let mut data: &[u8] = b"abc";
        let mut obj = StreamedObject::new(id(), ObjectMeta::new(3), &mut data);
        let mut buf = Vec::new();
        obj.take_reader().unwrap().read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"abc");
        assert!(matches!(
            obj.take_reader(),
            Err(StoreError::StreamUnavailable(_))
        ));
    }

    #[test]
    fn short_stream_is_size_mismatch() {
        let mut data: &[u8] = b"ab";
        let mut obj = StreamedObject::new(id(), ObjectMeta::new(5), &mut data);
        let err = obj.read_to_vec().unwrap_err();
        assert!(matches!(
            err,
            StoreError::SizeMismatch { declared: 5, actual: 2, .. }
        ));
    }

    #[test]
    fn long_stream_reads_one_byte_past_declared() {
        let mut data: &[u8] = &[0u8; 1000];
        let mut obj = StreamedObject::new(id(), ObjectMeta::new(10), &mut data);
        let err = obj.read_to_vec().unwrap_err();
        assert!(matches!(
            err,
            StoreError::SizeMismatch { declared: 10, actual: 11, .. }
        ));
    }

    #[test]
    fn empty_object_reads_empty() {
        let mut data: &[u8] = b"";
        let mut obj = StreamedObject::new(id(), ObjectMeta::new(0), &mut data);
        assert!(obj.read_to_vec().unwrap().is_empty());
    }

    // -----------------------------------------------------------------------
    // Checked reader
    // -----------------------------------------------------------------------

    struct Broken {
        prefix: &'static [u8],
    }

    impl Read for Broken {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.prefix.is_empty() {
                return Err(io::Error::other("source disk gone"));
            }
            self.prefix.read(buf)
        }
    }

    #[test]
    fn checked_reader_passes_exact_stream() {
        let mut data: &[u8] = b"abcdef";
        let mut obj = StreamedObject::new(id(), ObjectMeta::new(6), &mut data);
        let mut reader = obj.checked_reader().unwrap();
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"abcdef");
        assert_eq!(reader.finish().unwrap(), 6);
        assert!(obj.is_consumed());
    }

    #[test]
    fn checked_reader_rejects_short_stream() {
        let mut data: &[u8] = b"short";
        let mut obj = StreamedObject::new(id(), ObjectMeta::new(500), &mut data);
        let mut reader = obj.checked_reader().unwrap();
        assert!(reader.read_to_end(&mut Vec::new()).is_err());
        assert!(matches!(
            reader.into_failure(),
            Some(StoreError::SizeMismatch { declared: 500, actual: 5, .. })
        ));
    }

    #[test]
    fn checked_reader_rejects_long_stream() {
        let mut data: &[u8] = &[1u8; 64];
        let mut obj = StreamedObject::new(id(), ObjectMeta::new(10), &mut data);
        let mut reader = obj.checked_reader().unwrap();
        assert!(reader.read_to_end(&mut Vec::new()).is_err());
        let err = reader.finish().unwrap_err();
        assert!(matches!(err, StoreError::SizeMismatch { declared: 10, .. }));
    }

    #[test]
    fn checked_reader_keeps_source_error() {
        let mut data = Broken { prefix: b"abc" };
        let mut obj = StreamedObject::new(id(), ObjectMeta::new(10), &mut data);
        let mut reader = obj.checked_reader().unwrap();
        let err = reader.read_to_end(&mut Vec::new()).unwrap_err();
        assert_eq!(err.to_string(), "source disk gone");
        assert_eq!(reader.bytes_read(), 3);
        match reader.into_failure() {
            Some(StoreError::Io(source)) => assert_eq!(source.to_string(), "source disk gone"),
            other => panic!("unexpected failure: {other:?}"),
        }
    }

    #[test]
    fn checked_reader_unread_stream_fails_finish() {
        let mut data: &[u8] = b"abc";
        let mut obj = StreamedObject::new(id(), ObjectMeta::new(3), &mut data);
        let reader = obj.checked_reader().unwrap();
        assert!(reader.into_failure().is_none());
        let mut data: &[u8] = b"abc";
        let mut obj = StreamedObject::new(id(), ObjectMeta::new(3), &mut data);
        assert!(matches!(
            obj.checked_reader().unwrap().finish(),
            Err(StoreError::SizeMismatch { declared: 3, actual: 0, .. })
        ));
        assert!(matches!(obj.checked_reader(), Err(StoreError::StreamUnavailable(_))));
    }

    #[test]
    fn debug_shows_consumption() {
        let mut data: &[u8] = b"x";
        let obj = StreamedObject::new(id(), ObjectMeta::new(1), &mut data);
        let debug = format!("{obj:?}");
        assert!(debug.contains("consumed: false"));
    }
}
