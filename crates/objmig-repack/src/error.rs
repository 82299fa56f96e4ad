use objmig_store::StoreError;
use objmig_types::{NewHashkey, ObjectId, OldHashkey};

/// Errors from the repack engine. None of them is retried internally.
#[derive(Debug, thiserror::Error)]
pub enum RepackError {
    /// A stream handle was used after it had been consumed.
    #[error("stream for {0} is no longer available")]
    StreamUnavailable(ObjectId),

    /// Adding to the cache would break its budget. The flush policy should
    /// have flushed first, so this is a logic error.
    #[error("cache overflow: adding {size} bytes to {buffered} buffered exceeds the budget of {budget}")]
    CacheOverflow { size: u64, buffered: u64, budget: u64 },

    /// Old and new hashkey lists of one batch differ in length.
    #[error("length mismatch: {old} old hashkeys, {new} new hashkeys")]
    LengthMismatch { old: usize, new: usize },

    /// An old hashkey was recorded twice; groups were not disjoint.
    #[error("duplicate old hashkey {0}")]
    DuplicateKey(OldHashkey),

    /// The pack writer could not persist a batch.
    #[error("pack writer failed: {0}")]
    WriteFailure(#[source] StoreError),

    /// The stream source failed while the group was being read.
    #[error("stream source failed: {0}")]
    SourceReadFailure(#[source] StoreError),

    /// The target store could not be queried during verification.
    #[error("target lookup failed: {0}")]
    TargetReadFailure(#[source] StoreError),

    #[error("size mismatch: {new} ({new_size}) vs {old} ({old_size})")]
    SizeMismatch {
        old: OldHashkey,
        old_size: u64,
        new: NewHashkey,
        new_size: u64,
    },

    #[error("{new} (remapped from {old}) is missing from the target store")]
    MissingTarget { old: OldHashkey, new: NewHashkey },

    #[error("a group worker panicked")]
    WorkerPanicked,
}

/// Errors raised by a stream source while iterating are read failures,
/// except misuse of a consumed stream.
impl From<StoreError> for RepackError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::StreamUnavailable(id) => Self::StreamUnavailable(id),
            other => Self::SourceReadFailure(other),
        }
    }
}

/// Result alias for repack operations.
pub type RepackResult<T> = Result<T, RepackError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::RepackDriver;
    use crate::config::RepackConfig;
    use crate::mapping::HashkeyMappingBuilder;
    use crate::planner::BatchPlanner;
    use crate::testing::{RecordingWriter, ScriptedSource, Yield};

    #[test]
    fn consumed_stream_keeps_its_own_variant() {
        let id = ObjectId::from_bytes(b"consumed");
        let err = RepackError::from(StoreError::StreamUnavailable(id));
        assert!(matches!(err, RepackError::StreamUnavailable(i) if i == id));
    }

    #[test]
    fn other_store_errors_are_read_failures() {
        let id = ObjectId::from_bytes(b"missing");
        let err = RepackError::from(StoreError::NotFound(id));
        assert!(matches!(err, RepackError::SourceReadFailure(StoreError::NotFound(i)) if i == id));
    }

    #[test]
    fn consumed_stream_surfaces_from_driver() {
        for declared in [10, 500] {
            let mut source = ScriptedSource::new();
            let key = source.add("consumed", declared, Yield::Consumed);
            let mut planner = BatchPlanner::new();
            planner.push_group([key]);
            let group = planner.finish().remove(0);
            let writer = RecordingWriter::new();
            let mut mapping = HashkeyMappingBuilder::new();

            let err = RepackDriver::new(&writer, RepackConfig::new(100, false))
                .repack_group(&source, &group, &mut mapping)
                .unwrap_err();

            assert!(
                matches!(err, RepackError::StreamUnavailable(id) if id == key.object_id()),
                "declared {declared}: {err:?}"
            );
            assert_eq!(writer.calls(), 0);
        }
    }
}
