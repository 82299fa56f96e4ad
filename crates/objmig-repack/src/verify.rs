use objmig_store::ObjectSizes;
use serde::Serialize;
use tracing::debug;

use crate::error::{RepackError, RepackResult};
use crate::mapping::HashkeyMapping;

/// Summary of a successful size verification.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct VerificationReport {
    /// Mapping entries checked.
    pub checked: usize,
    /// Sum of the verified object sizes.
    pub bytes: u64,
}

/// Check that every remapped object kept its size.
///
/// Stops at the first mismatch. An old object missing from `source` is a
/// source read failure, a new one missing from `target` is `MissingTarget`.
pub fn verify_sizes<S, T>(
    source: &S,
    target: &T,
    mapping: &HashkeyMapping,
) -> RepackResult<VerificationReport>
where
    S: ObjectSizes + ?Sized,
    T: ObjectSizes + ?Sized,
{
    let mut report = VerificationReport::default();
    for (old, new) in mapping.iter() {
        let old_size = source
            .object_size(&old.object_id())
            .map_err(RepackError::SourceReadFailure)?
            .ok_or_else(|| {
                RepackError::SourceReadFailure(objmig_store::StoreError::NotFound(old.object_id()))
            })?;
        let new_size = target
            .object_size(&new.object_id())
            .map_err(RepackError::TargetReadFailure)?
            .ok_or(RepackError::MissingTarget { old, new })?;
        if old_size != new_size {
            return Err(RepackError::SizeMismatch {
                old,
                old_size,
                new,
                new_size,
            });
        }
        report.checked += 1;
        report.bytes += new_size;
    }
    debug!(checked = report.checked, bytes = report.bytes, "sizes verified");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MigrationConfig;
    use crate::migration::Migration;
    use crate::planner::BatchPlanner;
    use crate::testing::{source_with_sizes, RecordingWriter};
    use objmig_store::InMemoryContainer;
    use std::num::NonZeroUsize;

    fn migrate(sizes: &[usize]) -> (InMemoryContainer, RecordingWriter, HashkeyMapping) {
        let (source, keys) = source_with_sizes(sizes);
        let writer = RecordingWriter::new();
        let groups = BatchPlanner::by_size(keys, NonZeroUsize::new(2).unwrap());
        let mapping = Migration::new(&source, &writer, MigrationConfig::default())
            .run(&groups)
            .unwrap()
            .mapping;
        (source, writer, mapping)
    }

    #[test]
    fn verified_migration() {
        let (source, writer, mapping) = migrate(&[5, 10, 15]);
        let report = verify_sizes(&source, &writer, &mapping).unwrap();
        assert_eq!(report, VerificationReport { checked: 3, bytes: 30 });
    }

    #[test]
    fn empty_mapping_verifies() {
        let source = InMemoryContainer::new();
        let report = verify_sizes(&source, &source, &HashkeyMapping::default()).unwrap();
        assert_eq!(report.checked, 0);
    }

    #[test]
    fn size_mismatch_names_both_sides() {
        let (source, writer, mapping) = migrate(&[5, 10]);
        let (old, new) = mapping.iter().next().unwrap();
        writer.corrupt_size(&new.object_id(), 999);

        let err = verify_sizes(&source, &writer, &mapping).unwrap_err();
        match err {
            RepackError::SizeMismatch { old: o, new: n, new_size, .. } => {
                assert_eq!(o, old);
                assert_eq!(n, new);
                assert_eq!(new_size, 999);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_target_object() {
        let (source, writer, mapping) = migrate(&[5]);
        let (_, new) = mapping.iter().next().unwrap();
        writer.forget(&new.object_id());

        let err = verify_sizes(&source, &writer, &mapping).unwrap_err();
        assert!(matches!(err, RepackError::MissingTarget { .. }));
    }

    #[test]
    fn missing_source_object() {
        let (_, writer, mapping) = migrate(&[5]);
        let empty = InMemoryContainer::new();
        let err = verify_sizes(&empty, &writer, &mapping).unwrap_err();
        assert!(matches!(err, RepackError::SourceReadFailure(_)));
    }
}
