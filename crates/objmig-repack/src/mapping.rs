use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use objmig_types::{NewHashkey, OldHashkey};
use serde::{Deserialize, Serialize};

use crate::error::{RepackError, RepackResult};

/// Destination for the `(old, new)` pairs produced by each pack write.
pub trait MappingSink {
    /// Record positional pairs. Either all pairs are recorded or none.
    fn record(&mut self, old: &[OldHashkey], new: &[NewHashkey]) -> RepackResult<()>;
}

/// Accumulates the old -> new hashkey mapping of a migration.
///
/// Append-only: an old hashkey can be recorded once. A second record of the
/// same key means the planner produced overlapping groups and is rejected
/// rather than overwritten.
#[derive(Debug, Default)]
pub struct HashkeyMappingBuilder {
    mapping: BTreeMap<OldHashkey, NewHashkey>,
}

impl HashkeyMappingBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, old: &[OldHashkey], new: &[NewHashkey]) -> RepackResult<()> {
        if old.len() != new.len() {
            return Err(RepackError::LengthMismatch {
                old: old.len(),
                new: new.len(),
            });
        }
        let mut batch = HashSet::with_capacity(old.len());
        for key in old {
            if self.mapping.contains_key(key) || !batch.insert(*key) {
                return Err(RepackError::DuplicateKey(*key));
            }
        }
        self.mapping.extend(old.iter().copied().zip(new.iter().copied()));
        Ok(())
    }

    /// Fold a finished mapping (e.g. from another worker) into this one.
    pub fn merge(&mut self, other: HashkeyMapping) -> RepackResult<()> {
        let (old, new): (Vec<_>, Vec<_>) = other.mapping.into_iter().unzip();
        self.record(&old, &new)
    }

    pub fn len(&self) -> usize {
        self.mapping.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }

    pub fn finish(self) -> HashkeyMapping {
        HashkeyMapping {
            mapping: self.mapping,
        }
    }
}

impl MappingSink for HashkeyMappingBuilder {
    fn record(&mut self, old: &[OldHashkey], new: &[NewHashkey]) -> RepackResult<()> {
        HashkeyMappingBuilder::record(self, old, new)
    }
}

/// A [`HashkeyMappingBuilder`] behind a mutex, shared by group workers.
#[derive(Debug, Default)]
pub struct SharedMappingBuilder {
    inner: Mutex<HashkeyMappingBuilder>,
}

impl SharedMappingBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, old: &[OldHashkey], new: &[NewHashkey]) -> RepackResult<()> {
        self.inner.lock().expect("lock poisoned").record(old, new)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_inner(self) -> HashkeyMappingBuilder {
        self.inner
            .into_inner()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl MappingSink for &SharedMappingBuilder {
    fn record(&mut self, old: &[OldHashkey], new: &[NewHashkey]) -> RepackResult<()> {
        SharedMappingBuilder::record(self, old, new)
    }
}

/// Finished, read-only old -> new hashkey mapping.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HashkeyMapping {
    mapping: BTreeMap<OldHashkey, NewHashkey>,
}

impl HashkeyMapping {
    pub fn get(&self, old: &OldHashkey) -> Option<NewHashkey> {
        self.mapping.get(old).copied()
    }

    pub fn contains(&self, old: &OldHashkey) -> bool {
        self.mapping.contains_key(old)
    }

    pub fn len(&self) -> usize {
        self.mapping.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }

    /// Pairs in old-hashkey order.
    pub fn iter(&self) -> impl Iterator<Item = (OldHashkey, NewHashkey)> + '_ {
        self.mapping.iter().map(|(old, new)| (*old, *new))
    }

    pub fn old_hashkeys(&self) -> impl Iterator<Item = OldHashkey> + '_ {
        self.mapping.keys().copied()
    }

    /// Number of distinct new hashkeys. Lower than [`len`](Self::len) only
    /// when distinct old objects had identical content.
    pub fn distinct_new_hashkeys(&self) -> usize {
        self.mapping.values().collect::<HashSet<_>>().len()
    }
}
