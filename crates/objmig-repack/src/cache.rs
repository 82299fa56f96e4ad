use objmig_types::OldHashkey;

use crate::error::{RepackError, RepackResult};

/// An object copied out of its stream, waiting for the next batched write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BufferedObject {
    pub old_hashkey: OldHashkey,
    pub content: Vec<u8>,
}

/// Ordered in-memory holding area for small objects.
///
/// Entries keep insertion order so that the hashkeys and buffers returned by
/// [`drain`](Self::drain) line up position by position with what the pack
/// writer returns. The cache never talks to a writer itself.
///
/// Invariants: `total_size` is the sum of the buffered content lengths and
/// never exceeds `budget`.
#[derive(Debug)]
pub struct BoundedCache {
    entries: Vec<BufferedObject>,
    total_size: u64,
    budget: u64,
}

impl BoundedCache {
    pub fn new(budget: u64) -> Self {
        Self {
            entries: Vec::new(),
            total_size: 0,
            budget,
        }
    }

    /// Whether `size` more bytes can be buffered without exceeding the budget.
    pub fn fits(&self, size: u64) -> bool {
        self.total_size
            .checked_add(size)
            .is_some_and(|total| total <= self.budget)
    }

    /// Buffer an object. Fails with `CacheOverflow` instead of breaking the
    /// budget; callers are expected to flush first.
    pub fn add(&mut self, old_hashkey: OldHashkey, content: Vec<u8>) -> RepackResult<()> {
        let size = content.len() as u64;
        if !self.fits(size) {
            return Err(RepackError::CacheOverflow {
                size,
                buffered: self.total_size,
                budget: self.budget,
            });
        }
        self.total_size += size;
        self.entries.push(BufferedObject {
            old_hashkey,
            content,
        });
        Ok(())
    }

    /// Remove everything, returning hashkeys and buffers in insertion order.
    pub fn drain(&mut self) -> (Vec<OldHashkey>, Vec<Vec<u8>>) {
        self.total_size = 0;
        std::mem::take(&mut self.entries)
            .into_iter()
            .map(|entry| (entry.old_hashkey, entry.content))
            .unzip()
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn budget(&self) -> u64 {
        self.budget
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
