use std::collections::HashSet;
use std::num::NonZeroUsize;

use objmig_types::OldHashkey;

/// A batch of old hashkeys processed by one driver invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Group {
    index: usize,
    keys: Vec<OldHashkey>,
}

impl Group {
    /// Position of the group in its plan, starting at 1.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn keys(&self) -> &[OldHashkey] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Builds a sequence of disjoint groups.
///
/// A key that already appears in an earlier group (or earlier in the same
/// group) is dropped, so the mapping builder never sees it twice. This
/// matters because several catalog entries may reference the same object.
#[derive(Debug, Default)]
pub struct BatchPlanner {
    seen: HashSet<OldHashkey>,
    groups: Vec<Group>,
    dropped: usize,
}

impl BatchPlanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a group built from `keys`, minus the keys already planned.
    pub fn push_group<I>(&mut self, keys: I) -> &Group
    where
        I: IntoIterator<Item = OldHashkey>,
    {
        let mut group_keys = Vec::new();
        for key in keys {
            if self.seen.insert(key) {
                group_keys.push(key);
            } else {
                self.dropped += 1;
            }
        }
        let index = self.groups.len() + 1;
        self.groups.push(Group {
            index,
            keys: group_keys,
        });
        &self.groups[index - 1]
    }

    /// Keys skipped because they were already planned.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn finish(self) -> Vec<Group> {
        self.groups
    }

    /// Consecutive groups of at most `group_size` distinct keys.
    pub fn by_size<I>(keys: I, group_size: NonZeroUsize) -> Vec<Group>
    where
        I: IntoIterator<Item = OldHashkey>,
    {
        let unique = dedup(keys);
        let mut planner = Self::new();
        for chunk in unique.chunks(group_size.get()) {
            planner.push_group(chunk.iter().copied());
        }
        planner.finish()
    }

    /// `count` groups whose sizes differ by at most one; later groups take
    /// the remainder. Produces fewer groups when there are fewer keys.
    pub fn split_even<I>(keys: I, count: NonZeroUsize) -> Vec<Group>
    where
        I: IntoIterator<Item = OldHashkey>,
    {
        let unique = dedup(keys);
        let count = count.get().min(unique.len().max(1));
        let base = unique.len() / count;
        let remainder = unique.len() % count;
        let mut planner = Self::new();
        let mut start = 0;
        for i in 0..count {
            let len = base + usize::from(i >= count - remainder);
            planner.push_group(unique[start..start + len].iter().copied());
            start += len;
        }
        planner.finish()
    }
}

fn dedup<I: IntoIterator<Item = OldHashkey>>(keys: I) -> Vec<OldHashkey> {
    let mut seen = HashSet::new();
    keys.into_iter().filter(|k| seen.insert(*k)).collect()
}
