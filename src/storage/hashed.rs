use alloc::vec::{self, Vec};
use core::iter::FusedIterator;

use hashbrown::HashMap;

use super::{IndexedStorage, Rejected};
use crate::error::Result;

/// Hash-indexed sparse storage.
///
/// O(1) expected access with no upper bound on the index, for huge index spaces with
/// few live entries. Ordered traversal sorts the occupied indices first.
#[derive(Clone, Debug)]
pub struct Hashed<T> {
    map: HashMap<usize, T>,
    // One past the highest index written since the storage was last empty.
    bound: usize,
}

impl<T> Hashed<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
            bound: 0,
        }
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            map: HashMap::with_capacity(capacity),
            bound: 0,
        }
    }
}

impl<T> Default for Hashed<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> IndexedStorage<T> for Hashed<T> {
    type Indices<'a>
        = HashedIndices
    where
        Self: 'a;

    #[inline]
    fn get(&self, index: usize) -> Option<&T> {
        self.map.get(&index)
    }

    fn replace(mut self, index: usize, value: T) -> core::result::Result<(Self, Option<T>), Rejected<Self>> {
        self.bound = self.bound.max(index.saturating_add(1));
        let previous = self.map.insert(index, value);
        Ok((self, previous))
    }

    fn take(mut self, index: usize) -> core::result::Result<(Self, Option<T>), Rejected<Self>> {
        let previous = self.map.remove(&index);
        if self.map.is_empty() {
            self.bound = 0;
        }
        Ok((self, previous))
    }

    fn empty_copy(&self) -> Self {
        Self::new()
    }

    /// Collects and sorts every occupied index up front: O(n log n) before the first
    /// item, then O(1) per item.
    fn non_null_indices(&self) -> HashedIndices {
        let mut indices: Vec<usize> = self.map.keys().copied().collect();
        indices.sort_unstable();
        HashedIndices {
            inner: indices.into_iter(),
        }
    }

    fn max_idx_overapproximation(&self) -> usize {
        self.bound
    }

    #[inline]
    fn len(&self) -> usize {
        self.map.len()
    }

    fn max_idx(&self) -> usize {
        self.map.keys().max().map_or(0, |&index| index + 1)
    }

    fn bytes_used(&self) -> Result<usize> {
        // One control byte per bucket on top of the entry itself.
        Ok(size_of::<Self>() + self.map.capacity() * (size_of::<(usize, T)>() + 1))
    }
}

/// Ascending occupied indices of a [`Hashed`] storage.
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct HashedIndices {
    inner: vec::IntoIter<usize>,
}

impl Iterator for HashedIndices {
    type Item = usize;

    #[inline]
    fn next(&mut self) -> Option<usize> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for HashedIndices {}

impl FusedIterator for HashedIndices {}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn huge_indices_are_cheap() {
        let storage = Hashed::new().set(usize::MAX - 1, 1u8).unwrap().set(7, 2).unwrap();
        assert_eq!(storage.len(), 2);
        assert_eq!(storage.get(usize::MAX - 1), Some(&1));
        assert_eq!(storage.max_idx(), usize::MAX);
        let indices: Vec<_> = storage.non_null_indices().collect();
        assert_eq!(indices, [7, usize::MAX - 1]);
    }

    #[test]
    fn bound_resets_when_emptied() {
        let storage = Hashed::new().set(40, 'x').unwrap();
        assert_eq!(storage.max_idx_overapproximation(), 41);
        let storage = storage.remove(40).unwrap();
        assert_eq!(storage.max_idx_overapproximation(), 0);
        assert!(storage.bytes_used().is_ok());
    }
}
