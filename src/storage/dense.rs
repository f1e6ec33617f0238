use alloc::vec::Vec;
use core::iter::{Enumerate, FusedIterator};
use core::slice;

use super::{IndexedStorage, Rejected, Step, SubtreeMove};
use crate::shape::Shape;
use crate::error::{Error, Result};

/// Contiguous storage: index `i` lives in slot `i` of a `Vec<Option<T>>`.
///
/// O(1) access; the slot vector grows by reallocation up to the highest index written
/// and shrinks back when trailing slots are cleared. Best for near-contiguous indices:
/// writing index `i` allocates `i + 1` slots, so a huge index is only as cheap as the
/// allocator allows. A write at `usize::MAX` is rejected as out of bounds.
#[derive(Clone, Debug, Default)]
pub struct Dense<T> {
    slots: Vec<Option<T>>,
    len: usize,
}

impl<T> Dense<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            len: 0,
        }
    }

    /// Creates an empty storage with room for indices `0..capacity`.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            len: 0,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.capacity()
    }

    fn trim(&mut self) {
        while matches!(self.slots.last(), Some(None)) {
            self.slots.pop();
        }
    }
}

impl<T> IndexedStorage<T> for Dense<T> {
    type Indices<'a>
        = DenseIndices<'a, T>
    where
        Self: 'a;

    #[inline]
    fn get(&self, index: usize) -> Option<&T> {
        self.slots.get(index)?.as_ref()
    }

    fn replace(mut self, index: usize, value: T) -> core::result::Result<(Self, Option<T>), Rejected<Self>> {
        if index >= self.slots.len() {
            let Some(needed) = index.checked_add(1) else {
                return Err(Rejected::new(
                    self,
                    Error::OutOfBounds {
                        index,
                        bound: usize::MAX,
                    },
                ));
            };
            self.slots.resize_with(needed, || None);
        }
        let previous = self.slots[index].replace(value);
        if previous.is_none() {
            self.len += 1;
        }
        Ok((self, previous))
    }

    fn take(mut self, index: usize) -> core::result::Result<(Self, Option<T>), Rejected<Self>> {
        let previous = self.slots.get_mut(index).and_then(Option::take);
        if previous.is_some() {
            self.len -= 1;
            self.trim();
        }
        Ok((self, previous))
    }

    fn empty_copy(&self) -> Self {
        Self::new()
    }

    fn non_null_indices(&self) -> DenseIndices<'_, T> {
        DenseIndices {
            slots: self.slots.iter().enumerate(),
            remaining: self.len,
        }
    }

    fn max_idx_overapproximation(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    fn len(&self) -> usize {
        self.len
    }

    fn max_idx(&self) -> usize {
        // Trailing absent slots are always trimmed.
        self.slots.len()
    }

    fn move_subtree(self, source: usize, shape: Shape, dest: usize) -> Step<Self> {
        if source == dest {
            return Ok(self);
        }
        let plan = SubtreeMove::plan::<T, Self>(&self, source, shape, dest).and_then(|plan| {
            if plan.moves.iter().any(|&(_, to)| to == usize::MAX) {
                Err(Error::OutOfBounds {
                    index: usize::MAX,
                    bound: usize::MAX,
                })
            } else {
                Ok(plan)
            }
        });
        match plan {
            Ok(plan) => plan.apply(self),
            Err(error) => Err(Rejected::new(self, error)),
        }
    }

    fn bytes_used(&self) -> Result<usize> {
        Ok(size_of::<Self>() + self.slots.capacity() * size_of::<Option<T>>())
    }
}

/// Ascending occupied indices of a [`Dense`] storage.
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct DenseIndices<'a, T> {
    slots: Enumerate<slice::Iter<'a, Option<T>>>,
    remaining: usize,
}

impl<T> Iterator for DenseIndices<'_, T> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let (index, _) = self.slots.find(|(_, slot)| slot.is_some())?;
        self.remaining -= 1;
        Some(index)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<T> ExactSizeIterator for DenseIndices<'_, T> {}

impl<T> FusedIterator for DenseIndices<'_, T> {}
