//! The indexed-storage contract and its backends.
//!
//! An [`IndexedStorage`] is conceptually an infinite sparse array: every index either
//! holds exactly one value or is absent. Backends implement a small required core
//! (`get`, `replace`, `take`, `empty_copy`, `non_null_indices`,
//! `max_idx_overapproximation`); traversal and relocation are provided on top of it.

use alloc::vec::Vec;
use core::mem;

use smallvec::{SmallVec, smallvec};

use crate::error::{Error, Result};
use crate::shape::Shape;

mod checked;
mod chunked;
mod compressed;
mod dense;
mod hashed;
mod trie;

pub use checked::{Checked, Proposal};
pub use chunked::{Chunked, ChunkedIndices, DEFAULT_CHUNK_BITS};
pub use compressed::{Compressed, CompressedIndices, Entries, Row, Usage};
pub use dense::{Dense, DenseIndices};
pub use hashed::{Hashed, HashedIndices};
pub use trie::{Trie, TrieIndices};

/// A mutation that the storage refused, together with the untouched storage.
///
/// The storage was consumed by the mutating call, so it is handed back here and the
/// owner keeps using it as if the call had never been made.
#[derive(Debug)]
pub struct Rejected<S> {
    /// The storage as it was before the refused call.
    pub storage: S,
    /// Why the call was refused.
    pub error: Error,
}

impl<S> Rejected<S> {
    /// Pairs the untouched `storage` with the `error` that refused the mutation.
    pub fn new(storage: S, error: Error) -> Self {
        Self { storage, error }
    }

    /// Splits into the storage to keep using and the error.
    pub fn into_parts(self) -> (S, Error) {
        (self.storage, self.error)
    }

    /// Rewraps the returned storage, keeping the error.
    pub fn map_storage<U>(self, f: impl FnOnce(S) -> U) -> Rejected<U> {
        Rejected {
            storage: f(self.storage),
            error: self.error,
        }
    }
}

/// The outcome of a mutating storage operation: the handle to use from now on.
pub type Step<S> = core::result::Result<S, Rejected<S>>;

/// A sparse mapping from non-negative integer indices to optional values.
///
/// Mutating operations consume the storage and return the handle to use afterward.
/// In-place backends return the same instance; copy-on-write backends may return a
/// different one. A rejected mutation returns the unchanged storage in [`Rejected`].
///
/// Backends that can reject writes must override [`move_subtree`] and [`move_range`]
/// so that the whole relocation is validated before any slot changes.
///
/// # Examples
///
/// ```
/// use flatshape::{Dense, IndexedStorage, Shape};
///
/// let storage = Dense::new().set(1, "a").unwrap().set(3, "b").unwrap();
/// assert!(storage.has(3));
/// assert_eq!(storage.get(2), None);
///
/// // Move the subtree rooted at 1 (which contains 1 and 3) to the root.
/// let storage = storage.move_subtree(1, Shape::CompleteBinaryTree, 0).unwrap();
/// let occupied: Vec<_> = storage.non_null_indices().collect();
/// assert_eq!(occupied, [0, 1]);
/// assert_eq!(storage.get(1), Some(&"b"));
/// ```
///
/// [`move_subtree`]: IndexedStorage::move_subtree
/// [`move_range`]: IndexedStorage::move_range
pub trait IndexedStorage<T>: Sized {
    /// Ascending iterator over occupied indices.
    type Indices<'a>: Iterator<Item = usize>
    where
        Self: 'a;

    /// Returns the value at `index`, or `None` if the index is absent.
    fn get(&self, index: usize) -> Option<&T>;

    /// Writes `value` at `index`, returning the storage and the previous value.
    fn replace(self, index: usize, value: T) -> core::result::Result<(Self, Option<T>), Rejected<Self>>;

    /// Clears `index`, returning the storage and the value it held.
    fn take(self, index: usize) -> core::result::Result<(Self, Option<T>), Rejected<Self>>;

    /// A new, empty storage of the same kind and configuration.
    #[must_use]
    fn empty_copy(&self) -> Self;

    /// Yields every occupied index in strictly ascending order.
    ///
    /// Ordered backends walk their contents as the iterator advances. Unordered ones
    /// such as [`Hashed`] collect and sort the indices when the iterator is created.
    fn non_null_indices(&self) -> Self::Indices<'_>;

    /// An exclusive upper bound on the occupied indices. May overestimate.
    fn max_idx_overapproximation(&self) -> usize;

    /// Returns true if `index` holds a value.
    fn has(&self, index: usize) -> bool {
        self.get(index).is_some()
    }

    /// Number of occupied indices.
    fn len(&self) -> usize {
        self.non_null_indices().count()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Writes `value` at `index`.
    fn set(self, index: usize, value: T) -> Step<Self> {
        self.replace(index, value).map(|(storage, _)| storage)
    }

    /// Clears `index`.
    fn remove(self, index: usize) -> Step<Self> {
        self.take(index).map(|(storage, _)| storage)
    }

    /// One past the highest occupied index; 0 when empty.
    fn max_idx(&self) -> usize {
        self.non_null_indices().last().map_or(0, |index| index + 1)
    }

    /// A full, independent duplicate.
    #[must_use]
    fn copy(&self) -> Self
    where
        Self: Clone,
    {
        self.clone()
    }

    /// A full duplicate that shares no structure with `self`.
    ///
    /// Equal to [`copy`](IndexedStorage::copy) unless the backend shares structure
    /// between copies.
    #[must_use]
    fn copy_nested(&self) -> Self
    where
        Self: Clone,
    {
        self.copy()
    }

    /// Visits every occupied index in ascending order exactly once.
    fn for_each_non_null(&self, mut visitor: impl FnMut(usize, &T)) {
        for index in self.non_null_indices() {
            if let Some(value) = self.get(index) {
                visitor(index, value);
            }
        }
    }

    /// Pre-order walk over the occupied indices of the subtree of `shape` rooted at
    /// `root`.
    fn for_each_successor(&self, root: usize, shape: Shape, mut visitor: impl FnMut(usize, &T)) {
        let bound = self.max_idx_overapproximation();
        if self.len().saturating_mul(8) < bound {
            // Sparse: walking the index space would visit mostly absent slots.
            let mut hits: Vec<usize> = self
                .non_null_indices()
                .filter(|&index| shape.is_successor(root, index))
                .collect();
            hits.sort_unstable_by(|&a, &b| shape.pre_order_cmp(a, b));
            for index in hits {
                if let Some(value) = self.get(index) {
                    visitor(index, value);
                }
            }
            return;
        }

        let mut stack: SmallVec<[usize; 64]> = smallvec![root];
        while let Some(index) = stack.pop() {
            if index >= bound {
                continue;
            }
            if let Some(value) = self.get(index) {
                visitor(index, value);
            }
            // Push in reverse so branch 0 is visited first.
            for branch in (0..shape.arity()).rev() {
                if let Some(child) = shape.child(index, branch)
                    && child < bound
                {
                    stack.push(child);
                }
            }
        }
    }

    /// Relocates the subtree rooted at `source` so that it is rooted at `dest`.
    ///
    /// Every occupied index below `source` moves to the same relative position below
    /// `dest`. Moved source slots are cleared, and the destination subtree is replaced
    /// wholesale: slots in it that receive no value end up absent. Overlapping
    /// subtrees are handled by gathering every value before writing any.
    fn move_subtree(self, source: usize, shape: Shape, dest: usize) -> Step<Self> {
        if source == dest {
            return Ok(self);
        }
        match SubtreeMove::plan::<T, Self>(&self, source, shape, dest) {
            Ok(plan) => plan.apply(self),
            Err(error) => Err(Rejected::new(self, error)),
        }
    }

    /// Moves the `count` slots starting at `from` to start at `to`.
    ///
    /// Absent slots move too, so the destination range ends up an exact copy of the
    /// source range. Vacated slots that are not overwritten are cleared.
    fn move_range(self, from: usize, to: usize, count: usize) -> Step<Self> {
        if count == 0 || from == to {
            return Ok(self);
        }
        if let Err(error) = check_range(from, to, count) {
            return Err(Rejected::new(self, error));
        }
        shift_range(self, from, to, count)
    }

    /// The first occupied index below `bound` (unbounded if `None`) whose value equals
    /// `value`.
    fn find_first(&self, value: &T, bound: Option<usize>) -> Option<usize>
    where
        T: PartialEq,
    {
        self.non_null_indices()
            .take_while(|&index| bound.is_none_or(|bound| index < bound))
            .find(|&index| self.get(index) == Some(value))
    }

    /// Streams the value pairs of the indices occupied in both `self` and `other`, in
    /// ascending index order.
    fn join_inner<U, S>(&self, other: &S, mut consumer: impl FnMut(&T, &U))
    where
        S: IndexedStorage<U>,
    {
        for index in self.non_null_indices() {
            if let (Some(left), Some(right)) = (self.get(index), other.get(index)) {
                consumer(left, right);
            }
        }
    }

    /// A best-effort estimate of the heap and inline memory in use.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DiagnosticsUnsupported`] if the backend cannot estimate it.
    fn bytes_used(&self) -> Result<usize> {
        Err(Error::DiagnosticsUnsupported)
    }
}

/// Runs a consuming storage operation on a storage held in a field, putting back
/// whichever storage the operation hands back.
pub(crate) fn rebind<T, S, R>(slot: &mut S, operation: impl FnOnce(S) -> core::result::Result<(S, R), Rejected<S>>) -> Result<R>
where
    S: IndexedStorage<T>,
{
    let placeholder = slot.empty_copy();
    let storage = mem::replace(slot, placeholder);
    match operation(storage) {
        Ok((storage, result)) => {
            *slot = storage;
            Ok(result)
        }
        Err(rejected) => {
            let (storage, error) = rejected.into_parts();
            *slot = storage;
            Err(error)
        }
    }
}

pub(crate) fn rebind_step<T, S>(slot: &mut S, operation: impl FnOnce(S) -> Step<S>) -> Result<()>
where
    S: IndexedStorage<T>,
{
    rebind(slot, |storage| operation(storage).map(|storage| (storage, ())))
}

/// Rejects ranges whose end would overflow `usize`.
pub(crate) fn check_range(from: usize, to: usize, count: usize) -> Result<()> {
    for start in [from, to] {
        if start.checked_add(count).is_none() {
            return Err(Error::OutOfBounds {
                index: start,
                bound: usize::MAX - count,
            });
        }
    }
    Ok(())
}

/// Moves `count` slots from `from` to `to`, gathering before writing. The range must
/// already be known not to overflow.
pub(crate) fn shift_range<T, S: IndexedStorage<T>>(mut storage: S, from: usize, to: usize, count: usize) -> Step<S> {
    tracing::trace!(from, to, count, "move_range");
    let mut moved = Vec::with_capacity(count);
    for offset in 0..count {
        let (rest, value) = storage.take(from + offset)?;
        storage = rest;
        moved.push(value);
    }
    for (offset, value) in moved.into_iter().enumerate() {
        storage = match value {
            Some(value) => storage.set(to + offset, value)?,
            None => storage.remove(to + offset)?,
        };
    }
    Ok(storage)
}

/// The slot-level effect of relocating one subtree onto another.
pub(crate) struct SubtreeMove {
    /// `(from, to)` for every occupied index of the source subtree, in pre-order.
    pub(crate) moves: Vec<(usize, usize)>,
    /// Occupied indices of the destination subtree that receive no value.
    pub(crate) stale: Vec<usize>,
}

impl SubtreeMove {
    pub(crate) fn plan<T, S>(storage: &S, source: usize, shape: Shape, dest: usize) -> Result<Self>
    where
        S: IndexedStorage<T>,
    {
        let mut moves = Vec::new();
        let mut overflow = None;
        storage.for_each_successor(source, shape, |index, _| match shape.relocate(index, source, dest) {
            Some(to) => moves.push((index, to)),
            None => overflow = overflow.or(Some(index)),
        });
        if let Some(index) = overflow {
            return Err(Error::OutOfBounds {
                index,
                bound: usize::MAX,
            });
        }

        let mut targets: Vec<usize> = moves.iter().map(|&(_, to)| to).collect();
        targets.sort_unstable();
        let mut stale = Vec::new();
        storage.for_each_successor(dest, shape, |index, _| {
            if targets.binary_search(&index).is_err() {
                stale.push(index);
            }
        });
        Ok(Self { moves, stale })
    }

    /// Carries out the plan: takes every source value, clears the stale slots, then
    /// writes the gathered values.
    pub(crate) fn apply<T, S: IndexedStorage<T>>(self, mut storage: S) -> Step<S> {
        tracing::trace!(moved = self.moves.len(), stale = self.stale.len(), "move_subtree");
        let mut moved = Vec::with_capacity(self.moves.len());
        for &(from, to) in &self.moves {
            let (rest, value) = storage.take(from)?;
            storage = rest;
            if let Some(value) = value {
                moved.push((to, value));
            }
        }
        for &index in &self.stale {
            storage = storage.remove(index)?;
        }
        for (to, value) in moved {
            storage = storage.set(to, value)?;
        }
        Ok(storage)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use alloc::vec;

    fn filled(indices: &[usize]) -> Dense<usize> {
        indices
            .iter()
            .try_fold(Dense::new(), |storage, &index| storage.set(index, index * 10))
            .unwrap()
    }

    fn contents<S: IndexedStorage<usize>>(storage: &S) -> Vec<(usize, usize)> {
        let mut out = Vec::new();
        storage.for_each_non_null(|index, value| out.push((index, *value)));
        out
    }

    #[test]
    fn successors_are_visited_in_pre_order() {
        let storage = filled(&[0, 1, 2, 3, 4, 5, 6, 9]);
        let mut visited = Vec::new();
        storage.for_each_successor(1, Shape::CompleteBinaryTree, |index, _| visited.push(index));
        assert_eq!(visited, [1, 3, 4, 9]);
    }

    #[test]
    fn successors_skip_gaps() {
        // 1 is absent, but its descendants are still part of the walk.
        let storage = filled(&[3, 8]);
        let mut visited = Vec::new();
        storage.for_each_successor(1, Shape::CompleteBinaryTree, |index, _| visited.push(index));
        assert_eq!(visited, [3, 8]);
    }

    #[test]
    fn sparse_successors_are_visited_in_pre_order() {
        let storage = Hashed::new();
        let storage = [1usize, 3, 4, 9, 2, 1 << 40]
            .iter()
            .try_fold(storage, |storage, &index| storage.set(index, ()))
            .unwrap();
        let mut visited = Vec::new();
        storage.for_each_successor(1, Shape::CompleteBinaryTree, |index, _| visited.push(index));
        assert_eq!(visited, [1, 3, 1 << 40, 4, 9]);
    }

    #[test]
    fn move_subtree_into_own_descendant() {
        // Push the subtree at 1 down to its left child 3.
        let storage = filled(&[1, 3, 4]);
        let storage = storage.move_subtree(1, Shape::CompleteBinaryTree, 3).unwrap();
        assert_eq!(contents(&storage), [(3, 10), (7, 30), (8, 40)]);
    }

    #[test]
    fn move_subtree_onto_own_ancestor() {
        // Pull the subtree at 6 up to 2; the stale value at 2 is replaced.
        let storage = filled(&[2, 5, 6, 13, 14]);
        let storage = storage.move_subtree(6, Shape::CompleteBinaryTree, 2).unwrap();
        assert_eq!(contents(&storage), [(2, 60), (5, 130), (6, 140)]);
    }

    #[test]
    fn move_empty_subtree_clears_destination() {
        let storage = filled(&[1, 3]);
        let storage = storage.move_subtree(2, Shape::CompleteBinaryTree, 1).unwrap();
        assert!(storage.is_empty());
    }

    #[test]
    fn move_range_shifts_right_and_left() {
        let storage = filled(&[0, 1, 2]);
        let storage = storage.move_range(1, 2, 2).unwrap();
        assert_eq!(contents(&storage), [(0, 0), (2, 10), (3, 20)]);

        let storage = storage.move_range(2, 1, 2).unwrap();
        assert_eq!(contents(&storage), [(0, 0), (1, 10), (2, 20)]);
    }

    #[test]
    fn move_range_overflow_is_rejected() {
        let storage = filled(&[0]);
        let rejected = storage.move_range(0, usize::MAX, 2).unwrap_err();
        assert!(matches!(rejected.error, Error::OutOfBounds { .. }));
        assert_eq!(contents(&rejected.storage), [(0, 0)]);
    }

    #[test]
    fn find_first_respects_bound() {
        let storage = Dense::new().set(2, 'x').unwrap().set(5, 'y').unwrap().set(7, 'x').unwrap();
        assert_eq!(storage.find_first(&'x', None), Some(2));
        assert_eq!(storage.find_first(&'y', Some(5)), None);
        assert_eq!(storage.find_first(&'y', Some(6)), Some(5));
        assert_eq!(storage.find_first(&'z', None), None);
    }

    #[test]
    fn join_inner_streams_intersection() {
        let left = filled(&[0, 2, 4, 6]);
        let right = Hashed::new().set(4, 1).unwrap().set(0, 2).unwrap().set(5, 3).unwrap();
        let mut pairs = vec![];
        left.join_inner(&right, |a, b| pairs.push((*a, *b)));
        assert_eq!(pairs, [(0, 2), (40, 1)]);
    }

    #[test]
    fn max_idx_is_exclusive() {
        assert_eq!(Dense::<u8>::new().max_idx(), 0);
        assert_eq!(filled(&[4, 9]).max_idx(), 10);
    }
}
