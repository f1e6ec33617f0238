//! A growable list laid out along a [`LinearChain`](crate::Shape::LinearChain).
//!
//! Element `i` lives at index `i` of the backing storage. Inserting and removing shift
//! the tail with [`IndexedStorage::move_range`]. The storage is wrapped in a
//! [`Checked`] whose validator refuses any write past the end of the list, so a bounds
//! bug surfaces as an [`Error::Rejected`] instead of a gap.

use alloc::format;
use alloc::sync::Arc;
use core::fmt;
use core::iter::FusedIterator;
use core::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{Error, Result};
use crate::storage::{Checked, Dense, IndexedStorage, Proposal, rebind, rebind_step};

/// A list of `T` over any [`IndexedStorage`].
///
/// # Examples
///
/// ```
/// use flatshape::{Hashed, Sequence};
///
/// let mut list = Sequence::with_storage(Hashed::new());
/// list.push('a')?;
/// list.push('c')?;
/// list.insert(1, 'b')?;
/// assert_eq!(list.iter().collect::<String>(), "abc");
///
/// assert_eq!(list.remove(0)?, Some('a'));
/// assert_eq!(list.index_of(&'c'), Some(1));
/// # Ok::<(), flatshape::Error>(())
/// ```
pub struct Sequence<T, S = Dense<T>> {
    storage: Checked<S, T>,
    // Shared with the validator, which reads it before every write.
    len: Arc<AtomicUsize>,
}

impl<T: 'static> Sequence<T> {
    /// Makes a new, empty list held in a [`Dense`] storage.
    #[must_use]
    pub fn new() -> Self {
        Self::with_storage(Dense::new())
    }
}

impl<T, S> Sequence<T, S>
where
    T: 'static,
    S: IndexedStorage<T>,
{
    /// Makes a new, empty list over an [`empty_copy`](IndexedStorage::empty_copy) of
    /// `storage`.
    #[must_use]
    pub fn with_storage(storage: S) -> Self {
        let len = Arc::new(AtomicUsize::new(0));
        Self {
            storage: bounded(storage.empty_copy(), Arc::clone(&len)),
            len,
        }
    }
}

/// Wraps `storage` so that no write lands past the list length held in `len`.
fn bounded<T: 'static, S: IndexedStorage<T>>(storage: S, len: Arc<AtomicUsize>) -> Checked<S, T> {
    Checked::new(storage, move |proposal: &Proposal<'_, T>| {
        let len = len.load(Ordering::Relaxed);
        if proposal.hi() > len {
            return Err(proposal.reject(format!(
                "list index {} too large for list of length {len}",
                proposal.hi()
            )));
        }
        Ok(())
    })
}

impl<T, S> Sequence<T, S>
where
    S: IndexedStorage<T>,
{
    /// Returns the number of elements.
    ///
    /// # Complexity
    ///
    /// O(1)
    #[must_use]
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The backing storage.
    #[must_use]
    pub fn storage(&self) -> &S {
        self.storage.inner()
    }

    /// Returns the element at `index`, or `None` if it is past the end.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&T> {
        if index < self.len() { self.storage.get(index) } else { None }
    }

    /// Appends `value` to the end of the list.
    ///
    /// # Errors
    ///
    /// Returns the error of a backing storage that rejects the write.
    pub fn push(&mut self, value: T) -> Result<()> {
        let len = self.len();
        rebind_step(&mut self.storage, |storage| storage.set(len, value))?;
        self.set_len(len + 1);
        Ok(())
    }

    /// Inserts `value` at `index`, shifting every later element one place right.
    ///
    /// # Errors
    ///
    /// * [`Error::Rejected`] if `index > len`.
    /// * The error of a backing storage that rejects the shift or the write. The list
    ///   is left unchanged.
    /// * [`Error::Inconsistent`] if shifting the tail back after a rejected write is
    ///   rejected too.
    ///
    /// # Complexity
    ///
    /// O(len - index) slot moves.
    pub fn insert(&mut self, index: usize, value: T) -> Result<()> {
        let len = self.len();
        let tail = len.saturating_sub(index);
        if tail > 0 {
            rebind_step(&mut self.storage, |storage| storage.move_range(index, index + 1, tail))?;
        }
        if let Err(error) = rebind_step(&mut self.storage, |storage| storage.set(index, value)) {
            if tail > 0
                && let Err(undo) = rebind_step(&mut self.storage, |storage| storage.move_range(index + 1, index, tail))
            {
                return Err(error.rollback_failed(undo));
            }
            return Err(error);
        }
        self.set_len(len + 1);
        Ok(())
    }

    /// Removes and returns the element at `index`, shifting every later element one
    /// place left.
    ///
    /// # Errors
    ///
    /// * [`Error::OutOfBounds`] if `index >= len`.
    /// * The error of a backing storage that rejects the shift. The list is left
    ///   unchanged.
    /// * [`Error::Inconsistent`] if putting the removed element back is rejected too.
    pub fn remove(&mut self, index: usize) -> Result<Option<T>> {
        let len = self.len();
        if index >= len {
            return Err(Error::OutOfBounds { index, bound: len });
        }
        let removed = rebind(&mut self.storage, |storage| storage.take(index))?;
        let tail = len - index - 1;
        if tail > 0
            && let Err(error) = rebind_step(&mut self.storage, |storage| storage.move_range(index + 1, index, tail))
        {
            if let Some(value) = removed
                && let Err(undo) = rebind_step(&mut self.storage, |storage| storage.set(index, value))
            {
                return Err(error.rollback_failed(undo));
            }
            return Err(error);
        }
        self.set_len(len - 1);
        Ok(removed)
    }

    /// Overwrites the element at `index`, returning the previous one.
    ///
    /// # Errors
    ///
    /// * [`Error::OutOfBounds`] if `index >= len`.
    /// * The error of a backing storage that rejects the write.
    pub fn replace(&mut self, index: usize, value: T) -> Result<Option<T>> {
        let len = self.len();
        if index >= len {
            return Err(Error::OutOfBounds { index, bound: len });
        }
        rebind(&mut self.storage, |storage| storage.replace(index, value))
    }

    /// The position of the first element equal to `value`.
    ///
    /// # Complexity
    ///
    /// O(len)
    #[must_use]
    pub fn index_of(&self, value: &T) -> Option<usize>
    where
        T: PartialEq,
    {
        self.storage.find_first(value, Some(self.len()))
    }

    #[must_use]
    pub fn contains(&self, value: &T) -> bool
    where
        T: PartialEq,
    {
        self.index_of(value).is_some()
    }

    /// Removes every element, keeping the storage configuration.
    pub fn clear(&mut self) {
        self.storage = self.storage.empty_copy();
        self.set_len(0);
    }

    /// Gets an iterator over the elements, front to back.
    pub fn iter(&self) -> Iter<'_, T, S> {
        Iter {
            storage: &self.storage,
            front: 0,
            back: self.len(),
        }
    }

    fn set_len(&self, len: usize) {
        self.len.store(len, Ordering::Relaxed);
    }
}

impl<T: 'static> Default for Sequence<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, S> Clone for Sequence<T, S>
where
    T: Clone + 'static,
    S: IndexedStorage<T> + Clone,
{
    fn clone(&self) -> Self {
        // The copy needs its own length counter, hence its own validator.
        let len = Arc::new(AtomicUsize::new(self.len()));
        Self {
            storage: bounded(self.storage.inner().copy(), Arc::clone(&len)),
            len,
        }
    }
}

impl<T: fmt::Debug, S: IndexedStorage<T>> fmt::Debug for Sequence<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<'a, T, S: IndexedStorage<T>> IntoIterator for &'a Sequence<T, S> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T, S>;

    fn into_iter(self) -> Iter<'a, T, S> {
        self.iter()
    }
}

/// An iterator over the elements of a [`Sequence`].
///
/// This `struct` is created by the [`iter`](Sequence::iter) method.
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct Iter<'a, T, S = Dense<T>> {
    storage: &'a Checked<S, T>,
    front: usize,
    back: usize,
}

impl<'a, T, S: IndexedStorage<T>> Iterator for Iter<'a, T, S> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        while self.front < self.back {
            let index = self.front;
            self.front += 1;
            if let Some(value) = self.storage.get(index) {
                return Some(value);
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.back - self.front;
        (remaining, Some(remaining))
    }
}

impl<T, S: IndexedStorage<T>> DoubleEndedIterator for Iter<'_, T, S> {
    fn next_back(&mut self) -> Option<Self::Item> {
        while self.front < self.back {
            self.back -= 1;
            if let Some(value) = self.storage.get(self.back) {
                return Some(value);
            }
        }
        None
    }
}

impl<T, S: IndexedStorage<T>> ExactSizeIterator for Iter<'_, T, S> {}

impl<T, S: IndexedStorage<T>> FusedIterator for Iter<'_, T, S> {}

impl<T, S> fmt::Debug for Iter<'_, T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Iter").field("remaining", &(self.back - self.front)).finish()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::storage::{Chunked, Hashed, Trie};
    use alloc::vec::Vec;
    use proptest::prelude::*;

    fn contents<S: IndexedStorage<i32>>(list: &Sequence<i32, S>) -> Vec<i32> {
        list.iter().copied().collect()
    }

    #[test]
    fn insert_and_remove_shift_the_tail() {
        let mut list = Sequence::new();
        for value in [1, 2, 4] {
            list.push(value).unwrap();
        }
        list.insert(2, 3).unwrap();
        list.insert(0, 0).unwrap();
        list.insert(5, 5).unwrap();
        assert_eq!(contents(&list), [0, 1, 2, 3, 4, 5]);

        assert_eq!(list.remove(0).unwrap(), Some(0));
        assert_eq!(list.remove(2).unwrap(), Some(3));
        assert_eq!(contents(&list), [1, 2, 4, 5]);
        assert_eq!(list.storage().max_idx(), 4);
    }

    #[test]
    fn writes_past_the_end_are_rejected() {
        let mut list = Sequence::with_storage(Hashed::new());
        list.push(7).unwrap();
        let error = list.insert(3, 9).unwrap_err();
        assert_eq!(
            error,
            Error::Rejected {
                lo: 3,
                hi: 3,
                reason: "list index 3 too large for list of length 1".into()
            }
        );
        assert_eq!(contents(&list), [7]);
        assert_eq!(list.remove(1), Err(Error::OutOfBounds { index: 1, bound: 1 }));
        assert_eq!(list.replace(1, 0), Err(Error::OutOfBounds { index: 1, bound: 1 }));
    }

    #[test]
    fn lookups() {
        let mut list = Sequence::with_storage(Trie::new());
        for value in [3, 1, 4, 1, 5] {
            list.push(value).unwrap();
        }
        assert_eq!(list.index_of(&1), Some(1));
        assert!(list.contains(&5));
        assert!(!list.contains(&9));
        assert_eq!(list.replace(4, 9).unwrap(), Some(5));
        assert_eq!(list.get(4), Some(&9));
        assert_eq!(list.get(5), None);
        assert_eq!(list.iter().rev().copied().collect::<Vec<_>>(), [9, 1, 4, 1, 3]);
    }

    #[test]
    fn clear_keeps_working() {
        let mut list = Sequence::with_storage(Chunked::with_chunk_bits(2));
        list.push(1).unwrap();
        list.push(2).unwrap();
        list.clear();
        assert!(list.is_empty());
        assert!(list.insert(1, 0).is_err());
        list.push(3).unwrap();
        assert_eq!(contents(&list), [3]);
        assert_eq!(list.storage().chunk_size(), 4);
    }

    #[test]
    fn clones_are_independent() {
        let mut list = Sequence::new();
        list.push(1).unwrap();
        let mut copy = list.clone();
        copy.push(2).unwrap();
        list.push(3).unwrap();
        list.push(4).unwrap();
        assert_eq!(contents(&list), [1, 3, 4]);
        assert_eq!(contents(&copy), [1, 2]);
        // The copy's bound follows its own length.
        assert!(copy.insert(3, 0).is_err());
        assert_eq!(alloc::format!("{copy:?}"), "[1, 2]");
    }

    #[test]
    fn rejected_insert_restores_the_tail() {
        let storage = Checked::new(Dense::new(), |proposal: &Proposal<'_, i32>| {
            if proposal.writes().any(|(_, value)| value == Some(&13)) {
                Err(proposal.reject("unlucky"))
            } else {
                Ok(())
            }
        });
        let mut list = Sequence::with_storage(storage);
        list.push(1).unwrap();
        list.push(2).unwrap();
        assert!(matches!(list.insert(0, 13), Err(Error::Rejected { .. })));
        assert_eq!(contents(&list), [1, 2]);
        assert_eq!(list.storage().max_idx(), 2);
    }

    #[test]
    fn failed_restore_is_inconsistent() {
        // Index 2 can be filled but never cleared again, so the shifted tail cannot
        // move back.
        let storage = Checked::new(Dense::new(), |proposal: &Proposal<'_, i32>| {
            let refused = proposal
                .writes()
                .any(|(index, value)| value == Some(&13) || (index == 2 && value.is_none()));
            if refused {
                Err(proposal.reject("refused"))
            } else {
                Ok(())
            }
        });
        let mut list = Sequence::with_storage(storage);
        list.push(1).unwrap();
        list.push(2).unwrap();
        assert!(matches!(list.insert(0, 13), Err(Error::Inconsistent(_))));
    }

    #[derive(Clone, Debug)]
    enum Op {
        Push(i32),
        Insert(usize, i32),
        Remove(usize),
        Replace(usize, i32),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            any::<i32>().prop_map(Op::Push),
            (0..40usize, any::<i32>()).prop_map(|(index, value)| Op::Insert(index, value)),
            (0..40usize).prop_map(Op::Remove),
            (0..40usize, any::<i32>()).prop_map(|(index, value)| Op::Replace(index, value)),
        ]
    }

    proptest! {
        #[test]
        fn behaves_like_vec(ops in prop::collection::vec(op(), 0..120)) {
            let mut list = Sequence::with_storage(Hashed::new());
            let mut model = Vec::new();
            for op in ops {
                match op {
                    Op::Push(value) => {
                        list.push(value).unwrap();
                        model.push(value);
                    }
                    Op::Insert(index, value) => {
                        prop_assert_eq!(list.insert(index, value).is_ok(), index <= model.len());
                        if index <= model.len() {
                            model.insert(index, value);
                        }
                    }
                    Op::Remove(index) => {
                        let expected = (index < model.len()).then(|| model.remove(index));
                        prop_assert_eq!(list.remove(index).ok().flatten(), expected);
                    }
                    Op::Replace(index, value) => {
                        let expected = model.get_mut(index).map(|slot| core::mem::replace(slot, value));
                        prop_assert_eq!(list.replace(index, value).ok().flatten(), expected);
                    }
                }
                prop_assert_eq!(list.len(), model.len());
            }
            prop_assert_eq!(contents(&list), model);
        }
    }
}
