use core::fmt;
use core::iter::FusedIterator;
use core::marker::PhantomData;

use smallvec::SmallVec;

use super::TREE;
use crate::shape::{LEFT, RIGHT, Shape};
use crate::storage::{Dense, IndexedStorage};

/// An iterator over the entries of a [`RedBlackTree`](super::RedBlackTree), sorted by
/// key.
///
/// This `struct` is created by the [`iter`](super::RedBlackTree::iter) method.
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct Iter<'a, K, V, KS = Dense<K>, VS = Dense<V>> {
    keys: &'a KS,
    values: &'a VS,
    // Nodes whose left subtree has been entered but which are not yet yielded.
    stack: SmallVec<[usize; 64]>,
    remaining: usize,
    _marker: PhantomData<(&'a K, &'a V)>,
}

impl<'a, K, V, KS, VS> Iter<'a, K, V, KS, VS>
where
    KS: IndexedStorage<K>,
    VS: IndexedStorage<V>,
{
    pub(super) fn new(keys: &'a KS, values: &'a VS, len: usize) -> Self {
        let mut iter = Self {
            keys,
            values,
            stack: SmallVec::new(),
            remaining: len,
            _marker: PhantomData,
        };
        iter.descend(Shape::ROOT);
        iter
    }

    fn descend(&mut self, mut index: usize) {
        while self.keys.has(index) {
            self.stack.push(index);
            match TREE.child(index, LEFT) {
                Some(left) => index = left,
                None => break,
            }
        }
    }
}

impl<'a, K, V, KS, VS> Iterator for Iter<'a, K, V, KS, VS>
where
    KS: IndexedStorage<K>,
    VS: IndexedStorage<V>,
{
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.stack.pop()?;
        if let Some(right) = TREE.child(index, RIGHT) {
            self.descend(right);
        }
        self.remaining = self.remaining.saturating_sub(1);
        Some((self.keys.get(index)?, self.values.get(index)?))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V, KS, VS> ExactSizeIterator for Iter<'_, K, V, KS, VS>
where
    KS: IndexedStorage<K>,
    VS: IndexedStorage<V>,
{
}

impl<K, V, KS, VS> FusedIterator for Iter<'_, K, V, KS, VS>
where
    KS: IndexedStorage<K>,
    VS: IndexedStorage<V>,
{
}

impl<K, V, KS, VS> Clone for Iter<'_, K, V, KS, VS> {
    fn clone(&self) -> Self {
        Self {
            keys: self.keys,
            values: self.values,
            stack: self.stack.clone(),
            remaining: self.remaining,
            _marker: PhantomData,
        }
    }
}

impl<K, V, KS, VS> fmt::Debug for Iter<'_, K, V, KS, VS> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Iter").field("remaining", &self.remaining).finish()
    }
}

/// An iterator over the keys of a [`RedBlackTree`](super::RedBlackTree), in sorted
/// order.
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct Keys<'a, K, V, KS = Dense<K>, VS = Dense<V>> {
    pub(super) inner: Iter<'a, K, V, KS, VS>,
}

impl<'a, K, V, KS, VS> Iterator for Keys<'a, K, V, KS, VS>
where
    KS: IndexedStorage<K>,
    VS: IndexedStorage<V>,
{
    type Item = &'a K;

    fn next(&mut self) -> Option<&'a K> {
        self.inner.next().map(|(key, _)| key)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V, KS, VS> ExactSizeIterator for Keys<'_, K, V, KS, VS>
where
    KS: IndexedStorage<K>,
    VS: IndexedStorage<V>,
{
}

impl<K, V, KS, VS> FusedIterator for Keys<'_, K, V, KS, VS>
where
    KS: IndexedStorage<K>,
    VS: IndexedStorage<V>,
{
}

/// An iterator over the values of a [`RedBlackTree`](super::RedBlackTree), in order by
/// key.
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct Values<'a, K, V, KS = Dense<K>, VS = Dense<V>> {
    pub(super) inner: Iter<'a, K, V, KS, VS>,
}

impl<'a, K, V, KS, VS> Iterator for Values<'a, K, V, KS, VS>
where
    KS: IndexedStorage<K>,
    VS: IndexedStorage<V>,
{
    type Item = &'a V;

    fn next(&mut self) -> Option<&'a V> {
        self.inner.next().map(|(_, value)| value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V, KS, VS> ExactSizeIterator for Values<'_, K, V, KS, VS>
where
    KS: IndexedStorage<K>,
    VS: IndexedStorage<V>,
{
}

impl<K, V, KS, VS> FusedIterator for Values<'_, K, V, KS, VS>
where
    KS: IndexedStorage<K>,
    VS: IndexedStorage<V>,
{
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use crate::RedBlackTree;
    use alloc::vec::Vec;

    #[test]
    fn iterates_in_key_order() {
        let mut tree = RedBlackTree::new();
        for key in [50, 20, 80, 10, 30, 70, 90, 60] {
            tree.put(key, key / 10).unwrap();
        }
        let mut iter = tree.iter();
        assert_eq!(iter.len(), 8);
        assert_eq!(iter.next(), Some((&10, &1)));
        assert_eq!(iter.len(), 7);

        let keys: Vec<_> = tree.keys().copied().collect();
        assert_eq!(keys, [10, 20, 30, 50, 60, 70, 80, 90]);
        let values: Vec<_> = (&tree).into_iter().map(|(_, value)| *value).collect();
        assert_eq!(values, [1, 2, 3, 5, 6, 7, 8, 9]);
    }

    #[test]
    fn empty_tree_yields_nothing() {
        let tree: RedBlackTree<u8, u8> = RedBlackTree::new();
        assert_eq!(tree.iter().next(), None);
        assert_eq!(tree.keys().len(), 0);
        assert_eq!(tree.values().count(), 0);
    }
}
