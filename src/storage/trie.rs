use alloc::boxed::Box;
use core::iter::FusedIterator;

use smallvec::SmallVec;

use super::{IndexedStorage, Rejected};
use crate::error::Result;

const BITS: u32 = 4;
const FANOUT: usize = 1 << BITS;
const MASK: usize = FANOUT - 1;
// Levels needed to address every `usize`.
const MAX_LEVELS: u32 = usize::BITS / BITS;

#[derive(Clone, Debug)]
enum Node<T> {
    Branch(Box<[Option<Node<T>>; FANOUT]>),
    Leaf(Box<[Option<T>; FANOUT]>),
}

impl<T> Node<T> {
    fn empty(level: u32) -> Self {
        if level == 0 {
            Node::Leaf(Box::new(core::array::from_fn(|_| None)))
        } else {
            Node::Branch(Box::new(core::array::from_fn(|_| None)))
        }
    }

    fn count_nodes(&self) -> (usize, usize) {
        match self {
            Node::Leaf(_) => (0, 1),
            Node::Branch(children) => children.iter().flatten().fold((1, 0), |(branches, leaves), child| {
                let (b, l) = child.count_nodes();
                (branches + b, leaves + l)
            }),
        }
    }
}

#[inline]
const fn digit(index: usize, level: u32) -> usize {
    (index >> (level * BITS)) & MASK
}

/// Indices addressable by a trie whose root sits at `level`.
const fn capacity(level: u32) -> usize {
    match FANOUT.checked_pow(level + 1) {
        Some(capacity) => capacity,
        None => usize::MAX,
    }
}

/// Trie-indexed sparse storage.
///
/// A 16-way radix trie over the bits of the index. Access touches at most
/// `usize::BITS / 4` levels; the trie only grows upwards (a new root above the old
/// one) when an index exceeds the current height, so growth never rehashes or copies
/// the existing entries. Nodes are allocated lazily and freed once empty.
#[derive(Clone, Debug)]
pub struct Trie<T> {
    root: Option<Node<T>>,
    // Level of the root node; leaves are level 0.
    level: u32,
    len: usize,
    bound: usize,
}

impl<T> Trie<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            root: None,
            level: 0,
            len: 0,
            bound: 0,
        }
    }

    /// Number of levels from the root to the leaves.
    #[must_use]
    pub const fn height(&self) -> u32 {
        if self.root.is_some() { self.level + 1 } else { 0 }
    }

    /// Adds levels above the root until `index` is addressable, returning the root.
    fn grow_to_fit(&mut self, index: usize) -> &mut Node<T> {
        let target = self.level_after_growth(index);
        let mut root = match self.root.take() {
            Some(root) => root,
            None => {
                self.level = target;
                Node::empty(target)
            }
        };
        while self.level < target {
            let mut children: Box<[Option<Node<T>>; FANOUT]> = Box::new(core::array::from_fn(|_| None));
            children[0] = Some(root);
            root = Node::Branch(children);
            self.level += 1;
        }
        self.root.insert(root)
    }

    fn slot_mut(&mut self, index: usize) -> &mut Option<T> {
        let mut level = self.level_after_growth(index);
        let mut node = self.grow_to_fit(index);
        loop {
            match node {
                Node::Leaf(slots) => return &mut slots[digit(index, 0)],
                Node::Branch(children) => {
                    let child = &mut children[digit(index, level)];
                    level -= 1;
                    node = child.get_or_insert_with(|| Node::empty(level));
                }
            }
        }
    }

    fn level_after_growth(&self, index: usize) -> u32 {
        let mut level = if self.root.is_some() { self.level } else { 0 };
        while index >= capacity(level) && level + 1 < MAX_LEVELS {
            level += 1;
        }
        level
    }
}

/// Removes `index` below `node` at `level`; the flag reports whether `node` became empty.
fn take_in<T>(node: &mut Node<T>, level: u32, index: usize) -> (Option<T>, bool) {
    match node {
        Node::Leaf(slots) => {
            let taken = slots[digit(index, 0)].take();
            (taken, slots.iter().all(Option::is_none))
        }
        Node::Branch(children) => {
            let slot = &mut children[digit(index, level)];
            let Some(child) = slot else {
                return (None, false);
            };
            let (taken, child_empty) = take_in(child, level - 1, index);
            if child_empty {
                *slot = None;
            }
            (taken, children.iter().all(Option::is_none))
        }
    }
}

impl<T> Default for Trie<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> IndexedStorage<T> for Trie<T> {
    type Indices<'a>
        = TrieIndices<'a, T>
    where
        Self: 'a;

    fn get(&self, index: usize) -> Option<&T> {
        if index >= capacity(self.level) && self.level + 1 < MAX_LEVELS {
            return None;
        }
        let mut node = self.root.as_ref()?;
        let mut level = self.level;
        loop {
            match node {
                Node::Leaf(slots) => return slots[digit(index, 0)].as_ref(),
                Node::Branch(children) => {
                    node = children[digit(index, level)].as_ref()?;
                    level -= 1;
                }
            }
        }
    }

    fn replace(mut self, index: usize, value: T) -> core::result::Result<(Self, Option<T>), Rejected<Self>> {
        let previous = self.slot_mut(index).replace(value);
        if previous.is_none() {
            self.len += 1;
        }
        self.bound = self.bound.max(index.saturating_add(1));
        Ok((self, previous))
    }

    fn take(mut self, index: usize) -> core::result::Result<(Self, Option<T>), Rejected<Self>> {
        if index >= self.bound {
            return Ok((self, None));
        }
        let level = self.level;
        let Some(root) = self.root.as_mut() else {
            return Ok((self, None));
        };
        let (taken, root_empty) = take_in(root, level, index);
        if taken.is_some() {
            self.len -= 1;
        }
        if root_empty {
            self.root = None;
            self.level = 0;
            self.bound = 0;
        }
        Ok((self, taken))
    }

    fn empty_copy(&self) -> Self {
        Self::new()
    }

    fn non_null_indices(&self) -> TrieIndices<'_, T> {
        let mut stack = SmallVec::new();
        if let Some(root) = &self.root {
            stack.push(Frame {
                node: root,
                base: 0,
                level: self.level,
                next: 0,
            });
        }
        TrieIndices {
            stack,
            remaining: self.len,
        }
    }

    fn max_idx_overapproximation(&self) -> usize {
        self.bound
    }

    #[inline]
    fn len(&self) -> usize {
        self.len
    }

    fn bytes_used(&self) -> Result<usize> {
        let (branches, leaves) = self.root.as_ref().map_or((0, 0), Node::count_nodes);
        Ok(size_of::<Self>()
            + branches * size_of::<[Option<Node<T>>; FANOUT]>()
            + leaves * size_of::<[Option<T>; FANOUT]>())
    }
}

struct Frame<'a, T> {
    node: &'a Node<T>,
    base: usize,
    level: u32,
    next: usize,
}

/// Ascending occupied indices of a [`Trie`] storage.
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct TrieIndices<'a, T> {
    stack: SmallVec<[Frame<'a, T>; 16]>,
    remaining: usize,
}

impl<T> Iterator for TrieIndices<'_, T> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        loop {
            let frame = self.stack.last_mut()?;
            if frame.next == FANOUT {
                self.stack.pop();
                continue;
            }
            let digit = frame.next;
            frame.next += 1;
            let (node, base, level) = (frame.node, frame.base, frame.level);
            match node {
                Node::Leaf(slots) => {
                    if slots[digit].is_some() {
                        self.remaining -= 1;
                        return Some(base | digit);
                    }
                }
                Node::Branch(children) => {
                    if let Some(child) = &children[digit] {
                        self.stack.push(Frame {
                            node: child,
                            base: base | (digit << (level * BITS)),
                            level: level - 1,
                            next: 0,
                        });
                    }
                }
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<T> ExactSizeIterator for TrieIndices<'_, T> {}

impl<T> FusedIterator for TrieIndices<'_, T> {}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::storage::Dense;
    use alloc::vec::Vec;
    use proptest::prelude::*;

    #[test]
    fn grows_upwards_without_losing_entries() {
        let storage = Trie::new().set(3, 'a').unwrap();
        assert_eq!(storage.height(), 1);
        let storage = storage.set(1000, 'b').unwrap();
        assert_eq!(storage.height(), 3);
        assert_eq!(storage.get(3), Some(&'a'));
        assert_eq!(storage.get(1000), Some(&'b'));
        assert_eq!(storage.get(4096), None);
    }

    #[test]
    fn extreme_indices() {
        let storage = Trie::new().set(usize::MAX, 1).unwrap().set(0, 2).unwrap();
        assert_eq!(storage.get(usize::MAX), Some(&1));
        assert_eq!(storage.height(), MAX_LEVELS);
        let indices: Vec<_> = storage.non_null_indices().collect();
        assert_eq!(indices, [0, usize::MAX]);
    }

    #[test]
    fn empty_nodes_are_freed() {
        let storage = Trie::new().set(300, 1).unwrap().set(5, 2).unwrap();
        let before = storage.bytes_used().unwrap();
        let storage = storage.remove(300).unwrap();
        assert!(storage.bytes_used().unwrap() < before);
        let storage = storage.remove(5).unwrap();
        assert_eq!(storage.height(), 0);
        assert_eq!(storage.bytes_used().unwrap(), size_of::<Trie<i32>>());
    }

    proptest! {
        #[test]
        fn trie_matches_dense(operations in prop::collection::vec((any::<bool>(), 0usize..5000, any::<u16>()), 0..300)) {
            let mut trie = Trie::new();
            let mut dense = Dense::new();
            for (insert, index, value) in operations {
                if insert {
                    trie = trie.set(index, value).unwrap();
                    dense = dense.set(index, value).unwrap();
                } else {
                    let (next, a) = trie.take(index).unwrap();
                    trie = next;
                    let (next, b) = dense.take(index).unwrap();
                    dense = next;
                    prop_assert_eq!(a, b);
                }
                prop_assert_eq!(trie.len(), dense.len());
            }
            let a: Vec<_> = trie.non_null_indices().collect();
            let b: Vec<_> = dense.non_null_indices().collect();
            prop_assert_eq!(&a, &b);
            for index in a {
                prop_assert_eq!(trie.get(index), dense.get(index));
            }
        }
    }
}
