use alloc::format;
use alloc::string::String;
use core::cmp::Ordering;

use super::{Color, KeyOrder, RedBlackTree, TREE};
use crate::error::{Error, Result};
use crate::shape::{LEFT, RIGHT, Shape};
use crate::storage::IndexedStorage;

impl<K, V, O, KS, VS, CS> RedBlackTree<K, V, O, KS, VS, CS>
where
    O: KeyOrder<K>,
    KS: IndexedStorage<K>,
    VS: IndexedStorage<V>,
    CS: IndexedStorage<Color>,
{
    /// Verifies every structural invariant of the tree.
    ///
    /// Checks that keys, values and colours occupy the same indices, that the entry
    /// count matches, that every non-root node has a parent, that keys are strictly
    /// ordered in-order, that the root is black, that no red node has a red parent,
    /// and that every path from the root to an absent slot crosses the same number of
    /// black nodes.
    ///
    /// Runs after every `put` when [`TreeConfig::invariant_checks`] is enabled.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Inconsistent`] naming the first violation found, or
    /// [`Error::Incomparable`] if two stored keys cannot be ordered.
    ///
    /// [`TreeConfig::invariant_checks`]: super::TreeConfig::invariant_checks
    ///
    /// # Complexity
    ///
    /// O(n)
    pub fn check_invariants(&self) -> Result<()> {
        let mut count = 0;
        for index in self.keys.non_null_indices() {
            count += 1;
            if !self.values.has(index) || !self.colors.has(index) {
                return Err(inconsistent(format!("index {index} holds a key but no value or colour")));
            }
            if let Some(parent) = TREE.parent(index)
                && !self.keys.has(parent)
            {
                return Err(inconsistent(format!("index {index} has no parent")));
            }
            if self.is_red(index)
                && let Some(parent) = TREE.parent(index)
                && self.is_red(parent)
            {
                return Err(inconsistent(format!("red index {index} has a red parent")));
            }
        }
        if count != self.len || self.values.len() != self.len || self.colors.len() != self.len {
            return Err(inconsistent(format!(
                "tree of {} entries holds {count} keys, {} values and {} colours",
                self.len,
                self.values.len(),
                self.colors.len()
            )));
        }
        if self.is_red(Shape::ROOT) {
            return Err(inconsistent("the root is red".into()));
        }

        let mut previous: Option<&K> = None;
        for (key, _) in self.iter() {
            if let Some(previous) = previous
                && self.compare(previous, key)? != Ordering::Less
            {
                return Err(inconsistent("keys are not in strictly ascending order".into()));
            }
            previous = Some(key);
        }

        self.black_height(Shape::ROOT)?;
        tracing::debug!(len = self.len, "red-black invariants hold");
        Ok(())
    }

    /// Black nodes on every path from `index` down to an absent slot, counting the
    /// absent slot.
    fn black_height(&self, index: usize) -> Result<usize> {
        if !self.keys.has(index) {
            return Ok(1);
        }
        let (Some(left), Some(right)) = (TREE.child(index, LEFT), TREE.child(index, RIGHT)) else {
            return Err(inconsistent(format!("index {index} has no addressable children")));
        };
        let left = self.black_height(left)?;
        let right = self.black_height(right)?;
        if left != right {
            return Err(inconsistent(format!(
                "black heights below index {index} differ: {left} on the left, {right} on the right"
            )));
        }
        Ok(left + usize::from(!self.is_red(index)))
    }
}

fn inconsistent(message: String) -> Error {
    tracing::debug!(%message, "red-black invariant violated");
    Error::Inconsistent(message)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::storage::Step;

    fn tree(keys: &[i32]) -> RedBlackTree<i32, ()> {
        let mut tree = RedBlackTree::new();
        for &key in keys {
            tree.put(key, ()).unwrap();
        }
        tree.check_invariants().unwrap();
        tree
    }

    fn mutate<S: IndexedStorage<T>, T>(slot: &mut S, operation: impl FnOnce(S) -> Step<S>) {
        super::super::rebind_step(slot, operation).unwrap();
    }

    #[test]
    fn detects_red_root() {
        let mut tree = tree(&[1]);
        mutate(&mut tree.colors, |colors| colors.set(0, Color::Red));
        assert_eq!(tree.check_invariants(), Err(Error::Inconsistent("the root is red".into())));
    }

    #[test]
    fn detects_red_red() {
        let mut tree = tree(&[2, 1, 3, 4]);
        // 4 sits red below black 3; repaint 3.
        mutate(&mut tree.colors, |colors| colors.set(2, Color::Red));
        assert!(matches!(tree.check_invariants(), Err(Error::Inconsistent(message)) if message.contains("red parent")));
    }

    #[test]
    fn detects_black_height_mismatch() {
        let mut tree = tree(&[2, 1, 3]);
        mutate(&mut tree.colors, |colors| colors.set(1, Color::Black));
        assert!(matches!(tree.check_invariants(), Err(Error::Inconsistent(message)) if message.contains("black heights")));
    }

    #[test]
    fn detects_misordered_keys() {
        let mut tree = tree(&[2, 1, 3]);
        mutate(&mut tree.keys, |keys| keys.set(1, 5));
        assert!(matches!(tree.check_invariants(), Err(Error::Inconsistent(message)) if message.contains("ascending")));
    }

    #[test]
    fn detects_orphans_and_missing_columns() {
        let mut orphan = tree(&[2, 1, 3]);
        // 7 hangs below the absent left child of 1.
        mutate(&mut orphan.keys, |keys| keys.set(7, 0));
        mutate(&mut orphan.values, |values| values.set(7, ()));
        mutate(&mut orphan.colors, |colors| colors.set(7, Color::Red));
        orphan.len += 1;
        assert!(matches!(orphan.check_invariants(), Err(Error::Inconsistent(message)) if message.contains("no parent")));

        let mut missing = tree(&[2, 1]);
        mutate(&mut missing.values, |values| values.remove(1));
        assert!(matches!(missing.check_invariants(), Err(Error::Inconsistent(message)) if message.contains("no value")));
    }
}
