use alloc::format;

use super::{Color, Journal, KeyOrder, RedBlackTree, TREE, Undo, child, rebind_step};
use crate::error::{Error, Result};
use crate::shape::{LEFT, RIGHT};
use crate::storage::{IndexedStorage, Rejected, Step};

/// One step of a rotation, applied identically to all three storages.
#[derive(Clone, Copy, Debug)]
pub(super) enum Relocation {
    Subtree { from: usize, to: usize },
    Slot { from: usize, to: usize },
}

impl Relocation {
    fn run<T, S: IndexedStorage<T>>(self, storage: S) -> Step<S> {
        match self {
            Self::Subtree { from, to } => storage.move_subtree(from, TREE, to),
            Self::Slot { from, to } => storage.move_range(from, to, 1),
        }
    }

    /// Every step lands on vacated slots, so swapping the ends undoes it.
    const fn inverse(self) -> Self {
        match self {
            Self::Subtree { from, to } => Self::Subtree { from: to, to: from },
            Self::Slot { from, to } => Self::Slot { from: to, to: from },
        }
    }
}

/// The five relocations of one rotation, deepest first.
pub(super) type Plan = [Relocation; 5];

/// Plans a rotation at `pivot` that sends it down toward `toward`. Returns the plan and
/// the index the pivot node ends up at.
fn plan(pivot: usize, toward: usize) -> Result<(Plan, usize)> {
    let staying = child(pivot, toward)?;
    let rising = child(pivot, 1 - toward)?;
    let plan = [
        Relocation::Subtree {
            from: staying,
            to: child(staying, toward)?,
        },
        Relocation::Slot { from: pivot, to: staying },
        Relocation::Slot { from: rising, to: pivot },
        Relocation::Subtree {
            from: child(rising, toward)?,
            to: child(staying, 1 - toward)?,
        },
        Relocation::Subtree {
            from: child(rising, 1 - toward)?,
            to: rising,
        },
    ];
    Ok((plan, staying))
}

/// Applies `steps` in order. A rejected step hands the storage back with the steps
/// before it undone.
fn apply<T, S: IndexedStorage<T>>(mut storage: S, steps: &[Relocation]) -> Step<S> {
    for (done, &step) in steps.iter().enumerate() {
        storage = match step.run(storage) {
            Ok(storage) => storage,
            Err(rejected) => {
                let (storage, error) = rejected.into_parts();
                return Err(match undo(storage, &steps[..done]) {
                    Ok(storage) => Rejected::new(storage, error),
                    Err(failed) => {
                        let (storage, undo_error) = failed.into_parts();
                        Rejected::new(storage, error.rollback_failed(undo_error))
                    }
                });
            }
        };
    }
    Ok(storage)
}

/// Undoes `steps`, last step first.
fn undo<T, S: IndexedStorage<T>>(mut storage: S, steps: &[Relocation]) -> Step<S> {
    for step in steps.iter().rev() {
        storage = step.inverse().run(storage)?;
    }
    Ok(storage)
}

impl<K, V, O, KS, VS, CS> RedBlackTree<K, V, O, KS, VS, CS>
where
    O: KeyOrder<K>,
    KS: IndexedStorage<K>,
    VS: IndexedStorage<V>,
    CS: IndexedStorage<Color>,
{
    /// Rotates the subtree at `pivot` to the left: its right child takes its place and
    /// the old pivot becomes that child's left child.
    ///
    /// Returns the index the old pivot node moved to. A rejected rotation leaves all
    /// three storages as they were; a completed one is recorded in `journal`.
    pub(crate) fn rotate_left(&mut self, pivot: usize, journal: &mut Journal) -> Result<usize> {
        if !self.keys.has(pivot) || !self.keys.has(child(pivot, RIGHT)?) {
            return Err(Error::Inconsistent(format!("rotate_left({pivot}) needs a node with a right child")));
        }
        tracing::trace!(pivot, "rotate_left");
        self.rotate(pivot, LEFT, journal)
    }

    /// Rotates the subtree at `pivot` to the right: its left child takes its place and
    /// the old pivot becomes that child's right child.
    ///
    /// Returns the index the old pivot node moved to, as [`rotate_left`](Self::rotate_left)
    /// does.
    pub(crate) fn rotate_right(&mut self, pivot: usize, journal: &mut Journal) -> Result<usize> {
        if !self.keys.has(pivot) || !self.keys.has(child(pivot, LEFT)?) {
            return Err(Error::Inconsistent(format!("rotate_right({pivot}) needs a node with a left child")));
        }
        tracing::trace!(pivot, "rotate_right");
        self.rotate(pivot, RIGHT, journal)
    }

    fn rotate(&mut self, pivot: usize, toward: usize, journal: &mut Journal) -> Result<usize> {
        let (plan, moved) = plan(pivot, toward)?;
        self.relocate(&plan)?;
        journal.push(Undo::Rotate(plan));
        Ok(moved)
    }

    /// Runs `plan` on keys, values and colours in turn. If one storage rejects it, the
    /// storages already rotated are rotated back.
    fn relocate(&mut self, plan: &Plan) -> Result<()> {
        rebind_step(&mut self.keys, |keys| apply(keys, plan))?;
        if let Err(error) = rebind_step(&mut self.values, |values| apply(values, plan)) {
            return Err(match rebind_step(&mut self.keys, |keys| undo(keys, plan)) {
                Ok(()) => error,
                Err(undo_error) => error.rollback_failed(undo_error),
            });
        }
        if let Err(error) = rebind_step(&mut self.colors, |colors| apply(colors, plan)) {
            let restored = rebind_step(&mut self.values, |values| undo(values, plan))
                .and_then(|()| rebind_step(&mut self.keys, |keys| undo(keys, plan)));
            return Err(match restored {
                Ok(()) => error,
                Err(undo_error) => error.rollback_failed(undo_error),
            });
        }
        Ok(())
    }

    /// Reverses a completed rotation on all three storages.
    pub(super) fn unrotate(&mut self, plan: &Plan) -> Result<()> {
        rebind_step(&mut self.colors, |colors| undo(colors, plan))?;
        rebind_step(&mut self.values, |values| undo(values, plan))?;
        rebind_step(&mut self.keys, |keys| undo(keys, plan))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::TreeConfig;
    use alloc::vec::Vec;
    use proptest::prelude::*;

    type Tree = RedBlackTree<i32, i32>;

    fn snapshot(tree: &Tree) -> Vec<(usize, i32, i32, Color)> {
        tree.keys
            .non_null_indices()
            .map(|index| {
                (
                    index,
                    *tree.keys.get(index).unwrap(),
                    *tree.values.get(index).unwrap(),
                    *tree.colors.get(index).unwrap(),
                )
            })
            .collect()
    }

    fn build(keys: &[i32]) -> Tree {
        let mut tree = RedBlackTree::new().with_config(TreeConfig::new().with_invariant_checks(true));
        for &key in keys {
            tree.put(key, key * 100).unwrap();
        }
        tree
    }

    #[test]
    fn rotate_left_at_root() {
        // 2 at the root with 1 and 3 below it.
        let mut tree = build(&[2, 1, 3, 4]);
        assert_eq!(tree.rotate_left(0, &mut Journal::new()).unwrap(), 1);
        let keys: Vec<_> = snapshot(&tree).into_iter().map(|(index, key, ..)| (index, key)).collect();
        assert_eq!(keys, [(0, 3), (1, 2), (2, 4), (3, 1)]);
        // In-order sequence is untouched.
        assert_eq!(tree.keys().copied().collect::<Vec<_>>(), [1, 2, 3, 4]);
    }

    #[test]
    fn rotate_right_carries_the_inner_subtree() {
        let mut tree = build(&[4, 2, 6, 1, 3, 5, 7]);
        assert_eq!(tree.rotate_right(0, &mut Journal::new()).unwrap(), 2);
        let keys: Vec<_> = snapshot(&tree).into_iter().map(|(index, key, ..)| (index, key)).collect();
        // 2 rises to the root; its right child 3 becomes 4's left child.
        assert_eq!(keys, [(0, 2), (1, 1), (2, 4), (5, 3), (6, 6), (13, 5), (14, 7)]);
        assert_eq!(tree.values().copied().collect::<Vec<_>>(), [100, 200, 300, 400, 500, 600, 700]);
    }

    #[test]
    fn rotation_without_child_is_inconsistent() {
        let mut tree = build(&[1]);
        let mut journal = Journal::new();
        assert!(matches!(tree.rotate_left(0, &mut journal), Err(Error::Inconsistent(_))));
        assert!(matches!(tree.rotate_right(0, &mut journal), Err(Error::Inconsistent(_))));
        assert!(journal.is_empty());
        assert_eq!(snapshot(&tree), [(0, 1, 100, Color::Black)]);
    }

    proptest! {
        #[test]
        fn rotations_round_trip(keys in prop::collection::vec(any::<i16>(), 1..80), choice in any::<prop::sample::Index>()) {
            let keys: Vec<i32> = keys.into_iter().map(i32::from).collect();
            let mut tree = build(&keys);
            let before = snapshot(&tree);

            let candidates: Vec<usize> =
                tree.keys.non_null_indices().filter(|&index| tree.keys.has(2 * index + 2)).collect();
            prop_assume!(!candidates.is_empty());
            let pivot = candidates[choice.index(candidates.len())];

            let mut journal = Journal::new();
            let moved = tree.rotate_left(pivot, &mut journal).unwrap();
            prop_assert_eq!(moved, 2 * pivot + 1);
            prop_assert_eq!(journal.len(), 1);
            let Some(Undo::Rotate(plan)) = journal.pop() else {
                panic!("rotation was not journaled");
            };
            let rotated = snapshot(&tree);
            tree.unrotate(&plan).unwrap();
            prop_assert_eq!(snapshot(&tree), before.clone());

            tree.rotate_left(pivot, &mut journal).unwrap();
            prop_assert_eq!(snapshot(&tree), rotated);
            prop_assert_eq!(tree.rotate_right(pivot, &mut journal).unwrap(), 2 * pivot + 2);
            prop_assert_eq!(snapshot(&tree), before);
        }
    }
}
