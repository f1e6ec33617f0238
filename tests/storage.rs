use pretty_assertions::assert_eq;
use proptest::prelude::*;
use flatshape::{Checked, Chunked, Compressed, Dense, Error, Hashed, IndexedStorage, Shape, Trie, Usage};

// ─── Operations enum for driving randomized tests ────────────────────────────

#[derive(Debug, Clone)]
enum StorageOp {
    Set(usize, u32),
    Remove(usize),
    MoveRange(usize, usize, usize),
    MoveSubtree(usize, usize),
    MoveChain(usize, usize),
}

fn storage_op_strategy() -> impl Strategy<Value = StorageOp> {
    prop_oneof![
        6 => (0usize..64, any::<u32>()).prop_map(|(i, v)| StorageOp::Set(i, v)),
        2 => (0usize..64).prop_map(StorageOp::Remove),
        1 => (0usize..64, 0usize..64, 0usize..16).prop_map(|(f, t, n)| StorageOp::MoveRange(f, t, n)),
        1 => (0usize..7, 0usize..7).prop_map(|(s, d)| StorageOp::MoveSubtree(s, d)),
        1 => (0usize..64, 0usize..64).prop_map(|(s, d)| StorageOp::MoveChain(s, d)),
    ]
}

/// Replays `ops`, then lists the contents in index order.
fn replay<S: IndexedStorage<u32>>(mut storage: S, ops: &[StorageOp]) -> Vec<(usize, u32)> {
    for op in ops {
        storage = match *op {
            StorageOp::Set(index, value) => storage.set(index, value),
            StorageOp::Remove(index) => storage.remove(index),
            StorageOp::MoveRange(from, to, count) => storage.move_range(from, to, count),
            // Moving towards the front never deepens the tree, so indices stay inside the grid.
            StorageOp::MoveSubtree(source, dest) => {
                storage.move_subtree(source.max(dest), Shape::CompleteBinaryTree, source.min(dest))
            }
            StorageOp::MoveChain(source, dest) => {
                storage.move_subtree(source.max(dest), Shape::LinearChain, source.min(dest))
            }
        }
        .unwrap_or_else(|rejected| panic!("{op:?} was rejected: {}", rejected.error));
    }
    let mut contents = Vec::new();
    storage.for_each_non_null(|index, value| contents.push((index, *value)));
    assert_eq!(contents.len(), storage.len());
    assert_eq!(storage.non_null_indices().collect::<Vec<_>>(), contents.iter().map(|&(i, _)| i).collect::<Vec<_>>());
    assert!(storage.max_idx() <= storage.max_idx_overapproximation());
    contents
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Every backend is observably interchangeable.
    #[test]
    fn backends_are_interchangeable(ops in proptest::collection::vec(storage_op_strategy(), 0..200)) {
        let expected = replay(Dense::new(), &ops);
        prop_assert_eq!(replay(Hashed::new(), &ops), expected.clone());
        prop_assert_eq!(replay(Trie::new(), &ops), expected.clone());
        prop_assert_eq!(replay(Chunked::with_chunk_bits(2), &ops), expected.clone());
        prop_assert_eq!(replay(Checked::new(Hashed::new(), |_| Ok(())), &ops), expected.clone());
        for usage in [Usage::Size, Usage::Insert, Usage::Read] {
            prop_assert_eq!(replay(Compressed::new(32, 32, usage), &ops), expected.clone());
        }
    }
}

#[test]
fn huge_indices_in_sparse_backends() {
    let far = usize::MAX - 1;
    let hashed = Hashed::new().set(far, 'h').unwrap().set(3, 'x').unwrap().set(7, 'y').unwrap();
    let trie = Trie::new().set(far, 't').unwrap().set(3, 'x').unwrap();
    assert_eq!(hashed.get(far), Some(&'h'));
    assert_eq!(trie.get(far), Some(&'t'));
    assert_eq!(trie.non_null_indices().collect::<Vec<_>>(), vec![3, far]);
    assert_eq!(hashed.non_null_indices().collect::<Vec<_>>(), vec![3, 7, far]);

    // Re-rooting 3 at `far` would push its child 7 past the index space.
    let rejected = hashed.move_subtree(3, Shape::CompleteBinaryTree, far).unwrap_err();
    assert!(matches!(rejected.error, Error::OutOfBounds { .. }));
    assert_eq!(rejected.storage.get(3), Some(&'x'));
}

#[test]
fn sparse_matrix_product() {
    // a = [[1, 0, 2], [0, 3, 0]], b = [[4, 0], [0, 5], [6, 0]]
    let a = Compressed::new(2, 3, Usage::Insert)
        .set_at(0, 0, 1)
        .and_then(|a| a.set_at(0, 2, 2))
        .and_then(|a| a.set_at(1, 1, 3))
        .unwrap()
        .change(Usage::Read);
    let b = Compressed::new(3, 2, Usage::Size)
        .set_at(0, 0, 4)
        .and_then(|b| b.set_at(1, 1, 5))
        .and_then(|b| b.set_at(2, 0, 6))
        .unwrap();

    let mut product = [[0; 2]; 2];
    for (row, cells) in product.iter_mut().enumerate() {
        for (col, cell) in cells.iter_mut().enumerate() {
            a.join_row_col(row, &b, col, |x, y| *cell += x * y).unwrap();
        }
    }
    assert_eq!(product, [[16, 0], [0, 15]]);

    assert_eq!(
        a.join_row_col(0, &a, 0, |_: &i32, _: &i32| {}),
        Err(Error::DimensionMismatch {
            expected: (3, 3),
            actual: (2, 3)
        })
    );
    let outside = b.set_at(3, 0, 1).unwrap_err();
    assert!(matches!(outside.error, Error::OutOfBounds { .. }));
}

#[test]
fn bytes_used_is_best_effort() {
    let dense = Dense::new().set(10, 1u64).unwrap();
    assert!(dense.bytes_used().unwrap() >= 11 * core::mem::size_of::<Option<u64>>());
    let maps = Compressed::<u64>::new(4, 4, Usage::Insert);
    assert_eq!(maps.bytes_used(), Err(Error::DiagnosticsUnsupported));
}
