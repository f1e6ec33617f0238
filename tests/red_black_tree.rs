use std::collections::BTreeMap;

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use flatshape::{Checked, Chunked, Color, Dense, Error, Hashed, IndexedStorage, Natural, RedBlackTree, TreeConfig, Trie};

fn checked<K: Ord, V>() -> RedBlackTree<K, V> {
    RedBlackTree::new().with_config(TreeConfig::new().with_invariant_checks(true))
}

fn entries<K: Copy, V: Copy, O, KS, VS, CS>(tree: &RedBlackTree<K, V, O, KS, VS, CS>) -> Vec<(K, V)>
where
    O: flatshape::KeyOrder<K>,
    KS: IndexedStorage<K>,
    VS: IndexedStorage<V>,
    CS: IndexedStorage<Color>,
{
    tree.iter().map(|(&key, &value)| (key, value)).collect()
}

// ─── Scenarios ───────────────────────────────────────────────────────────────

#[test]
fn in_order_walk_is_sorted() {
    let mut tree = checked();
    for key in [5, 3, 8, 1, 4, 7, 9] {
        assert_eq!(tree.put(key, key * 10).unwrap(), None);
    }
    assert_eq!(
        entries(&tree),
        vec![(1, 10), (3, 30), (4, 40), (5, 50), (7, 70), (8, 80), (9, 90)]
    );
    assert!(!tree.contains_key(&6).unwrap());
    assert!(tree.contains_key(&8).unwrap());
}

#[test]
fn insertion_order_does_not_change_the_map() {
    let mut forward = checked();
    let mut reverse = checked();
    for key in [5, 3, 8, 1, 4, 7, 9] {
        forward.put(key, key * 10).unwrap();
    }
    for key in [9, 7, 4, 1, 8, 3, 5] {
        reverse.put(key, key * 10).unwrap();
    }
    assert_eq!(entries(&forward), entries(&reverse));
}

#[test]
fn ascending_inserts_respect_the_height_bound() {
    let n = 1000u32;
    let mut tree = RedBlackTree::new();
    for key in 0..n {
        tree.put(key, ()).unwrap();
    }
    tree.check_invariants().unwrap();
    let bound = 2.0 * f64::from(n + 1).log2();
    assert!(tree.height() as f64 <= bound, "height {} exceeds {bound}", tree.height());
    assert_eq!(tree.len(), n as usize);
}

#[test]
fn rejected_odd_value_changes_nothing() {
    let values = Checked::new(Dense::new(), |proposal| {
        if proposal.writes().any(|(_, value)| value.is_some_and(|value: &i32| value % 2 != 0)) {
            return Err(proposal.reject("odd value"));
        }
        Ok(())
    });
    let mut tree = RedBlackTree::with_storages(Dense::new(), values, Dense::new(), Natural)
        .with_config(TreeConfig::new().with_invariant_checks(true));
    for key in [4, 2, 6, 1] {
        tree.put(key, key * 2).unwrap();
    }
    let before = entries(&tree);

    let error = tree.put(3, 3).unwrap_err();
    assert!(matches!(error, Error::Rejected { ref reason, .. } if reason == "odd value"));
    let error = tree.put(2, 5).unwrap_err();
    assert!(matches!(error, Error::Rejected { .. }));

    assert_eq!(entries(&tree), before);
    assert_eq!(tree.len(), 4);
    tree.check_invariants().unwrap();
}

// ─── Properties ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum TreeOp {
    Put(i32, i32),
    Get(i32),
    ContainsKey(i32),
}

fn tree_op_strategy() -> impl Strategy<Value = TreeOp> {
    prop_oneof![
        4 => (-500i32..500, any::<i32>()).prop_map(|(k, v)| TreeOp::Put(k, v)),
        2 => (-500i32..500).prop_map(TreeOp::Get),
        1 => (-500i32..500).prop_map(TreeOp::ContainsKey),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Replays random operations on both a tree and a BTreeMap.
    #[test]
    fn tree_ops_match_btreemap(ops in proptest::collection::vec(tree_op_strategy(), 0..400)) {
        let mut tree = checked();
        let mut model = BTreeMap::new();
        for op in ops {
            match op {
                TreeOp::Put(key, value) => prop_assert_eq!(tree.put(key, value).unwrap(), model.insert(key, value)),
                TreeOp::Get(key) => prop_assert_eq!(tree.get(&key).unwrap(), model.get(&key)),
                TreeOp::ContainsKey(key) => {
                    prop_assert_eq!(tree.contains_key(&key).unwrap(), model.contains_key(&key));
                }
            }
            prop_assert_eq!(tree.len(), model.len());
        }
        prop_assert_eq!(tree.first_key_value(), model.first_key_value());
        prop_assert_eq!(tree.last_key_value(), model.last_key_value());
        prop_assert_eq!(entries(&tree), model.into_iter().collect::<Vec<_>>());
    }

    /// Every backend combination produces the same map.
    #[test]
    fn backends_agree(keys in proptest::collection::vec(any::<u16>(), 0..200)) {
        let mut dense = checked();
        let mut trie = RedBlackTree::with_storages(Trie::new(), Trie::new(), Trie::new(), Natural);
        let mut mixed = RedBlackTree::with_storages(Hashed::new(), Chunked::with_chunk_bits(3), Dense::new(), Natural);
        for key in keys {
            dense.put(key, u32::from(key) * 3).unwrap();
            trie.put(key, u32::from(key) * 3).unwrap();
            mixed.put(key, u32::from(key) * 3).unwrap();
        }
        trie.check_invariants().unwrap();
        mixed.check_invariants().unwrap();
        prop_assert_eq!(entries(&trie), entries(&dense));
        prop_assert_eq!(entries(&mixed), entries(&dense));
        prop_assert_eq!(trie.height(), dense.height());
    }
}
