//! An ordered map whose nodes live at complete-binary-tree indices of three parallel
//! storages.
//!
//! The node at index `i` keeps its key, value and colour at index `i` of the key,
//! value and colour storages; its children sit at `2i + 1` and `2i + 2`. There are no
//! links to maintain: a rotation relocates whole subtrees with
//! [`IndexedStorage::move_subtree`].

use core::cmp::Ordering;
use core::fmt;
use core::marker::PhantomData;

use smallvec::SmallVec;

use crate::error::{Error, Result};
use crate::shape::{LEFT, RIGHT, Shape};
use crate::storage::{Dense, IndexedStorage, rebind, rebind_step};

mod check;
mod config;
mod dot;
mod iter;
mod order;
mod rotate;

pub use config::TreeConfig;
pub use iter::{Iter, Keys, Values};
pub use order::{Comparator, KeyOrder, Natural, PartialOrder};

const TREE: Shape = Shape::CompleteBinaryTree;

/// Colour of an occupied slot. Absent slots count as black.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum Color {
    Red,
    #[default]
    Black,
}

/// A red-black tree over pluggable index-addressed storages.
///
/// Keys are arranged by the tree's [`KeyOrder`] (natural [`Ord`] by default). Keys,
/// values and colours each live in their own [`IndexedStorage`], so any backend of
/// this crate (or a validating [`Checked`](crate::Checked) wrapper) can hold them.
///
/// Entries can be inserted and overwritten but not removed.
///
/// # Examples
///
/// ```
/// use flatshape::RedBlackTree;
///
/// let mut tree = RedBlackTree::new();
/// assert_eq!(tree.put("b", 2)?, None);
/// assert_eq!(tree.put("a", 1)?, None);
/// assert_eq!(tree.put("b", 20)?, Some(2));
///
/// assert_eq!(tree.get(&"b")?, Some(&20));
/// assert_eq!(tree.len(), 2);
/// assert_eq!(tree.iter().collect::<Vec<_>>(), [(&"a", &1), (&"b", &20)]);
/// # Ok::<(), flatshape::Error>(())
/// ```
///
/// Any storage backend can be chosen per column:
///
/// ```
/// use flatshape::{Color, Dense, Hashed, RedBlackTree, Natural, Trie};
///
/// let mut tree = RedBlackTree::with_storages(Trie::new(), Hashed::new(), Dense::<Color>::new(), Natural);
/// for key in 0..100u32 {
///     tree.put(key, key * key)?;
/// }
/// assert_eq!(tree.get(&9)?, Some(&81));
/// tree.check_invariants()?;
/// # Ok::<(), flatshape::Error>(())
/// ```
pub struct RedBlackTree<K, V, O = Natural, KS = Dense<K>, VS = Dense<V>, CS = Dense<Color>> {
    keys: KS,
    values: VS,
    colors: CS,
    len: usize,
    order: O,
    config: TreeConfig,
    _marker: PhantomData<(K, V)>,
}

/// A change made while rebalancing, kept so a rejected `put` can be undone.
enum Undo {
    Paint { index: usize, previous: Option<Color> },
    Rotate(rotate::Plan),
}

type Journal = SmallVec<[Undo; 4]>;

/// Where a descent for a key ended.
enum Search {
    Found(usize),
    Vacant(usize),
}

impl<K: Ord, V> RedBlackTree<K, V> {
    /// Makes a new, empty tree ordered by `K`'s [`Ord`] and held in [`Dense`] storages.
    ///
    /// # Examples
    ///
    /// ```
    /// use flatshape::RedBlackTree;
    ///
    /// let tree: RedBlackTree<i32, &str> = RedBlackTree::new();
    /// assert!(tree.is_empty());
    /// ```
    #[must_use]
    pub fn new() -> Self {
        Self::with_order(Natural)
    }
}

impl<K, V, O: KeyOrder<K>> RedBlackTree<K, V, O> {
    /// Makes a new, empty tree ordered by `order`.
    #[must_use]
    pub fn with_order(order: O) -> Self {
        Self::with_storages(Dense::new(), Dense::new(), Dense::new(), order)
    }
}

impl<K, V, O, KS, VS, CS> RedBlackTree<K, V, O, KS, VS, CS>
where
    O: KeyOrder<K>,
    KS: IndexedStorage<K>,
    VS: IndexedStorage<V>,
    CS: IndexedStorage<Color>,
{
    /// Makes a new, empty tree over the given storages.
    ///
    /// The storages serve as prototypes: the tree starts from an
    /// [`empty_copy`](IndexedStorage::empty_copy) of each, so their configuration is
    /// kept and their contents are not.
    #[must_use]
    pub fn with_storages(keys: KS, values: VS, colors: CS, order: O) -> Self {
        Self {
            keys: keys.empty_copy(),
            values: values.empty_copy(),
            colors: colors.empty_copy(),
            len: 0,
            order,
            config: TreeConfig::new(),
            _marker: PhantomData,
        }
    }

    /// Replaces the tree's configuration.
    #[must_use]
    pub const fn with_config(mut self, config: TreeConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub const fn config(&self) -> TreeConfig {
        self.config
    }

    /// Returns the number of entries in the tree.
    ///
    /// # Complexity
    ///
    /// O(1)
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns a reference to the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Incomparable`] if `key` cannot be ordered against a key on the
    /// search path.
    ///
    /// # Examples
    ///
    /// ```
    /// use flatshape::RedBlackTree;
    ///
    /// let mut tree = RedBlackTree::new();
    /// tree.put(1, "a")?;
    /// assert_eq!(tree.get(&1)?, Some(&"a"));
    /// assert_eq!(tree.get(&2)?, None);
    /// # Ok::<(), flatshape::Error>(())
    /// ```
    ///
    /// # Complexity
    ///
    /// O(log n) comparisons.
    pub fn get(&self, key: &K) -> Result<Option<&V>> {
        match self.search(key)? {
            Search::Found(index) => Ok(self.values.get(index)),
            Search::Vacant(_) => Ok(None),
        }
    }

    /// Returns `true` if the tree holds an entry for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Incomparable`] as [`get`](Self::get) does.
    pub fn contains_key(&self, key: &K) -> Result<bool> {
        Ok(matches!(self.search(key)?, Search::Found(_)))
    }

    /// Returns `true` if any entry holds `value`.
    ///
    /// # Complexity
    ///
    /// O(n): a scan of the value storage.
    #[must_use]
    pub fn contains_value(&self, value: &V) -> bool
    where
        V: PartialEq,
    {
        self.values.find_first(value, None).is_some()
    }

    /// Inserts `value` under `key`, returning the value previously stored there.
    ///
    /// An existing entry keeps its original key; only the value is replaced.
    ///
    /// # Errors
    ///
    /// * [`Error::Incomparable`] if `key` cannot be ordered, checked even when the
    ///   tree is empty. The tree is unchanged.
    /// * The error of a storage that rejects one of the writes, while placing the new
    ///   entry or while rebalancing. The tree is unchanged.
    /// * [`Error::Inconsistent`] if undoing a rejected write is itself rejected, or if
    ///   invariant checks are enabled and fail.
    ///
    /// # Examples
    ///
    /// ```
    /// use flatshape::RedBlackTree;
    ///
    /// let mut tree = RedBlackTree::new();
    /// assert_eq!(tree.put(37, "a")?, None);
    /// assert_eq!(tree.put(37, "b")?, Some("a"));
    /// assert_eq!(tree.get(&37)?, Some(&"b"));
    /// # Ok::<(), flatshape::Error>(())
    /// ```
    ///
    /// # Complexity
    ///
    /// O(log n) comparisons. A rotation relocates the subtrees around its pivot, so
    /// rebalancing costs time proportional to the size of the rotated subtrees.
    pub fn put(&mut self, key: K, value: V) -> Result<Option<V>> {
        if self.len == 0 {
            self.compare(&key, &key)?;
            self.write_node(Shape::ROOT, key, value, Color::Black)?;
            self.len = 1;
            self.verify()?;
            return Ok(None);
        }

        match self.search(&key)? {
            Search::Found(index) => rebind(&mut self.values, |values| values.replace(index, value)),
            Search::Vacant(index) => {
                self.write_node(index, key, value, Color::Red)?;
                self.len += 1;
                let mut journal = Journal::new();
                if let Err(error) = self.fix_up(index, &mut journal) {
                    return Err(match self.roll_back(index, journal) {
                        Ok(()) => error,
                        Err(undo) => error.rollback_failed(undo),
                    });
                }
                self.verify()?;
                Ok(None)
            }
        }
    }

    /// Deletion is not supported.
    ///
    /// # Errors
    ///
    /// Always returns [`Error::Unsupported`].
    pub fn remove(&mut self, _key: &K) -> Result<Option<V>> {
        Err(Error::Unsupported("remove"))
    }

    /// Returns the entry with the smallest key.
    ///
    /// # Complexity
    ///
    /// O(log n): a walk down the left spine.
    #[must_use]
    pub fn first_key_value(&self) -> Option<(&K, &V)> {
        self.spine_end(LEFT)
    }

    /// Returns the entry with the largest key.
    ///
    /// # Complexity
    ///
    /// O(log n): a walk down the right spine.
    #[must_use]
    pub fn last_key_value(&self) -> Option<(&K, &V)> {
        self.spine_end(RIGHT)
    }

    /// Number of levels of the tree; 0 when empty.
    ///
    /// A red-black tree of `n` entries is never taller than `2 * log2(n + 1)`.
    #[must_use]
    pub fn height(&self) -> usize {
        self.keys.non_null_indices().map(|index| TREE.depth(index) + 1).max().unwrap_or(0)
    }

    /// Gets an iterator over the entries of the tree, sorted by key.
    pub fn iter(&self) -> Iter<'_, K, V, KS, VS> {
        Iter::new(&self.keys, &self.values, self.len)
    }

    /// Gets an iterator over the keys of the tree, in sorted order.
    pub fn keys(&self) -> Keys<'_, K, V, KS, VS> {
        Keys { inner: self.iter() }
    }

    /// Gets an iterator over the values of the tree, in order by key.
    pub fn values(&self) -> Values<'_, K, V, KS, VS> {
        Values { inner: self.iter() }
    }

    fn compare(&self, a: &K, b: &K) -> Result<Ordering> {
        self.order.compare(a, b).ok_or(Error::Incomparable)
    }

    fn search(&self, key: &K) -> Result<Search> {
        let mut index = Shape::ROOT;
        while let Some(current) = self.keys.get(index) {
            let branch = match self.compare(key, current)? {
                Ordering::Equal => return Ok(Search::Found(index)),
                Ordering::Less => LEFT,
                Ordering::Greater => RIGHT,
            };
            index = child(index, branch)?;
        }
        Ok(Search::Vacant(index))
    }

    fn spine_end(&self, branch: usize) -> Option<(&K, &V)> {
        let mut index = Shape::ROOT;
        let mut found = None;
        while let Some(key) = self.keys.get(index) {
            found = Some((key, self.values.get(index)?));
            index = TREE.child(index, branch)?;
        }
        found
    }

    fn is_red(&self, index: usize) -> bool {
        self.colors.get(index) == Some(&Color::Red)
    }

    fn paint(&mut self, index: usize, color: Color, journal: &mut Journal) -> Result<()> {
        let previous = self.colors.get(index).copied();
        if previous == Some(color) {
            return Ok(());
        }
        rebind_step(&mut self.colors, |colors| colors.set(index, color))?;
        journal.push(Undo::Paint { index, previous });
        Ok(())
    }

    /// Writes a node into an absent slot, value first. Rolls back on a rejection.
    fn write_node(&mut self, index: usize, key: K, value: V, color: Color) -> Result<()> {
        rebind_step(&mut self.values, |values| values.set(index, value))?;
        if let Err(error) = rebind_step(&mut self.keys, |keys| keys.set(index, key)) {
            return Err(match rebind_step(&mut self.values, |values| values.remove(index)) {
                Ok(()) => error,
                Err(undo) => error.rollback_failed(undo),
            });
        }
        if let Err(error) = rebind_step(&mut self.colors, |colors| colors.set(index, color)) {
            let restored = rebind_step(&mut self.keys, |keys| keys.remove(index))
                .and_then(|()| rebind_step(&mut self.values, |values| values.remove(index)));
            return Err(match restored {
                Ok(()) => error,
                Err(undo) => error.rollback_failed(undo),
            });
        }
        Ok(())
    }

    /// Undoes the rebalancing recorded in `journal`, newest first, then removes the
    /// node that was written at `index`.
    fn roll_back(&mut self, index: usize, journal: Journal) -> Result<()> {
        for change in journal.into_iter().rev() {
            match change {
                Undo::Paint {
                    index,
                    previous: Some(color),
                } => rebind_step(&mut self.colors, |colors| colors.set(index, color))?,
                Undo::Paint { index, previous: None } => rebind_step(&mut self.colors, |colors| colors.remove(index))?,
                Undo::Rotate(plan) => self.unrotate(&plan)?,
            }
        }
        rebind_step(&mut self.colors, |colors| colors.remove(index))?;
        rebind_step(&mut self.keys, |keys| keys.remove(index))?;
        rebind_step(&mut self.values, |values| values.remove(index))?;
        self.len -= 1;
        Ok(())
    }

    /// Restores the colouring after a red node was placed at `node`.
    fn fix_up(&mut self, mut node: usize, journal: &mut Journal) -> Result<()> {
        while let Some(parent) = TREE.parent(node)
            && self.is_red(parent)
        {
            let grandparent = TREE
                .parent(parent)
                .ok_or_else(|| Error::Inconsistent("red node at the root".into()))?;
            let side = branch_of(parent);
            let uncle = child(grandparent, 1 - side)?;

            if self.is_red(uncle) {
                self.paint(parent, Color::Black, journal)?;
                self.paint(uncle, Color::Black, journal)?;
                self.paint(grandparent, Color::Red, journal)?;
                node = grandparent;
                continue;
            }

            if branch_of(node) != side {
                // Inner grandchild: turn it into the outer one first.
                if side == LEFT {
                    self.rotate_left(parent, journal)?;
                } else {
                    self.rotate_right(parent, journal)?;
                }
            }
            self.paint(parent, Color::Black, journal)?;
            self.paint(grandparent, Color::Red, journal)?;
            if side == LEFT {
                self.rotate_right(grandparent, journal)?;
            } else {
                self.rotate_left(grandparent, journal)?;
            }
            break;
        }
        self.paint(Shape::ROOT, Color::Black, journal)
    }

    fn verify(&self) -> Result<()> {
        if self.config.invariant_checks() {
            self.check_invariants()?;
        }
        Ok(())
    }
}

#[inline]
fn child(index: usize, branch: usize) -> Result<usize> {
    TREE.child(index, branch).ok_or(Error::OutOfBounds {
        index,
        bound: usize::MAX,
    })
}

#[inline]
fn branch_of(index: usize) -> usize {
    TREE.branch_of(index).unwrap_or(LEFT)
}

impl<K, V, O, KS, VS, CS> Clone for RedBlackTree<K, V, O, KS, VS, CS>
where
    O: Clone,
    KS: Clone,
    VS: Clone,
    CS: Clone,
{
    fn clone(&self) -> Self {
        Self {
            keys: self.keys.clone(),
            values: self.values.clone(),
            colors: self.colors.clone(),
            len: self.len,
            order: self.order.clone(),
            config: self.config,
            _marker: PhantomData,
        }
    }
}

impl<K: Ord, V> Default for RedBlackTree<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, O, KS, VS, CS> fmt::Debug for RedBlackTree<K, V, O, KS, VS, CS>
where
    K: fmt::Debug,
    V: fmt::Debug,
    O: KeyOrder<K>,
    KS: IndexedStorage<K>,
    VS: IndexedStorage<V>,
    CS: IndexedStorage<Color>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<'a, K, V, O, KS, VS, CS> IntoIterator for &'a RedBlackTree<K, V, O, KS, VS, CS>
where
    O: KeyOrder<K>,
    KS: IndexedStorage<K>,
    VS: IndexedStorage<V>,
    CS: IndexedStorage<Color>,
{
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V, KS, VS>;

    fn into_iter(self) -> Iter<'a, K, V, KS, VS> {
        self.iter()
    }
}
