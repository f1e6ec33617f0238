use core::cmp::Ordering;

/// The ordering a [`RedBlackTree`](super::RedBlackTree) uses to arrange its keys.
///
/// Every operation of one tree uses the same policy. `None` means the two keys cannot
/// be ordered, which fails the operation with [`Error::Incomparable`].
///
/// [`Error::Incomparable`]: crate::Error::Incomparable
pub trait KeyOrder<K: ?Sized> {
    fn compare(&self, a: &K, b: &K) -> Option<Ordering>;
}

/// Orders keys by their [`Ord`] implementation. Never fails.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct Natural;

impl<K: Ord + ?Sized> KeyOrder<K> for Natural {
    #[inline]
    fn compare(&self, a: &K, b: &K) -> Option<Ordering> {
        Some(a.cmp(b))
    }
}

/// Orders keys by their [`PartialOrd`] implementation; unordered pairs (such as a NaN
/// against anything) are incomparable.
///
/// # Examples
///
/// ```
/// use flatshape::red_black_tree::PartialOrder;
/// use flatshape::{Error, RedBlackTree};
///
/// let mut tree = RedBlackTree::with_order(PartialOrder);
/// tree.put(1.5, "a")?;
/// assert_eq!(tree.put(f64::NAN, "b"), Err(Error::Incomparable));
/// # Ok::<(), Error>(())
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct PartialOrder;

impl<K: PartialOrd + ?Sized> KeyOrder<K> for PartialOrder {
    #[inline]
    fn compare(&self, a: &K, b: &K) -> Option<Ordering> {
        a.partial_cmp(b)
    }
}

/// Orders keys with a caller-supplied total comparison.
///
/// # Examples
///
/// ```
/// use flatshape::RedBlackTree;
/// use flatshape::red_black_tree::Comparator;
///
/// // Longest first.
/// let mut tree = RedBlackTree::with_order(Comparator(|a: &&str, b: &&str| b.len().cmp(&a.len())));
/// for word in ["fig", "banana", "kiwi"] {
///     tree.put(word, ())?;
/// }
/// assert_eq!(tree.keys().copied().collect::<Vec<_>>(), ["banana", "kiwi", "fig"]);
/// # Ok::<(), flatshape::Error>(())
/// ```
#[derive(Clone, Copy, Debug)]
pub struct Comparator<F>(pub F);

impl<K, F> KeyOrder<K> for Comparator<F>
where
    F: Fn(&K, &K) -> Ordering,
{
    #[inline]
    fn compare(&self, a: &K, b: &K) -> Option<Ordering> {
        Some((self.0)(a, b))
    }
}
