/// Behavioural switches of a [`RedBlackTree`](super::RedBlackTree).
///
/// # Examples
///
/// ```
/// use flatshape::{RedBlackTree, TreeConfig};
///
/// let config = TreeConfig::new().with_invariant_checks(true);
/// let mut tree = RedBlackTree::new().with_config(config);
/// tree.put(1, 'a')?;
/// assert!(tree.config().invariant_checks());
/// # Ok::<(), flatshape::Error>(())
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct TreeConfig {
    invariant_checks: bool,
}

impl TreeConfig {
    /// The default configuration. Invariant checks are on only when the crate is built
    /// with the `invariant-checks` feature.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            invariant_checks: cfg!(feature = "invariant-checks"),
        }
    }

    /// Verify every red-black invariant after each `put`.
    ///
    /// Turns each insertion into an O(n) operation; meant for tests and debugging.
    #[must_use]
    pub const fn with_invariant_checks(mut self, enabled: bool) -> Self {
        self.invariant_checks = enabled;
        self
    }

    #[must_use]
    pub const fn invariant_checks(self) -> bool {
        self.invariant_checks
    }
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self::new()
    }
}
