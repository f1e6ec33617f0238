//! Index arithmetic for the topologies a storage can be addressed by.
//!
//! A [`Shape`] maps structural navigation (parent, n-th child) onto plain integer
//! arithmetic. Shapes are data, so one storage backend serves unrelated topologies
//! without specialization.

use core::cmp::Ordering;

use smallvec::SmallVec;

/// Branch taken from a complete-binary-tree node to reach its left child.
pub const LEFT: usize = 0;
/// Branch taken from a complete-binary-tree node to reach its right child.
pub const RIGHT: usize = 1;

/// A declared topology over the non-negative integers.
///
/// Every function is deterministic and total: arithmetic that would overflow `usize`
/// yields `None` instead of wrapping.
///
/// # Examples
///
/// ```
/// use flatshape::Shape;
///
/// let tree = Shape::CompleteBinaryTree;
/// assert_eq!(tree.child(3, 0), Some(7));
/// assert_eq!(tree.child(3, 1), Some(8));
/// assert_eq!(tree.parent(8), Some(3));
/// assert_eq!(tree.parent(0), None);
///
/// let chain = Shape::LinearChain;
/// assert_eq!(chain.child(3, 0), Some(4));
/// assert_eq!(chain.parent(3), Some(2));
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Shape {
    /// `child(i, 0) = 2i + 1`, `child(i, 1) = 2i + 2`, `parent(i) = (i - 1) / 2`.
    CompleteBinaryTree,
    /// `child(i, 0) = i + 1`, `parent(i) = i - 1`.
    LinearChain,
}

impl Shape {
    /// Index of the root node.
    pub const ROOT: usize = 0;

    /// Number of children every node has.
    #[must_use]
    pub const fn arity(self) -> usize {
        match self {
            Shape::CompleteBinaryTree => 2,
            Shape::LinearChain => 1,
        }
    }

    /// Returns the index of child `branch` of `index`, or `None` if the branch does not
    /// exist for this shape or the index would overflow.
    #[must_use]
    pub const fn child(self, index: usize, branch: usize) -> Option<usize> {
        if branch >= self.arity() {
            return None;
        }
        match index.checked_mul(self.arity()) {
            Some(base) => base.checked_add(1 + branch),
            None => None,
        }
    }

    /// Returns the parent of `index`; the root has none.
    #[must_use]
    pub const fn parent(self, index: usize) -> Option<usize> {
        if index == Self::ROOT {
            None
        } else {
            Some((index - 1) / self.arity())
        }
    }

    /// Returns which branch of its parent `index` hangs off; the root has none.
    #[must_use]
    pub const fn branch_of(self, index: usize) -> Option<usize> {
        if index == Self::ROOT {
            None
        } else {
            Some((index - 1) % self.arity())
        }
    }

    /// Number of steps from the root to `index`.
    #[must_use]
    pub const fn depth(self, index: usize) -> usize {
        match self {
            Shape::CompleteBinaryTree => match index.checked_add(1) {
                Some(n) => n.ilog2() as usize,
                None => usize::BITS as usize,
            },
            Shape::LinearChain => index,
        }
    }

    /// Returns true if `index` lies in the subtree rooted at `root` (including `root`).
    #[must_use]
    pub fn is_successor(self, root: usize, index: usize) -> bool {
        match self {
            Shape::LinearChain => index >= root,
            Shape::CompleteBinaryTree => {
                let mut current = index;
                while current > root {
                    current = (current - 1) / 2;
                }
                current == root
            }
        }
    }

    /// Orders two indices as a pre-order walk from the root visits them: an ancestor
    /// before its descendants, and branch 0 subtrees before branch 1 subtrees.
    #[must_use]
    pub fn pre_order_cmp(self, a: usize, b: usize) -> Ordering {
        match self {
            Shape::LinearChain => a.cmp(&b),
            Shape::CompleteBinaryTree => {
                // The bits of `i + 1` after its leading one spell the path from the root.
                let (x, y) = (a as u128 + 1, b as u128 + 1);
                let (x_bits, y_bits) = (u128::BITS - x.leading_zeros(), u128::BITS - y.leading_zeros());
                let width = x_bits.max(y_bits);
                (x << (width - x_bits))
                    .cmp(&(y << (width - y_bits)))
                    .then(x_bits.cmp(&y_bits))
            }
        }
    }

    /// Maps `index`, a member of the subtree rooted at `source`, to the index at the
    /// same relative position in the subtree rooted at `dest`.
    ///
    /// Returns `None` if `index` is not in the subtree at `source` or if the
    /// destination index overflows.
    #[must_use]
    pub fn relocate(self, index: usize, source: usize, dest: usize) -> Option<usize> {
        if let Shape::LinearChain = self {
            let offset = index.checked_sub(source)?;
            return dest.checked_add(offset);
        }

        // Record the branches from `source` down to `index`, then replay them from `dest`.
        let mut path: SmallVec<[usize; 64]> = SmallVec::new();
        let mut current = index;
        while current > source {
            path.push(self.branch_of(current)?);
            current = self.parent(current)?;
        }
        if current != source {
            return None;
        }

        let mut target = dest;
        for &branch in path.iter().rev() {
            target = self.child(target, branch)?;
        }
        Some(target)
    }
}

/// A position within a [`Shape`] that can be stepped along its edges.
///
/// `Cursor` is the ergonomic face of [`Shape`] arithmetic: it pairs a shape with a
/// current index and exposes `left`/`right`/`successor` steps. Steps that would overflow
/// return `None`.
///
/// # Examples
///
/// ```
/// use flatshape::{Cursor, Shape};
///
/// let cursor = Cursor::new(Shape::CompleteBinaryTree);
/// let grandchild = cursor.left().and_then(|c| c.right()).unwrap();
/// assert_eq!(grandchild.index(), 4);
/// assert_eq!(grandchild.up().map(|c| c.index()), Some(1));
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct Cursor {
    shape: Shape,
    index: usize,
}

impl Cursor {
    /// Creates a cursor at the root of `shape`.
    #[must_use]
    pub const fn new(shape: Shape) -> Self {
        Self::at(shape, Shape::ROOT)
    }

    /// Creates a cursor at `index`.
    #[must_use]
    pub const fn at(shape: Shape, index: usize) -> Self {
        Self { shape, index }
    }

    /// The index the cursor currently points at.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.index
    }

    #[must_use]
    pub const fn shape(self) -> Shape {
        self.shape
    }

    /// Steps to child `branch`.
    #[must_use]
    pub const fn step(self, branch: usize) -> Option<Self> {
        match self.shape.child(self.index, branch) {
            Some(index) => Some(Self::at(self.shape, index)),
            None => None,
        }
    }

    /// Steps to the left child (complete binary tree) or successor (linear chain).
    #[must_use]
    pub const fn left(self) -> Option<Self> {
        self.step(LEFT)
    }

    /// Steps to the right child. Always `None` for a linear chain.
    #[must_use]
    pub const fn right(self) -> Option<Self> {
        self.step(RIGHT)
    }

    /// Steps to the successor of a linear chain.
    #[must_use]
    pub const fn successor(self) -> Option<Self> {
        self.step(0)
    }

    /// Steps `n` times along branch 0.
    #[must_use]
    pub fn successor_nth(self, n: usize) -> Option<Self> {
        (0..n).try_fold(self, |cursor, _| cursor.successor())
    }

    /// Steps to the parent.
    #[must_use]
    pub const fn up(self) -> Option<Self> {
        match self.shape.parent(self.index) {
            Some(index) => Some(Self::at(self.shape, index)),
            None => None,
        }
    }
}
