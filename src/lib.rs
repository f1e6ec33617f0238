//! Shape-polymorphic containers over pluggable, sparse, integer-indexed storage.
//!
//! Every collection in this crate expresses its topology (a list, a complete binary
//! tree, a 2-D grid) as pure index arithmetic over an [`IndexedStorage`]. Backends only
//! decide how indices map to memory:
//!
//! - [`Dense`] - a `Vec` of optional slots, for near-contiguous indices
//! - [`Hashed`] - a hash map, for huge and scattered index spaces
//! - [`Trie`] - a 16-way radix trie, for semi-dense index sets
//! - [`Chunked`] - lazily allocated copy-on-write blocks
//! - [`Compressed`] - a 2-D compressed sparse layout selected by a [`Usage`] hint
//! - [`Checked`] - validates every proposed mutation before committing it
//!
//! [`RedBlackTree`] is an ordered map built entirely on this contract. Its nodes live at
//! complete-binary-tree indices (`2i + 1`, `2i + 2`), so a rotation is a relocation of
//! whole subtrees rather than a rewiring of pointers.
//!
//! # Example
//!
//! ```
//! use flatshape::RedBlackTree;
//!
//! let mut tree = RedBlackTree::new();
//! for key in [5, 3, 8, 1, 4, 7, 9] {
//!     tree.put(key, key * 10)?;
//! }
//!
//! assert_eq!(tree.get(&4)?, Some(&40));
//! assert!(!tree.contains_key(&6)?);
//! let keys: Vec<_> = tree.keys().copied().collect();
//! assert_eq!(keys, [1, 3, 4, 5, 7, 8, 9]);
//! # Ok::<(), flatshape::Error>(())
//! ```
//!
//! # Ownership of storage handles
//!
//! Mutating storage operations consume the storage and return the handle to use from
//! then on. In-place backends hand back the same value, copy-on-write backends may hand
//! back a different one, and a rejected mutation hands back the untouched storage inside
//! [`Rejected`]. Stale handles are therefore unrepresentable.

#![no_std]
#![forbid(unsafe_code)]
#![forbid(keyword_idents)]
#![forbid(non_ascii_idents)]
#![forbid(unreachable_pub)]
#![warn(clippy::all)]
#![warn(clippy::cargo)]
#![warn(clippy::pedantic)]
// Enable coverage attributes for nightly builds.
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

extern crate alloc;
#[cfg(test)]
extern crate std;

mod error;

pub mod red_black_tree;
pub mod sequence;
pub mod shape;
pub mod storage;

pub use error::{Error, Result};
pub use red_black_tree::{Color, KeyOrder, Natural, RedBlackTree, TreeConfig};
pub use sequence::Sequence;
pub use shape::{Cursor, Shape};
pub use storage::{
    Checked, Chunked, Compressed, DEFAULT_CHUNK_BITS, Dense, Hashed, IndexedStorage, Proposal, Rejected, Step, Trie,
    Usage,
};
