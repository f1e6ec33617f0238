use alloc::sync::Arc;
use alloc::vec::Vec;
use core::iter::FusedIterator;

use super::{IndexedStorage, Rejected};
use crate::error::Result;

/// Default chunk size is `1 << DEFAULT_CHUNK_BITS` slots.
pub const DEFAULT_CHUNK_BITS: u32 = 6;
const MAX_CHUNK_BITS: u32 = 16;

#[derive(Clone, Debug)]
struct Chunk<T> {
    slots: Vec<Option<T>>,
    occupied: usize,
}

impl<T> Chunk<T> {
    fn new(size: usize) -> Self {
        let mut slots = Vec::with_capacity(size);
        slots.resize_with(size, || None);
        Self { slots, occupied: 0 }
    }
}

/// Chunked storage: the index space is cut into fixed-size blocks allocated on first
/// write.
///
/// Cloning is shallow: clones share their chunks, and a chunk is only copied when one
/// of the sharers writes to it (`Arc::make_mut`). Use
/// [`copy_nested`](IndexedStorage::copy_nested) for a duplicate that shares nothing.
///
/// # Examples
///
/// ```
/// use flatshape::{Chunked, IndexedStorage};
///
/// let original = Chunked::new().set(3, 'a').unwrap();
/// let copy = original.clone().set(3, 'b').unwrap();
/// assert_eq!(original.get(3), Some(&'a'));
/// assert_eq!(copy.get(3), Some(&'b'));
/// ```
#[derive(Debug)]
pub struct Chunked<T> {
    chunks: Vec<Option<Arc<Chunk<T>>>>,
    chunk_bits: u32,
    len: usize,
}

impl<T> Chunked<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            chunks: Vec::new(),
            chunk_bits: DEFAULT_CHUNK_BITS,
            len: 0,
        }
    }

    /// Creates an empty storage with chunks of `1 << chunk_bits` slots.
    ///
    /// # Panics
    ///
    /// Panics if `chunk_bits` is 0 or greater than 16.
    #[must_use]
    pub fn with_chunk_bits(chunk_bits: u32) -> Self {
        assert!(
            (1..=MAX_CHUNK_BITS).contains(&chunk_bits),
            "`Chunked::with_chunk_bits()` - chunk_bits must be in 1..={MAX_CHUNK_BITS}, got {chunk_bits}"
        );
        Self {
            chunks: Vec::new(),
            chunk_bits,
            len: 0,
        }
    }

    /// Number of slots per chunk.
    #[must_use]
    pub const fn chunk_size(&self) -> usize {
        1 << self.chunk_bits
    }

    /// Number of chunks currently allocated.
    #[must_use]
    pub fn allocated_chunks(&self) -> usize {
        self.chunks.iter().flatten().count()
    }

    #[inline]
    const fn split(&self, index: usize) -> (usize, usize) {
        (index >> self.chunk_bits, index & (self.chunk_size() - 1))
    }

    fn trim(&mut self) {
        while matches!(self.chunks.last(), Some(None)) {
            self.chunks.pop();
        }
    }
}

impl<T> Default for Chunked<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Chunked<T> {
    fn clone(&self) -> Self {
        Self {
            chunks: self.chunks.clone(),
            chunk_bits: self.chunk_bits,
            len: self.len,
        }
    }
}

impl<T: Clone> IndexedStorage<T> for Chunked<T> {
    type Indices<'a>
        = ChunkedIndices<'a, T>
    where
        Self: 'a;

    #[inline]
    fn get(&self, index: usize) -> Option<&T> {
        let (chunk, offset) = self.split(index);
        self.chunks.get(chunk)?.as_ref()?.slots[offset].as_ref()
    }

    fn replace(mut self, index: usize, value: T) -> core::result::Result<(Self, Option<T>), Rejected<Self>> {
        let (chunk, offset) = self.split(index);
        let size = self.chunk_size();
        if chunk >= self.chunks.len() {
            self.chunks.resize_with(chunk + 1, || None);
        }
        let block = Arc::make_mut(self.chunks[chunk].get_or_insert_with(|| Arc::new(Chunk::new(size))));
        let previous = block.slots[offset].replace(value);
        if previous.is_none() {
            block.occupied += 1;
            self.len += 1;
        }
        Ok((self, previous))
    }

    fn take(mut self, index: usize) -> core::result::Result<(Self, Option<T>), Rejected<Self>> {
        let (chunk, offset) = self.split(index);
        let Some(Some(shared)) = self.chunks.get_mut(chunk) else {
            return Ok((self, None));
        };
        if shared.slots[offset].is_none() {
            // Leave shared chunks alone when there is nothing to clear.
            return Ok((self, None));
        }
        let block = Arc::make_mut(shared);
        let previous = block.slots[offset].take();
        block.occupied -= 1;
        self.len -= 1;
        if block.occupied == 0 {
            self.chunks[chunk] = None;
            self.trim();
        }
        Ok((self, previous))
    }

    fn empty_copy(&self) -> Self {
        Self {
            chunks: Vec::new(),
            chunk_bits: self.chunk_bits,
            len: 0,
        }
    }

    fn non_null_indices(&self) -> ChunkedIndices<'_, T> {
        ChunkedIndices {
            storage: self,
            next: 0,
            remaining: self.len,
        }
    }

    fn max_idx_overapproximation(&self) -> usize {
        self.chunks.len().saturating_mul(self.chunk_size())
    }

    #[inline]
    fn len(&self) -> usize {
        self.len
    }

    fn copy_nested(&self) -> Self {
        Self {
            chunks: self
                .chunks
                .iter()
                .map(|chunk| chunk.as_ref().map(|chunk| Arc::new(Chunk::clone(chunk))))
                .collect(),
            chunk_bits: self.chunk_bits,
            len: self.len,
        }
    }

    fn bytes_used(&self) -> Result<usize> {
        let per_chunk = size_of::<Chunk<T>>() + self.chunk_size() * size_of::<Option<T>>();
        Ok(size_of::<Self>()
            + self.chunks.capacity() * size_of::<Option<Arc<Chunk<T>>>>()
            + self.allocated_chunks() * per_chunk)
    }
}

/// Ascending occupied indices of a [`Chunked`] storage.
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct ChunkedIndices<'a, T> {
    storage: &'a Chunked<T>,
    next: usize,
    remaining: usize,
}

impl<T> Iterator for ChunkedIndices<'_, T> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.remaining == 0 {
            return None;
        }
        let size = self.storage.chunk_size();
        loop {
            let (chunk, offset) = self.storage.split(self.next);
            match self.storage.chunks.get(chunk)? {
                // Skip unallocated chunks whole.
                None => self.next = (chunk + 1) * size,
                Some(block) => {
                    let found = block.slots[offset..].iter().position(Option::is_some);
                    match found {
                        Some(position) => {
                            let index = self.next + position;
                            self.next = index + 1;
                            self.remaining -= 1;
                            return Some(index);
                        }
                        None => self.next = (chunk + 1) * size,
                    }
                }
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<T> ExactSizeIterator for ChunkedIndices<'_, T> {}

impl<T> FusedIterator for ChunkedIndices<'_, T> {}
