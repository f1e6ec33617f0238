use alloc::collections::{BTreeMap, btree_map};
use alloc::vec::Vec;
use core::iter::FusedIterator;
use core::slice;

use smallvec::SmallVec;

use super::{IndexedStorage, Rejected, Step, SubtreeMove, check_range, shift_range};
use crate::error::{Error, Result};
use crate::shape::Shape;

/// How a [`Compressed`] storage expects to be used, choosing its representation.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum Usage {
    /// Compressed sparse rows: three flat arrays, the smallest footprint. Writes that
    /// add or clear an entry shift the arrays.
    #[default]
    Size,
    /// One ordered map per row: cheap random writes.
    Insert,
    /// One sorted inline vector per row: cheap lookups and row scans.
    Read,
}

#[derive(Clone, Debug)]
enum Repr<T> {
    Csr {
        // `row_ptr[r]..row_ptr[r + 1]` is the slice of row `r` in `col_idx`/`values`.
        row_ptr: Vec<usize>,
        col_idx: Vec<usize>,
        values: Vec<T>,
    },
    Maps(Vec<BTreeMap<usize, T>>),
    Sorted(Vec<SmallVec<[(usize, T); 4]>>),
}

/// Compressed sparse 2-D storage of a `rows x cols` grid.
///
/// As an [`IndexedStorage`], cell `(row, col)` lives at linear index
/// `row * cols + col`; writes outside the grid are rejected with
/// [`Error::OutOfBounds`].
///
/// # Examples
///
/// ```
/// use flatshape::{Compressed, IndexedStorage, Usage};
///
/// let grid = Compressed::new(3, 4, Usage::Insert)
///     .set_at(1, 2, 7.5)
///     .unwrap()
///     .set_at(2, 0, 1.0)
///     .unwrap();
/// assert_eq!(grid.get_at(1, 2), Some(&7.5));
/// assert_eq!(grid.get(6), Some(&7.5));
///
/// let grid = grid.change(Usage::Size);
/// let row: Vec<_> = grid.row(2).collect();
/// assert_eq!(row, [(0, &1.0)]);
/// assert!(grid.set_at(3, 0, 0.0).is_err());
/// ```
#[derive(Clone, Debug)]
pub struct Compressed<T> {
    rows: usize,
    cols: usize,
    repr: Repr<T>,
    len: usize,
}

impl<T> Compressed<T> {
    /// Creates an empty `rows x cols` grid.
    ///
    /// # Panics
    ///
    /// Panics if `rows * cols` overflows `usize`.
    #[must_use]
    pub fn new(rows: usize, cols: usize, usage: Usage) -> Self {
        Self::with_capacity(rows, cols, usage, 0)
    }

    /// Creates an empty grid sized for about `expected_nnz` entries.
    ///
    /// # Panics
    ///
    /// Panics if `rows * cols` overflows `usize`.
    #[must_use]
    pub fn with_capacity(rows: usize, cols: usize, usage: Usage, expected_nnz: usize) -> Self {
        assert!(
            rows.checked_mul(cols).is_some(),
            "`Compressed::new()` - a {rows} x {cols} grid overflows the index space"
        );
        let repr = match usage {
            Usage::Size => {
                let mut row_ptr = Vec::with_capacity(rows + 1);
                row_ptr.resize(rows + 1, 0);
                Repr::Csr {
                    row_ptr,
                    col_idx: Vec::with_capacity(expected_nnz),
                    values: Vec::with_capacity(expected_nnz),
                }
            }
            Usage::Insert => Repr::Maps((0..rows).map(|_| BTreeMap::new()).collect()),
            Usage::Read => Repr::Sorted((0..rows).map(|_| SmallVec::new()).collect()),
        };
        Self {
            rows,
            cols,
            repr,
            len: 0,
        }
    }

    /// `(rows, cols)`.
    #[must_use]
    pub const fn dims(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    #[must_use]
    pub const fn usage(&self) -> Usage {
        match self.repr {
            Repr::Csr { .. } => Usage::Size,
            Repr::Maps(_) => Usage::Insert,
            Repr::Sorted(_) => Usage::Read,
        }
    }

    fn check_cell(&self, row: usize, col: usize) -> Result<()> {
        if row >= self.rows || col >= self.cols {
            return Err(Error::OutOfBounds {
                index: row.saturating_mul(self.cols).saturating_add(col),
                bound: self.rows * self.cols,
            });
        }
        Ok(())
    }

    const fn outside(&self, index: usize) -> Error {
        Error::OutOfBounds {
            index,
            bound: self.rows * self.cols,
        }
    }

    const fn cell_of(&self, index: usize) -> Option<(usize, usize)> {
        if self.cols == 0 {
            return None;
        }
        let (row, col) = (index / self.cols, index % self.cols);
        if row < self.rows { Some((row, col)) } else { None }
    }

    /// Returns the value at `(row, col)`; `None` outside the grid.
    #[must_use]
    pub fn get_at(&self, row: usize, col: usize) -> Option<&T> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        match &self.repr {
            Repr::Csr {
                row_ptr,
                col_idx,
                values,
            } => {
                let start = row_ptr[row];
                let position = col_idx[start..row_ptr[row + 1]].binary_search(&col).ok()?;
                Some(&values[start + position])
            }
            Repr::Maps(rows) => rows[row].get(&col),
            Repr::Sorted(rows) => {
                let entries = &rows[row];
                let position = entries.binary_search_by_key(&col, |&(c, _)| c).ok()?;
                Some(&entries[position].1)
            }
        }
    }

    /// Writes `value` at `(row, col)`.
    pub fn set_at(self, row: usize, col: usize, value: T) -> Step<Self> {
        self.replace_at(row, col, value).map(|(storage, _)| storage)
    }

    /// Writes `value` at `(row, col)`, returning the storage and the previous value.
    pub fn replace_at(
        mut self,
        row: usize,
        col: usize,
        value: T,
    ) -> core::result::Result<(Self, Option<T>), Rejected<Self>> {
        if let Err(error) = self.check_cell(row, col) {
            return Err(Rejected::new(self, error));
        }
        let previous = match &mut self.repr {
            Repr::Csr {
                row_ptr,
                col_idx,
                values,
            } => {
                let start = row_ptr[row];
                match col_idx[start..row_ptr[row + 1]].binary_search(&col) {
                    Ok(position) => Some(core::mem::replace(&mut values[start + position], value)),
                    Err(position) => {
                        col_idx.insert(start + position, col);
                        values.insert(start + position, value);
                        for end in &mut row_ptr[row + 1..] {
                            *end += 1;
                        }
                        None
                    }
                }
            }
            Repr::Maps(rows) => rows[row].insert(col, value),
            Repr::Sorted(rows) => {
                let entries = &mut rows[row];
                match entries.binary_search_by_key(&col, |&(c, _)| c) {
                    Ok(position) => Some(core::mem::replace(&mut entries[position].1, value)),
                    Err(position) => {
                        entries.insert(position, (col, value));
                        None
                    }
                }
            }
        };
        if previous.is_none() {
            self.len += 1;
        }
        Ok((self, previous))
    }

    /// Clears `(row, col)`, returning the storage and the value it held.
    pub fn take_at(mut self, row: usize, col: usize) -> core::result::Result<(Self, Option<T>), Rejected<Self>> {
        if row >= self.rows || col >= self.cols {
            return Ok((self, None));
        }
        let taken = match &mut self.repr {
            Repr::Csr {
                row_ptr,
                col_idx,
                values,
            } => {
                let start = row_ptr[row];
                match col_idx[start..row_ptr[row + 1]].binary_search(&col) {
                    Ok(position) => {
                        col_idx.remove(start + position);
                        for end in &mut row_ptr[row + 1..] {
                            *end -= 1;
                        }
                        Some(values.remove(start + position))
                    }
                    Err(_) => None,
                }
            }
            Repr::Maps(rows) => rows[row].remove(&col),
            Repr::Sorted(rows) => {
                let entries = &mut rows[row];
                entries
                    .binary_search_by_key(&col, |&(c, _)| c)
                    .ok()
                    .map(|position| entries.remove(position).1)
            }
        };
        if taken.is_some() {
            self.len -= 1;
        }
        Ok((self, taken))
    }

    /// The occupied cells of `row` as `(col, value)`, ascending by column. Empty for a
    /// row outside the grid.
    pub fn row(&self, row: usize) -> Row<'_, T> {
        let inner = if row >= self.rows {
            RowInner::Pairs(Default::default())
        } else {
            match &self.repr {
                Repr::Csr {
                    row_ptr,
                    col_idx,
                    values,
                } => {
                    let range = row_ptr[row]..row_ptr[row + 1];
                    RowInner::Slices(col_idx[range.clone()].iter(), values[range].iter())
                }
                Repr::Maps(rows) => RowInner::Map(rows[row].iter()),
                Repr::Sorted(rows) => RowInner::Pairs(rows[row].iter()),
            }
        };
        Row { inner }
    }

    /// The occupied cells of `col` as `(row, value)`, ascending by row.
    pub fn column(&self, col: usize) -> impl Iterator<Item = (usize, &T)> + '_ {
        (0..self.rows).filter_map(move |row| self.get_at(row, col).map(|value| (row, value)))
    }

    /// Every occupied cell as `(row, col, value)` in row-major order.
    pub fn entries(&self) -> Entries<'_, T> {
        Entries {
            storage: self,
            row: 0,
            current: self.row(0),
            remaining: self.len,
        }
    }

    /// Visits the occupied cells of `row`, ascending by column.
    pub fn for_each_col_non_null(&self, row: usize, mut visitor: impl FnMut(usize, &T)) {
        for (col, value) in self.row(row) {
            visitor(col, value);
        }
    }

    /// Visits the occupied cells of `col`, ascending by row.
    pub fn for_each_row_non_null(&self, col: usize, mut visitor: impl FnMut(usize, &T)) {
        for (row, value) in self.column(col) {
            visitor(row, value);
        }
    }

    /// Streams the value pairs where row `row` of `self` and column `col` of `other`
    /// are both occupied, ascending. The building block of a sparse dot product.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DimensionMismatch`] unless `self` has as many columns as
    /// `other` has rows, and [`Error::OutOfBounds`] if `row` or `col` is outside its
    /// grid.
    pub fn join_row_col<U>(
        &self,
        row: usize,
        other: &Compressed<U>,
        col: usize,
        mut consumer: impl FnMut(&T, &U),
    ) -> Result<()> {
        if self.cols != other.rows {
            return Err(Error::DimensionMismatch {
                expected: (self.cols, other.cols),
                actual: other.dims(),
            });
        }
        if row >= self.rows {
            return Err(Error::OutOfBounds {
                index: row,
                bound: self.rows,
            });
        }
        if col >= other.cols {
            return Err(Error::OutOfBounds {
                index: col,
                bound: other.cols,
            });
        }
        for (k, left) in self.row(row) {
            if let Some(right) = other.get_at(k, col) {
                consumer(left, right);
            }
        }
        Ok(())
    }

    /// Converts to the representation for `usage`, keeping every entry.
    #[must_use]
    pub fn change(self, usage: Usage) -> Self {
        if usage == self.usage() {
            return self;
        }
        tracing::debug!(from = ?self.usage(), to = ?usage, nnz = self.len, "changing compressed representation");
        let (rows, cols, len) = (self.rows, self.cols, self.len);
        let mut target = Self::with_capacity(rows, cols, usage, len);
        match &mut target.repr {
            Repr::Csr {
                row_ptr,
                col_idx,
                values,
            } => {
                for (row, col, value) in self.into_entries() {
                    col_idx.push(col);
                    values.push(value);
                    row_ptr[row + 1] += 1;
                }
                for row in 0..rows {
                    row_ptr[row + 1] += row_ptr[row];
                }
            }
            Repr::Maps(maps) => {
                for (row, col, value) in self.into_entries() {
                    maps[row].insert(col, value);
                }
            }
            Repr::Sorted(sorted) => {
                // Entries arrive in row-major order, so pushing keeps every row sorted.
                for (row, col, value) in self.into_entries() {
                    sorted[row].push((col, value));
                }
            }
        }
        target.len = len;
        target
    }

    fn into_entries(self) -> Vec<(usize, usize, T)> {
        let mut entries = Vec::with_capacity(self.len);
        match self.repr {
            Repr::Csr {
                row_ptr,
                col_idx,
                values,
            } => {
                let mut row = 0;
                for (position, (col, value)) in col_idx.into_iter().zip(values).enumerate() {
                    while position >= row_ptr[row + 1] {
                        row += 1;
                    }
                    entries.push((row, col, value));
                }
            }
            Repr::Maps(rows) => {
                for (row, map) in rows.into_iter().enumerate() {
                    entries.extend(map.into_iter().map(|(col, value)| (row, col, value)));
                }
            }
            Repr::Sorted(rows) => {
                for (row, cells) in rows.into_iter().enumerate() {
                    entries.extend(cells.into_iter().map(|(col, value)| (row, col, value)));
                }
            }
        }
        entries
    }
}

impl<T> IndexedStorage<T> for Compressed<T> {
    type Indices<'a>
        = CompressedIndices<'a, T>
    where
        Self: 'a;

    fn get(&self, index: usize) -> Option<&T> {
        let (row, col) = self.cell_of(index)?;
        self.get_at(row, col)
    }

    fn replace(self, index: usize, value: T) -> core::result::Result<(Self, Option<T>), Rejected<Self>> {
        match self.cell_of(index) {
            Some((row, col)) => self.replace_at(row, col, value),
            None => {
                let error = self.outside(index);
                Err(Rejected::new(self, error))
            }
        }
    }

    fn take(self, index: usize) -> core::result::Result<(Self, Option<T>), Rejected<Self>> {
        match self.cell_of(index) {
            Some((row, col)) => self.take_at(row, col),
            None => Ok((self, None)),
        }
    }

    fn empty_copy(&self) -> Self {
        Self::new(self.rows, self.cols, self.usage())
    }

    fn non_null_indices(&self) -> CompressedIndices<'_, T> {
        CompressedIndices {
            entries: self.entries(),
            cols: self.cols,
        }
    }

    fn max_idx_overapproximation(&self) -> usize {
        self.rows * self.cols
    }

    #[inline]
    fn len(&self) -> usize {
        self.len
    }

    fn move_subtree(self, source: usize, shape: Shape, dest: usize) -> Step<Self> {
        if source == dest {
            return Ok(self);
        }
        let plan = SubtreeMove::plan::<T, Self>(&self, source, shape, dest)
            .and_then(|plan| {
                let outside = plan.moves.iter().map(|&(_, to)| to).find(|&to| self.cell_of(to).is_none());
                match outside {
                    Some(to) => Err(self.outside(to)),
                    None => Ok(plan),
                }
            });
        match plan {
            Ok(plan) => plan.apply(self),
            Err(error) => Err(Rejected::new(self, error)),
        }
    }

    fn move_range(self, from: usize, to: usize, count: usize) -> Step<Self> {
        if count == 0 || from == to {
            return Ok(self);
        }
        // Only occupied source slots need a cell to land in; clearing outside the grid
        // is a no-op.
        let verdict = check_range(from, to, count).and_then(|()| {
            match (0..count).find(|&offset| self.has(from + offset) && self.cell_of(to + offset).is_none()) {
                Some(offset) => Err(self.outside(to + offset)),
                None => Ok(()),
            }
        });
        match verdict {
            Ok(()) => shift_range(self, from, to, count),
            Err(error) => Err(Rejected::new(self, error)),
        }
    }

    fn bytes_used(&self) -> Result<usize> {
        let heap = match &self.repr {
            Repr::Csr {
                row_ptr,
                col_idx,
                values,
            } => {
                (row_ptr.capacity() + col_idx.capacity()) * size_of::<usize>() + values.capacity() * size_of::<T>()
            }
            // Tree node layout is not observable.
            Repr::Maps(_) => return Err(Error::DiagnosticsUnsupported),
            Repr::Sorted(rows) => {
                rows.capacity() * size_of::<SmallVec<[(usize, T); 4]>>()
                    + rows
                        .iter()
                        .filter(|cells| cells.spilled())
                        .map(|cells| cells.capacity() * size_of::<(usize, T)>())
                        .sum::<usize>()
            }
        };
        Ok(size_of::<Self>() + heap)
    }
}

enum RowInner<'a, T> {
    Slices(slice::Iter<'a, usize>, slice::Iter<'a, T>),
    Map(btree_map::Iter<'a, usize, T>),
    Pairs(slice::Iter<'a, (usize, T)>),
}

/// Occupied cells of one row of a [`Compressed`] storage, ascending by column.
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct Row<'a, T> {
    inner: RowInner<'a, T>,
}

impl<'a, T> Iterator for Row<'a, T> {
    type Item = (usize, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.inner {
            RowInner::Slices(cols, values) => Some((*cols.next()?, values.next()?)),
            RowInner::Map(cells) => cells.next().map(|(&col, value)| (col, value)),
            RowInner::Pairs(cells) => cells.next().map(|(col, value)| (*col, value)),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = match &self.inner {
            RowInner::Slices(cols, _) => cols.len(),
            RowInner::Map(cells) => cells.len(),
            RowInner::Pairs(cells) => cells.len(),
        };
        (len, Some(len))
    }
}

impl<T> ExactSizeIterator for Row<'_, T> {}

impl<T> FusedIterator for Row<'_, T> {}

/// Every occupied cell of a [`Compressed`] storage as `(row, col, value)`, row-major.
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct Entries<'a, T> {
    storage: &'a Compressed<T>,
    row: usize,
    current: Row<'a, T>,
    remaining: usize,
}

impl<'a, T> Iterator for Entries<'a, T> {
    type Item = (usize, usize, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        loop {
            if let Some((col, value)) = self.current.next() {
                self.remaining -= 1;
                return Some((self.row, col, value));
            }
            self.row += 1;
            if self.row >= self.storage.rows {
                return None;
            }
            self.current = self.storage.row(self.row);
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<T> ExactSizeIterator for Entries<'_, T> {}

impl<T> FusedIterator for Entries<'_, T> {}

/// Ascending occupied linear indices of a [`Compressed`] storage.
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct CompressedIndices<'a, T> {
    entries: Entries<'a, T>,
    cols: usize,
}

impl<T> Iterator for CompressedIndices<'_, T> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let (row, col, _) = self.entries.next()?;
        Some(row * self.cols + col)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.entries.size_hint()
    }
}

impl<T> ExactSizeIterator for CompressedIndices<'_, T> {}

impl<T> FusedIterator for CompressedIndices<'_, T> {}
