use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::sync::Arc;
use core::fmt;

use super::{IndexedStorage, Rejected, Step, SubtreeMove, check_range};
use crate::error::{Error, Result};
use crate::shape::Shape;

type Validator<T> = dyn Fn(&Proposal<'_, T>) -> Result<()> + Send + Sync;

// Object-safe view of the current contents.
trait Lookup<T> {
    fn lookup(&self, index: usize) -> Option<&T>;
}

impl<T, S: IndexedStorage<T>> Lookup<T> for S {
    fn lookup(&self, index: usize) -> Option<&T> {
        self.get(index)
    }
}

/// The state a storage would be in after a pending mutation: the pending writes
/// overlaid on the current contents.
pub struct Proposal<'a, T> {
    current: &'a dyn Lookup<T>,
    writes: &'a BTreeMap<usize, Option<&'a T>>,
    len: usize,
}

impl<'a, T> Proposal<'a, T> {
    /// The value `index` would hold.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&'a T> {
        match self.writes.get(&index) {
            Some(&write) => write,
            None => self.current.lookup(index),
        }
    }

    /// Lowest index the mutation touches.
    #[must_use]
    pub fn lo(&self) -> usize {
        self.writes.keys().next().copied().unwrap_or_default()
    }

    /// Highest index the mutation touches.
    #[must_use]
    pub fn hi(&self) -> usize {
        self.writes.keys().next_back().copied().unwrap_or_default()
    }

    /// Number of occupied indices after the mutation.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Every touched index with the value it would hold, ascending.
    pub fn writes(&self) -> impl Iterator<Item = (usize, Option<&'a T>)> + '_ {
        self.writes.iter().map(|(&index, &value)| (index, value))
    }

    /// Builds the error that refuses this mutation.
    #[must_use]
    pub fn reject(&self, reason: impl Into<String>) -> Error {
        Error::Rejected {
            lo: self.lo(),
            hi: self.hi(),
            reason: reason.into(),
        }
    }
}

/// A storage wrapper that validates every mutation before it reaches the inner storage.
///
/// The validator sees a [`Proposal`] of the post-mutation state of the touched range.
/// If it returns an error the inner storage is not modified and the mutation fails
/// with that error. Relocations are validated as a whole before any slot moves.
///
/// # Examples
///
/// ```
/// use flatshape::{Checked, Dense, Error, IndexedStorage};
///
/// let storage = Checked::new(Dense::new(), |proposal| {
///     if proposal.writes().any(|(_, value)| value.is_some_and(|v: &i32| *v < 0)) {
///         return Err(proposal.reject("negative value"));
///     }
///     Ok(())
/// });
/// let storage = storage.set(0, 4).unwrap();
/// let rejected = storage.set(1, -4).unwrap_err();
/// assert!(matches!(rejected.error, Error::Rejected { lo: 1, hi: 1, .. }));
/// assert_eq!(rejected.storage.get(1), None);
/// ```
pub struct Checked<S, T> {
    inner: S,
    validator: Arc<Validator<T>>,
}

impl<S, T> Checked<S, T>
where
    S: IndexedStorage<T>,
{
    pub fn new(inner: S, validator: impl Fn(&Proposal<'_, T>) -> Result<()> + Send + Sync + 'static) -> Self {
        Self {
            inner,
            validator: Arc::new(validator),
        }
    }

    #[must_use]
    pub const fn inner(&self) -> &S {
        &self.inner
    }

    #[must_use]
    pub fn into_inner(self) -> S {
        self.inner
    }

    fn validate(&self, writes: &BTreeMap<usize, Option<&T>>) -> Result<()> {
        if writes.is_empty() {
            return Ok(());
        }
        let len = writes.iter().fold(self.inner.len(), |len, (&index, after)| {
            match (self.inner.has(index), after.is_some()) {
                (false, true) => len + 1,
                (true, false) => len - 1,
                _ => len,
            }
        });
        let proposal = Proposal {
            current: &self.inner,
            writes,
            len,
        };
        let verdict = (self.validator)(&proposal);
        if let Err(error) = &verdict {
            tracing::warn!(lo = proposal.lo(), hi = proposal.hi(), %error, "checked storage rejected a mutation");
        }
        verdict
    }

    fn rewrap<R>(
        validator: Arc<Validator<T>>,
        result: core::result::Result<(S, R), Rejected<S>>,
    ) -> core::result::Result<(Self, R), Rejected<Self>> {
        match result {
            Ok((inner, extra)) => Ok((Self { inner, validator }, extra)),
            Err(rejected) => Err(rejected.map_storage(|inner| Self { inner, validator })),
        }
    }
}

impl<S, T> IndexedStorage<T> for Checked<S, T>
where
    S: IndexedStorage<T>,
{
    type Indices<'a>
        = S::Indices<'a>
    where
        Self: 'a;

    #[inline]
    fn get(&self, index: usize) -> Option<&T> {
        self.inner.get(index)
    }

    fn replace(self, index: usize, value: T) -> core::result::Result<(Self, Option<T>), Rejected<Self>> {
        let verdict = self.validate(&BTreeMap::from([(index, Some(&value))]));
        if let Err(error) = verdict {
            return Err(Rejected::new(self, error));
        }
        let Self { inner, validator } = self;
        Self::rewrap(validator, inner.replace(index, value))
    }

    fn take(self, index: usize) -> core::result::Result<(Self, Option<T>), Rejected<Self>> {
        let verdict = self.validate(&BTreeMap::from([(index, None)]));
        if let Err(error) = verdict {
            return Err(Rejected::new(self, error));
        }
        let Self { inner, validator } = self;
        Self::rewrap(validator, inner.take(index))
    }

    fn empty_copy(&self) -> Self {
        Self {
            inner: self.inner.empty_copy(),
            validator: Arc::clone(&self.validator),
        }
    }

    fn non_null_indices(&self) -> S::Indices<'_> {
        self.inner.non_null_indices()
    }

    fn max_idx_overapproximation(&self) -> usize {
        self.inner.max_idx_overapproximation()
    }

    #[inline]
    fn len(&self) -> usize {
        self.inner.len()
    }

    fn max_idx(&self) -> usize {
        self.inner.max_idx()
    }

    fn move_subtree(self, source: usize, shape: Shape, dest: usize) -> Step<Self> {
        if source == dest {
            return Ok(self);
        }
        let verdict = SubtreeMove::plan::<T, S>(&self.inner, source, shape, dest).and_then(|plan| {
            let mut writes = BTreeMap::new();
            for &(from, _) in &plan.moves {
                writes.insert(from, None);
            }
            for &index in &plan.stale {
                writes.insert(index, None);
            }
            for &(from, to) in &plan.moves {
                writes.insert(to, self.inner.get(from));
            }
            self.validate(&writes)
        });
        if let Err(error) = verdict {
            return Err(Rejected::new(self, error));
        }
        let Self { inner, validator } = self;
        let moved = inner.move_subtree(source, shape, dest).map(|inner| (inner, ()));
        Self::rewrap(validator, moved).map(|(storage, ())| storage)
    }

    fn move_range(self, from: usize, to: usize, count: usize) -> Step<Self> {
        if count == 0 || from == to {
            return Ok(self);
        }
        let verdict = check_range(from, to, count).and_then(|()| {
            let mut writes = BTreeMap::new();
            for offset in 0..count {
                writes.insert(from + offset, None);
            }
            for offset in 0..count {
                writes.insert(to + offset, self.inner.get(from + offset));
            }
            self.validate(&writes)
        });
        if let Err(error) = verdict {
            return Err(Rejected::new(self, error));
        }
        let Self { inner, validator } = self;
        let moved = inner.move_range(from, to, count).map(|inner| (inner, ()));
        Self::rewrap(validator, moved).map(|(storage, ())| storage)
    }

    fn bytes_used(&self) -> Result<usize> {
        self.inner.bytes_used()
    }
}

impl<S: Clone, T> Clone for Checked<S, T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            validator: Arc::clone(&self.validator),
        }
    }
}

impl<S: fmt::Debug, T> fmt::Debug for Checked<S, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Checked").field("inner", &self.inner).finish_non_exhaustive()
    }
}
