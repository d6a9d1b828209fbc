//! Parallel folds over the present entries of an index.
use rayon::iter::{IntoParallelIterator, ParallelIterator};

use crate::{partition::FairRangePartitioner, Key, SparseBitIndex};

impl<T: Sync> SparseBitIndex<T> {
    /// Folds all present entries into a single value in parallel.
    ///
    /// Every entry is mapped by `transform` and the results are combined with `combine`, first
    /// within each window of `partitioner` and then across windows. `combine` must be associative
    /// and commutative with `zero` as its identity, as no order of combination is guaranteed.
    ///
    /// `transform` may look up the same key in other indices, which is how a filter is joined
    /// against numeric columns.
    pub fn reduce<R, M, C>(
        &self,
        partitioner: impl Into<FairRangePartitioner>,
        zero: R,
        transform: M,
        combine: C,
    ) -> R
    where
        R: Clone + Send + Sync,
        M: Fn(Key, &T) -> R + Sync,
        C: Fn(R, R) -> R + Sync,
    {
        self.partitions(partitioner)
            .into_par_iter()
            .map(|window| {
                window.iter().fold(zero.clone(), |acc, (key, value)| {
                    combine(acc, transform(key, value))
                })
            })
            .reduce(|| zero.clone(), &combine)
    }

    /// Like [`reduce`][Self::reduce], but accumulates every entry in place.
    ///
    /// Each window starts from a clone of `zero` and feeds its entries to `accumulate`. The
    /// per-window results are combined with `combine`.
    pub fn fold_with<R, A, C>(
        &self,
        partitioner: impl Into<FairRangePartitioner>,
        zero: R,
        accumulate: A,
        combine: C,
    ) -> R
    where
        R: Clone + Send + Sync,
        A: Fn(&mut R, Key, &T) + Sync,
        C: Fn(R, R) -> R + Sync,
    {
        self.partitions(partitioner)
            .into_par_iter()
            .map(|window| {
                let mut acc = zero.clone();
                for (key, value) in window {
                    accumulate(&mut acc, key, value);
                }
                acc
            })
            .reduce(|| zero.clone(), &combine)
    }

    /// Like [`reduce`][Self::reduce], but with a fallible transform.
    ///
    /// Returns one of the errors produced by `transform` if any entry fails. Windows that have not
    /// started yet are skipped once an error occurred.
    pub fn try_reduce<R, E, M, C>(
        &self,
        partitioner: impl Into<FairRangePartitioner>,
        zero: R,
        transform: M,
        combine: C,
    ) -> Result<R, E>
    where
        R: Clone + Send + Sync,
        E: Send,
        M: Fn(Key, &T) -> Result<R, E> + Sync,
        C: Fn(R, R) -> R + Sync,
    {
        self.partitions(partitioner)
            .into_par_iter()
            .map(|window| {
                window
                    .iter()
                    .try_fold(zero.clone(), |acc, (key, value)| -> Result<R, E> {
                        Ok(combine(acc, transform(key, value)?))
                    })
            })
            .try_reduce(|| zero.clone(), |a, b| Ok(combine(a, b)))
    }
}
