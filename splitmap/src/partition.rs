//! Fair splitting of the chunk range into disjoint windows for parallel execution.
use std::ops::Range;

use rayon::iter::{
    plumbing::{bridge_unindexed, Folder, UnindexedConsumer, UnindexedProducer},
    IntoParallelIterator, ParallelIterator,
};

use crate::{
    index::{IndexView, IndexViewMut},
    IndexError, CHUNK_COUNT,
};

/// Splits the chunk range `0..1024` into a fixed number of disjoint, contiguous windows.
///
/// With `P` units, every unit receives `1024 / P` chunks and the first `1024 % P` units receive one
/// additional chunk. The unit count is clamped to `1..=1024`, so every unit covers at least one
/// chunk and the units always cover all chunks exactly once, in ascending order.
///
/// Window boundaries are computed on demand from the unit number, so handing out or splitting
/// units never allocates.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct FairRangePartitioner {
    units: usize,
}

impl Default for FairRangePartitioner {
    fn default() -> Self {
        Self::available()
    }
}

impl From<usize> for FairRangePartitioner {
    fn from(units: usize) -> Self {
        Self::new(units)
    }
}

impl FairRangePartitioner {
    /// Creates a partitioner producing `units` windows, clamped to `1..=1024`.
    pub const fn new(units: usize) -> Self {
        let units = if units == 0 {
            1
        } else if units > CHUNK_COUNT {
            CHUNK_COUNT
        } else {
            units
        };
        Self { units }
    }

    /// Creates a partitioner producing one window per thread of the current rayon thread pool.
    ///
    /// By default this is the available hardware parallelism.
    pub fn available() -> Self {
        Self::new(rayon::current_num_threads())
    }

    /// Returns the number of windows produced.
    pub fn units(&self) -> usize {
        self.units
    }

    #[inline(always)]
    fn start(&self, unit: usize) -> usize {
        let base = CHUNK_COUNT / self.units;
        let remainder = CHUNK_COUNT % self.units;
        unit * base + unit.min(remainder)
    }

    /// Returns the chunk range of a unit.
    ///
    /// # Panics
    /// Panics when `unit` is not below [`units`][Self::units].
    pub fn window(&self, unit: usize) -> Range<usize> {
        assert!(
            unit < self.units,
            "unit {unit} out of range 0..{}",
            self.units
        );
        self.start(unit)..self.start(unit + 1)
    }

    /// Iterates over the chunk ranges of all units in ascending order.
    pub fn windows(&self) -> impl ExactSizeIterator<Item = Range<usize>> + '_ {
        (0..self.units).map(|unit| self.window(unit))
    }

    /// Splits a view covering all chunks into a depleting sequence of per-unit views.
    ///
    /// # Panics
    /// Panics when the window of `root` is not `0..1024`, see
    /// [`try_partition`][Self::try_partition].
    pub fn partition<V: SplitWindow>(self, root: V) -> Partitions<V> {
        match self.try_partition(root) {
            Ok(partitions) => partitions,
            Err(err) => panic!("only views covering all chunks can be partitioned: {err}"),
        }
    }

    /// Splits a view covering all chunks into a depleting sequence of per-unit views.
    ///
    /// A view missing some chunks is rejected with the first chunk it does not cover.
    pub fn try_partition<V: SplitWindow>(self, root: V) -> Result<Partitions<V>, IndexError> {
        let window = root.window();
        if window != (0..CHUNK_COUNT) {
            let chunk = if window.start > 0 { 0 } else { window.end };
            return Err(IndexError::ChunkOutsideWindow { chunk, window });
        }
        Ok(Partitions {
            partitioner: self,
            units: 0..self.units,
            rest: Some(root),
        })
    }
}

/// Views that can be split into two views at a chunk boundary.
///
/// This is implemented for the shared and exclusive index views, and for pairs of views covering
/// the same window, which allows walking several indices in lock step.
pub trait SplitWindow: Sized {
    /// Returns the range of chunk indices covered.
    fn window(&self) -> Range<usize>;

    /// Splits into the windows before and starting at an absolute chunk index.
    fn split_at_chunk(self, chunk: usize) -> (Self, Self);
}

impl<T> SplitWindow for IndexView<'_, T> {
    fn window(&self) -> Range<usize> {
        IndexView::window(self)
    }

    fn split_at_chunk(self, chunk: usize) -> (Self, Self) {
        IndexView::split_at_chunk(self, chunk)
    }
}

impl<T> SplitWindow for IndexViewMut<'_, T> {
    fn window(&self) -> Range<usize> {
        IndexViewMut::window(self)
    }

    fn split_at_chunk(self, chunk: usize) -> (Self, Self) {
        IndexViewMut::split_at_chunk(self, chunk)
    }
}

impl<A: SplitWindow, B: SplitWindow> SplitWindow for (A, B) {
    fn window(&self) -> Range<usize> {
        let window = self.0.window();
        debug_assert_eq!(window, self.1.window());
        window
    }

    fn split_at_chunk(self, chunk: usize) -> (Self, Self) {
        let (a_lo, a_hi) = self.0.split_at_chunk(chunk);
        let (b_lo, b_hi) = self.1.split_at_chunk(chunk);
        ((a_lo, b_lo), (a_hi, b_hi))
    }
}

/// Depleting sequence of disjoint per-unit views produced by a [`FairRangePartitioner`].
///
/// Units are handed out in ascending order and never reissued. [`len`][ExactSizeIterator::len]
/// always reports the exact number of remaining units, and [`split_off`][Self::split_off] moves the
/// upper half of the remaining units into an independent sequence. Converting into a parallel
/// iterator lets rayon's work stealing perform these splits on demand.
pub struct Partitions<V> {
    partitioner: FairRangePartitioner,
    units: Range<usize>,
    rest: Option<V>,
}

impl<V: SplitWindow> Partitions<V> {
    /// Returns the partitioner these units were taken from.
    pub fn partitioner(&self) -> FairRangePartitioner {
        self.partitioner
    }

    /// Returns the unit numbers that were not handed out yet.
    pub fn remaining_units(&self) -> Range<usize> {
        self.units.clone()
    }

    /// Moves the upper half of the remaining units into a new sequence.
    ///
    /// Returns `None` when fewer than two units remain.
    pub fn split_off(&mut self) -> Option<Self> {
        if self.units.len() < 2 {
            return None;
        }
        let mid = self.units.start + self.units.len() / 2;
        let rest = self.rest.take()?;
        let (lower, upper) = rest.split_at_chunk(self.partitioner.start(mid));
        self.rest = Some(lower);
        let upper_units = mid..self.units.end;
        self.units.end = mid;
        Some(Self {
            partitioner: self.partitioner,
            units: upper_units,
            rest: Some(upper),
        })
    }
}

impl<V: SplitWindow> Iterator for Partitions<V> {
    type Item = V;

    fn next(&mut self) -> Option<V> {
        let unit = self.units.next()?;
        let rest = self.rest.take()?;
        if self.units.is_empty() {
            return Some(rest);
        }
        let (head, tail) = rest.split_at_chunk(self.partitioner.start(unit + 1));
        self.rest = Some(tail);
        Some(head)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.units.len(), Some(self.units.len()))
    }
}

impl<V: SplitWindow> ExactSizeIterator for Partitions<V> {}

impl<V: SplitWindow> std::iter::FusedIterator for Partitions<V> {}

/// Parallel iterator over the units of [`Partitions`].
pub struct ParallelPartitions<V>(Partitions<V>);

impl<V: SplitWindow + Send> IntoParallelIterator for Partitions<V> {
    type Iter = ParallelPartitions<V>;
    type Item = V;

    fn into_par_iter(self) -> Self::Iter {
        ParallelPartitions(self)
    }
}

impl<V: SplitWindow + Send> ParallelIterator for ParallelPartitions<V> {
    type Item = V;

    fn drive_unindexed<C>(self, consumer: C) -> C::Result
    where
        C: UnindexedConsumer<Self::Item>,
    {
        bridge_unindexed(self.0, consumer)
    }
}

impl<V: SplitWindow + Send> UnindexedProducer for Partitions<V> {
    type Item = V;

    fn split(mut self) -> (Self, Option<Self>) {
        let upper = self.split_off();
        (self, upper)
    }

    fn fold_with<F>(self, folder: F) -> F
    where
        F: Folder<Self::Item>,
    {
        folder.consume_iter(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SparseBitIndex;

    #[test]
    fn windows_cover_all_chunks_for_every_unit_count() {
        for units in 1..=CHUNK_COUNT {
            let partitioner = FairRangePartitioner::new(units);
            assert_eq!(partitioner.units(), units);
            let mut next = 0;
            let mut min_len = usize::MAX;
            let mut max_len = 0;
            for window in partitioner.windows() {
                assert_eq!(window.start, next);
                assert!(!window.is_empty());
                min_len = min_len.min(window.len());
                max_len = max_len.max(window.len());
                next = window.end;
            }
            assert_eq!(next, CHUNK_COUNT);
            assert!(max_len - min_len <= 1);
        }
    }

    #[test]
    fn unit_count_is_clamped() {
        assert_eq!(FairRangePartitioner::new(0).units(), 1);
        assert_eq!(FairRangePartitioner::new(CHUNK_COUNT + 1).units(), CHUNK_COUNT);
        assert_eq!(FairRangePartitioner::new(usize::MAX).units(), CHUNK_COUNT);
        assert!(FairRangePartitioner::available().units() >= 1);
    }

    #[test]
    fn remainder_goes_to_leading_units() {
        let partitioner = FairRangePartitioner::new(3);
        assert_eq!(
            partitioner.windows().collect::<Vec<_>>(),
            vec![0..342, 342..683, 683..1024]
        );
    }

    #[test]
    fn partitions_yield_matching_views() {
        let index = SparseBitIndex::<u8>::new();
        for units in [1, 2, 3, 7, 64, 1000, 1024] {
            let partitioner = FairRangePartitioner::new(units);
            let partitions = index.partitions(partitioner);
            assert_eq!(partitions.len(), units);
            let windows: Vec<_> = partitions.map(|view| view.window()).collect();
            assert_eq!(windows, partitioner.windows().collect::<Vec<_>>());
        }
    }

    #[test]
    fn split_off_peels_disjoint_halves() {
        let mut index = SparseBitIndex::<u8>::new();
        let partitioner = FairRangePartitioner::new(10);
        let mut lower = index.partitions_mut(partitioner);
        assert_eq!(lower.next().map(|view| view.window()), Some(0..103));
        assert_eq!(lower.len(), 9);

        let mut upper = lower.split_off().unwrap();
        assert_eq!(lower.remaining_units(), 1..5);
        assert_eq!(upper.remaining_units(), 5..10);

        let mut inner = upper.split_off().unwrap();
        assert_eq!(upper.len() + inner.len(), 5);
        assert!(inner.split_off().is_some());

        let mut windows: Vec<_> = lower
            .chain(upper)
            .chain(inner)
            .map(|view| view.window())
            .collect();
        windows.sort_by_key(|window| window.start);
        let expected: Vec<_> = partitioner.windows().skip(1).collect();
        assert_eq!(windows.len(), 7);
        assert!(windows.iter().all(|window| expected.contains(window)));
    }

    #[test]
    fn partial_views_are_rejected() {
        let mut index = SparseBitIndex::<u8>::new();
        let partitioner = FairRangePartitioner::new(4);

        let (low, high) = index.view().split_at_chunk(300);
        assert_eq!(
            partitioner.try_partition(low).err(),
            Some(IndexError::ChunkOutsideWindow {
                chunk: 300,
                window: 0..300
            })
        );
        assert_eq!(
            partitioner.try_partition(high).err(),
            Some(IndexError::ChunkOutsideWindow {
                chunk: 0,
                window: 300..CHUNK_COUNT
            })
        );
        assert_eq!(partitioner.try_partition(index.view()).map(|p| p.len()).ok(), Some(4));

        let (low, _) = index.view_mut().split_at_chunk(CHUNK_COUNT);
        assert_eq!(partitioner.try_partition(low).map(|p| p.len()).ok(), Some(4));
    }

    #[test]
    #[should_panic]
    fn partition_panics_on_partial_views() {
        let index = SparseBitIndex::<u8>::new();
        let (_, high) = index.view().split_at_chunk(1);
        FairRangePartitioner::new(2).partition(high);
    }

    #[test]
    fn single_unit_does_not_split() {
        let index = SparseBitIndex::<u8>::new();
        let mut partitions = index.partitions(1usize);
        assert!(partitions.split_off().is_none());
        assert_eq!(partitions.next().map(|view| view.window()), Some(0..CHUNK_COUNT));
        assert!(partitions.next().is_none());
        assert_eq!(partitions.len(), 0);
    }

    #[test]
    fn parallel_partitions_write_disjoint_windows() {
        let mut index = SparseBitIndex::new();
        index
            .partitions_mut(FairRangePartitioner::new(13))
            .into_par_iter()
            .for_each(|mut view| {
                for chunk in view.window() {
                    view.insert((chunk * 64) as u16, chunk).unwrap();
                }
            });
        assert_eq!(index.len(), CHUNK_COUNT);
        assert!(index.iter().all(|(key, &chunk)| key as usize == chunk * 64));
    }

    #[test]
    fn parallel_partitions_keep_unit_order() {
        let index = SparseBitIndex::<u8>::new();
        let windows: Vec<_> = index
            .partitions(37usize)
            .into_par_iter()
            .map(|view| view.window())
            .collect();
        assert_eq!(windows, FairRangePartitioner::new(37).windows().collect::<Vec<_>>());
    }
}
