//! Joining indices by key and applying circuits to the joined rows.
use std::convert::Infallible;

use quanta::Instant;
use rayon::iter::{IntoParallelIterator, ParallelIterator};

use crate::{
    empty_page, index::IndexView, partition::FairRangePartitioner, set_bits, slice::Slice,
    SparseBitIndex,
};

/// Selects which keys of the joined inputs take part in an evaluation.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum KeyMatch {
    /// Keys present in at least one input.
    #[default]
    Union,
    /// Keys present in every input.
    Intersection,
}

impl KeyMatch {
    /// Returns the presence word that is neutral for [`combine`][Self::combine].
    pub fn identity(self) -> u64 {
        match self {
            KeyMatch::Union => 0,
            KeyMatch::Intersection => !0,
        }
    }

    /// Combines two presence words.
    #[inline(always)]
    pub fn combine(self, acc: u64, word: u64) -> u64 {
        match self {
            KeyMatch::Union => acc | word,
            KeyMatch::Intersection => acc & word,
        }
    }

    /// Combines the presence words of all inputs at a chunk.
    ///
    /// Without inputs no key is matched, independent of the mode.
    fn fold<T>(self, inputs: &[IndexView<'_, T>], chunk: usize) -> u64 {
        if inputs.is_empty() {
            return 0;
        }
        inputs.iter().fold(self.identity(), |acc, input| {
            self.combine(acc, input.word_at(chunk))
        })
    }
}

/// Joins indices by key and applies a circuit to every joined row in parallel.
///
/// An evaluation runs in two phases that are both split into the disjoint chunk windows of a
/// [`FairRangePartitioner`]:
///
/// * Grouping combines the presence words of the inputs according to the [`KeyMatch`] mode and
///   builds a [`Slice`] for every matched key, holding the value of each input that has one and the
///   default value otherwise.
/// * Aggregation applies the circuit to every slice. Keys for which the circuit returns `None` are
///   dropped from the result.
///
/// Every parallel task writes only the chunks of its own window, so neither phase needs any
/// synchronization beyond joining the tasks.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct CircuitEvaluator {
    key_match: KeyMatch,
    partitioner: FairRangePartitioner,
}

impl CircuitEvaluator {
    /// Creates an evaluator matching the union of keys, using one window per rayon thread.
    pub fn new() -> Self {
        Self::default()
    }

    /// Matches keys present in at least one input.
    pub fn union(self) -> Self {
        self.matching(KeyMatch::Union)
    }

    /// Matches keys present in every input.
    pub fn intersection(self) -> Self {
        self.matching(KeyMatch::Intersection)
    }

    /// Sets the key matching mode.
    pub fn matching(mut self, key_match: KeyMatch) -> Self {
        self.key_match = key_match;
        self
    }

    /// Sets the partitioner, or the number of windows, used for both phases.
    pub fn parallelism(mut self, partitioner: impl Into<FairRangePartitioner>) -> Self {
        self.partitioner = partitioner.into();
        self
    }

    /// Returns the key matching mode.
    pub fn key_match(&self) -> KeyMatch {
        self.key_match
    }

    /// Returns the partitioner used for both phases.
    pub fn partitioner(&self) -> FairRangePartitioner {
        self.partitioner
    }

    /// Runs the grouping phase on its own.
    ///
    /// `filters[i]` identifies `inputs[i]` within the produced slices.
    ///
    /// # Panics
    /// Panics when `filters` and `inputs` differ in length.
    pub fn group<'f, F, T>(
        &self,
        default: &T,
        filters: &'f [F],
        inputs: &[&SparseBitIndex<T>],
    ) -> SparseBitIndex<Slice<'f, F, T>>
    where
        F: Sync,
        T: Clone + Send + Sync,
    {
        assert_eq!(filters.len(), inputs.len(), "one filter per input required");
        let start_time = Instant::now();
        let views: Vec<IndexView<'_, T>> = inputs.iter().map(|input| input.view()).collect();
        let key_match = self.key_match;

        let mut grouped = SparseBitIndex::new();
        grouped
            .partitions_mut(self.partitioner)
            .into_par_iter()
            .for_each(|mut window| {
                for chunk in window.window() {
                    let combined = key_match.fold(&views, chunk);
                    let mut slices = None;
                    if combined != 0 {
                        for (position, input) in views.iter().enumerate() {
                            let Some(values) = input.page_at(chunk) else {
                                continue;
                            };
                            // Under a union the combined word is looser than the input's own.
                            for bit in set_bits(combined & input.word_at(chunk)) {
                                let Some(value) = &values[bit] else {
                                    continue;
                                };
                                slices.get_or_insert_with(empty_page)[bit]
                                    .get_or_insert_with(|| Slice::filled(filters, default.clone()))
                                    .set_at(position, value.clone());
                            }
                        }
                    }
                    window.set_chunk_at(chunk, combined, slices);
                }
            });

        log::trace!(
            "grouped {} inputs by {:?}: {} keys in {:?}",
            inputs.len(),
            key_match,
            grouped.len(),
            start_time.elapsed()
        );
        grouped
    }

    /// Runs the aggregation phase on its own, consuming a grouped index.
    pub fn aggregate<'f, F, T, C>(
        &self,
        grouped: SparseBitIndex<Slice<'f, F, T>>,
        circuit: C,
    ) -> SparseBitIndex<T>
    where
        F: Sync,
        T: Send + Sync,
        C: Fn(Slice<'f, F, T>) -> Option<T> + Sync,
    {
        match self.try_aggregate(grouped, |slice| Ok::<_, Infallible>(circuit(slice))) {
            Ok(output) => output,
            Err(never) => match never {},
        }
    }

    /// Runs the aggregation phase with a fallible circuit.
    ///
    /// Returns the first error produced by the circuit. Windows that were already written are
    /// discarded together with the rest of the output.
    pub fn try_aggregate<'f, F, T, E, C>(
        &self,
        mut grouped: SparseBitIndex<Slice<'f, F, T>>,
        circuit: C,
    ) -> Result<SparseBitIndex<T>, E>
    where
        F: Sync,
        T: Send + Sync,
        E: Send,
        C: Fn(Slice<'f, F, T>) -> Result<Option<T>, E> + Sync,
    {
        let start_time = Instant::now();
        let mut output = SparseBitIndex::new();
        self.partitioner
            .partition((grouped.view_mut(), output.view_mut()))
            .into_par_iter()
            .try_for_each(|(mut source, mut target)| -> Result<(), E> {
                for chunk in source.window() {
                    let mut key_mask = source.word_at(chunk);
                    if key_mask == 0 {
                        continue;
                    }
                    let mut slices = source.take_page_at(chunk);
                    let mut values = empty_page();
                    for bit in set_bits(key_mask) {
                        let slice = slices.as_mut().and_then(|slices| slices[bit].take());
                        let result = match slice {
                            Some(slice) => circuit(slice)?,
                            None => None,
                        };
                        match result {
                            Some(value) => values[bit] = Some(value),
                            None => key_mask &= !(1 << bit),
                        }
                    }
                    target.set_chunk_at(chunk, key_mask, (key_mask != 0).then_some(values));
                }
                Ok(())
            })?;

        log::trace!("aggregated {} keys in {:?}", output.len(), start_time.elapsed());
        Ok(output)
    }

    /// Joins `inputs` by key and applies `circuit` to every matched key.
    ///
    /// Each input is paired with the filter identifying it within the slices passed to the
    /// circuit. Inputs without a value for a matched key contribute `default`. The result holds the
    /// circuit's output for every matched key for which it returned `Some`.
    pub fn evaluate<F, T, C>(
        &self,
        circuit: C,
        default: T,
        inputs: &[(F, &SparseBitIndex<T>)],
    ) -> SparseBitIndex<T>
    where
        F: Clone + Sync,
        T: Clone + Send + Sync,
        C: for<'f> Fn(Slice<'f, F, T>) -> Option<T> + Sync,
    {
        match self.try_evaluate(|slice| Ok::<_, Infallible>(circuit(slice)), default, inputs) {
            Ok(output) => output,
            Err(never) => match never {},
        }
    }

    /// Like [`evaluate`][Self::evaluate], but with a fallible circuit.
    ///
    /// The first error returned by the circuit is returned once the remaining parallel tasks have
    /// finished or were abandoned. The partially written output is dropped.
    pub fn try_evaluate<F, T, E, C>(
        &self,
        circuit: C,
        default: T,
        inputs: &[(F, &SparseBitIndex<T>)],
    ) -> Result<SparseBitIndex<T>, E>
    where
        F: Clone + Sync,
        T: Clone + Send + Sync,
        E: Send,
        C: for<'f> Fn(Slice<'f, F, T>) -> Result<Option<T>, E> + Sync,
    {
        let start_time = Instant::now();
        let filters: Vec<F> = inputs.iter().map(|(filter, _)| filter.clone()).collect();
        let indices: Vec<&SparseBitIndex<T>> = inputs.iter().map(|&(_, index)| index).collect();

        let grouped = self.group(&default, &filters, &indices);
        let output = self.try_aggregate(grouped, &circuit)?;

        log::debug!(
            "evaluated circuit over {} inputs ({:?}, {} windows): {} keys in {:?}",
            inputs.len(),
            self.key_match,
            self.partitioner.units(),
            output.len(),
            start_time.elapsed()
        );
        Ok(output)
    }
}

/// Applies `circuit` to every key present in at least one input.
///
/// See [`CircuitEvaluator::evaluate`].
pub fn evaluate<F, T, C>(
    circuit: C,
    default: T,
    inputs: &[(F, &SparseBitIndex<T>)],
) -> SparseBitIndex<T>
where
    F: Clone + Sync,
    T: Clone + Send + Sync,
    C: for<'f> Fn(Slice<'f, F, T>) -> Option<T> + Sync,
{
    CircuitEvaluator::new().evaluate(circuit, default, inputs)
}

/// Applies `circuit` to every key present in all inputs.
///
/// See [`CircuitEvaluator::evaluate`].
pub fn evaluate_if_keys_intersect<F, T, C>(
    circuit: C,
    default: T,
    inputs: &[(F, &SparseBitIndex<T>)],
) -> SparseBitIndex<T>
where
    F: Clone + Sync,
    T: Clone + Send + Sync,
    C: for<'f> Fn(Slice<'f, F, T>) -> Option<T> + Sync,
{
    CircuitEvaluator::new()
        .intersection()
        .evaluate(circuit, default, inputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CHUNK_COUNT;

    #[test]
    fn key_match_words() {
        assert_eq!(KeyMatch::Union.combine(KeyMatch::Union.identity(), 0b1010), 0b1010);
        assert_eq!(KeyMatch::Union.combine(0b0110, 0b1010), 0b1110);
        assert_eq!(
            KeyMatch::Intersection.combine(KeyMatch::Intersection.identity(), 0b1010),
            0b1010
        );
        assert_eq!(KeyMatch::Intersection.combine(0b0110, 0b1010), 0b0010);
    }

    #[test]
    fn grouping_writes_combined_presence() {
        let a: SparseBitIndex<u32> = [(1, 10), (64, 11), (200, 12)].into_iter().collect();
        let b: SparseBitIndex<u32> = [(1, 20), (65, 21)].into_iter().collect();
        let filters = ['a', 'b'];

        let evaluator = CircuitEvaluator::new().parallelism(4usize);
        let grouped = evaluator.group(&0, &filters, &[&a, &b]);
        assert_eq!(grouped.presence_word(0), Ok(0b10));
        assert_eq!(grouped.presence_word(1), Ok(0b11));
        assert_eq!(grouped.presence_word(3), Ok(1 << 8));
        assert_eq!(grouped.len(), 4);
        assert_eq!(grouped.get(1).map(|slice| slice.values()), Some(&[10, 20][..]));
        assert_eq!(grouped.get(64).map(|slice| slice.values()), Some(&[11, 0][..]));
        assert_eq!(grouped.get(65).map(|slice| slice.values()), Some(&[0, 21][..]));

        let grouped = evaluator.intersection().group(&0, &filters, &[&a, &b]);
        assert_eq!(grouped.keys().collect::<Vec<_>>(), vec![1]);
        assert!((1..CHUNK_COUNT).all(|chunk| grouped.presence_word(chunk) == Ok(0)));
    }

    #[test]
    fn grouping_skips_present_bits_without_value() {
        let mut a = SparseBitIndex::new();
        a.insert(3, 1u8);
        a.write_chunk(0, 0b1001, None).unwrap();
        let b: SparseBitIndex<u8> = [(0, 2), (3, 4)].into_iter().collect();

        let grouped = CircuitEvaluator::new()
            .intersection()
            .group(&9, &["a", "b"], &[&a, &b]);
        assert_eq!(grouped.presence_word(0), Ok(0b1001));
        assert_eq!(grouped.get(0).map(|slice| slice.values()), Some(&[9, 2][..]));
        assert_eq!(grouped.get(3).map(|slice| slice.values()), Some(&[1, 4][..]));
    }

    #[test]
    fn stale_values_of_cleared_bits_are_ignored() {
        let mut a = SparseBitIndex::new();
        a.insert(5, 50u32);
        a.insert(6, 60u32);
        a.write_chunk(0, 1 << 6, None).unwrap();
        let b: SparseBitIndex<u32> = [(5, 1)].into_iter().collect();

        let grouped = CircuitEvaluator::new().group(&0, &[0, 1], &[&a, &b]);
        assert_eq!(grouped.get(5).map(|slice| slice.values()), Some(&[0, 1][..]));
        assert_eq!(grouped.get(6).map(|slice| slice.values()), Some(&[60, 0][..]));
    }

    #[test]
    fn no_inputs_match_no_keys() {
        let evaluator = CircuitEvaluator::new().intersection();
        let grouped = evaluator.group::<u8, u8>(&0, &[], &[]);
        assert!(grouped.is_empty());
        let output = evaluator.evaluate(|_| Some(1u8), 0, &[] as &[(u8, &SparseBitIndex<u8>)]);
        assert!(output.is_empty());
    }

    #[test]
    fn aggregation_prunes_absent_results() {
        let a: SparseBitIndex<i32> = (0..200).map(|key| (key, key as i32)).collect();
        let evaluator = CircuitEvaluator::new().parallelism(7usize);
        let grouped = evaluator.group(&0, &["a"], &[&a]);
        let output = evaluator.aggregate(grouped, |slice| {
            let value = slice[0];
            (value % 3 == 0).then_some(value * 2)
        });
        assert_eq!(output.len(), 67);
        for key in 0..200u16 {
            let expected = (key % 3 == 0).then_some(key as i32 * 2);
            assert_eq!(output.get(key).copied(), expected);
            assert_eq!(output.contains(key), expected.is_some());
        }
        assert_eq!(output.presence_word(0), Ok(0x9249_2492_4924_9249));
    }

    #[test]
    fn builder_settings() {
        let evaluator = CircuitEvaluator::new();
        assert_eq!(evaluator.key_match(), KeyMatch::Union);
        let evaluator = evaluator.intersection().parallelism(3usize);
        assert_eq!(evaluator.key_match(), KeyMatch::Intersection);
        assert_eq!(evaluator.partitioner(), FairRangePartitioner::new(3));
        assert_eq!(evaluator.union().key_match(), KeyMatch::Union);
    }
}
