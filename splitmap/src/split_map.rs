//! Sets of `u32` rows stored as containers keyed by the high half of each row.
use std::fmt;

use roaring::RoaringBitmap;

use crate::{
    circuit::CircuitEvaluator, container::Container, scatter::KeyLayout, slice::Slice, Key,
    SparseBitIndex,
};

/// A set of `u32` row ids split into a [`SparseBitIndex`] of containers.
///
/// The high 16 bits of a row select the key, via the map's [`KeyLayout`], and the low 16 bits are
/// stored in the container under that key. Split maps sharing a layout address the same rows with
/// the same keys and can be combined with
/// [`CircuitEvaluator::evaluate_split_maps`].
pub struct SplitMap<C = RoaringBitmap> {
    index: SparseBitIndex<C>,
    layout: KeyLayout,
}

impl<C> Default for SplitMap<C> {
    fn default() -> Self {
        Self::from_index(SparseBitIndex::new(), KeyLayout::default())
    }
}

impl<C: fmt::Debug> fmt::Debug for SplitMap<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SplitMap")
            .field("layout", &self.layout)
            .field("index", &self.index)
            .finish()
    }
}

impl<C> SplitMap<C> {
    /// Wraps an index of containers whose keys follow `layout`.
    pub fn from_index(index: SparseBitIndex<C>, layout: KeyLayout) -> Self {
        Self { index, layout }
    }

    /// Returns the index of containers.
    pub fn index(&self) -> &SparseBitIndex<C> {
        &self.index
    }

    /// Consumes the map, returning the index of containers.
    pub fn into_index(self) -> SparseBitIndex<C> {
        self.index
    }

    /// Returns the layout mapping row ids to keys.
    pub fn layout(&self) -> KeyLayout {
        self.layout
    }

    /// Returns the container holding the low parts of the rows with the given high part.
    pub fn container(&self, high: u16) -> Option<&C> {
        self.index.get(self.layout.key(high))
    }
}

impl<C: Container> SplitMap<C> {
    /// Returns the number of rows.
    pub fn cardinality(&self) -> u64 {
        self.index.values().map(Container::cardinality).sum()
    }

    /// Returns `true` when the map holds no rows.
    pub fn is_empty(&self) -> bool {
        self.index.values().all(Container::is_empty)
    }
}

impl SplitMap<RoaringBitmap> {
    /// Returns `true` when the map holds `row`.
    pub fn contains(&self, row: u32) -> bool {
        let (key, low) = self.layout.split_row(row);
        self.index
            .get(key)
            .is_some_and(|container| container.contains(low as u32))
    }

    /// Iterates over all rows.
    ///
    /// Rows are grouped by key in ascending key order and ascending within a key. For the
    /// [`Identity`][KeyLayout::Identity] layout this is ascending row order.
    pub fn rows(&self) -> impl Iterator<Item = u32> + '_ {
        self.index.iter().flat_map(move |(key, container)| {
            container
                .iter()
                .map(move |low| self.layout.join_row(key, low as u16))
        })
    }

    /// Collects all rows into a single bitmap.
    pub fn to_bitmap(&self) -> RoaringBitmap {
        self.rows().collect()
    }
}

/// Builds a [`SplitMap`] of [`RoaringBitmap`]s from individual row ids.
///
/// Rows can be added in any order and added more than once.
#[derive(Default)]
pub struct PageWriter {
    layout: KeyLayout,
    index: SparseBitIndex<RoaringBitmap>,
}

impl PageWriter {
    /// Creates a writer for the given layout.
    pub fn new(layout: KeyLayout) -> Self {
        Self {
            layout,
            index: SparseBitIndex::new(),
        }
    }

    /// Adds a row.
    pub fn add(&mut self, row: u32) {
        let (key, low) = self.layout.split_row(row);
        self.container(key).insert(low as u32);
    }

    /// Adds a sorted run of rows.
    ///
    /// Unsorted input is accepted too, but then takes the slower per-row path.
    pub fn add_sorted(&mut self, rows: &[u32]) {
        if rows.windows(2).any(|pair| pair[0] > pair[1]) {
            rows.iter().for_each(|&row| self.add(row));
            return;
        }
        for run in rows.chunk_by(|a, b| a >> 16 == b >> 16) {
            let (key, _) = self.layout.split_row(run[0]);
            // Sorted and grouped by high part, so the low parts are sorted as well.
            let lows = run.iter().map(|&row| row & 0xffff);
            let container = self.container(key);
            if container.append(lows.clone()).is_err() {
                container.extend(lows);
            }
        }
    }

    fn container(&mut self, key: Key) -> &mut RoaringBitmap {
        self.index.get_or_insert_with(key, RoaringBitmap::new)
    }

    /// Finishes the map.
    pub fn finish(self) -> SplitMap {
        SplitMap::from_index(self.index, self.layout)
    }
}

impl Extend<u32> for PageWriter {
    fn extend<I: IntoIterator<Item = u32>>(&mut self, rows: I) {
        rows.into_iter().for_each(|row| self.add(row));
    }
}

impl FromIterator<u32> for SplitMap {
    fn from_iter<I: IntoIterator<Item = u32>>(rows: I) -> Self {
        let mut writer = PageWriter::default();
        writer.extend(rows);
        writer.finish()
    }
}

impl CircuitEvaluator {
    /// Combines split maps key by key with a circuit over their containers.
    ///
    /// Inputs without a container for a matched key contribute an empty container, and empty
    /// results are dropped from the returned map. Containers that are present but empty still
    /// reach the circuit.
    ///
    /// # Panics
    /// Panics when the maps do not share a common layout.
    pub fn evaluate_split_maps<F, C, K>(
        &self,
        circuit: K,
        maps: &[(F, &SplitMap<C>)],
    ) -> SplitMap<C>
    where
        F: Clone + Sync,
        C: Container + Send + Sync,
        K: for<'f> Fn(Slice<'f, F, C>) -> C + Sync,
    {
        let layout = maps.first().map_or_else(KeyLayout::default, |(_, map)| map.layout);
        assert!(
            maps.iter().all(|(_, map)| map.layout == layout),
            "split maps with different key layouts cannot be combined"
        );
        let inputs: Vec<(F, &SparseBitIndex<C>)> = maps
            .iter()
            .map(|(filter, map)| (filter.clone(), &map.index))
            .collect();
        let index = self.evaluate(
            |slice| Some(circuit(slice)).filter(|result| !result.is_empty()),
            C::default(),
            &inputs,
        );
        SplitMap::from_index(index, layout)
    }
}
