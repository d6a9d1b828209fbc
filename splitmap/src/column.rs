//! Numeric columns addressed by the same row ids as split maps.
use crate::{scatter::KeyLayout, Key, SparseBitIndex, KEY_SPACE};

/// The values of the 65536 rows sharing a key.
pub type ColumnPage = Box<[f64]>;

fn empty_column_page() -> ColumnPage {
    vec![0.0; KEY_SPACE].into_boxed_slice()
}

/// A column of `f64` values for `u32` row ids.
///
/// Like a [`SplitMap`](crate::SplitMap), the column is keyed by the high 16 bits of each row
/// according to its [`KeyLayout`]. Every key holds a full page indexed by the low 16 bits. Rows of
/// an allocated page that were never written read as `0.0`.
#[derive(Debug, Default)]
pub struct DoubleColumn {
    index: SparseBitIndex<ColumnPage>,
    layout: KeyLayout,
}

impl DoubleColumn {
    /// Wraps an index of pages whose keys follow `layout`.
    ///
    /// # Panics
    /// Panics when a page does not hold exactly 65536 values.
    pub fn from_index(index: SparseBitIndex<ColumnPage>, layout: KeyLayout) -> Self {
        assert!(
            index.values().all(|page| page.len() == KEY_SPACE),
            "column pages must hold {KEY_SPACE} values"
        );
        Self { index, layout }
    }

    /// Returns the index of pages.
    pub fn index(&self) -> &SparseBitIndex<ColumnPage> {
        &self.index
    }

    /// Returns the layout mapping row ids to keys.
    pub fn layout(&self) -> KeyLayout {
        self.layout
    }

    /// Returns the page stored under a key.
    pub fn page(&self, key: Key) -> Option<&[f64]> {
        self.index.get(key).map(|page| &page[..])
    }

    /// Returns the value of a row, or `None` when its page was never written.
    pub fn get(&self, row: u32) -> Option<f64> {
        let (key, low) = self.layout.split_row(row);
        self.page(key).map(|page| page[low as usize])
    }
}

/// Builds a [`DoubleColumn`] from individual row values.
#[derive(Default)]
pub struct DoubleColumnWriter {
    layout: KeyLayout,
    index: SparseBitIndex<ColumnPage>,
}

impl DoubleColumnWriter {
    /// Creates a writer for the given layout.
    pub fn new(layout: KeyLayout) -> Self {
        Self {
            layout,
            index: SparseBitIndex::new(),
        }
    }

    /// Sets the value of a row, replacing any previous value.
    pub fn add(&mut self, row: u32, value: f64) {
        let (key, low) = self.layout.split_row(row);
        self.index.get_or_insert_with(key, empty_column_page)[low as usize] = value;
    }

    /// Finishes the column.
    pub fn finish(self) -> DoubleColumn {
        DoubleColumn {
            index: self.index,
            layout: self.layout,
        }
    }
}
