//! Prefix-indexed sparse columns joined by user supplied circuits.
//!
//! Every index in this crate addresses the same 16-bit key space. A [`SparseBitIndex`] stores a
//! value per present key using a two-level layout: 1024 presence words of 64 bits each, and a
//! [`ChunkedValueStore`] whose 64-slot pages are only allocated once a key of the corresponding
//! chunk is written.
//!
//! Independently built indices can be joined by key and combined with an arbitrary circuit using
//! [`CircuitEvaluator`], and folded into scalar results using [`SparseBitIndex::reduce`] and
//! friends. Both run in parallel on rayon's thread pool without any locking: the chunk range
//! `0..1024` is split into disjoint windows by a [`FairRangePartitioner`], and each parallel task
//! receives exclusive views of its window only.
//!
//! On top of the generic core, [`SplitMap`] stores sets of `u32` rows as containers keyed by the
//! high 16 bits of each row and [`DoubleColumn`] stores numeric values for the same rows, which is
//! what the ready-made [`reducers`] operate on.
#![deny(unsafe_code)]

mod circuit;
mod column;
mod container;
mod index;
mod partition;
mod reduce;
mod scatter;
mod slice;
mod split_map;
mod store;

#[cfg(test)]
mod test_index;

pub mod reducers;

pub use circuit::{evaluate, evaluate_if_keys_intersect, CircuitEvaluator, KeyMatch};
pub use column::{ColumnPage, DoubleColumn, DoubleColumnWriter};
pub use container::Container;
pub use index::{key_from_position, Entries, IndexView, IndexViewMut, SparseBitIndex};
pub use partition::{FairRangePartitioner, ParallelPartitions, Partitions, SplitWindow};
pub use scatter::{gather, scatter, KeyLayout};
pub use slice::Slice;
pub use split_map::{PageWriter, SplitMap};
pub use store::ChunkedValueStore;

pub use roaring::RoaringBitmap;

use std::ops::Range;

/// A key of the shared 16-bit key space.
pub type Key = u16;

/// Number of keys in the shared key space.
pub const KEY_SPACE: usize = 1 << Key::BITS;

/// Number of keys covered by a single presence word and value page.
pub const CHUNK_SIZE: usize = u64::BITS as usize;

/// Shift turning a key into the index of its chunk.
pub const CHUNK_SHIFT: u32 = {
    assert!(CHUNK_SIZE.is_power_of_two());
    CHUNK_SIZE.trailing_zeros()
};

/// Mask turning a key into its bit position within its chunk.
pub const CHUNK_MASK: usize = CHUNK_SIZE - 1;

/// Number of chunks, i.e. presence words and value pages, of every index.
pub const CHUNK_COUNT: usize = KEY_SPACE / CHUNK_SIZE;

/// A page of values for the 64 keys of one chunk.
pub type Page<T> = Box<[Option<T>; CHUNK_SIZE]>;

/// Allocates a page with all slots absent.
pub fn empty_page<T>() -> Page<T> {
    Box::new(std::array::from_fn(|_| None))
}

/// Error cases for accessing indices, stores and views.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum IndexError {
    /// The chunk index is not below [`CHUNK_COUNT`].
    #[error("chunk index {chunk} is out of range 0..{CHUNK_COUNT}")]
    ChunkOutOfRange {
        /// The rejected chunk index.
        chunk: usize,
    },
    /// The position does not fit into the 16-bit key space.
    #[error("position {position} is out of range 0..{KEY_SPACE}")]
    KeyOutOfRange {
        /// The rejected position.
        position: usize,
    },
    /// The chunk index is valid but not part of the window of the accessed view.
    #[error("chunk index {chunk} is outside of the view window {window:?}")]
    ChunkOutsideWindow {
        /// The rejected chunk index.
        chunk: usize,
        /// The window of the view.
        window: Range<usize>,
    },
}

#[inline(always)]
pub(crate) fn check_chunk(chunk: usize) -> Result<(), IndexError> {
    if chunk < CHUNK_COUNT {
        Ok(())
    } else {
        Err(IndexError::ChunkOutOfRange { chunk })
    }
}

/// Splits a key into its chunk index and its bit position within the chunk.
#[inline(always)]
pub(crate) fn split_key(key: Key) -> (usize, usize) {
    let position = key as usize;
    (position >> CHUNK_SHIFT, position & CHUNK_MASK)
}

/// Inverse of [`split_key`].
#[inline(always)]
pub(crate) fn join_key(chunk: usize, bit: usize) -> Key {
    debug_assert!(chunk < CHUNK_COUNT && bit < CHUNK_SIZE);
    ((chunk << CHUNK_SHIFT) | bit) as Key
}

/// Iterates over the set bit positions of a word, least significant first.
#[inline(always)]
pub(crate) fn set_bits(mut word: u64) -> impl Iterator<Item = usize> {
    std::iter::from_fn(move || {
        if word == 0 {
            None
        } else {
            let bit = word.trailing_zeros() as usize;
            word &= word - 1;
            Some(bit)
        }
    })
}
