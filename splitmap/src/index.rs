//! The sparse bit-indexed map from keys to values and its window views.
use std::{fmt, ops::Range};

use crate::{
    check_chunk, empty_page, join_key,
    partition::{FairRangePartitioner, Partitions},
    split_key,
    store::{read_slot, write_slot, ChunkedValueStore},
    IndexError, Key, Page, CHUNK_COUNT, CHUNK_SIZE, KEY_SPACE,
};

/// Converts a position of the key space into a [`Key`], failing for positions outside of it.
pub fn key_from_position(position: usize) -> Result<Key, IndexError> {
    Key::try_from(position).map_err(|_| IndexError::KeyOutOfRange { position })
}

/// Sparse map from 16-bit keys to values of type `T`.
///
/// The presence of a key is recorded in one of 1024 presence words, and its value is stored in the
/// corresponding page of a [`ChunkedValueStore`]. Reading or combining presence never touches the
/// values, which is what allows joins to skip whole chunks cheaply.
///
/// An index can be viewed as a whole ([`view`][Self::view], [`view_mut`][Self::view_mut]) or split
/// into disjoint windows of chunks by a [`FairRangePartitioner`] ([`partitions`][Self::partitions],
/// [`partitions_mut`][Self::partitions_mut]). Exclusive windows only ever come from splitting an
/// exclusive borrow of the whole index, so concurrent writers through different windows can never
/// touch the same chunk.
pub struct SparseBitIndex<T> {
    presence: Box<[u64]>,
    store: ChunkedValueStore<T>,
}

impl<T> Default for SparseBitIndex<T> {
    fn default() -> Self {
        Self {
            presence: vec![0; CHUNK_COUNT].into_boxed_slice(),
            store: ChunkedValueStore::default(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for SparseBitIndex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<T> SparseBitIndex<T> {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value of a present key.
    #[inline(always)]
    pub fn get(&self, key: Key) -> Option<&T> {
        let (chunk, bit) = split_key(key);
        if self.presence[chunk] & (1 << bit) != 0 {
            self.store.get(key)
        } else {
            None
        }
    }

    /// Returns a mutable reference to the value of a present key.
    #[inline(always)]
    pub fn get_mut(&mut self, key: Key) -> Option<&mut T> {
        let (chunk, bit) = split_key(key);
        if self.presence[chunk] & (1 << bit) != 0 {
            self.store.get_mut(key)
        } else {
            None
        }
    }

    /// Returns `true` when the presence bit of a key is set.
    #[inline(always)]
    pub fn contains(&self, key: Key) -> bool {
        let (chunk, bit) = split_key(key);
        self.presence[chunk] & (1 << bit) != 0
    }

    /// Inserts a value for a key and marks the key as present.
    ///
    /// Returns the previous value if the key was present.
    pub fn insert(&mut self, key: Key, value: T) -> Option<T> {
        let (chunk, bit) = split_key(key);
        let was_present = self.presence[chunk] & (1 << bit) != 0;
        self.presence[chunk] |= 1 << bit;
        let previous = self.store.put(key, value);
        previous.filter(|_| was_present)
    }

    /// Returns the value of a key, inserting the result of `value` first if the key is absent.
    pub fn get_or_insert_with(&mut self, key: Key, value: impl FnOnce() -> T) -> &mut T {
        let (chunk, bit) = split_key(key);
        let was_present = self.presence[chunk] & (1 << bit) != 0;
        self.presence[chunk] |= 1 << bit;
        let slot = &mut self.store.pages_mut()[chunk].get_or_insert_with(empty_page)[bit];
        if !was_present {
            // An unreachable value left behind by `write_chunk` must not resurface.
            *slot = None;
        }
        slot.get_or_insert_with(value)
    }

    /// Returns the presence word of a chunk.
    pub fn presence_word(&self, chunk: usize) -> Result<u64, IndexError> {
        check_chunk(chunk)?;
        Ok(self.presence[chunk])
    }

    /// Replaces the presence word of a chunk and, if given a page, the values of the chunk.
    ///
    /// The page is only transferred when `word` is non-zero. Passing `None` updates the presence
    /// word alone, which is the cheap way to mark a whole chunk absent.
    pub fn write_chunk(
        &mut self,
        chunk: usize,
        word: u64,
        page: Option<Page<T>>,
    ) -> Result<(), IndexError> {
        check_chunk(chunk)?;
        set_chunk(&mut self.presence[chunk], &mut self.store.pages_mut()[chunk], word, page);
        Ok(())
    }

    /// Copies the values of a chunk into a caller provided buffer.
    ///
    /// Returns whether the page of the chunk is allocated. Absent pages fill the buffer with
    /// `None`. This copies slots regardless of presence bits.
    pub fn read_page(
        &self,
        chunk: usize,
        out: &mut [Option<T>; CHUNK_SIZE],
    ) -> Result<bool, IndexError>
    where
        T: Clone,
    {
        self.store.read_page(chunk, out)
    }

    /// Returns the underlying value store.
    pub fn store(&self) -> &ChunkedValueStore<T> {
        &self.store
    }

    /// Returns the number of present keys.
    pub fn len(&self) -> usize {
        self.presence.iter().map(|word| word.count_ones() as usize).sum()
    }

    /// Returns `true` when no key is present.
    pub fn is_empty(&self) -> bool {
        self.presence.iter().all(|&word| word == 0)
    }

    /// Iterates over present keys and their values in ascending key order.
    pub fn iter(&self) -> Entries<'_, T> {
        self.view().iter()
    }

    /// Iterates over present keys in ascending order.
    pub fn keys(&self) -> impl Iterator<Item = Key> + '_ {
        self.iter().map(|(key, _)| key)
    }

    /// Iterates over the values of present keys in ascending key order.
    pub fn values(&self) -> impl Iterator<Item = &T> + '_ {
        self.iter().map(|(_, value)| value)
    }

    /// Returns a shared view covering all chunks.
    pub fn view(&self) -> IndexView<'_, T> {
        IndexView {
            offset: 0,
            presence: &self.presence,
            pages: self.store.pages(),
        }
    }

    /// Returns an exclusive view covering all chunks.
    pub fn view_mut(&mut self) -> IndexViewMut<'_, T> {
        IndexViewMut {
            offset: 0,
            presence: &mut self.presence,
            pages: self.store.pages_mut(),
        }
    }

    /// Splits the index into disjoint shared windows.
    ///
    /// Accepts a [`FairRangePartitioner`] or the desired number of windows.
    pub fn partitions(
        &self,
        partitioner: impl Into<FairRangePartitioner>,
    ) -> Partitions<IndexView<'_, T>> {
        partitioner.into().partition(self.view())
    }

    /// Splits the index into disjoint exclusive windows.
    ///
    /// Accepts a [`FairRangePartitioner`] or the desired number of windows.
    pub fn partitions_mut(
        &mut self,
        partitioner: impl Into<FairRangePartitioner>,
    ) -> Partitions<IndexViewMut<'_, T>> {
        partitioner.into().partition(self.view_mut())
    }
}

impl<T> FromIterator<(Key, T)> for SparseBitIndex<T> {
    fn from_iter<I: IntoIterator<Item = (Key, T)>>(iter: I) -> Self {
        let mut index = Self::new();
        index.extend(iter);
        index
    }
}

impl<T> Extend<(Key, T)> for SparseBitIndex<T> {
    fn extend<I: IntoIterator<Item = (Key, T)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.insert(key, value);
        }
    }
}

impl<'a, T> IntoIterator for &'a SparseBitIndex<T> {
    type Item = (Key, &'a T);
    type IntoIter = Entries<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[inline(always)]
fn set_chunk<T>(presence: &mut u64, slot: &mut Option<Page<T>>, word: u64, page: Option<Page<T>>) {
    *presence = word;
    if word != 0 {
        if let Some(page) = page {
            *slot = Some(page);
        }
    }
}

#[inline(always)]
fn check_window(window: Range<usize>, chunk: usize) -> Result<usize, IndexError> {
    check_chunk(chunk)?;
    if window.contains(&chunk) {
        Ok(chunk - window.start)
    } else {
        Err(IndexError::ChunkOutsideWindow { chunk, window })
    }
}

/// Checks a split point, which may also be the end of the window.
#[inline(always)]
fn check_split(window: Range<usize>, chunk: usize) -> Result<usize, IndexError> {
    if chunk > CHUNK_COUNT {
        return Err(IndexError::ChunkOutOfRange { chunk });
    }
    if chunk < window.start || chunk > window.end {
        return Err(IndexError::ChunkOutsideWindow { chunk, window });
    }
    Ok(chunk - window.start)
}

/// Shared view of a contiguous window of chunks of a [`SparseBitIndex`].
///
/// Chunk indices passed to and returned from a view are always absolute, i.e. the same as for the
/// index the view was taken from.
pub struct IndexView<'a, T> {
    offset: usize,
    presence: &'a [u64],
    pages: &'a [Option<Page<T>>],
}

impl<T> Clone for IndexView<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for IndexView<'_, T> {}

impl<T: fmt::Debug> fmt::Debug for IndexView<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexView")
            .field("window", &self.window())
            .field("entries", &DebugEntries(*self))
            .finish()
    }
}

struct DebugEntries<'a, T>(IndexView<'a, T>);

impl<T: fmt::Debug> fmt::Debug for DebugEntries<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.0.iter()).finish()
    }
}

impl<'a, T> IndexView<'a, T> {
    /// Returns the range of chunk indices covered by this view.
    pub fn window(&self) -> Range<usize> {
        self.offset..self.offset + self.presence.len()
    }

    /// Returns the presence word of a chunk within the window.
    pub fn presence_word(&self, chunk: usize) -> Result<u64, IndexError> {
        let local = check_window(self.window(), chunk)?;
        Ok(self.presence[local])
    }

    /// Returns the page of a chunk within the window if it is allocated.
    pub fn page(&self, chunk: usize) -> Result<Option<&'a [Option<T>; CHUNK_SIZE]>, IndexError> {
        let local = check_window(self.window(), chunk)?;
        Ok(self.pages[local].as_deref())
    }

    /// Copies the values of a chunk within the window into a caller provided buffer.
    pub fn read_page(
        &self,
        chunk: usize,
        out: &mut [Option<T>; CHUNK_SIZE],
    ) -> Result<bool, IndexError>
    where
        T: Clone,
    {
        let local = check_window(self.window(), chunk)?;
        Ok(read_slot(&self.pages[local], out))
    }

    /// Returns the value of a present key whose chunk lies within the window.
    pub fn get(&self, key: Key) -> Result<Option<&'a T>, IndexError> {
        let (chunk, bit) = split_key(key);
        let local = check_window(self.window(), chunk)?;
        if self.presence[local] & (1 << bit) == 0 {
            return Ok(None);
        }
        Ok(self.pages[local].as_ref().and_then(|page| page[bit].as_ref()))
    }

    /// Returns the number of present keys within the window.
    pub fn len(&self) -> usize {
        self.presence.iter().map(|word| word.count_ones() as usize).sum()
    }

    /// Returns `true` when no key within the window is present.
    pub fn is_empty(&self) -> bool {
        self.presence.iter().all(|&word| word == 0)
    }

    /// Iterates over the present keys of the window and their values in ascending key order.
    pub fn iter(&self) -> Entries<'a, T> {
        Entries {
            offset: self.offset,
            presence: self.presence,
            pages: self.pages,
            chunk: 0,
            mask: 0,
        }
    }

    /// Splits the view into the windows before and starting at an absolute chunk index.
    ///
    /// # Panics
    /// Panics when `chunk` is not within `window().start..=window().end`, see
    /// [`try_split_at_chunk`][Self::try_split_at_chunk].
    pub fn split_at_chunk(self, chunk: usize) -> (Self, Self) {
        match self.try_split_at_chunk(chunk) {
            Ok(halves) => halves,
            Err(err) => panic!("{err}"),
        }
    }

    /// Splits the view into the windows before and starting at an absolute chunk index.
    ///
    /// `chunk` may be the start or the end of the window, producing an empty half.
    pub fn try_split_at_chunk(self, chunk: usize) -> Result<(Self, Self), IndexError> {
        let local = check_split(self.window(), chunk)?;
        let (presence_lo, presence_hi) = self.presence.split_at(local);
        let (pages_lo, pages_hi) = self.pages.split_at(local);
        Ok((
            Self {
                offset: self.offset,
                presence: presence_lo,
                pages: pages_lo,
            },
            Self {
                offset: chunk,
                presence: presence_hi,
                pages: pages_hi,
            },
        ))
    }

    pub(crate) fn word_at(&self, chunk: usize) -> u64 {
        self.presence[chunk - self.offset]
    }

    pub(crate) fn page_at(&self, chunk: usize) -> Option<&'a [Option<T>; CHUNK_SIZE]> {
        self.pages[chunk - self.offset].as_deref()
    }
}

impl<'a, T> IntoIterator for IndexView<'a, T> {
    type Item = (Key, &'a T);
    type IntoIter = Entries<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Exclusive view of a contiguous window of chunks of a [`SparseBitIndex`].
///
/// Only obtainable by exclusively borrowing an index or by splitting another exclusive view, so two
/// live exclusive views never share a chunk.
pub struct IndexViewMut<'a, T> {
    offset: usize,
    presence: &'a mut [u64],
    pages: &'a mut [Option<Page<T>>],
}

impl<T: fmt::Debug> fmt::Debug for IndexViewMut<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.as_view(), f)
    }
}

impl<'a, T> IndexViewMut<'a, T> {
    /// Returns the range of chunk indices covered by this view.
    pub fn window(&self) -> Range<usize> {
        self.offset..self.offset + self.presence.len()
    }

    /// Reborrows this view as a shared view.
    pub fn as_view(&self) -> IndexView<'_, T> {
        IndexView {
            offset: self.offset,
            presence: self.presence,
            pages: self.pages,
        }
    }

    /// Returns the presence word of a chunk within the window.
    pub fn presence_word(&self, chunk: usize) -> Result<u64, IndexError> {
        let local = check_window(self.window(), chunk)?;
        Ok(self.presence[local])
    }

    /// Replaces the presence word of a chunk within the window and, if given a page, its values.
    ///
    /// See [`SparseBitIndex::write_chunk`].
    pub fn write_chunk(
        &mut self,
        chunk: usize,
        word: u64,
        page: Option<Page<T>>,
    ) -> Result<(), IndexError> {
        let local = check_window(self.window(), chunk)?;
        set_chunk(&mut self.presence[local], &mut self.pages[local], word, page);
        Ok(())
    }

    /// Copies a caller provided buffer into the page of a chunk within the window.
    ///
    /// Presence bits are left untouched.
    pub fn write_page(
        &mut self,
        chunk: usize,
        input: &[Option<T>; CHUNK_SIZE],
    ) -> Result<(), IndexError>
    where
        T: Clone,
    {
        let local = check_window(self.window(), chunk)?;
        write_slot(&mut self.pages[local], input);
        Ok(())
    }

    /// Inserts a value for a key whose chunk lies within the window.
    ///
    /// Returns the previous value if the key was present.
    pub fn insert(&mut self, key: Key, value: T) -> Result<Option<T>, IndexError> {
        let (chunk, bit) = split_key(key);
        let local = check_window(self.window(), chunk)?;
        let was_present = self.presence[local] & (1 << bit) != 0;
        self.presence[local] |= 1 << bit;
        let page = self.pages[local].get_or_insert_with(empty_page);
        Ok(page[bit].replace(value).filter(|_| was_present))
    }

    /// Splits the view into the windows before and starting at an absolute chunk index.
    ///
    /// # Panics
    /// Panics when `chunk` is not within `window().start..=window().end`, see
    /// [`try_split_at_chunk`][Self::try_split_at_chunk].
    pub fn split_at_chunk(self, chunk: usize) -> (Self, Self) {
        match self.try_split_at_chunk(chunk) {
            Ok(halves) => halves,
            Err(err) => panic!("{err}"),
        }
    }

    /// Splits the view into the windows before and starting at an absolute chunk index.
    ///
    /// The view is consumed even when the split point is rejected.
    pub fn try_split_at_chunk(self, chunk: usize) -> Result<(Self, Self), IndexError> {
        let local = check_split(self.window(), chunk)?;
        let (presence_lo, presence_hi) = self.presence.split_at_mut(local);
        let (pages_lo, pages_hi) = self.pages.split_at_mut(local);
        Ok((
            Self {
                offset: self.offset,
                presence: presence_lo,
                pages: pages_lo,
            },
            Self {
                offset: chunk,
                presence: presence_hi,
                pages: pages_hi,
            },
        ))
    }

    pub(crate) fn word_at(&self, chunk: usize) -> u64 {
        self.presence[chunk - self.offset]
    }

    pub(crate) fn take_page_at(&mut self, chunk: usize) -> Option<Page<T>> {
        self.pages[chunk - self.offset].take()
    }

    /// Writes a chunk known to be inside the window.
    pub(crate) fn set_chunk_at(&mut self, chunk: usize, word: u64, page: Option<Page<T>>) {
        let local = chunk - self.offset;
        set_chunk(&mut self.presence[local], &mut self.pages[local], word, page);
    }
}

/// Iterator over the present keys of an index or view and their values.
///
/// Keys are yielded in ascending order: chunks in ascending order and, within a chunk, bits from
/// least to most significant. Keys whose presence bit is set but whose slot holds no value are
/// skipped.
pub struct Entries<'a, T> {
    offset: usize,
    presence: &'a [u64],
    pages: &'a [Option<Page<T>>],
    chunk: usize,
    mask: u64,
}

impl<T> Clone for Entries<'_, T> {
    fn clone(&self) -> Self {
        Self {
            offset: self.offset,
            presence: self.presence,
            pages: self.pages,
            chunk: self.chunk,
            mask: self.mask,
        }
    }
}

impl<'a, T> Iterator for Entries<'a, T> {
    type Item = (Key, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.mask == 0 {
                // Skip chunks without present keys or without an allocated page.
                loop {
                    if self.chunk >= self.presence.len() {
                        return None;
                    }
                    let chunk = self.chunk;
                    self.chunk += 1;
                    if self.presence[chunk] != 0 && self.pages[chunk].is_some() {
                        self.mask = self.presence[chunk];
                        break;
                    }
                }
            }
            let local = self.chunk - 1;
            let bit = self.mask.trailing_zeros() as usize;
            self.mask &= self.mask - 1;
            let Some(page) = &self.pages[local] else {
                continue;
            };
            if let Some(value) = &page[bit] {
                return Some((join_key(self.offset + local, bit), value));
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.mask.count_ones() as usize
            + self.presence[self.chunk.min(self.presence.len())..]
                .iter()
                .map(|word| word.count_ones() as usize)
                .sum::<usize>();
        (0, Some(remaining.min(KEY_SPACE)))
    }
}

impl<T> std::iter::FusedIterator for Entries<'_, T> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_get_and_presence() {
        let mut index = SparseBitIndex::new();
        assert!(index.is_empty());
        assert_eq!(index.insert(0, 'a'), None);
        assert_eq!(index.insert(65, 'b'), None);
        assert_eq!(index.insert(u16::MAX, 'c'), None);
        assert_eq!(index.insert(65, 'd'), Some('b'));

        assert_eq!(index.len(), 3);
        assert_eq!(index.get(0), Some(&'a'));
        assert_eq!(index.get(65), Some(&'d'));
        assert_eq!(index.get(64), None);
        assert_eq!(index.get(u16::MAX), Some(&'c'));

        assert_eq!(index.presence_word(0), Ok(1));
        assert_eq!(index.presence_word(1), Ok(2));
        assert_eq!(index.presence_word(CHUNK_COUNT - 1), Ok(1 << 63));
        assert_eq!(
            index.presence_word(CHUNK_COUNT),
            Err(IndexError::ChunkOutOfRange { chunk: CHUNK_COUNT })
        );

        assert_eq!(
            index.iter().collect::<Vec<_>>(),
            vec![(0, &'a'), (65, &'d'), (u16::MAX, &'c')]
        );
    }

    #[test]
    fn write_chunk_with_and_without_page() {
        let mut index = SparseBitIndex::new();
        let mut page = empty_page();
        page[0] = Some(10u32);
        page[63] = Some(20u32);
        index.write_chunk(5, 1 | 1 << 63, Some(page)).unwrap();
        assert_eq!(index.get(5 * 64), Some(&10));
        assert_eq!(index.get(5 * 64 + 63), Some(&20));

        // Only the presence word changes when no page is given.
        index.write_chunk(5, 1 << 63, None).unwrap();
        assert_eq!(index.get(5 * 64), None);
        assert_eq!(index.get(5 * 64 + 63), Some(&20));
        assert_eq!(index.len(), 1);

        // A zero word never transfers a page.
        let mut other = empty_page();
        other[1] = Some(30u32);
        index.write_chunk(5, 0, Some(other)).unwrap();
        assert!(index.is_empty());
        assert_eq!(index.store().get(5 * 64 + 63), Some(&20));

        assert!(index.write_chunk(CHUNK_COUNT, 1, None).is_err());
    }

    #[test]
    fn present_bit_without_value_is_skipped() {
        let mut index = SparseBitIndex::<u8>::new();
        index.write_chunk(7, 0b11, None).unwrap();
        assert!(index.contains(7 * 64));
        assert_eq!(index.get(7 * 64), None);
        assert_eq!(index.iter().count(), 0);

        index.insert(7 * 64 + 1, 9);
        assert_eq!(index.get(7 * 64), None);
        assert_eq!(index.iter().collect::<Vec<_>>(), vec![(7 * 64 + 1, &9)]);
    }

    #[test]
    fn views_check_their_window() {
        let mut index: SparseBitIndex<u32> = (0..1000).map(|key| (key * 60, key as u32)).collect();
        let (low, high) = index.view().split_at_chunk(100);
        assert_eq!(low.window(), 0..100);
        assert_eq!(high.window(), 100..CHUNK_COUNT);
        assert_eq!(low.len() + high.len(), index.len());
        assert_eq!(low.get(60), Ok(Some(&1)));
        assert_eq!(
            low.get(100 * 64),
            Err(IndexError::ChunkOutsideWindow {
                chunk: 100,
                window: 0..100
            })
        );
        assert!(high.presence_word(99).is_err());
        assert!(high.iter().all(|(key, _)| key as usize >= 100 * 64));

        let (mut low, mut high) = index.view_mut().split_at_chunk(512);
        assert_eq!(low.insert(0, 77), Ok(Some(0)));
        assert!(low.insert(512 * 64, 1).is_err());
        assert_eq!(high.insert(512 * 64 + 1, 5), Ok(None));
        assert!(high.write_chunk(511, 0, None).is_err());
        high.write_chunk(513, 0, None).unwrap();

        let mut values = [None; CHUNK_SIZE];
        values[1] = Some(41);
        values[2] = Some(42);
        assert_eq!(
            high.write_page(511, &values),
            Err(IndexError::ChunkOutsideWindow {
                chunk: 511,
                window: 512..CHUNK_COUNT
            })
        );
        high.write_page(1000, &values).unwrap();
        assert_eq!(high.presence_word(1000), Ok(0));
        assert_eq!(high.as_view().get(1000 * 64 + 1), Ok(None));
        high.write_chunk(1000, 0b100, None).unwrap();
        assert_eq!(high.as_view().get(1000 * 64 + 2), Ok(Some(&42)));

        assert_eq!(index.get(0), Some(&77));
        assert_eq!(index.get(512 * 64 + 1), Some(&5));
        assert_eq!(index.presence_word(513), Ok(0));
        assert_eq!(index.get(1000 * 64 + 1), None);
        assert_eq!(index.get(1000 * 64 + 2), Some(&42));
    }

    #[test]
    fn split_points_are_checked() {
        let mut index = SparseBitIndex::<u8>::new();
        let (low, high) = index.view().split_at_chunk(10);
        assert_eq!(
            low.try_split_at_chunk(0)
                .map(|(empty, rest)| (empty.window(), rest.window())),
            Ok((0..0, 0..10))
        );
        assert_eq!(
            low.try_split_at_chunk(11).err(),
            Some(IndexError::ChunkOutsideWindow {
                chunk: 11,
                window: 0..10
            })
        );
        assert_eq!(
            high.try_split_at_chunk(CHUNK_COUNT + 1).err(),
            Some(IndexError::ChunkOutOfRange {
                chunk: CHUNK_COUNT + 1
            })
        );
        assert!(high.try_split_at_chunk(CHUNK_COUNT).is_ok());

        let (low, high) = index.view_mut().split_at_chunk(10);
        assert_eq!(
            high.try_split_at_chunk(9).err(),
            Some(IndexError::ChunkOutsideWindow {
                chunk: 9,
                window: 10..CHUNK_COUNT
            })
        );
        let (empty, rest) = low.try_split_at_chunk(10).unwrap();
        assert_eq!((empty.window(), rest.window()), (0..10, 10..10));
    }

    #[test]
    #[should_panic]
    fn split_at_chunk_panics_outside_window() {
        let index = SparseBitIndex::<u8>::new();
        let (low, _) = index.view().split_at_chunk(10);
        low.split_at_chunk(20);
    }

    #[test]
    fn get_or_insert_with_inserts_once() {
        let mut index = SparseBitIndex::new();
        index.get_or_insert_with(3, Vec::new).push(1);
        index.get_or_insert_with(3, Vec::new).push(2);
        assert_eq!(index.get(3), Some(&vec![1, 2]));
        assert_eq!(index.len(), 1);
    }
}
