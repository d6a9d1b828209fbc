//! Lazily paged value storage covering the full key space.
use std::fmt;

use crate::{check_chunk, empty_page, split_key, IndexError, Key, Page, CHUNK_COUNT, CHUNK_SIZE};

/// Storage for one optional value per key, grouped into [`CHUNK_COUNT`] pages of [`CHUNK_SIZE`]
/// slots.
///
/// Pages are allocated on the first write into them and stay allocated afterwards. The store does
/// not track which keys are present, that is the job of the presence bitmap of the owning
/// [`SparseBitIndex`](crate::SparseBitIndex). A slot can therefore hold a value that is no longer
/// reachable through the index.
pub struct ChunkedValueStore<T> {
    pages: Box<[Option<Page<T>>]>,
}

impl<T> Default for ChunkedValueStore<T> {
    fn default() -> Self {
        Self {
            pages: (0..CHUNK_COUNT).map(|_| None).collect(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for ChunkedValueStore<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(
                self.pages
                    .iter()
                    .enumerate()
                    .filter_map(|(chunk, page)| Some((chunk, page.as_deref()?))),
            )
            .finish()
    }
}

impl<T> ChunkedValueStore<T> {
    /// Creates a store with all pages absent.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value stored in the slot of a key, if any.
    #[inline(always)]
    pub fn get(&self, key: Key) -> Option<&T> {
        let (chunk, bit) = split_key(key);
        self.pages[chunk].as_ref()?[bit].as_ref()
    }

    /// Returns a mutable reference to the value stored in the slot of a key, if any.
    #[inline(always)]
    pub fn get_mut(&mut self, key: Key) -> Option<&mut T> {
        let (chunk, bit) = split_key(key);
        self.pages[chunk].as_mut()?[bit].as_mut()
    }

    /// Stores a value in the slot of a key, allocating its page if necessary.
    ///
    /// Returns the value previously stored in the slot.
    #[inline(always)]
    pub fn put(&mut self, key: Key, value: T) -> Option<T> {
        let (chunk, bit) = split_key(key);
        self.pages[chunk].get_or_insert_with(empty_page)[bit].replace(value)
    }

    /// Returns the page of a chunk if it was allocated.
    pub fn page(&self, chunk: usize) -> Result<Option<&[Option<T>; CHUNK_SIZE]>, IndexError> {
        check_chunk(chunk)?;
        Ok(self.pages[chunk].as_deref())
    }

    /// Copies the page of a chunk into a caller provided buffer.
    ///
    /// Returns whether the page was allocated. For absent pages, the buffer is filled with `None`.
    pub fn read_page(
        &self,
        chunk: usize,
        out: &mut [Option<T>; CHUNK_SIZE],
    ) -> Result<bool, IndexError>
    where
        T: Clone,
    {
        check_chunk(chunk)?;
        Ok(read_slot(&self.pages[chunk], out))
    }

    /// Copies a caller provided buffer into the page of a chunk, allocating it if necessary.
    pub fn write_page(
        &mut self,
        chunk: usize,
        input: &[Option<T>; CHUNK_SIZE],
    ) -> Result<(), IndexError>
    where
        T: Clone,
    {
        check_chunk(chunk)?;
        write_slot(&mut self.pages[chunk], input);
        Ok(())
    }

    /// Adopts a caller provided page for a chunk without copying it.
    ///
    /// Returns the page that was replaced, if any.
    pub fn transfer_page(
        &mut self,
        chunk: usize,
        page: Page<T>,
    ) -> Result<Option<Page<T>>, IndexError> {
        check_chunk(chunk)?;
        Ok(self.pages[chunk].replace(page))
    }

    /// Returns the number of allocated pages.
    pub fn allocated_pages(&self) -> usize {
        self.pages.iter().filter(|page| page.is_some()).count()
    }

    pub(crate) fn pages(&self) -> &[Option<Page<T>>] {
        &self.pages
    }

    pub(crate) fn pages_mut(&mut self) -> &mut [Option<Page<T>>] {
        &mut self.pages
    }
}

/// Clones a page slot into `out`, filling it with `None` when the page is absent.
pub(crate) fn read_slot<T: Clone>(
    slot: &Option<Page<T>>,
    out: &mut [Option<T>; CHUNK_SIZE],
) -> bool {
    match slot {
        Some(page) => {
            out.clone_from(&**page);
            true
        }
        None => {
            out.fill_with(|| None);
            false
        }
    }
}

/// Clones `input` into a page slot, allocating the page if it is absent.
pub(crate) fn write_slot<T: Clone>(slot: &mut Option<Page<T>>, input: &[Option<T>; CHUNK_SIZE]) {
    match slot {
        Some(page) => (**page).clone_from(input),
        None => *slot = Some(Box::new(input.clone())),
    }
}
