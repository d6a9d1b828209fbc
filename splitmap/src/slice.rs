//! Per-key join rows handed to circuits.
use std::{fmt, ops::Index};

/// The values that the joined inputs hold for one key.
///
/// A slice associates every participating filter with a value. Filters are shared by all slices of
/// one evaluation and kept in input order, so a slice can be addressed either by filter identity
/// ([`get`][Self::get]) or by input position (indexing). Inputs that have no value for the key
/// hold the default value given to the evaluation.
#[derive(Clone, PartialEq, Eq)]
pub struct Slice<'f, F, T> {
    filters: &'f [F],
    values: Vec<T>,
}

impl<F: fmt::Debug, T: fmt::Debug> fmt::Debug for Slice<'_, F, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<'f, F, T> Slice<'f, F, T> {
    /// Creates a slice holding `default` for every filter.
    pub fn filled(filters: &'f [F], default: T) -> Self
    where
        T: Clone,
    {
        Self {
            filters,
            values: vec![default; filters.len()],
        }
    }

    /// Creates a slice from filters and values given in the same order.
    ///
    /// # Panics
    /// Panics when the lengths differ.
    pub fn from_values(filters: &'f [F], values: Vec<T>) -> Self {
        assert_eq!(filters.len(), values.len(), "one value per filter required");
        Self { filters, values }
    }

    /// Returns the number of participating filters.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` when no filter participates.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the participating filters in input order.
    pub fn filters(&self) -> &'f [F] {
        self.filters
    }

    /// Returns the values in input order.
    pub fn values(&self) -> &[T] {
        &self.values
    }

    /// Consumes the slice, returning the values in input order.
    pub fn into_values(self) -> Vec<T> {
        self.values
    }

    /// Returns the position of a filter among the participating filters.
    pub fn position(&self, filter: &F) -> Option<usize>
    where
        F: PartialEq,
    {
        self.filters.iter().position(|candidate| candidate == filter)
    }

    /// Returns the value of a filter, or `None` if the filter does not participate.
    pub fn get(&self, filter: &F) -> Option<&T>
    where
        F: PartialEq,
    {
        self.position(filter).map(|position| &self.values[position])
    }

    /// Returns a mutable reference to the value of a filter.
    pub fn get_mut(&mut self, filter: &F) -> Option<&mut T>
    where
        F: PartialEq,
    {
        self.position(filter)
            .map(move |position| &mut self.values[position])
    }

    /// Sets the value of a filter, returning `false` if the filter does not participate.
    pub fn set(&mut self, filter: &F, value: T) -> bool
    where
        F: PartialEq,
    {
        match self.get_mut(filter) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Takes the value of a filter, leaving the default of `T` in its place.
    pub fn take(&mut self, filter: &F) -> Option<T>
    where
        F: PartialEq,
        T: Default,
    {
        self.get_mut(filter).map(std::mem::take)
    }

    pub(crate) fn set_at(&mut self, position: usize, value: T) {
        self.values[position] = value;
    }

    /// Iterates over filters and their values in input order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = (&'f F, &T)> + '_ {
        self.filters.iter().zip(self.values.iter())
    }
}

impl<F, T> Index<usize> for Slice<'_, F, T> {
    type Output = T;

    fn index(&self, position: usize) -> &T {
        &self.values[position]
    }
}

impl<'a, F, T> IntoIterator for &'a Slice<'_, F, T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}

impl<F, T> IntoIterator for Slice<'_, F, T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}
