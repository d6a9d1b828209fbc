//! Set algebra required from the values of a [`SplitMap`](crate::SplitMap).
use roaring::RoaringBitmap;

/// A set of 16-bit low row parts stored under one key of a [`SplitMap`](crate::SplitMap).
///
/// The index never inspects the representation of a container. Circuits over split maps combine
/// containers using these operations, and [`cardinality`][Self::cardinality] lets them skip empty
/// operands. The [`Default`] value is the empty set.
pub trait Container: Clone + Default {
    /// Returns the number of elements.
    fn cardinality(&self) -> u64;

    /// Returns `true` when the container has no elements.
    fn is_empty(&self) -> bool {
        self.cardinality() == 0
    }

    /// Returns the elements contained in either container.
    fn union(&self, other: &Self) -> Self;

    /// Returns the elements contained in both containers.
    fn intersection(&self, other: &Self) -> Self;

    /// Returns the elements contained in exactly one of the containers.
    fn symmetric_difference(&self, other: &Self) -> Self;

    /// Adds the elements of `other` to `self`.
    fn union_with(&mut self, other: &Self);
}

impl Container for RoaringBitmap {
    fn cardinality(&self) -> u64 {
        self.len()
    }

    fn is_empty(&self) -> bool {
        RoaringBitmap::is_empty(self)
    }

    fn union(&self, other: &Self) -> Self {
        self | other
    }

    fn intersection(&self, other: &Self) -> Self {
        self & other
    }

    fn symmetric_difference(&self, other: &Self) -> Self {
        self ^ other
    }

    fn union_with(&mut self, other: &Self) {
        *self |= other;
    }
}
