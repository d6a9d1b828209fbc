//! Invertible scattering of row prefixes over the key space.
use crate::Key;

const MULTIPLIER: u16 = 0x9e37;

const MULTIPLIER_INV: u16 = {
    // Newton's iteration doubles the number of correct low bits, starting from 3.
    let mut inv = MULTIPLIER;
    let mut round = 0;
    while round < 4 {
        inv = inv.wrapping_mul(2u16.wrapping_sub(MULTIPLIER.wrapping_mul(inv)));
        round += 1;
    }
    assert!(MULTIPLIER.wrapping_mul(inv) == 1);
    inv
};

/// Maps a 16-bit value to a key, spreading consecutive values over distant chunks.
///
/// This is a bijection on `u16`, inverted by [`gather`]. Dense row ids share only a few high
/// parts, which would otherwise all fall into the first chunks and thus into the first partition.
#[inline]
pub fn scatter(value: u16) -> Key {
    let mixed = value.wrapping_mul(MULTIPLIER);
    mixed ^ (mixed >> 8)
}

/// Inverse of [`scatter`].
#[inline]
pub fn gather(key: Key) -> u16 {
    (key ^ (key >> 8)).wrapping_mul(MULTIPLIER_INV)
}

/// How the high 16 bits of a `u32` row id are turned into a key.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum KeyLayout {
    /// Keys are the [`scatter`]ed high parts.
    #[default]
    Scattered,
    /// Keys are the high parts themselves.
    Identity,
}

impl KeyLayout {
    /// Returns the key storing the rows with the given high part.
    #[inline]
    pub fn key(self, high: u16) -> Key {
        match self {
            KeyLayout::Scattered => scatter(high),
            KeyLayout::Identity => high,
        }
    }

    /// Returns the high part of the rows stored under a key.
    #[inline]
    pub fn high(self, key: Key) -> u16 {
        match self {
            KeyLayout::Scattered => gather(key),
            KeyLayout::Identity => key,
        }
    }

    /// Splits a row id into its key and its low 16 bits.
    #[inline]
    pub fn split_row(self, row: u32) -> (Key, u16) {
        (self.key((row >> 16) as u16), row as u16)
    }

    /// Inverse of [`split_row`][Self::split_row].
    #[inline]
    pub fn join_row(self, key: Key, low: u16) -> u32 {
        (self.high(key) as u32) << 16 | low as u32
    }
}
