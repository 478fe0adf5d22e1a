//! Fixed-width four-state vectors.
//!
//! A [`LogicVec`] stores a signal value the way VPI `s_vpi_vecval` does: two
//! parallel planes of 32-bit words, `aval` and `bval`, least significant word
//! first. A bit is known when its `bval` bit is clear, and then `aval` holds
//! it. The two-state projections mask unknown bits to 0, so they are cheap
//! word operations rather than per-bit loops.

use crate::logic::Logic;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A four-state bit vector of fixed width. Bit 0 is the least significant.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LogicVec {
    width: u32,
    aval: Vec<u32>,
    bval: Vec<u32>,
}

impl LogicVec {
    /// An all-zero vector.
    pub fn new(width: u32) -> Self {
        let words = width.div_ceil(32) as usize;
        Self {
            width,
            aval: vec![0; words],
            bval: vec![0; words],
        }
    }

    /// Number of bits.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// # Panics
    ///
    /// Panics if `index >= self.width()`.
    pub fn get(&self, index: u32) -> Logic {
        let (word, mask) = self.locate(index);
        Logic::from_planes(self.aval[word] & mask != 0, self.bval[word] & mask != 0)
    }

    /// # Panics
    ///
    /// Panics if `index >= self.width()`.
    pub fn set(&mut self, index: u32, value: Logic) {
        let (word, mask) = self.locate(index);
        let (a, b) = value.planes();
        apply(&mut self.aval[word], mask, a);
        apply(&mut self.bval[word], mask, b);
    }

    /// The low `width` bits of `value`, all known.
    pub fn from_u64(value: u64, width: u32) -> Self {
        let mut v = Self::new(width);
        if let Some(low) = v.aval.first_mut() {
            *low = value as u32;
        }
        if let Some(high) = v.aval.get_mut(1) {
            *high = (value >> 32) as u32;
        }
        v.clear_padding();
        v
    }

    /// Parses an MSB-first string of `0 1 x z` digits, one bit per digit.
    pub fn from_binary_str(s: &str) -> Option<Self> {
        let mut v = Self::new(s.chars().count() as u32);
        for (i, c) in s.chars().rev().enumerate() {
            v.set(i as u32, Logic::from_char(c)?);
        }
        Some(v)
    }

    /// `true` if any bit is `x` or `z`.
    pub fn has_unknown(&self) -> bool {
        self.bval.iter().any(|&w| w != 0)
    }

    /// Two-state value of bits 0..32.
    pub fn to_word(&self) -> u32 {
        self.known_word(0)
    }

    /// Two-state value as 32-bit words, least significant first. A zero-width
    /// vector still yields one word.
    pub fn to_words(&self) -> Vec<u32> {
        let count = self.aval.len().max(1);
        (0..count).map(|w| self.known_word(w)).collect()
    }

    /// Two-state binary digits, MSB first, exactly `width` long.
    pub fn to_bin_string(&self) -> String {
        (0..self.width)
            .rev()
            .map(|i| if self.get(i).to_bit() { '1' } else { '0' })
            .collect()
    }

    /// Two-state lowercase hex digits, MSB first, `ceil(width / 4)` long.
    pub fn to_hex_string(&self) -> String {
        let digits = self.width.div_ceil(4);
        (0..digits)
            .rev()
            .map(|d| {
                let word = self.known_word((d / 8) as usize);
                let nibble = (word >> ((d % 8) * 4)) & 0xf;
                char::from_digit(nibble, 16).unwrap_or('0')
            })
            .collect()
    }

    fn known_word(&self, word: usize) -> u32 {
        match (self.aval.get(word), self.bval.get(word)) {
            (Some(a), Some(b)) => a & !b,
            _ => 0,
        }
    }

    fn locate(&self, index: u32) -> (usize, u32) {
        assert!(
            index < self.width,
            "bit {index} is outside a {}-bit vector",
            self.width
        );
        ((index / 32) as usize, 1 << (index % 32))
    }

    fn clear_padding(&mut self) {
        let used = self.width % 32;
        if used == 0 {
            return;
        }
        let mask = (1u32 << used) - 1;
        if let Some(top) = self.aval.last_mut() {
            *top &= mask;
        }
    }
}

fn apply(word: &mut u32, mask: u32, on: bool) {
    if on {
        *word |= mask;
    } else {
        *word &= !mask;
    }
}

impl fmt::Display for LogicVec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        (0..self.width)
            .rev()
            .try_for_each(|i| write!(f, "{}", self.get(i)))
    }
}

impl fmt::Debug for LogicVec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LogicVec[{}]({self})", self.width)
    }
}
