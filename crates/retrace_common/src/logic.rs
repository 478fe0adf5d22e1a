//! Single four-state logic values.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One bit of a recorded signal: `0`, `1`, unknown `x` or high-impedance `z`.
///
/// VCD dumps and VPI vectors both carry these four states. The replay engine
/// hands scripts two-state values only, so [`Logic::to_bit`] is the projection
/// every reader goes through.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default, Serialize, Deserialize)]
pub enum Logic {
    /// Driven low.
    #[default]
    Zero,
    /// Driven high.
    One,
    /// Unknown.
    X,
    /// Not driven.
    Z,
}

impl Logic {
    /// Parses a VCD value character. Case is ignored for `x` and `z`.
    pub fn from_char(c: char) -> Option<Self> {
        Some(match c.to_ascii_lowercase() {
            '0' => Logic::Zero,
            '1' => Logic::One,
            'x' => Logic::X,
            'z' => Logic::Z,
            _ => return None,
        })
    }

    /// The lowercase character a VCD dump would use.
    pub fn to_char(self) -> char {
        match self {
            Logic::Zero => '0',
            Logic::One => '1',
            Logic::X => 'x',
            Logic::Z => 'z',
        }
    }

    /// Builds a value from its VPI `aval`/`bval` bit pair.
    pub fn from_planes(aval: bool, bval: bool) -> Self {
        match (aval, bval) {
            (false, false) => Logic::Zero,
            (true, false) => Logic::One,
            (false, true) => Logic::Z,
            (true, true) => Logic::X,
        }
    }

    /// The VPI `aval`/`bval` bit pair of this value.
    pub fn planes(self) -> (bool, bool) {
        match self {
            Logic::Zero => (false, false),
            Logic::One => (true, false),
            Logic::Z => (false, true),
            Logic::X => (true, true),
        }
    }

    /// `true` for `0` and `1`.
    pub fn is_known(self) -> bool {
        matches!(self, Logic::Zero | Logic::One)
    }

    /// Two-state projection. Only `1` reads as set.
    pub fn to_bit(self) -> bool {
        self == Logic::One
    }
}

impl fmt::Display for Logic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_char())
    }
}
