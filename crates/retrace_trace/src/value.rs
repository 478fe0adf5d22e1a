//! Value formats handed to scripts.

use retrace_common::LogicVec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::TraceError;

/// The representation a caller asks a signal value to be decoded into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ValueFormat {
    /// Low 32 bits as an unsigned integer.
    #[default]
    Integer,
    /// Binary string, MSB first, exactly `width` characters.
    BinStr,
    /// Lowercase hex string, `ceil(width / 4)` digits.
    HexStr,
    /// 32-bit chunks, least significant first.
    Vector,
}

impl FromStr for ValueFormat {
    type Err = TraceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "int" | "integer" => Ok(ValueFormat::Integer),
            "bin" | "binary" => Ok(ValueFormat::BinStr),
            "hex" => Ok(ValueFormat::HexStr),
            "vec" | "vector" => Ok(ValueFormat::Vector),
            other => Err(TraceError::UnknownFormat(other.to_string())),
        }
    }
}

/// One 32-bit chunk of a vector value.
///
/// `bval` marks unknown bits in the four-state encoding; the replay engine is
/// two-state, so it is always 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VecVal {
    /// Value bits.
    pub aval: u32,
    /// Unknown-bit mask.
    pub bval: u32,
}

/// A decoded signal value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalValue {
    /// See [`ValueFormat::Integer`].
    Integer(u32),
    /// See [`ValueFormat::BinStr`].
    BinStr(String),
    /// See [`ValueFormat::HexStr`].
    HexStr(String),
    /// See [`ValueFormat::Vector`].
    Vector(Vec<VecVal>),
}

impl SignalValue {
    /// Decodes a four-state value into `format`.
    pub fn from_bits(bits: &LogicVec, format: ValueFormat) -> Self {
        match format {
            ValueFormat::Integer => SignalValue::Integer(bits.to_word()),
            ValueFormat::BinStr => SignalValue::BinStr(bits.to_bin_string()),
            ValueFormat::HexStr => SignalValue::HexStr(bits.to_hex_string()),
            ValueFormat::Vector => SignalValue::Vector(
                bits.to_words()
                    .into_iter()
                    .map(|aval| VecVal { aval, bval: 0 })
                    .collect(),
            ),
        }
    }

    /// Decodes a cached two-state word of a signal at most 32 bits wide.
    ///
    /// Produces exactly what [`SignalValue::from_bits`] produces for the
    /// equivalent vector.
    pub fn from_word(word: u32, width: u32, format: ValueFormat) -> Self {
        let word = mask_to_width(word, width);
        match format {
            ValueFormat::Integer => SignalValue::Integer(word),
            ValueFormat::Vector => SignalValue::Vector(vec![VecVal { aval: word, bval: 0 }]),
            _ => Self::from_bits(&LogicVec::from_u64(word as u64, width), format),
        }
    }

    /// Returns the integer value if this is [`SignalValue::Integer`].
    pub fn as_integer(&self) -> Option<u32> {
        match self {
            SignalValue::Integer(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for SignalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalValue::Integer(v) => write!(f, "{v}"),
            SignalValue::BinStr(s) => write!(f, "'b{s}"),
            SignalValue::HexStr(s) => write!(f, "'h{s}"),
            SignalValue::Vector(words) => {
                write!(f, "[")?;
                for (i, w) in words.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{:#010x}", w.aval)?;
                }
                write!(f, "]")
            }
        }
    }
}

fn mask_to_width(word: u32, width: u32) -> u32 {
    if width >= 32 {
        word
    } else {
        word & ((1u32 << width) - 1)
    }
}
