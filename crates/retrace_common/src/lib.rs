//! Value types shared by the retrace crates.
//!
//! [`Logic`] and [`LogicVec`] carry four-state signal values from a trace to
//! the replay engine. [`ContentHash`] keys and checksums replay-cache files.

#![warn(missing_docs)]

pub mod hash;
pub mod logic;
pub mod logic_vec;

pub use hash::ContentHash;
pub use logic::Logic;
pub use logic_vec::LogicVec;
