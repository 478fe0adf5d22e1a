//! XXH3 hashes used to key and verify replay-cache files.

use serde::{Deserialize, Serialize};
use std::fmt;
use xxhash_rust::xxh3::{xxh3_128, Xxh3};

/// A 128-bit XXH3 hash.
///
/// Cache artifacts store the hash of their payload so that a truncated or
/// corrupted file reads as a miss. Trace files are keyed by the hash of their
/// canonical path.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash([u8; 16]);

impl ContentHash {
    /// Hashes one byte slice.
    pub fn from_bytes(data: &[u8]) -> Self {
        Self(xxh3_128(data).to_le_bytes())
    }

    /// Hashes several byte slices as one length-delimited sequence.
    ///
    /// `["ab", "c"]` and `["a", "bc"]` hash differently.
    pub fn from_parts<'a, I>(parts: I) -> Self
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        let mut hasher = Xxh3::new();
        for part in parts {
            hasher.update(&(part.len() as u64).to_le_bytes());
            hasher.update(part);
        }
        Self(hasher.digest128().to_le_bytes())
    }

    /// The first 16 hex digits, used in file names.
    pub fn short(&self) -> String {
        self.0[..8].iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.short())
    }
}
