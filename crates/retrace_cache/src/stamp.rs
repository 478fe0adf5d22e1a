//! Freshness stamps for source trace files.

use std::path::Path;
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};

use crate::error::CacheError;

/// Size and modification time of a trace file when its derived data was cached.
///
/// A cached entry is fresh only if the current stamp of the trace is equal to
/// the recorded one. Content is never hashed: traces can be gigabytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceStamp {
    /// File size in bytes.
    pub size: u64,
    /// Modification time, whole seconds since the Unix epoch.
    pub modified_secs: u64,
    /// Sub-second part of the modification time.
    pub modified_nanos: u32,
}

impl SourceStamp {
    /// Reads the stamp of the file at `path`.
    pub fn of(path: &Path) -> Result<Self, CacheError> {
        let io_err = |source| CacheError::Io {
            path: path.to_path_buf(),
            source,
        };
        let meta = std::fs::metadata(path).map_err(io_err)?;
        let modified = meta.modified().map_err(io_err)?;
        // Pre-epoch timestamps collapse to zero; they still compare consistently.
        let since_epoch = modified.duration_since(UNIX_EPOCH).unwrap_or_default();
        Ok(Self {
            size: meta.len(),
            modified_secs: since_epoch.as_secs(),
            modified_nanos: since_epoch.subsec_nanos(),
        })
    }
}
