//! The `manifest.json` index of a cache directory.
//!
//! One manifest is shared by every trace replayed against the same cache
//! directory. Each trace gets a [`TraceEntry`] keyed by the short hash of its
//! canonical path; the entry remembers the [`SourceStamp`] the artifacts were
//! built from and which artifacts were written.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::CacheError;
use crate::stamp::SourceStamp;

/// Index of a cache directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheManifest {
    /// Version of the tool that last wrote the manifest.
    pub tool_version: String,
    /// Entries by trace key.
    pub traces: BTreeMap<String, TraceEntry>,
}

/// What the cache holds for one trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEntry {
    /// Canonical trace path, kept for humans reading the manifest.
    pub path: String,
    /// Size and mtime of the trace the artifacts were derived from.
    pub stamp: SourceStamp,
    /// A time table was written.
    pub has_time_table: bool,
    /// Length of the written signal-name table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal_names: Option<usize>,
}

impl TraceEntry {
    /// An entry with no artifacts yet.
    pub fn new(path: &str, stamp: SourceStamp) -> Self {
        Self {
            path: path.to_owned(),
            stamp,
            has_time_table: false,
            signal_names: None,
        }
    }
}

impl CacheManifest {
    /// File name of the manifest inside a cache directory.
    pub const FILE_NAME: &'static str = "manifest.json";

    /// An empty manifest stamped with `tool_version`.
    pub fn new(tool_version: &str) -> Self {
        Self {
            tool_version: tool_version.to_owned(),
            traces: BTreeMap::new(),
        }
    }

    /// Location of the manifest inside `cache_dir`.
    pub fn path_in(cache_dir: &Path) -> PathBuf {
        cache_dir.join(Self::FILE_NAME)
    }

    /// Reads the manifest of `cache_dir`.
    ///
    /// A missing file is `None`. An unreadable or malformed one is logged and
    /// is `None` as well, so the caller starts over.
    pub fn load(cache_dir: &Path) -> Option<Self> {
        let path = Self::path_in(cache_dir);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                log::warn!("cannot read cache manifest {}: {e}", path.display());
                return None;
            }
        };
        serde_json::from_str(&text)
            .map_err(|e| log::warn!("discarding malformed cache manifest {}: {e}", path.display()))
            .ok()
    }

    /// Writes the manifest into `cache_dir`, creating the directory first.
    pub fn save(&self, cache_dir: &Path) -> Result<(), CacheError> {
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source: std::io::Error| CacheError::Io { path, source }
        };
        std::fs::create_dir_all(cache_dir).map_err(io_err(cache_dir))?;
        let json = serde_json::to_vec_pretty(self).map_err(|e| CacheError::Encode(e.to_string()))?;
        let path = Self::path_in(cache_dir);
        std::fs::write(&path, json).map_err(io_err(&path))
    }

    /// Artifacts are only reused by the exact version that wrote them.
    pub fn is_compatible(&self, current_version: &str) -> bool {
        self.tool_version == current_version
    }
}
