//! Per-trace cache orchestrator.
//!
//! [`TraceCache`] ties together the manifest, the artifact store and the
//! trace's freshness stamp. It exposes typed load/store operations for the two
//! pieces of derived data the replay engine persists: the sorted unique time
//! table and the table of previously resolved signal names.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use retrace_common::ContentHash;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::artifact::{ArtifactKind, ArtifactStore};
use crate::error::CacheError;
use crate::manifest::{CacheManifest, TraceEntry};
use crate::stamp::SourceStamp;

/// Smallest signal-name table worth writing back to disk.
///
/// Short scripts that resolve a handful of names gain nothing from the file.
pub const MIN_PERSISTED_SIGNALS: usize = 15;

/// A resolved signal as remembered between runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSignal {
    /// The oracle's reference for the signal.
    pub signal_ref: u32,
    /// Bit width reported by the oracle.
    pub width: u32,
    /// Variable kind name reported by the oracle.
    pub var_type: String,
}

/// Previously resolved signal names, keyed by full hierarchical name.
pub type SignalNameTable = BTreeMap<String, PersistedSignal>;

/// Cache of derived data for one trace file.
///
/// Opening the cache reads the trace's current [`SourceStamp`]. If the manifest
/// recorded a different stamp for this trace, every artifact of the trace is
/// considered stale and loads return `None` until new data is stored.
pub struct TraceCache {
    /// Root directory for all cache files.
    cache_dir: PathBuf,

    /// The cache manifest shared by all traces in this directory.
    manifest: CacheManifest,

    /// Binary artifact store.
    store: ArtifactStore,

    /// Artifact key derived from the trace path.
    key: String,

    /// Current state of this trace's entry.
    entry: TraceEntry,

    /// Version string for compatibility checks.
    tool_version: String,
}

impl TraceCache {
    /// Opens the cache for `trace_path` under `cache_dir`.
    ///
    /// Fails only if the trace itself cannot be stat'ed. An absent, corrupt or
    /// incompatible manifest starts a fresh cache.
    pub fn open(cache_dir: &Path, trace_path: &Path, tool_version: &str) -> Result<Self, CacheError> {
        let stamp = SourceStamp::of(trace_path)?;
        let manifest = CacheManifest::load(cache_dir)
            .filter(|m| m.is_compatible(tool_version))
            .unwrap_or_else(|| CacheManifest::new(tool_version));

        let path_str = std::fs::canonicalize(trace_path)
            .unwrap_or_else(|_| trace_path.to_path_buf())
            .display()
            .to_string();
        let key = ContentHash::from_bytes(path_str.as_bytes()).short();

        let entry = match manifest.traces.get(&key) {
            Some(entry) if entry.stamp == stamp => entry.clone(),
            Some(_) => {
                log::info!("{path_str} changed since it was cached; rebuilding derived data");
                TraceEntry::new(&path_str, stamp)
            }
            None => TraceEntry::new(&path_str, stamp),
        };

        Ok(Self {
            cache_dir: cache_dir.to_path_buf(),
            manifest,
            store: ArtifactStore::new(cache_dir),
            key,
            entry,
            tool_version: tool_version.to_string(),
        })
    }

    /// Returns the cache directory.
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Returns the trace's current stamp.
    pub fn stamp(&self) -> SourceStamp {
        self.entry.stamp
    }

    /// Loads the persisted time table if it is fresh and intact.
    pub fn load_time_table(&self) -> Option<Vec<u64>> {
        if !self.entry.has_time_table {
            return None;
        }
        self.read_typed(ArtifactKind::TimeTable)
    }

    /// Persists the time table and records it in the manifest.
    pub fn store_time_table(&mut self, times: &[u64]) -> Result<(), CacheError> {
        self.write_typed(ArtifactKind::TimeTable, times)?;
        self.entry.has_time_table = true;
        self.save()
    }

    /// Loads the persisted signal-name table if it is fresh and intact.
    pub fn load_signal_names(&self) -> Option<SignalNameTable> {
        self.entry.signal_names?;
        self.read_typed(ArtifactKind::SignalNames)
    }

    /// Persists the signal-name table and records it in the manifest.
    pub fn store_signal_names(&mut self, table: &SignalNameTable) -> Result<(), CacheError> {
        self.write_typed(ArtifactKind::SignalNames, table)?;
        self.entry.signal_names = Some(table.len());
        self.save()
    }

    /// Deletes the whole cache directory. Returns `false` if it did not exist.
    pub fn clear(cache_dir: &Path) -> Result<bool, CacheError> {
        match std::fs::remove_dir_all(cache_dir) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CacheError::Io {
                path: cache_dir.to_path_buf(),
                source: e,
            }),
        }
    }

    fn read_typed<T: DeserializeOwned>(&self, kind: ArtifactKind) -> Option<T> {
        let bytes = self.store.read(kind, &self.key)?;
        match bincode::serde::decode_from_slice(&bytes, bincode::config::standard()) {
            Ok((value, _)) => Some(value),
            Err(e) => {
                log::warn!("ignoring undecodable {kind:?} artifact: {e}");
                None
            }
        }
    }

    fn write_typed<T: Serialize + ?Sized>(&self, kind: ArtifactKind, value: &T) -> Result<(), CacheError> {
        let bytes = bincode::serde::encode_to_vec(value, bincode::config::standard())
            .map_err(|e| CacheError::Encode(e.to_string()))?;
        self.store.write(kind, &self.key, &bytes, &self.tool_version)?;
        Ok(())
    }

    fn save(&mut self) -> Result<(), CacheError> {
        self.manifest
            .traces
            .insert(self.key.clone(), self.entry.clone());
        self.manifest.save(&self.cache_dir)
    }
}
