//! Checksummed artifact files.
//!
//! An artifact file is laid out as
//!
//! ```text
//! "RTRC" | header length (u32 LE) | bincode ArtifactHeader | payload
//! ```
//!
//! The header records the format version, the producing tool version, the
//! payload length and its XXH3 hash. A file that fails any of these checks is
//! reported as an error by [`ArtifactStore::read_checked`] and as a miss by
//! [`ArtifactStore::read`].

use std::path::{Path, PathBuf};

use retrace_common::ContentHash;
use serde::{Deserialize, Serialize};

use crate::error::CacheError;

const MAGIC: [u8; 4] = *b"RTRC";

/// Layout version of artifact files. Bump when the header or a payload
/// encoding changes.
pub const FORMAT_VERSION: u32 = 2;

/// The two kinds of derived data kept per trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    /// The sorted, deduplicated table of recorded times.
    TimeTable,
    /// Previously resolved signal names.
    SignalNames,
}

impl ArtifactKind {
    /// Subdirectory of the cache holding artifacts of this kind.
    pub fn dir(self) -> &'static str {
        match self {
            ArtifactKind::TimeTable => "times",
            ArtifactKind::SignalNames => "names",
        }
    }

    /// File extension of artifacts of this kind.
    pub fn extension(self) -> &'static str {
        match self {
            ArtifactKind::TimeTable => "tidx",
            ArtifactKind::SignalNames => "sig",
        }
    }
}

/// Metadata written in front of every payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactHeader {
    /// [`FORMAT_VERSION`] at write time.
    pub format_version: u32,
    /// Version of the tool that wrote the file.
    pub tool_version: String,
    /// Payload length in bytes.
    pub payload_len: u64,
    /// XXH3 of the payload.
    pub checksum: ContentHash,
}

/// Artifact files under one cache directory.
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Creates a store rooted at `root`. Nothing is created on disk until the
    /// first write.
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    /// Path of the `kind` artifact for trace `key`.
    pub fn path(&self, kind: ArtifactKind, key: &str) -> PathBuf {
        self.root
            .join(kind.dir())
            .join(format!("{key}.{}", kind.extension()))
    }

    /// Writes `payload` as the `kind` artifact of `key`, replacing any previous
    /// file.
    ///
    /// The file is written to a `.tmp` sibling and renamed into place.
    pub fn write(
        &self,
        kind: ArtifactKind,
        key: &str,
        payload: &[u8],
        tool_version: &str,
    ) -> Result<PathBuf, CacheError> {
        let dir = self.root.join(kind.dir());
        std::fs::create_dir_all(&dir).map_err(|e| CacheError::Io {
            path: dir,
            source: e,
        })?;

        let header = ArtifactHeader {
            format_version: FORMAT_VERSION,
            tool_version: tool_version.to_string(),
            payload_len: payload.len() as u64,
            checksum: ContentHash::from_bytes(payload),
        };
        let file = frame(&header, payload)?;

        let path = self.path(kind, key);
        let tmp = path.with_extension(format!("{}.tmp", kind.extension()));
        std::fs::write(&tmp, &file).map_err(|e| CacheError::Io {
            path: tmp.clone(),
            source: e,
        })?;
        std::fs::rename(&tmp, &path).map_err(|e| CacheError::Io {
            path: path.clone(),
            source: e,
        })?;
        Ok(path)
    }

    /// Reads a payload, treating every failure as a miss.
    ///
    /// A file that exists but fails validation is logged at `warn`.
    pub fn read(&self, kind: ArtifactKind, key: &str) -> Option<Vec<u8>> {
        self.read_checked(kind, key).unwrap_or_else(|e| {
            log::warn!("ignoring cached artifact: {e}");
            None
        })
    }

    /// Reads and validates a payload. A missing file is `Ok(None)`.
    pub fn read_checked(&self, kind: ArtifactKind, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let path = self.path(kind, key);
        let raw = match std::fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CacheError::Io { path, source: e }),
        };
        unframe(&raw, &path).map(Some)
    }

    /// Deletes the `kind` artifact of `key` if present.
    pub fn remove(&self, kind: ArtifactKind, key: &str) -> Result<(), CacheError> {
        let path = self.path(kind, key);
        match std::fs::remove_file(&path) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(CacheError::Io { path, source: e }),
            _ => Ok(()),
        }
    }
}

fn frame(header: &ArtifactHeader, payload: &[u8]) -> Result<Vec<u8>, CacheError> {
    let header = bincode::serde::encode_to_vec(header, bincode::config::standard())
        .map_err(|e| CacheError::Encode(e.to_string()))?;
    let mut file = Vec::with_capacity(8 + header.len() + payload.len());
    file.extend_from_slice(&MAGIC);
    file.extend_from_slice(&(header.len() as u32).to_le_bytes());
    file.extend_from_slice(&header);
    file.extend_from_slice(payload);
    Ok(file)
}

fn unframe(raw: &[u8], path: &Path) -> Result<Vec<u8>, CacheError> {
    let corrupt = |reason: String| CacheError::Corrupt {
        path: path.to_path_buf(),
        reason,
    };

    let (magic, rest) = raw
        .split_first_chunk::<4>()
        .ok_or_else(|| corrupt("shorter than the magic bytes".to_string()))?;
    if *magic != MAGIC {
        return Err(corrupt("not a retrace cache artifact".to_string()));
    }
    let (len, rest) = rest
        .split_first_chunk::<4>()
        .ok_or_else(|| corrupt("missing header length".to_string()))?;
    let header_len = u32::from_le_bytes(*len) as usize;
    if rest.len() < header_len {
        return Err(corrupt("truncated header".to_string()));
    }
    let (header_bytes, payload) = rest.split_at(header_len);

    let (header, _): (ArtifactHeader, usize) =
        bincode::serde::decode_from_slice(header_bytes, bincode::config::standard())
            .map_err(|e| corrupt(format!("undecodable header: {e}")))?;
    if header.format_version != FORMAT_VERSION {
        return Err(CacheError::FormatVersion {
            path: path.to_path_buf(),
            found: header.format_version,
            supported: FORMAT_VERSION,
        });
    }
    if payload.len() as u64 != header.payload_len {
        return Err(corrupt(format!(
            "payload is {} bytes, header says {}",
            payload.len(),
            header.payload_len
        )));
    }
    let computed = ContentHash::from_bytes(payload);
    if computed != header.checksum {
        return Err(CacheError::Checksum {
            path: path.to_path_buf(),
            stored: header.checksum,
            computed,
        });
    }
    Ok(payload.to_vec())
}
