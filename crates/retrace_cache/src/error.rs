//! Replay-cache errors.

use std::path::PathBuf;

use retrace_common::ContentHash;

/// A failure while reading or writing the replay cache.
///
/// The replay engine never fails because of its cache: read errors become
/// misses and write errors are logged.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The filesystem refused an operation.
    #[error("cannot access replay cache at {path}: {source}")]
    Io {
        /// File or directory involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// An artifact is truncated or its header does not decode.
    #[error("corrupt cache artifact {path}: {reason}")]
    Corrupt {
        /// Artifact file.
        path: PathBuf,
        /// What was wrong with it.
        reason: String,
    },

    /// An artifact's payload does not hash to the checksum in its header.
    #[error("cache artifact {path} failed its integrity check (stored {stored}, computed {computed})")]
    Checksum {
        /// Artifact file.
        path: PathBuf,
        /// Checksum recorded when the artifact was written.
        stored: ContentHash,
        /// Checksum of the payload as read.
        computed: ContentHash,
    },

    /// An artifact was written in a layout this build does not read.
    #[error("cache artifact {path} uses format {found}, this build reads format {supported}")]
    FormatVersion {
        /// Artifact file.
        path: PathBuf,
        /// Format version found in the header.
        found: u32,
        /// Format version this build writes.
        supported: u32,
    },

    /// Cached data could not be encoded.
    #[error("cannot encode cache data: {0}")]
    Encode(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_display() {
        let err = CacheError::Io {
            path: PathBuf::from(".retrace-cache/manifest.json"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(
            err.to_string(),
            "cannot access replay cache at .retrace-cache/manifest.json: denied"
        );
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn corrupt_display() {
        let err = CacheError::Corrupt {
            path: PathBuf::from("times/k.tidx"),
            reason: "truncated header".to_string(),
        };
        assert_eq!(err.to_string(), "corrupt cache artifact times/k.tidx: truncated header");
    }

    #[test]
    fn checksum_display_names_both_hashes() {
        let stored = ContentHash::from_bytes(b"written");
        let computed = ContentHash::from_bytes(b"read");
        let msg = CacheError::Checksum {
            path: PathBuf::from("names/k.sig"),
            stored,
            computed,
        }
        .to_string();
        assert!(msg.contains(&stored.to_string()));
        assert!(msg.contains(&computed.to_string()));
    }

    #[test]
    fn format_version_display() {
        let err = CacheError::FormatVersion {
            path: PathBuf::from("times/k.tidx"),
            found: 1,
            supported: 2,
        };
        assert_eq!(
            err.to_string(),
            "cache artifact times/k.tidx uses format 1, this build reads format 2"
        );
    }

    #[test]
    fn encode_display() {
        assert_eq!(
            CacheError::Encode("unsupported type".to_string()).to_string(),
            "cannot encode cache data: unsupported type"
        );
    }
}
