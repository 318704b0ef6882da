//! Cache Entry
//!
//! Fingerprint of one song's last successful build: the job description it
//! was built from and the artifact it produced.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Memoized build fingerprint for one song.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// 64-bit hash of the serialized job description.
    pub content_hash: u64,

    /// Byte length of the serialized job description.
    pub content_length: usize,

    /// Last write time of the artifact.
    pub artifact_timestamp: DateTime<Utc>,

    /// Size of the artifact in bytes.
    pub artifact_byte_length: u64,
}

impl CacheEntry {
    /// Fingerprint `serialized` against the artifact currently on disk.
    ///
    /// Returns `None` when the artifact is missing or unreadable.
    pub fn from_artifact(serialized: &str, artifact: &Path) -> Option<CacheEntry> {
        let metadata = fs::metadata(artifact).ok()?;
        if !metadata.is_file() {
            return None;
        }
        let modified = metadata.modified().ok()?;

        Some(CacheEntry {
            content_hash: content_hash(serialized.as_bytes()),
            content_length: serialized.len(),
            artifact_timestamp: DateTime::<Utc>::from(modified),
            artifact_byte_length: metadata.len(),
        })
    }

    /// True only if both entries exist and all four fields match.
    pub fn is_valid(previous: Option<&CacheEntry>, candidate: Option<&CacheEntry>) -> bool {
        match (previous, candidate) {
            (Some(a), Some(b)) => {
                a.content_hash == b.content_hash
                    && a.content_length == b.content_length
                    && a.artifact_timestamp == b.artifact_timestamp
                    && a.artifact_byte_length == b.artifact_byte_length
            }
            _ => false,
        }
    }
}

/// First 8 bytes of the SHA-256 digest, big-endian.
pub fn content_hash(bytes: &[u8]) -> u64 {
    let digest = Sha256::digest(bytes);
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(head)
}
