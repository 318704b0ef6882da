//! Generation Cache
//!
//! Per-project map from song id to [`CacheEntry`]. Build workers finishing
//! different songs write concurrently, so the map is split into shards with
//! their own locks. Entries are only written after a successful build and are
//! never evicted; a stale entry simply fails the comparison.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::{PoisonError, RwLock};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::entry::CacheEntry;
use crate::compile::CompiledConfig;
use crate::error::{MsuError, Result};
use crate::model::Song;

const SHARD_COUNT: usize = 16;

/// On-disk layout of the cache file.
#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheFile {
    #[serde(default)]
    songs: BTreeMap<String, CacheEntry>,
}

/// Thread-safe song id to cache entry map.
#[derive(Debug)]
pub struct GenerationCache {
    shards: Vec<RwLock<HashMap<String, CacheEntry>>>,
}

impl Default for GenerationCache {
    fn default() -> Self {
        Self::new()
    }
}

impl GenerationCache {
    pub fn new() -> Self {
        Self {
            shards: (0..SHARD_COUNT).map(|_| RwLock::new(HashMap::new())).collect(),
        }
    }

    fn shard(&self, song_id: &str) -> &RwLock<HashMap<String, CacheEntry>> {
        let mut hasher = DefaultHasher::new();
        song_id.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % SHARD_COUNT]
    }

    pub fn get(&self, song_id: &str) -> Option<CacheEntry> {
        let shard = self.shard(song_id).read().unwrap_or_else(PoisonError::into_inner);
        shard.get(song_id).cloned()
    }

    pub fn insert(&self, song_id: &str, entry: CacheEntry) {
        let mut shard = self.shard(song_id).write().unwrap_or_else(PoisonError::into_inner);
        shard.insert(song_id.to_string(), entry);
    }

    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|s| s.read().unwrap_or_else(PoisonError::into_inner).len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sorted copy of every entry.
    pub fn snapshot(&self) -> BTreeMap<String, CacheEntry> {
        let mut out = BTreeMap::new();
        for shard in &self.shards {
            let shard = shard.read().unwrap_or_else(PoisonError::into_inner);
            out.extend(shard.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        out
    }

    /// Fingerprint the current artifact and compare it with the stored entry.
    ///
    /// `Some(candidate)` is returned alongside the verdict so callers can log it.
    pub fn check(&self, song_id: &str, serialized: &str, artifact: &Path) -> (bool, Option<CacheEntry>) {
        let previous = self.get(song_id);
        let candidate = CacheEntry::from_artifact(serialized, artifact);
        let valid = CacheEntry::is_valid(previous.as_ref(), candidate.as_ref());
        debug!(
            "Cache check for {}: previous={} candidate={} valid={}",
            song_id,
            previous.is_some(),
            candidate.is_some(),
            valid
        );
        (valid, candidate)
    }

    /// Store the fingerprint of a freshly built artifact.
    ///
    /// Refuses missing or empty artifacts so a failed build can never look cached.
    pub fn record(&self, song: &Song, config: &CompiledConfig, artifact: &Path) -> Result<CacheEntry> {
        let serialized = config.to_json()?;
        let entry = CacheEntry::from_artifact(&serialized, artifact).ok_or_else(|| MsuError::FileNotFound {
            path: artifact.to_path_buf(),
        })?;
        if entry.artifact_byte_length == 0 {
            return Err(MsuError::InvalidArtifact {
                path: artifact.to_path_buf(),
                reason: "artifact is empty".to_string(),
            });
        }
        self.insert(&song.id, entry.clone());
        Ok(entry)
    }

    /// Load a cache file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| MsuError::FileReadError {
            path: path.to_path_buf(),
            source: e,
        })?;
        let file: CacheFile = serde_json::from_str(&content)?;

        let cache = Self::new();
        for (song_id, entry) in file.songs {
            cache.insert(&song_id, entry);
        }
        Ok(cache)
    }

    /// Load a cache file, treating a missing or unreadable file as empty.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            return Self::new();
        }
        match Self::load(path) {
            Ok(cache) => cache,
            Err(e) => {
                warn!("Ignoring unreadable generation cache {}: {}", path.display(), e);
                Self::new()
            }
        }
    }

    /// Write the cache file, replacing it atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        let file = CacheFile {
            songs: self.snapshot(),
        };
        let content = serde_json::to_string_pretty(&file)?;

        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, content).map_err(|e| MsuError::FileWriteError {
            path: tmp_path.clone(),
            source: e,
        })?;
        fs::rename(&tmp_path, path).map_err(|e| MsuError::FileWriteError {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(())
    }
}
