//! Project State
//!
//! An MSU project: the ordered track list, pack-wide defaults, and the
//! generation cache that remembers which PCM files are up to date.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use super::song::{Song, Track};
use crate::build::BuildReport;
use crate::cache::GenerationCache;
use crate::error::{MsuError, Result};

/// Suffix of the generation cache file stored next to the project file.
pub const CACHE_FILE_SUFFIX: &str = "generation-cache.json";

/// Suffix of the acknowledged-warnings file stored next to the project file.
pub const ACK_FILE_SUFFIX: &str = "acknowledged-warnings.json";

/// How dither is decided for each song.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DitherPolicy {
    /// Use the project-wide flag, if any.
    #[default]
    Default,
    /// Dither every track.
    All,
    /// Never dither.
    None,
    /// Per song, on unless the song turns it off.
    DefaultOn,
    /// Per song, off unless the song turns it on.
    DefaultOff,
}

impl DitherPolicy {
    /// Resolve the dither flag for one song.
    ///
    /// `None` leaves the decision to msupcm++.
    pub fn resolve(&self, project_flag: Option<bool>, song_override: Option<bool>) -> Option<bool> {
        match self {
            DitherPolicy::Default => project_flag,
            DitherPolicy::All => Some(true),
            DitherPolicy::None => Some(false),
            DitherPolicy::DefaultOn => Some(song_override.unwrap_or(true)),
            DitherPolicy::DefaultOff => Some(song_override.unwrap_or(false)),
        }
    }

    /// Per-song policies cannot be expressed in a single pack-wide job file.
    pub fn is_per_song(&self) -> bool {
        matches!(self, DitherPolicy::DefaultOn | DitherPolicy::DefaultOff)
    }
}

/// Pack-wide settings that feed every job description.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectDefaults {
    #[serde(default)]
    pub game: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pack_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Base path of the pack's output files, e.g. `packs/zelda/zelda` for
    /// `zelda-1.pcm`, `zelda-2.pcm`, ...
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_prefix: Option<PathBuf>,

    /// Default RMS normalization in dBFS.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalization: Option<f64>,

    #[serde(default)]
    pub dither_policy: DitherPolicy,

    /// Project-wide dither flag used by [`DitherPolicy::Default`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dither: Option<bool>,
}

/// Main project state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub defaults: ProjectDefaults,

    #[serde(default)]
    pub tracks: Vec<Track>,

    /// Shared with build workers; persisted in its own file.
    #[serde(skip)]
    pub generation_cache: Arc<GenerationCache>,

    /// Path to the project file (not serialized).
    #[serde(skip)]
    pub project_path: PathBuf,
}

impl Project {
    pub fn new(name: impl Into<String>, defaults: ProjectDefaults) -> Self {
        Self {
            name: name.into(),
            defaults,
            tracks: Vec::new(),
            generation_cache: Arc::new(GenerationCache::new()),
            project_path: PathBuf::new(),
        }
    }

    /// Load a project file and its generation cache.
    ///
    /// A missing or corrupt cache file only costs a rebuild.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(MsuError::FileNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = fs::read_to_string(path).map_err(|e| MsuError::FileReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let mut project: Project = serde_json::from_str(&content)?;
        project.project_path = path.to_path_buf();
        project.generation_cache = Arc::new(GenerationCache::load_or_default(&project.cache_file_path()));

        info!(
            "Loaded project {} ({} tracks, {} songs)",
            path.display(),
            project.tracks.len(),
            project.songs().count()
        );
        Ok(project)
    }

    /// Save the project file. The generation cache is saved separately.
    pub fn save(&self) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(&self.project_path, content).map_err(|e| MsuError::FileWriteError {
            path: self.project_path.clone(),
            source: e,
        })?;
        Ok(())
    }

    /// Persist the generation cache next to the project file.
    pub fn save_generation_cache(&self) -> Result<()> {
        let path = self.cache_file_path();
        self.generation_cache.save(&path)?;
        info!("Saved project msupcm++ generation cache to {}", path.display());
        Ok(())
    }

    fn sibling_path(&self, suffix: &str) -> PathBuf {
        let stem = self
            .project_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "project".to_string());
        self.project_path.with_file_name(format!("{}.{}", stem, suffix))
    }

    pub fn cache_file_path(&self) -> PathBuf {
        self.sibling_path(CACHE_FILE_SUFFIX)
    }

    pub fn acknowledgements_path(&self) -> PathBuf {
        self.sibling_path(ACK_FILE_SUFFIX)
    }

    /// All songs, in track order, primary before alternates.
    pub fn songs(&self) -> impl Iterator<Item = &Song> {
        self.tracks.iter().flat_map(|t| t.songs.iter())
    }

    pub fn song(&self, song_id: &str) -> Option<&Song> {
        self.songs().find(|s| s.id == song_id)
    }

    pub fn song_mut(&mut self, song_id: &str) -> Option<&mut Song> {
        self.tracks
            .iter_mut()
            .flat_map(|t| t.songs.iter_mut())
            .find(|s| s.id == song_id)
    }

    pub fn track(&self, number: u32) -> Option<&Track> {
        self.tracks.iter().find(|t| t.number == number)
    }

    /// Get or create the track with this number, keeping tracks sorted.
    pub fn track_mut(&mut self, number: u32, name: &str) -> &mut Track {
        let index = match self.tracks.binary_search_by_key(&number, |t| t.number) {
            Ok(index) => index,
            Err(index) => {
                self.tracks.insert(index, Track::new(number, name));
                index
            }
        };
        &mut self.tracks[index]
    }

    /// Stamp the build time of every song the report built or found up to date.
    pub fn apply_report(&mut self, report: &BuildReport) {
        for result in &report.results {
            if !result.status.is_built() {
                continue;
            }
            match self.song_mut(&result.song_id) {
                Some(song) => song.last_built = Some(result.finished_at),
                None => warn!("Build result for unknown song {}", result.song_id),
            }
        }
    }
}
