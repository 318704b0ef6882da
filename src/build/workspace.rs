//! Build Workspace
//!
//! Scratch directory layout for a batch. Each song gets its own folder under
//! the work directory holding the job file handed to msupcm++ and the staged
//! artifact it writes:
//!
//! ```text
//! <work_dir>/
//! ├── <song id>/
//! │   ├── temp.json
//! │   └── temp.pcm
//! └── ...
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use walkdir::WalkDir;

use crate::compile::JobDescription;
use crate::error::{MsuError, Result};

pub const JOB_FILE_NAME: &str = "temp.json";
pub const STAGING_FILE_NAME: &str = "temp.pcm";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildWorkspace {
    root: PathBuf,
}

impl BuildWorkspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `msubuild` under the system temp directory.
    pub fn default_root() -> PathBuf {
        std::env::temp_dir().join("msubuild")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn song_dir(&self, song_id: &str) -> PathBuf {
        self.root.join(song_id)
    }

    pub fn job_path(&self, song_id: &str) -> PathBuf {
        self.song_dir(song_id).join(JOB_FILE_NAME)
    }

    pub fn staging_path(&self, song_id: &str) -> PathBuf {
        self.song_dir(song_id).join(STAGING_FILE_NAME)
    }

    /// Create the song folder, drop any stale staged artifact, and write the job file.
    pub fn write_job(&self, song_id: &str, job: &JobDescription) -> Result<PathBuf> {
        let dir = self.song_dir(song_id);
        fs::create_dir_all(&dir).map_err(|e| MsuError::DirectoryCreateError {
            path: dir.clone(),
            source: e,
        })?;

        let staging = self.staging_path(song_id);
        if staging.exists() {
            fs::remove_file(&staging).map_err(|e| MsuError::FileWriteError {
                path: staging.clone(),
                source: e,
            })?;
        }

        let job_path = self.job_path(song_id);
        let content = serde_json::to_string_pretty(job)?;
        fs::write(&job_path, content).map_err(|e| MsuError::FileWriteError {
            path: job_path.clone(),
            source: e,
        })?;
        debug!("Wrote job file {}", job_path.display());
        Ok(job_path)
    }

    /// Remove leftover staged artifacts and job files, then empty song folders.
    ///
    /// Returns the number of files removed.
    pub fn purge(&self) -> Result<usize> {
        if !self.root.exists() {
            return Ok(0);
        }

        let leftovers: Vec<PathBuf> = WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(2)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| {
                entry
                    .path()
                    .extension()
                    .map(|ext| ext == "pcm" || ext == "json")
                    .unwrap_or(false)
            })
            .map(|entry| entry.path().to_path_buf())
            .collect();

        for path in &leftovers {
            fs::remove_file(path).map_err(|e| MsuError::FileWriteError {
                path: path.clone(),
                source: e,
            })?;
        }

        // Song folders only; fails harmlessly when something else is inside.
        for entry in WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_dir())
        {
            let _ = fs::remove_dir(entry.path());
        }

        info!(
            "Removed {} temporary files from {}",
            leftovers.len(),
            self.root.display()
        );
        Ok(leftovers.len())
    }
}
