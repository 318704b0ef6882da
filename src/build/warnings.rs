//! Warning acknowledgements
//!
//! Output paths whose compiler warnings the user already accepted, so repeat
//! builds stay quiet about them.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{MsuError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarningAcknowledgements {
    #[serde(default)]
    paths: BTreeSet<PathBuf>,
}

impl WarningAcknowledgements {
    /// Load from disk. A missing file means nothing was acknowledged yet.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).map_err(|e| MsuError::FileReadError {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).map_err(|e| MsuError::FileWriteError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Returns false if the path was already acknowledged.
    pub fn acknowledge(&mut self, output_path: impl Into<PathBuf>) -> bool {
        self.paths.insert(output_path.into())
    }

    pub fn is_acknowledged(&self, output_path: &Path) -> bool {
        self.paths.contains(output_path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_acknowledge_and_persist() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("acks.json");

        let mut acks = WarningAcknowledgements::load(&path).unwrap();
        assert!(acks.is_empty());

        assert!(acks.acknowledge("pack-1.pcm"));
        assert!(!acks.acknowledge("pack-1.pcm"));
        acks.save(&path).unwrap();

        let loaded = WarningAcknowledgements::load(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(loaded.is_acknowledged(Path::new("pack-1.pcm")));
        assert!(!loaded.is_acknowledged(Path::new("pack-2.pcm")));
    }
}
