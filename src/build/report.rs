//! Build results
//!
//! Per-song outcomes and the aggregate report a batch hands back.

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::warnings::WarningAcknowledgements;
use crate::model::Song;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    Success,
    /// Usable artifact, but the compiler printed warnings.
    SuccessWithWarning,
    /// No usable artifact; the song stays unbuilt.
    Failure,
    /// Cache hit, nothing to do.
    Skipped,
    /// Never started because the batch was cancelled.
    Cancelled,
}

impl BuildStatus {
    /// The song's artifact is usable after this result.
    pub fn is_built(&self) -> bool {
        matches!(
            self,
            BuildStatus::Success | BuildStatus::SuccessWithWarning | BuildStatus::Skipped
        )
    }
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            BuildStatus::Success => "success",
            BuildStatus::SuccessWithWarning => "warning",
            BuildStatus::Failure => "failed",
            BuildStatus::Skipped => "up to date",
            BuildStatus::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

/// Outcome for one song.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SongResult {
    pub song_id: String,
    pub track_number: u32,
    pub song_name: String,
    pub output_path: PathBuf,
    pub status: BuildStatus,

    /// Error text for failures, compiler warning text for warnings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Advisory tree-shape warnings found while compiling.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub structure_warnings: Vec<String>,

    /// Failure worth one more attempt.
    #[serde(skip)]
    pub transient: bool,

    pub finished_at: DateTime<Utc>,
}

impl SongResult {
    pub fn new(song: &Song, status: BuildStatus) -> Self {
        Self {
            song_id: song.id.clone(),
            track_number: song.track_number,
            song_name: song.display_name().to_string(),
            output_path: song.resolved_output(),
            status,
            message: None,
            structure_warnings: Vec::new(),
            transient: false,
            finished_at: Utc::now(),
        }
    }

    pub fn failure(song: &Song, message: impl Into<String>) -> Self {
        Self::new(song, BuildStatus::Failure).with_message(message)
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_structure_warnings(mut self, warnings: Vec<String>) -> Self {
        self.structure_warnings = warnings;
        self
    }

    pub fn transient(mut self, transient: bool) -> Self {
        self.transient = transient;
        self
    }
}

impl fmt::Display for SongResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {}: {}", self.track_number, self.song_name, self.status)?;
        if let Some(message) = &self.message {
            write!(f, " ({})", message)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildCounts {
    pub success: usize,
    pub warning: usize,
    pub failure: usize,
    pub skipped: usize,
    pub cancelled: usize,
}

impl BuildCounts {
    pub fn total(&self) -> usize {
        self.success + self.warning + self.failure + self.skipped + self.cancelled
    }
}

/// Aggregate result of a batch, in the order the songs were submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildReport {
    pub results: Vec<SongResult>,
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl BuildReport {
    pub fn counts(&self) -> BuildCounts {
        let mut counts = BuildCounts::default();
        for result in &self.results {
            match result.status {
                BuildStatus::Success => counts.success += 1,
                BuildStatus::SuccessWithWarning => counts.warning += 1,
                BuildStatus::Failure => counts.failure += 1,
                BuildStatus::Skipped => counts.skipped += 1,
                BuildStatus::Cancelled => counts.cancelled += 1,
            }
        }
        counts
    }

    pub fn result(&self, song_id: &str) -> Option<&SongResult> {
        self.results.iter().find(|r| r.song_id == song_id)
    }

    pub fn failures(&self) -> impl Iterator<Item = &SongResult> {
        self.results
            .iter()
            .filter(|r| r.status == BuildStatus::Failure)
    }

    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }

    /// Warnings the user still has to see: one per output path, minus the
    /// paths already acknowledged.
    pub fn pending_warnings(&self, acknowledged: &WarningAcknowledgements) -> Vec<&SongResult> {
        let mut seen = HashSet::new();
        self.results
            .iter()
            .filter(|r| r.status == BuildStatus::SuccessWithWarning)
            .filter(|r| !acknowledged.is_acknowledged(&r.output_path))
            .filter(|r| seen.insert(r.output_path.clone()))
            .collect()
    }

    /// One-line summary.
    pub fn summary(&self) -> String {
        let counts = self.counts();
        let mut summary = format!(
            "{} songs: {} built, {} with warnings, {} failed, {} up to date",
            counts.total(),
            counts.success,
            counts.warning,
            counts.failure,
            counts.skipped
        );
        if counts.cancelled > 0 {
            summary.push_str(&format!(", {} cancelled", counts.cancelled));
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(track: u32, status: BuildStatus, output: &str) -> SongResult {
        let song = Song::new(track, format!("Track {}", track)).with_output(output);
        SongResult::new(&song, status)
    }

    fn report(results: Vec<SongResult>) -> BuildReport {
        BuildReport {
            results,
            cancelled: false,
            started_at: Utc::now(),
            finished_at: Utc::now(),
        }
    }

    #[test]
    fn test_counts_and_summary() {
        let report = report(vec![
            result(1, BuildStatus::Success, "a.pcm"),
            result(2, BuildStatus::SuccessWithWarning, "b.pcm"),
            result(3, BuildStatus::Failure, "c.pcm"),
            result(4, BuildStatus::Skipped, "d.pcm"),
        ]);

        let counts = report.counts();
        assert_eq!(counts.total(), 4);
        assert_eq!(counts.failure, 1);
        assert!(report.has_failures());
        assert_eq!(
            report.summary(),
            "4 songs: 1 built, 1 with warnings, 1 failed, 1 up to date"
        );
    }

    #[test]
    fn test_pending_warnings_dedup_and_ack() {
        let report = report(vec![
            result(1, BuildStatus::SuccessWithWarning, "shared.pcm"),
            result(1, BuildStatus::SuccessWithWarning, "shared.pcm"),
            result(2, BuildStatus::SuccessWithWarning, "other.pcm"),
            result(3, BuildStatus::Success, "clean.pcm"),
        ]);

        let mut acks = WarningAcknowledgements::default();
        assert_eq!(report.pending_warnings(&acks).len(), 2);

        acks.acknowledge("other.pcm");
        let pending = report.pending_warnings(&acks);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].output_path, PathBuf::from("shared.pcm"));
    }

    #[test]
    fn test_status_is_built() {
        assert!(BuildStatus::Skipped.is_built());
        assert!(BuildStatus::SuccessWithWarning.is_built());
        assert!(!BuildStatus::Failure.is_built());
        assert!(!BuildStatus::Cancelled.is_built());
    }
}
