//! Build Orchestrator
//!
//! Fans a list of songs out over a bounded pool of worker threads. Each worker
//! handles one song at a time: consult the cache, compile the job description,
//! run msupcm++, check and publish the artifact, record the cache entry.
//! Songs are independent, so a failure only ever affects its own result.
//!
//! Cancellation is cooperative. Workers check the token before starting a song
//! and never interrupt a running compiler, so a cancel takes effect once the
//! in-flight songs finish.

use std::any::Any;
use std::collections::HashMap;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use chrono::Utc;
use crossbeam_channel::Sender;
use log::{error, info, warn};

use super::adapter::{AdapterOutcome, CompilerAdapter, CompilerJob};
use super::artifact::validate_artifact;
use super::report::{BuildReport, BuildStatus, SongResult};
use super::workspace::BuildWorkspace;
use crate::cache::GenerationCache;
use crate::compile::{compile_with, CompileSettings, DEFAULT_VERBOSITY};
use crate::error::{MsuError, Result};
use crate::model::{Project, ProjectDefaults, Song};

/// Default number of concurrent msupcm++ processes.
pub const DEFAULT_MAX_WORKERS: usize = 10;

/// Batch settings.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildOptions {
    pub max_workers: usize,
    /// Ignore the cache and rebuild everything.
    pub force: bool,
    /// Keep job files and staged artifacts in the work directory.
    pub keep_temps: bool,
    pub verbosity: u8,
    /// Fail songs whose tree has structure warnings instead of building them.
    pub block_on_structure_warnings: bool,
    /// Give transient compiler failures a second, sequential attempt.
    pub retry_transient: bool,
    pub work_dir: PathBuf,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            force: false,
            keep_temps: false,
            verbosity: DEFAULT_VERBOSITY,
            block_on_structure_warnings: false,
            retry_transient: true,
            work_dir: BuildWorkspace::default_root(),
        }
    }
}

/// Shared stop flag for a batch.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Progress notifications for front-ends.
#[derive(Debug, Clone, PartialEq)]
pub enum BuildEvent {
    Started { song_id: String, track_number: u32 },
    Finished(SongResult),
}

pub struct BuildOrchestrator {
    adapter: Arc<dyn CompilerAdapter>,
    cache: Arc<GenerationCache>,
    defaults: ProjectDefaults,
    options: BuildOptions,
    base_dir: Option<PathBuf>,
    events: Option<Sender<BuildEvent>>,
}

/// A batch running on its own thread.
pub struct BuildHandle {
    cancel: CancellationToken,
    handle: JoinHandle<BuildReport>,
}

impl BuildHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the batch and return its report.
    pub fn join(self) -> Result<BuildReport> {
        self.handle.join().map_err(|_| MsuError::CompilerFailed {
            reason: "build thread panicked".to_string(),
        })
    }
}

impl BuildOrchestrator {
    pub fn new(
        adapter: Arc<dyn CompilerAdapter>,
        cache: Arc<GenerationCache>,
        defaults: ProjectDefaults,
        options: BuildOptions,
    ) -> Self {
        Self {
            adapter,
            cache,
            defaults,
            options,
            base_dir: None,
            events: None,
        }
    }

    /// Orchestrator sharing the project's cache, with relative input files
    /// resolved against the project file's directory.
    pub fn for_project(project: &Project, adapter: Arc<dyn CompilerAdapter>, options: BuildOptions) -> Self {
        let base_dir = project
            .project_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf);

        Self {
            base_dir,
            ..Self::new(
                adapter,
                Arc::clone(&project.generation_cache),
                project.defaults.clone(),
                options,
            )
        }
    }

    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(base_dir.into());
        self
    }

    pub fn with_events(mut self, events: Sender<BuildEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    pub fn cache(&self) -> &Arc<GenerationCache> {
        &self.cache
    }

    pub fn workspace(&self) -> BuildWorkspace {
        BuildWorkspace::new(&self.options.work_dir)
    }

    /// Run the batch on a background thread.
    pub fn spawn(self, songs: Vec<Song>) -> Result<BuildHandle> {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle = thread::Builder::new()
            .name("msubuild-orchestrator".to_string())
            .spawn(move || self.run(&songs, &token))?;
        Ok(BuildHandle { cancel, handle })
    }

    /// Build every song, blocking until the batch is done or cancelled.
    pub fn run(&self, songs: &[Song], cancel: &CancellationToken) -> BuildReport {
        let started_at = Utc::now();
        let workspace = self.workspace();
        let worker_count = self.options.max_workers.clamp(1, songs.len().max(1));
        info!(
            "Building {} songs with {} {} workers (force={})",
            songs.len(),
            worker_count,
            self.adapter.name(),
            self.options.force
        );

        let (job_tx, job_rx) = crossbeam_channel::unbounded::<(usize, &Song)>();
        let (result_tx, result_rx) = crossbeam_channel::unbounded::<(usize, SongResult)>();
        for job in songs.iter().enumerate() {
            let _ = job_tx.send(job);
        }
        drop(job_tx);

        thread::scope(|scope| {
            for worker in 0..worker_count {
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                let workspace = &workspace;
                let spawned = thread::Builder::new()
                    .name(format!("msubuild-worker-{}", worker))
                    .spawn_scoped(scope, move || {
                        for (index, song) in job_rx.iter() {
                            let result = self.process(song, workspace, cancel);
                            if result_tx.send((index, result)).is_err() {
                                break;
                            }
                        }
                    });
                if let Err(e) = spawned {
                    warn!("Failed to start build worker {}: {}", worker, e);
                }
            }
        });

        // Whatever no worker picked up (e.g. none could be started) runs here.
        for (index, song) in job_rx.try_iter() {
            let _ = result_tx.send((index, self.process(song, &workspace, cancel)));
        }
        drop(result_tx);

        let mut indexed: Vec<(usize, SongResult)> = result_rx.iter().collect();
        indexed.sort_by_key(|(index, _)| *index);

        if self.options.retry_transient {
            self.retry_transient(songs, &mut indexed, &workspace, cancel);
        }

        let report = BuildReport {
            results: indexed.into_iter().map(|(_, r)| r).collect(),
            cancelled: cancel.is_cancelled(),
            started_at,
            finished_at: Utc::now(),
        };
        info!("{}", report.summary());
        report
    }

    /// Second attempt for transient failures, one at a time.
    fn retry_transient(
        &self,
        songs: &[Song],
        results: &mut [(usize, SongResult)],
        workspace: &BuildWorkspace,
        cancel: &CancellationToken,
    ) {
        let by_id: HashMap<&str, &Song> = songs.iter().map(|s| (s.id.as_str(), s)).collect();

        for (_, result) in results.iter_mut() {
            if result.status != BuildStatus::Failure || !result.transient {
                continue;
            }
            let Some(song) = by_id.get(result.song_id.as_str()) else {
                continue;
            };
            if cancel.is_cancelled() {
                break;
            }
            info!("Retrying song {} after transient failure", result.song_id);
            let mut retried = self.process(song, workspace, cancel);
            // One retry only.
            retried.transient = false;
            *result = retried;
        }
    }

    /// Build one song and publish progress events around it.
    pub fn process(&self, song: &Song, workspace: &BuildWorkspace, cancel: &CancellationToken) -> SongResult {
        if cancel.is_cancelled() {
            return SongResult::new(song, BuildStatus::Cancelled);
        }

        self.emit(BuildEvent::Started {
            song_id: song.id.clone(),
            track_number: song.track_number,
        });

        // A panicking adapter fails this song only.
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.build_song(song, workspace)))
            .unwrap_or_else(|payload| {
                error!("Build of song {} panicked", song.id);
                SongResult::failure(song, format!("build panicked: {}", panic_message(&*payload)))
            });

        match result.status {
            BuildStatus::Failure => tracing::warn!(
                song_id = %result.song_id,
                track = result.track_number,
                output = %result.output_path.display(),
                message = result.message.as_deref().unwrap_or_default(),
                "song failed"
            ),
            status => tracing::info!(
                song_id = %result.song_id,
                track = result.track_number,
                output = %result.output_path.display(),
                %status,
                "song finished"
            ),
        }

        self.emit(BuildEvent::Finished(result.clone()));
        result
    }

    fn emit(&self, event: BuildEvent) {
        if let Some(events) = &self.events {
            // Nobody listening is fine.
            let _ = events.send(event);
        }
    }

    fn compile_settings(&self) -> CompileSettings {
        CompileSettings {
            verbosity: self.options.verbosity,
            keep_temps: self.options.keep_temps,
            base_dir: self.base_dir.clone(),
        }
    }

    fn resolve_source(&self, path: &Path) -> PathBuf {
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }

    fn build_song(&self, song: &Song, workspace: &BuildWorkspace) -> SongResult {
        let output = song.resolved_output();
        if output.as_os_str().is_empty() {
            return SongResult::failure(
                song,
                format!("Track #{} has no output path", song.track_number),
            );
        }
        if !song.has_audio_files() {
            return SongResult::failure(song, "No input files specified");
        }

        let config = compile_with(song, &self.defaults, &self.compile_settings());
        let structure_warnings: Vec<String> = config.warnings.iter().map(|w| w.to_string()).collect();
        if self.options.block_on_structure_warnings && !structure_warnings.is_empty() {
            return SongResult::failure(song, "Song has structure warnings")
                .with_structure_warnings(structure_warnings);
        }

        let serialized = match config.to_json() {
            Ok(serialized) => serialized,
            Err(e) => return SongResult::failure(song, e.to_string()),
        };

        if !self.options.force {
            let (valid, _) = self.cache.check(&song.id, &serialized, &output);
            if valid {
                return SongResult::new(song, BuildStatus::Skipped)
                    .with_structure_warnings(structure_warnings);
            }
        }

        for file in song.tree().files() {
            let source = self.resolve_source(file);
            if !source.exists() {
                return SongResult::failure(song, format!("{} not found", source.display()))
                    .with_structure_warnings(structure_warnings);
            }
        }

        let staging = workspace.staging_path(&song.id);
        let job_path = match workspace.write_job(&song.id, &config.with_output(&staging)) {
            Ok(path) => path,
            Err(e) => {
                return SongResult::failure(song, e.to_string())
                    .transient(e.is_retryable())
                    .with_structure_warnings(structure_warnings)
            }
        };

        let outcome = self.adapter.compile(&CompilerJob {
            song_id: song.id.clone(),
            job_path,
            work_dir: workspace.song_dir(&song.id),
            expected_output: staging.clone(),
        });

        let warning = match outcome {
            AdapterOutcome::Clean => None,
            AdapterOutcome::Warning(message) => Some(message),
            AdapterOutcome::Failed { message, transient } => {
                return SongResult::failure(song, message)
                    .transient(transient)
                    .with_structure_warnings(structure_warnings);
            }
        };

        let published = validate_artifact(&staging)
            .and_then(|_| publish(&staging, &output))
            .and_then(|_| self.cache.record(song, &config, &output));
        if let Err(e) = published {
            return SongResult::failure(song, e.to_string()).with_structure_warnings(structure_warnings);
        }

        if !self.options.keep_temps {
            let _ = fs::remove_dir_all(workspace.song_dir(&song.id));
        }

        let result = match warning {
            Some(message) => SongResult::new(song, BuildStatus::SuccessWithWarning).with_message(message),
            None => SongResult::new(song, BuildStatus::Success),
        };
        result.with_structure_warnings(structure_warnings)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

/// Move the staged artifact to its final location.
fn publish(staging: &Path, output: &Path) -> Result<()> {
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| MsuError::DirectoryCreateError {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }
    if output.exists() {
        fs::remove_file(output).map_err(|e| MsuError::FileWriteError {
            path: output.to_path_buf(),
            source: e,
        })?;
    }

    // rename fails across filesystems; fall back to copy.
    if fs::rename(staging, output).is_err() {
        fs::copy(staging, output).map_err(|e| MsuError::FileWriteError {
            path: output.to_path_buf(),
            source: e,
        })?;
        let _ = fs::remove_file(staging);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::artifact::encode_artifact;
    use crate::model::NodeFields;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Writes a valid artifact, or fails for the configured songs.
    struct ScriptedAdapter {
        fail: Vec<String>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedAdapter {
        fn new(fail: Vec<String>) -> Self {
            Self {
                fail,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    impl CompilerAdapter for ScriptedAdapter {
        fn compile(&self, job: &CompilerJob) -> AdapterOutcome {
            self.calls.lock().unwrap().push(job.song_id.clone());
            if self.fail.contains(&job.song_id) {
                return AdapterOutcome::failed("scripted failure");
            }
            fs::write(&job.expected_output, encode_artifact(0, 64)).unwrap();
            AdapterOutcome::Clean
        }

        fn verify(&self) -> Result<String> {
            Ok("msupcm v1.0-scripted".to_string())
        }
    }

    fn song(dir: &Path, track: u32) -> Song {
        let source = dir.join(format!("track-{}.wav", track));
        fs::write(&source, b"RIFF").unwrap();

        let mut song = Song::new(track, format!("Track {}", track))
            .with_output(dir.join("out").join(format!("pack-{}.pcm", track)));
        let root = song.root();
        song.set_fields(root, NodeFields::with_file(source)).unwrap();
        song
    }

    fn orchestrator(dir: &Path, adapter: Arc<ScriptedAdapter>) -> BuildOrchestrator {
        let options = BuildOptions {
            max_workers: 2,
            work_dir: dir.join("work"),
            ..BuildOptions::default()
        };
        BuildOrchestrator::new(
            adapter,
            Arc::new(GenerationCache::new()),
            ProjectDefaults::default(),
            options,
        )
    }

    #[test]
    fn test_build_then_skip() {
        let temp_dir = TempDir::new().unwrap();
        let songs = vec![song(temp_dir.path(), 1), song(temp_dir.path(), 2)];
        let adapter = Arc::new(ScriptedAdapter::new(Vec::new()));
        let orch = orchestrator(temp_dir.path(), Arc::clone(&adapter));

        let first = orch.run(&songs, &CancellationToken::new());
        assert_eq!(first.counts().success, 2);
        assert!(songs.iter().all(|s| s.resolved_output().exists()));
        assert_eq!(orch.cache().len(), 2);
        // Staging cleaned up.
        assert!(!orch.workspace().song_dir(&songs[0].id).exists());

        let second = orch.run(&songs, &CancellationToken::new());
        assert_eq!(second.counts().skipped, 2);
        assert_eq!(adapter.calls(), 2);
    }

    #[test]
    fn test_results_follow_input_order() {
        let temp_dir = TempDir::new().unwrap();
        let songs: Vec<Song> = (1..=6).map(|n| song(temp_dir.path(), n)).collect();
        let orch = orchestrator(temp_dir.path(), Arc::new(ScriptedAdapter::new(Vec::new())));

        let report = orch.run(&songs, &CancellationToken::new());
        let order: Vec<u32> = report.results.iter().map(|r| r.track_number).collect();
        assert_eq!(order, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_missing_source_and_output() {
        let temp_dir = TempDir::new().unwrap();

        let mut missing_source = Song::new(1, "Missing").with_output(temp_dir.path().join("a.pcm"));
        let root = missing_source.root();
        missing_source
            .set_fields(root, NodeFields::with_file(temp_dir.path().join("nope.wav")))
            .unwrap();

        let no_files = Song::new(2, "Empty").with_output(temp_dir.path().join("b.pcm"));
        let mut no_output = song(temp_dir.path(), 3);
        no_output.output_path = PathBuf::new();

        let adapter = Arc::new(ScriptedAdapter::new(Vec::new()));
        let orch = orchestrator(temp_dir.path(), Arc::clone(&adapter));
        let report = orch.run(
            &[missing_source, no_files, no_output],
            &CancellationToken::new(),
        );

        assert_eq!(report.counts().failure, 3);
        assert!(report.results[0].message.as_deref().unwrap().ends_with("nope.wav not found"));
        assert_eq!(report.results[1].message.as_deref(), Some("No input files specified"));
        assert_eq!(report.results[2].message.as_deref(), Some("Track #3 has no output path"));
        assert_eq!(adapter.calls(), 0);
    }

    #[test]
    fn test_cancelled_before_start() {
        let temp_dir = TempDir::new().unwrap();
        let songs = vec![song(temp_dir.path(), 1), song(temp_dir.path(), 2)];
        let adapter = Arc::new(ScriptedAdapter::new(Vec::new()));
        let orch = orchestrator(temp_dir.path(), Arc::clone(&adapter));

        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = orch.run(&songs, &cancel);

        assert!(report.cancelled);
        assert_eq!(report.counts().cancelled, 2);
        assert_eq!(adapter.calls(), 0);
        assert!(orch.cache().is_empty());
    }

    #[test]
    fn test_events_published() {
        let temp_dir = TempDir::new().unwrap();
        let songs = vec![song(temp_dir.path(), 1)];
        let (tx, rx) = crossbeam_channel::unbounded();
        let orch = orchestrator(temp_dir.path(), Arc::new(ScriptedAdapter::new(Vec::new()))).with_events(tx);

        orch.run(&songs, &CancellationToken::new());
        let events: Vec<BuildEvent> = rx.try_iter().collect();

        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], BuildEvent::Started { track_number: 1, .. }));
        assert!(matches!(&events[1], BuildEvent::Finished(r) if r.status == BuildStatus::Success));
    }

    #[test]
    fn test_spawned_batch() {
        let temp_dir = TempDir::new().unwrap();
        let songs = vec![song(temp_dir.path(), 1), song(temp_dir.path(), 2)];
        let orch = orchestrator(temp_dir.path(), Arc::new(ScriptedAdapter::new(Vec::new())));

        let handle = orch.spawn(songs).unwrap();
        let report = handle.join().unwrap();
        assert_eq!(report.counts().success, 2);
    }
}
