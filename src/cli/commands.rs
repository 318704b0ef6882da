//! CLI Command Implementations
//!
//! Implements the actual logic for each CLI command.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use log::{info, warn};

use super::BuildArgs;
use crate::build::{
    BuildEvent, BuildOptions, BuildOrchestrator, BuildReport, CompilerAdapter, MsuPcmAdapter,
    WarningAcknowledgements,
};
use crate::compile::{compile_project, compile_variant, compile_with, CompileSettings};
use crate::error::MsuError;
use crate::model::{Project, Song};

fn load_project(path: &Path) -> Result<Project> {
    Project::load(path).with_context(|| format!("Failed to load project {}", path.display()))
}

/// Relative input files in a project are relative to the project file.
fn compile_settings(project: &Project) -> CompileSettings {
    CompileSettings {
        base_dir: project
            .project_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf),
        ..CompileSettings::default()
    }
}

/// Build every selected song and persist the results.
pub fn build(project_path: &Path, args: &BuildArgs) -> Result<()> {
    info!("Building project: {}", project_path.display());

    let mut project = load_project(project_path)?;

    let adapter = MsuPcmAdapter::new(&args.compiler);
    let version = adapter
        .verify()
        .with_context(|| format!("msupcm++ could not be validated at {}", args.compiler.display()))?;
    info!("Using {}", version);

    let mut options = BuildOptions {
        force: args.force,
        keep_temps: args.keep_temps,
        ..BuildOptions::default()
    };
    if let Some(jobs) = args.jobs {
        options.max_workers = jobs;
    }
    if let Some(work_dir) = &args.work_dir {
        options.work_dir = work_dir.clone();
    }

    let songs: Vec<Song> = project
        .songs()
        .filter(|s| args.tracks.is_empty() || args.tracks.contains(&s.track_number))
        .cloned()
        .collect();
    if songs.is_empty() {
        println!("No songs to build");
        return Ok(());
    }

    let (events_tx, events_rx) = crossbeam_channel::unbounded();
    let orchestrator =
        BuildOrchestrator::for_project(&project, Arc::new(adapter), options.clone()).with_events(events_tx);
    let workspace = orchestrator.workspace();
    let total = songs.len();
    let handle = orchestrator.spawn(songs).context("Failed to start build")?;

    let mut finished = 0;
    for event in events_rx.iter() {
        if let BuildEvent::Finished(result) = event {
            finished += 1;
            println!("[{}/{}] {}", finished, total, result);
        }
    }

    let report = match handle.join() {
        Ok(report) => report,
        Err(e) => {
            // Songs that finished before the failure already hold cache entries.
            if let Err(save_err) = project.save_generation_cache() {
                warn!("Could not save generation cache: {}", save_err);
            }
            return Err(e.into());
        }
    };
    println!("{}", report.summary());

    report_warnings(&project, &report, args.ack_warnings)?;

    project.apply_report(&report);
    project
        .save_generation_cache()
        .context("Failed to save generation cache")?;
    project.save().context("Failed to save project")?;

    if !options.keep_temps {
        if let Err(e) = workspace.purge() {
            warn!("Could not clean work directory: {}", e);
        }
    }

    Ok(())
}

fn report_warnings(project: &Project, report: &BuildReport, acknowledge: bool) -> Result<()> {
    let path = project.acknowledgements_path();
    let mut acks = match WarningAcknowledgements::load(&path) {
        Ok(acks) => acks,
        Err(e) => {
            warn!("Ignoring unreadable warning acknowledgements: {}", e);
            WarningAcknowledgements::default()
        }
    };

    let pending: Vec<PathBuf> = report
        .pending_warnings(&acks)
        .into_iter()
        .map(|result| {
            println!(
                "Warning for {}: {}",
                result.output_path.display(),
                result.message.as_deref().unwrap_or_default()
            );
            result.output_path.clone()
        })
        .collect();

    if acknowledge && !pending.is_empty() {
        for output in pending {
            acks.acknowledge(output);
        }
        acks.save(&path).context("Failed to save warning acknowledgements")?;
        println!("Acknowledged warnings will not be shown again");
    }
    Ok(())
}

/// Print structure warnings for every song.
pub fn validate(project_path: &Path) -> Result<()> {
    let project = load_project(project_path)?;

    let mut total = 0;
    for song in project.songs() {
        let warnings = song.validate();
        if !song.has_audio_files() {
            println!("#{} {}: no input files", song.track_number, song.display_name());
        }
        for warning in &warnings {
            println!("#{} {}: {}", song.track_number, song.display_name(), warning);
        }
        if song.is_stale() {
            println!("#{} {}: needs rebuild", song.track_number, song.display_name());
        }
        total += warnings.len();
    }

    println!("{} structure warnings", total);
    Ok(())
}

/// Print the job description of one song.
pub fn compile(project_path: &Path, song_id: &str, option: Option<u32>) -> Result<()> {
    let project = load_project(project_path)?;
    let song = project.song(song_id).ok_or_else(|| MsuError::SongNotFound {
        song_id: song_id.to_string(),
    })?;

    let settings = compile_settings(&project);
    let config = match option {
        Some(option) => compile_variant(song, &project.defaults, &settings, option),
        None => compile_with(song, &project.defaults, &settings),
    };
    for warning in &config.warnings {
        warn!("{}", warning);
    }

    println!("{}", config.to_json()?);
    Ok(())
}

/// Write the pack-wide job description.
pub fn export_json(project_path: &Path, output: Option<&Path>) -> Result<()> {
    let project = load_project(project_path)?;
    let job = compile_project(&project, &compile_settings(&project));
    let content = serde_json::to_string_pretty(&job)?;

    match output {
        Some(path) => {
            fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Exported {} tracks to {}", job.tracks.len(), path.display());
        }
        None => println!("{}", content),
    }
    Ok(())
}

/// Check the msupcm++ executable.
pub fn verify(compiler: &Path) -> Result<()> {
    let version = MsuPcmAdapter::new(compiler)
        .verify()
        .with_context(|| format!("msupcm++ could not be validated at {}", compiler.display()))?;
    println!("{}", version);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NodeFields, ProjectDefaults};
    use tempfile::TempDir;

    fn project(dir: &Path) -> PathBuf {
        let mut project = Project::new("Test Pack", ProjectDefaults::default());
        project.project_path = dir.join("pack.json");

        let mut song = Song::new(1, "Title").with_output(dir.join("pack-1.pcm"));
        let root = song.root();
        song.set_fields(root, NodeFields::with_file("title.wav")).unwrap();
        project.track_mut(1, "Title").add_song(song);

        project.save().unwrap();
        project.project_path.clone()
    }

    #[test]
    fn test_export_json() {
        let temp_dir = TempDir::new().unwrap();
        let path = project(temp_dir.path());
        let output = temp_dir.path().join("tracks.json");

        export_json(&path, Some(&output)).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(json["first_track"], 1);
        assert_eq!(json["tracks"][0]["track_number"], 1);
        assert!(json["tracks"][0]["file"]
            .as_str()
            .unwrap()
            .ends_with("title.wav"));
    }

    #[test]
    fn test_compile_unknown_song() {
        let temp_dir = TempDir::new().unwrap();
        let path = project(temp_dir.path());

        assert!(compile(&path, "missing", None).is_err());
        assert!(validate(&path).is_ok());
    }

    #[test]
    fn test_build_requires_compiler() {
        let temp_dir = TempDir::new().unwrap();
        let path = project(temp_dir.path());
        let args = BuildArgs {
            force: false,
            jobs: None,
            compiler: temp_dir.path().join("no-msupcm"),
            work_dir: None,
            keep_temps: false,
            ack_warnings: false,
            tracks: Vec::new(),
        };

        let err = build(&path, &args).unwrap_err();
        assert!(err.to_string().contains("could not be validated"));
    }
}
