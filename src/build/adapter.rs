//! External Compiler Adapter
//!
//! The seam between the orchestrator and msupcm++. Everything native lives
//! behind [`CompilerAdapter`] so batches can be driven by a scripted fake.

use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::SystemTime;

use log::{debug, error};

use crate::error::{MsuError, Result};

/// One invocation of the native compiler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerJob {
    pub song_id: String,
    /// Job description file to hand to the compiler.
    pub job_path: PathBuf,
    pub work_dir: PathBuf,
    /// Where the job description tells the compiler to write.
    pub expected_output: PathBuf,
}

/// What the compiler reported for one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterOutcome {
    /// Artifact written, nothing printed on stderr.
    Clean,
    /// Artifact written, but the tool complained.
    Warning(String),
    /// No usable artifact.
    Failed { message: String, transient: bool },
}

impl AdapterOutcome {
    pub fn failed(message: impl Into<String>) -> Self {
        let message = message.into();
        let transient = is_transient(&message);
        AdapterOutcome::Failed { message, transient }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, AdapterOutcome::Failed { .. })
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, AdapterOutcome::Failed { transient: true, .. })
    }
}

/// Anything that can turn a job description file into an artifact.
pub trait CompilerAdapter: Send + Sync {
    /// Short name used in log lines.
    fn name(&self) -> &str {
        "msupcm++"
    }

    /// Run one job synchronously.
    fn compile(&self, job: &CompilerJob) -> AdapterOutcome;

    /// Check that the tool is usable, returning its version line.
    fn verify(&self) -> Result<String>;
}

/// The temp-file race inside msupcm++'s sox wrapper clears up on a second run.
pub fn is_transient(message: &str) -> bool {
    message.contains("__sox_wrapper_temp") && message.contains("Permission denied")
}

/// Strip NULs and surrounding whitespace from tool output.
pub fn clean_message(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).replace('\0', "").trim().to_string()
}

/// Runs a local msupcm++ executable.
#[derive(Debug, Clone)]
pub struct MsuPcmAdapter {
    executable: PathBuf,
}

impl MsuPcmAdapter {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
        }
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Locate the tool: an existing file as given, otherwise a program name
    /// looked up on PATH.
    pub fn resolve(&self) -> Result<PathBuf> {
        let not_found = || MsuError::CompilerNotFound {
            path: self.executable.clone(),
        };
        if self.executable.as_os_str().is_empty() {
            return Err(not_found());
        }
        if self.executable.is_file() {
            return Ok(self.executable.clone());
        }
        let found = which::which(&self.executable).map_err(|_| not_found())?;
        debug!("Resolved {} to {}", self.executable.display(), found.display());
        Ok(found)
    }

    /// Run the tool, returning cleaned (stdout, stderr, exit success).
    fn run(&self, args: &[&OsStr], work_dir: Option<&Path>) -> Result<(String, String, bool)> {
        let executable = self.resolve()?;

        let mut command = Command::new(&executable);
        command.args(args);
        if let Some(dir) = work_dir {
            command.current_dir(dir);
        }

        let output = command.output().map_err(|e| MsuError::CompilerFailed {
            reason: format!("Failed to start {}: {}", executable.display(), e),
        })?;

        Ok((
            clean_message(&output.stdout),
            clean_message(&output.stderr),
            output.status.success(),
        ))
    }
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

impl CompilerAdapter for MsuPcmAdapter {
    fn compile(&self, job: &CompilerJob) -> AdapterOutcome {
        let before = modified_time(&job.expected_output);

        let (stdout, stderr, exited_ok) =
            match self.run(&[job.job_path.as_os_str()], Some(&job.work_dir)) {
                Ok(result) => result,
                Err(e) => return AdapterOutcome::failed(e.to_string()),
            };
        debug!("msupcm++ output for {}: {}", job.song_id, stdout);

        // Only count the artifact if this run wrote it.
        let produced = match (modified_time(&job.expected_output), before) {
            (Some(after), Some(before)) => after > before,
            (Some(_), None) => true,
            (None, _) => false,
        } && fs::metadata(&job.expected_output).map(|m| m.len() > 0).unwrap_or(false);

        if !stderr.is_empty() {
            if produced {
                return AdapterOutcome::Warning(stderr);
            }
            error!("Error running msupcm++ for {}: {}", job.song_id, stderr);
            return AdapterOutcome::failed(stderr);
        }

        if !produced {
            let message = if stdout.is_empty() {
                "msupcm++ ran but did not create the expected file or return an error message".to_string()
            } else {
                format!(
                    "msupcm++ did not create the expected file and returned with the following message: {}",
                    stdout
                )
            };
            error!("Error running msupcm++ for {}: {}", job.song_id, message);
            return AdapterOutcome::failed(message);
        }

        if !exited_ok {
            return AdapterOutcome::Warning("msupcm++ exited with a non-zero status".to_string());
        }

        AdapterOutcome::Clean
    }

    fn verify(&self) -> Result<String> {
        let (stdout, stderr, _) = self.run(&[OsStr::new("-v")], None)?;
        if !stderr.is_empty() {
            return Err(MsuError::CompilerFailed { reason: stderr });
        }
        if !stdout.starts_with("msupcm v") {
            return Err(MsuError::CompilerFailed {
                reason: format!("Unexpected version output: {}", stdout),
            });
        }
        Ok(stdout.lines().next().unwrap_or_default().to_string())
    }
}
