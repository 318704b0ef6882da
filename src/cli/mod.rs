//! CLI Module
//!
//! Command-line interface for building MSU-1 audio packs.

pub mod commands;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// MSU-1 audio pack builder driving msupcm++
#[derive(Parser, Debug)]
#[command(name = "msubuild")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build PCM files for every stale song
    #[command(name = "build")]
    Build {
        /// Path to the project file
        project: PathBuf,

        #[command(flatten)]
        args: BuildArgs,
    },

    /// Report tree structure warnings for every song
    #[command(name = "validate")]
    Validate {
        /// Path to the project file
        project: PathBuf,
    },

    /// Print one song's job description
    #[command(name = "compile")]
    Compile {
        /// Path to the project file
        project: PathBuf,

        /// Song id
        #[arg(short, long)]
        song: String,

        /// Flatten the tree for this option index
        #[arg(long)]
        option: Option<u32>,
    },

    /// Write the pack-wide job description
    #[command(name = "export-json")]
    ExportJson {
        /// Path to the project file
        project: PathBuf,

        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Check that msupcm++ runs
    #[command(name = "verify")]
    Verify {
        /// Path to the msupcm++ executable
        #[arg(short, long, default_value = "msupcm")]
        compiler: PathBuf,
    },
}

#[derive(Args, Debug, Clone)]
pub struct BuildArgs {
    /// Rebuild even when the cache says a song is up to date
    #[arg(short, long)]
    pub force: bool,

    /// Maximum concurrent msupcm++ processes
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Path to the msupcm++ executable
    #[arg(short, long, default_value = "msupcm")]
    pub compiler: PathBuf,

    /// Directory for job files and staged artifacts
    #[arg(long)]
    pub work_dir: Option<PathBuf>,

    /// Keep job files and staged artifacts
    #[arg(long)]
    pub keep_temps: bool,

    /// Accept every new compiler warning so it is not shown again
    #[arg(long)]
    pub ack_warnings: bool,

    /// Only build these track numbers
    #[arg(short, long = "track")]
    pub tracks: Vec<u32>,
}
