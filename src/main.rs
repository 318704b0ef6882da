//! msubuild CLI - MSU-1 Audio Pack Builder
//!
//! Command-line interface for the msubuild pipeline.

use anyhow::Result;
use clap::Parser;
use env_logger::Env;
use log::info;

use msubuild::cli::{commands, Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logger
    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter)).init();

    info!("msubuild v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Some(cmd) => handle_command(cmd),
        None => {
            println!("msubuild v{}", env!("CARGO_PKG_VERSION"));
            println!("Use --help for available commands");
            Ok(())
        }
    }
}

fn handle_command(cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Build { project, args } => commands::build(&project, &args),
        Commands::Validate { project } => commands::validate(&project),
        Commands::Compile {
            project,
            song,
            option,
        } => commands::compile(&project, &song, option),
        Commands::ExportJson { project, output } => commands::export_json(&project, output.as_deref()),
        Commands::Verify { compiler } => commands::verify(&compiler),
    }
}
