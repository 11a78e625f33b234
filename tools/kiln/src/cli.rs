//! Command-line interface definitions for kiln.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Incremental build orchestrator for C and C++ workspaces.
#[derive(Parser, Debug)]
#[command(name = "kiln", version, about)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Workspace description file.
    #[arg(long, short = 'w', global = true, default_value = "workspace.kiln")]
    pub workspace: PathBuf,

    /// Configuration to build (defaults to the first one the workspace declares).
    #[arg(long, short = 'c', global = true)]
    pub config: Option<String>,

    /// Platform to build (defaults to the first one the workspace declares).
    #[arg(long, short = 'p', global = true)]
    pub platform: Option<String>,

    /// Suppress per-task output; show only errors and the final summary.
    #[arg(long, short = 'q', global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Enable verbose output with staleness reasons and timings.
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Maximum number of parallel workers (0 or omitted = auto-detect from CPU count).
    #[arg(long, short = 'j', global = true)]
    pub jobs: Option<usize>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build a project (or the whole workspace) incrementally.
    Build(BuildArgs),
    /// Clean, then build from scratch.
    Rebuild(BuildArgs),
    /// Remove intermediate files and outputs.
    Clean(CleanArgs),
    /// Print the resolved configuration of a project or the workspace.
    Resolve(ResolveArgs),
}

/// Arguments for `build` and `rebuild`.
#[derive(Parser, Debug)]
pub struct BuildArgs {
    /// Only this project (by `Project.Name`).
    #[arg(long)]
    pub project: Option<String>,

    /// Do not build the project's dependencies first.
    #[arg(long)]
    pub no_deps: bool,
}

/// Arguments for `clean`.
#[derive(Parser, Debug)]
pub struct CleanArgs {
    /// Only this project (by `Project.Name`).
    #[arg(long)]
    pub project: Option<String>,
}

/// Arguments for `resolve`.
#[derive(Parser, Debug)]
pub struct ResolveArgs {
    /// Project to print; the workspace file when omitted.
    #[arg(long)]
    pub project: Option<String>,
}
