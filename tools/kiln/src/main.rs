//! kiln command-line entry point.

use anyhow::Result;
use clap::Parser;
use kiln::builder::{BuildOutcome, Builder};
use kiln::cli::{self, Cli, Command};
use kiln::report::{self, Verbosity};
use kiln::workspace::Target;
use kiln_config::ConfigFile;

fn main() -> Result<()> {
    let cli = Cli::parse();
    report::set_verbosity(Verbosity::from_flags(cli.quiet, cli.verbose));

    match cli.command {
        Command::Build(ref args) => cmd_build(&cli, args, false),
        Command::Rebuild(ref args) => cmd_build(&cli, args, true),
        Command::Clean(ref args) => cmd_clean(&cli, args),
        Command::Resolve(ref args) => cmd_resolve(&cli, args),
    }
}

/// Load the workspace named on the command line.
fn load(cli: &Cli) -> Result<Builder> {
    let target = Target {
        configuration: cli.config.clone().unwrap_or_default(),
        platform: cli.platform.clone().unwrap_or_default(),
    };
    Builder::new(&cli.workspace, &target, cli.jobs.unwrap_or(0))
}

/// Build or rebuild.
fn cmd_build(cli: &Cli, args: &cli::BuildArgs, rebuild: bool) -> Result<()> {
    let builder = load(cli)?;
    let project = args.project.as_deref();
    let outcomes = if rebuild {
        builder.rebuild(project, !args.no_deps)?
    } else {
        builder.build(project, !args.no_deps)?
    };

    let count = |o: BuildOutcome| outcomes.iter().filter(|(_, x)| *x == o).count();
    let warnings = report::counts().warnings;
    println!(
        "\nBuild finished: {} built, {} up to date, {} skipped ({} {}), {warnings} warning{}.",
        count(BuildOutcome::Built),
        count(BuildOutcome::UpToDate),
        count(BuildOutcome::Skipped),
        builder.target().configuration,
        builder.target().platform,
        if warnings == 1 { "" } else { "s" },
    );
    Ok(())
}

/// Remove build artifacts.
fn cmd_clean(cli: &Cli, args: &cli::CleanArgs) -> Result<()> {
    let builder = load(cli)?;
    builder.clean(args.project.as_deref())?;
    println!("Clean complete.");
    Ok(())
}

/// Dump a resolved configuration.
fn cmd_resolve(cli: &Cli, args: &cli::ResolveArgs) -> Result<()> {
    let builder = load(cli)?;
    let config = match args.project.as_deref() {
        Some(name) => &builder.project(name)?.config,
        None => &builder.workspace().config,
    };
    print_config(config);
    Ok(())
}

fn print_config(config: &ConfigFile) {
    println!("# {}", config.path().display());
    for group in config.groups() {
        let keys = config.keys(group);
        if keys.is_empty() {
            continue;
        }
        if group.is_empty() {
            println!("\n(global)");
        } else {
            println!("\n[{group}]");
        }
        for key in keys {
            for value in config.get_values(group, key) {
                println!("  {key} = {value}");
            }
        }
    }
}
