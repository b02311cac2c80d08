//! cosync - round synchronization scenario runner
//!
//! CLI entry point for running and checking scenario files.

use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use eyre::{Context, Result};
use tracing::{debug, info};

use cosync::cli::{Cli, Command, OutputFormat};
use cosync::config::Config;
use cosync::scenario::Scenario;
use cosync::simulation::SimulationReport;

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>, log_file: Option<&PathBuf>) -> Result<()> {
    // Determine log level with priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());

    match log_file {
        Some(path) => {
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                fs::create_dir_all(dir).context("Failed to create log directory")?;
            }
            let file = fs::File::create(path).context("Failed to create log file")?;
            tracing_subscriber::fmt()
                .with_writer(file)
                .with_ansi(false)
                .with_env_filter(filter)
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .with_env_filter(filter)
                .init();
        }
    }

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    // Setup logging with priority: CLI > config > INFO default
    setup_logging(
        cli.log_level.as_deref(),
        config.log_level.as_deref(),
        config.log_file.as_ref(),
    )
    .context("Failed to setup logging")?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Run {
            scenario,
            format,
            max_rounds,
        } => cmd_run(config, &scenario, format, max_rounds).await,
        Command::Check { scenario } => cmd_check(&scenario),
    }
}

/// Run a scenario and print its report
async fn cmd_run(config: Config, path: &Path, format: OutputFormat, max_rounds: Option<u64>) -> Result<()> {
    let scenario = Scenario::load(path)?;

    let mut coordinator = config.coordinator;
    if max_rounds.is_some() {
        coordinator.max_rounds = max_rounds;
    }
    coordinator.validate()?;

    let report = scenario.build(coordinator)?.run().await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print_report(&report),
    }
    Ok(())
}

/// Validate a scenario and summarize it
fn cmd_check(path: &Path) -> Result<()> {
    let scenario = Scenario::load(path)?;
    scenario
        .validate()
        .context(format!("Scenario {} is invalid", path.display()))?;

    let constraints: usize = scenario.solvers.iter().map(|s| s.constraints.len()).sum();
    println!(
        "{}: ok ({} actors, {} adaptors, {} channels, {} solvers, {} constraints)",
        path.display(),
        scenario.actors.len(),
        scenario.adaptors.len(),
        scenario.channels.len(),
        scenario.solvers.len(),
        constraints
    );
    Ok(())
}

fn print_report(report: &SimulationReport) {
    let m = &report.metrics;
    println!("Rounds:          {}", m.rounds);
    println!("Solver passes:   {} (max {} in one round)", m.solver_passes, m.max_passes_in_round);
    println!("Proposals:       {}", m.proposals);
    println!("Admitted:        {}", m.admitted);
    println!("Idle releases:   {}", m.idle_releases);
    println!();

    println!("{:<16} {:>9} {:>8} {:>8} {:>8}", "COMPONENT", "ADMITTED", "IN", "OUT", "DROPPED");
    for c in &report.components {
        println!(
            "{:<16} {:>9} {:>8} {:>8} {:>8}",
            c.name, c.admitted, c.records_in, c.records_out, c.records_dropped
        );
    }

    if !report.channels.is_empty() {
        println!();
        println!("{:<16} {:>8} {:>8} {:>8} {:>8}", "CHANNEL", "WRITTEN", "READ", "DROPPED", "LEFT");
        for (name, stats) in &report.channels {
            println!(
                "{:<16} {:>8} {:>8} {:>8} {:>8}",
                name, stats.written, stats.read, stats.dropped, stats.len
            );
        }
    }
}
