//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// cosync - constraint-resolved round synchronization
#[derive(Parser)]
#[command(
    name = "cosync",
    about = "Run co-design synchronization scenarios under a round coordinator",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a scenario to completion and print its report
    Run {
        /// Scenario file (YAML)
        #[arg(value_name = "SCENARIO")]
        scenario: PathBuf,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,

        /// Stop after this many rounds
        #[arg(long)]
        max_rounds: Option<u64>,
    },

    /// Validate a scenario without running it
    Check {
        /// Scenario file (YAML)
        #[arg(value_name = "SCENARIO")]
        scenario: PathBuf,
    },
}

/// Output format for run reports
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use: text or json", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_format_parsing() {
        assert_eq!("json".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!("PLAIN".parse::<OutputFormat>().unwrap(), OutputFormat::Text);
        assert!("table".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_parse_run_command() {
        let cli = Cli::try_parse_from(["cosync", "-l", "debug", "run", "s.yml", "--format", "json"]).unwrap();
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        match cli.command {
            Command::Run {
                scenario,
                format,
                max_rounds,
            } => {
                assert_eq!(scenario, PathBuf::from("s.yml"));
                assert_eq!(format, OutputFormat::Json);
                assert_eq!(max_rounds, None);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_check_command() {
        let cli = Cli::try_parse_from(["cosync", "check", "s.yml", "--config", "c.yml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("c.yml")));
        assert!(matches!(cli.command, Command::Check { .. }));
    }
}
