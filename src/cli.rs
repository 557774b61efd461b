//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::Parser;
use std::path::PathBuf;

/// RetroLens - sprint retrospective metrics from tracker exports
///
/// Computes throughput, lead-time, WIP and ticket-mix metrics for a cycle,
/// compares it with the previous one and raises alerts. Markdown/JSON reports.
///
/// Examples:
///   retrolens --cycle data/payments/2026-Q1/2026-02-11
///   retrolens --cycle data/payments/2026-Q1/2026-02-11 --format json --output retro.json
///   retrolens --quarter data/payments/2026-Q1 --top-epics 5
///   retrolens --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Cycle directory to analyze (team/quarter/YYYY-MM-DD)
    #[arg(
        long,
        value_name = "DIR",
        required_unless_present_any = ["quarter", "init_config"]
    )]
    pub cycle: Option<PathBuf>,

    /// Quarter directory whose cycles are rolled up (team/YYYY-QN)
    #[arg(long, value_name = "DIR", conflicts_with = "cycle")]
    pub quarter: Option<PathBuf>,

    /// Previous cycle directory to compare against
    ///
    /// If not specified, the latest earlier cycle of the same team is used.
    #[arg(long, value_name = "DIR", requires = "cycle", conflicts_with = "no_compare")]
    pub previous: Option<PathBuf>,

    /// Skip the comparison with the previous cycle
    #[arg(long)]
    pub no_compare: bool,

    /// Alert when the share of slow (>10 day) items exceeds this percentage
    #[arg(long, value_name = "PCT")]
    pub slow_share: Option<f64>,

    /// Number of epics listed in the quarter ranking
    #[arg(long, value_name = "N")]
    pub top_epics: Option<usize>,

    /// Output file path for the report
    ///
    /// Defaults to retro_metrics.md or the value in the config file.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Path to configuration file
    ///
    /// If not specified, looks for .retrolens.toml in the current directory
    #[arg(short, long, value_name = "FILE", env = "RETROLENS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Exit with code 2 when any warning alert is raised
    #[arg(long)]
    pub fail_on_warning: bool,

    /// Generate a default .retrolens.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        match (&self.cycle, &self.quarter) {
            (None, None) => return Err("Either --cycle or --quarter is required".to_string()),
            (Some(_), Some(_)) => {
                return Err("Cannot use both --cycle and --quarter".to_string())
            }
            _ => {}
        }

        for (flag, dir) in [
            ("--cycle", &self.cycle),
            ("--quarter", &self.quarter),
            ("--previous", &self.previous),
        ] {
            if let Some(dir) = dir {
                if !dir.is_dir() {
                    return Err(format!("{} is not a directory: {}", flag, dir.display()));
                }
            }
        }

        if self.previous.is_some() && self.no_compare {
            return Err("Cannot use both --previous and --no-compare".to_string());
        }

        if let Some(share) = self.slow_share {
            if !(share > 0.0 && share <= 100.0) {
                return Err("Slow share must be in (0, 100]".to_string());
            }
        }

        if self.top_epics == Some(0) {
            return Err("Top epics must be at least 1".to_string());
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_args(cycle: PathBuf) -> Args {
        Args {
            cycle: Some(cycle),
            quarter: None,
            previous: None,
            no_compare: false,
            slow_share: None,
            top_epics: None,
            output: None,
            format: OutputFormat::Markdown,
            config: None,
            verbose: false,
            quiet: false,
            fail_on_warning: false,
            init_config: false,
        }
    }

    #[test]
    fn test_validation_ok() {
        let dir = TempDir::new().unwrap();
        let args = make_args(dir.path().to_path_buf());
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_validation_missing_directory() {
        let dir = TempDir::new().unwrap();
        let args = make_args(dir.path().join("2026-01-14"));
        let err = args.validate().unwrap_err();
        assert!(err.contains("--cycle"));
    }

    #[test]
    fn test_validation_requires_a_target() {
        let dir = TempDir::new().unwrap();
        let mut args = make_args(dir.path().to_path_buf());
        args.cycle = None;
        assert!(args.validate().is_err());

        args.init_config = true;
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let dir = TempDir::new().unwrap();
        let mut args = make_args(dir.path().to_path_buf());
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());

        let mut args = make_args(dir.path().to_path_buf());
        args.previous = Some(dir.path().to_path_buf());
        args.no_compare = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_ranges() {
        let dir = TempDir::new().unwrap();
        let mut args = make_args(dir.path().to_path_buf());
        args.slow_share = Some(0.0);
        assert!(args.validate().is_err());

        args.slow_share = Some(30.0);
        assert!(args.validate().is_ok());

        args.top_epics = Some(0);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_parse_flags() {
        let args = Args::parse_from([
            "retrolens",
            "--quarter",
            "data/team/2026-Q1",
            "--format",
            "json",
            "--fail-on-warning",
        ]);
        assert_eq!(args.quarter, Some(PathBuf::from("data/team/2026-Q1")));
        assert_eq!(args.format, OutputFormat::Json);
        assert!(args.fail_on_warning);
        assert!(args.cycle.is_none());
    }

    #[test]
    fn test_log_level() {
        let dir = TempDir::new().unwrap();
        let mut args = make_args(dir.path().to_path_buf());
        assert_eq!(args.log_level(), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(), tracing::Level::ERROR);
    }
}
