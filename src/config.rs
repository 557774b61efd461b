//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.retrolens.toml` files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Name of the configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = ".retrolens.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Alerting and comparison thresholds.
    #[serde(default)]
    pub thresholds: ThresholdConfig,

    /// Workflow settings.
    #[serde(default)]
    pub workflow: WorkflowConfig,

    /// Report settings.
    #[serde(default)]
    pub report: ReportConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Default output file path.
    #[serde(default = "default_output")]
    pub output: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
        }
    }
}

fn default_output() -> String {
    "retro_metrics.md".to_string()
}

/// Thresholds, all in percent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdConfig {
    /// Bug share above which a cycle is flagged.
    #[serde(default = "default_bug_percent")]
    pub bug_percent: f64,

    /// Incident share above which a cycle is flagged.
    #[serde(default = "default_incident_percent")]
    pub incident_percent: f64,

    /// Throughput mean change needed to count as improved or worsened.
    #[serde(default = "default_throughput_change_pct")]
    pub throughput_change_pct: f64,

    /// Lead-time change needed to count as improved or worsened.
    #[serde(default = "default_lead_time_change_pct")]
    pub lead_time_change_pct: f64,

    /// Share of slow (>10 day) items that raises an outlier alert.
    /// No default: the rule is off unless set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slow_lead_time_share: Option<f64>,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            bug_percent: default_bug_percent(),
            incident_percent: default_incident_percent(),
            throughput_change_pct: default_throughput_change_pct(),
            lead_time_change_pct: default_lead_time_change_pct(),
            slow_lead_time_share: None,
        }
    }
}

fn default_bug_percent() -> f64 {
    15.0
}

fn default_incident_percent() -> f64 {
    10.0
}

fn default_throughput_change_pct() -> f64 {
    5.0
}

fn default_lead_time_change_pct() -> f64 {
    10.0
}

/// Workflow settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// CFD stages not counted as work in progress.
    #[serde(default = "default_excluded_stages")]
    pub excluded_stages: Vec<String>,

    /// Window, in weeks, for rolling averages and rolling CV.
    #[serde(default = "default_rolling_window")]
    pub rolling_window: usize,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            excluded_stages: default_excluded_stages(),
            rolling_window: default_rolling_window(),
        }
    }
}

fn default_excluded_stages() -> Vec<String> {
    vec!["DONE", "READY TO DEV"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_rolling_window() -> usize {
    3
}

/// Report generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Number of epics kept in the quarter ranking.
    #[serde(default = "default_top_epics")]
    pub top_epics: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            top_epics: default_top_epics(),
        }
    }
}

fn default_top_epics() -> usize {
    10
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(DEFAULT_CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    /// Only values the user actually passed override the file.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref output) = args.output {
            self.general.output = output.display().to_string();
        }

        if let Some(share) = args.slow_share {
            self.thresholds.slow_lead_time_share = Some(share);
        }

        if let Some(top) = args.top_epics {
            self.report.top_epics = top;
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
