//! Cycle-over-cycle comparison.
//!
//! The engine consumes two already-resolved [`CycleMetrics`]; which cycle is
//! "previous" is decided by the caller.

use crate::models::{CycleMetrics, Metric};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Metrics tracked across cycles, in comparison order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackedMetric {
    ThroughputMean,
    LeadTimeP50,
    LeadTimeP90,
    LeadTimeStddev,
}

impl TrackedMetric {
    pub const ALL: [TrackedMetric; 4] = [
        TrackedMetric::ThroughputMean,
        TrackedMetric::LeadTimeP50,
        TrackedMetric::LeadTimeP90,
        TrackedMetric::LeadTimeStddev,
    ];

    pub fn higher_is_better(&self) -> bool {
        matches!(self, TrackedMetric::ThroughputMean)
    }

    /// Read this metric from a cycle.
    pub fn read(&self, metrics: &CycleMetrics) -> Metric<f64> {
        match self {
            TrackedMetric::ThroughputMean => metrics.throughput.as_ref().map(|t| t.mean),
            TrackedMetric::LeadTimeP50 => metrics.lead_time.as_ref().map(|l| l.p50),
            TrackedMetric::LeadTimeP90 => metrics.lead_time.as_ref().map(|l| l.p90),
            TrackedMetric::LeadTimeStddev => metrics.lead_time.as_ref().map(|l| l.stddev),
        }
    }
}

impl fmt::Display for TrackedMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackedMetric::ThroughputMean => write!(f, "Throughput (mean/week)"),
            TrackedMetric::LeadTimeP50 => write!(f, "Lead time p50"),
            TrackedMetric::LeadTimeP90 => write!(f, "Lead time p90"),
            TrackedMetric::LeadTimeStddev => write!(f, "Lead time stddev"),
        }
    }
}

/// Whether a metric moved in the good or bad direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Improved,
    Worsened,
    Stable,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Improved => write!(f, "Improved"),
            Direction::Worsened => write!(f, "Worsened"),
            Direction::Stable => write!(f, "Stable"),
        }
    }
}

impl Direction {
    pub fn emoji(&self) -> &'static str {
        match self {
            Direction::Improved => "🟢",
            Direction::Worsened => "🔴",
            Direction::Stable => "⚪",
        }
    }
}

/// Change of one tracked metric between two cycles.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub metric: TrackedMetric,
    pub previous_value: Metric<f64>,
    pub current_value: Metric<f64>,
    pub percent_change: Metric<f64>,
    pub direction: Metric<Direction>,
}

/// All tracked metrics of a cycle against its predecessor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub previous_label: String,
    pub current_label: String,
    pub results: Vec<ComparisonResult>,
}

impl Comparison {
    pub fn result_for(&self, metric: TrackedMetric) -> Option<&ComparisonResult> {
        self.results.iter().find(|r| r.metric == metric)
    }
}

/// `(current − previous) / previous × 100`; not applicable for a zero baseline.
pub fn percent_change(previous: f64, current: f64) -> Metric<f64> {
    if previous == 0.0 {
        Metric::NotApplicable
    } else {
        Metric::Value((current - previous) / previous * 100.0)
    }
}

/// Percent-change thresholds beyond which a metric counts as moved.
#[derive(Debug, Clone, Copy)]
pub struct ComparisonConfig {
    /// Throughput threshold in percent.
    pub throughput_change_pct: f64,
    /// Lead-time threshold in percent.
    pub lead_time_change_pct: f64,
}

impl Default for ComparisonConfig {
    fn default() -> Self {
        Self {
            throughput_change_pct: 5.0,
            lead_time_change_pct: 10.0,
        }
    }
}

impl From<&crate::config::Config> for ComparisonConfig {
    fn from(config: &crate::config::Config) -> Self {
        Self {
            throughput_change_pct: config.thresholds.throughput_change_pct,
            lead_time_change_pct: config.thresholds.lead_time_change_pct,
        }
    }
}

/// Compares a cycle against its predecessor.
#[derive(Debug, Clone, Default)]
pub struct ComparisonEngine {
    config: ComparisonConfig,
}

impl ComparisonEngine {
    pub fn new(config: ComparisonConfig) -> Self {
        Self { config }
    }

    /// Direction of a percent change for the given metric.
    pub fn direction(&self, metric: TrackedMetric, change: f64) -> Direction {
        let (threshold, signed) = if metric.higher_is_better() {
            (self.config.throughput_change_pct, change)
        } else {
            (self.config.lead_time_change_pct, -change)
        };

        if signed > threshold {
            Direction::Improved
        } else if signed < -threshold {
            Direction::Worsened
        } else {
            Direction::Stable
        }
    }

    fn compare_metric(
        &self,
        metric: TrackedMetric,
        current: &CycleMetrics,
        previous: &CycleMetrics,
    ) -> ComparisonResult {
        let previous_value = metric.read(previous);
        let current_value = metric.read(current);

        let percent_change = match (previous_value.get(), current_value.get()) {
            (Some(p), Some(c)) => percent_change(p, c),
            _ => Metric::InsufficientData,
        };

        ComparisonResult {
            metric,
            previous_value,
            current_value,
            percent_change,
            direction: percent_change.map(|change| self.direction(metric, change)),
        }
    }

    /// Compare every tracked metric. No predecessor means no comparison.
    pub fn compare(
        &self,
        current: &CycleMetrics,
        previous: Option<&CycleMetrics>,
    ) -> Option<Comparison> {
        let previous = previous?;

        Some(Comparison {
            previous_label: previous.label.clone(),
            current_label: current.label.clone(),
            results: TrackedMetric::ALL
                .iter()
                .map(|metric| self.compare_metric(*metric, current, previous))
                .collect(),
        })
    }
}
