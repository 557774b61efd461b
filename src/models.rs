//! Data models for retrospective metrics.
//!
//! This module contains the typed input series read from a cycle directory,
//! their validation, and the derived per-cycle metrics and report structures
//! handed to the renderer.

use crate::analysis::comparison::Comparison;
use crate::analysis::insights::Alert;
use crate::analysis::quarter::QuarterRollup;
use crate::analysis::trend::TrendAnalysis;
use crate::error::{DataFormatError, Series};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A computed value, or the reason there isn't one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum Metric<T> {
    /// The value was computed.
    Value(T),
    /// The computation is degenerate (division by a zero mean or baseline).
    NotApplicable,
    /// The input series was empty or too short.
    InsufficientData,
}

impl<T> Metric<T> {
    /// Returns the value, if present.
    pub fn value(&self) -> Option<&T> {
        match self {
            Metric::Value(v) => Some(v),
            _ => None,
        }
    }

    /// Maps the contained value, keeping markers as they are.
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Metric<U> {
        match self {
            Metric::Value(v) => Metric::Value(f(v)),
            Metric::NotApplicable => Metric::NotApplicable,
            Metric::InsufficientData => Metric::InsufficientData,
        }
    }

    pub fn as_ref(&self) -> Metric<&T> {
        match self {
            Metric::Value(v) => Metric::Value(v),
            Metric::NotApplicable => Metric::NotApplicable,
            Metric::InsufficientData => Metric::InsufficientData,
        }
    }
}

impl<T: Copy> Metric<T> {
    /// Returns a copy of the value, if present.
    pub fn get(&self) -> Option<T> {
        self.value().copied()
    }
}

/// Ticket type, normalized from tracker labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketType {
    Feature,
    Bug,
    Task,
    Incident,
    Other,
}

impl fmt::Display for TicketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TicketType::Feature => write!(f, "Feature"),
            TicketType::Bug => write!(f, "Bug"),
            TicketType::Task => write!(f, "Task"),
            TicketType::Incident => write!(f, "Incident"),
            TicketType::Other => write!(f, "Other"),
        }
    }
}

impl From<&str> for TicketType {
    fn from(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "story" | "história" | "historia" | "feature" | "epic" => TicketType::Feature,
            "bug" => TicketType::Bug,
            "task" | "tarefa" | "sub-tarefa" | "subtarefa" | "subtask" | "sub-task" => {
                TicketType::Task
            }
            "incident" | "incidente" => TicketType::Incident,
            _ => TicketType::Other,
        }
    }
}

/// One daily snapshot of the board: item count per workflow stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CfdSnapshot {
    pub date: NaiveDate,
    pub stages: BTreeMap<String, u32>,
}

/// Items completed in the week starting at `period`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThroughputSample {
    pub period: NaiveDate,
    pub count: u32,
}

/// A lead-time histogram bucket: `item_count` items took `days` days.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LeadTimeSample {
    pub days: f64,
    pub item_count: u32,
}

/// A completed ticket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketRecord {
    /// Tracker key (e.g. `FFC-123`), when the export has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub ticket_type: TicketType,
    /// Parent summary; `None` means the ticket is not attributed to an epic.
    pub epic: Option<String>,
}

/// The four raw series of one retrospective cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CycleData {
    /// Cycle identifier, usually the retrospective date.
    pub label: String,
    pub cfd: Vec<CfdSnapshot>,
    pub throughput: Vec<ThroughputSample>,
    pub lead_time: Vec<LeadTimeSample>,
    pub tickets: Vec<TicketRecord>,
}

impl CycleData {
    /// Creates an empty cycle with the given label.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }

    /// Checks the structural invariants of every series.
    ///
    /// Empty series are valid here; the calculator turns them into
    /// insufficient-data markers.
    pub fn validate(&self) -> Result<(), DataFormatError> {
        if let Some(first) = self.cfd.first() {
            for (i, pair) in self.cfd.windows(2).enumerate() {
                if pair[1].date <= pair[0].date {
                    return Err(DataFormatError::OutOfOrder {
                        series: Series::Cfd,
                        row: i + 2,
                        date: pair[1].date,
                    });
                }
            }
            for (i, snapshot) in self.cfd.iter().enumerate().skip(1) {
                if !snapshot.stages.keys().eq(first.stages.keys()) {
                    return Err(DataFormatError::StageMismatch { row: i + 1 });
                }
            }
        }

        for (i, pair) in self.throughput.windows(2).enumerate() {
            if pair[1].period <= pair[0].period {
                return Err(DataFormatError::OutOfOrder {
                    series: Series::Throughput,
                    row: i + 2,
                    date: pair[1].period,
                });
            }
        }

        for (i, sample) in self.lead_time.iter().enumerate() {
            if !sample.days.is_finite() || sample.days <= 0.0 {
                return Err(DataFormatError::InvalidValue {
                    series: Series::LeadTime,
                    row: i + 1,
                    field: "Leadtime".to_string(),
                    value: sample.days.to_string(),
                });
            }
        }

        Ok(())
    }
}

/// Qualitative throughput predictability, derived from the CV.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Predictability {
    High,
    Medium,
    Low,
}

impl fmt::Display for Predictability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predictability::High => write!(f, "High"),
            Predictability::Medium => write!(f, "Medium"),
            Predictability::Low => write!(f, "Low"),
        }
    }
}

/// 85% band around the mean weekly throughput.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceBand {
    pub lower: f64,
    pub upper: f64,
}

/// Weekly throughput statistics for one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThroughputStats {
    /// The weekly samples the statistics were computed from.
    pub weekly: Vec<ThroughputSample>,
    pub total: u64,
    pub mean: f64,
    /// Population standard deviation.
    pub stddev: f64,
    /// Coefficient of variation in percent.
    pub cv: Metric<f64>,
    pub predictability: Metric<Predictability>,
    pub confidence_band: ConfidenceBand,
    pub trend: TrendAnalysis,
    /// Rolling average per week (partial windows at the start).
    pub rolling_average: Vec<f64>,
    /// Expanding average per week.
    pub accumulated_average: Vec<f64>,
}

/// Item counts per lead-time band.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadTimeBuckets {
    /// At most 5 days.
    pub fast: u64,
    /// More than 5 and at most 10 days.
    pub normal: u64,
    /// More than 10 days.
    pub slow: u64,
}

impl LeadTimeBuckets {
    pub fn total(&self) -> u64 {
        self.fast + self.normal + self.slow
    }

    /// Share of slow items in percent.
    pub fn slow_share(&self) -> Metric<f64> {
        match self.total() {
            0 => Metric::InsufficientData,
            total => Metric::Value(self.slow as f64 * 100.0 / total as f64),
        }
    }
}

/// A point of the cumulative lead-time distribution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CumulativePoint {
    pub days: f64,
    pub count: u64,
    pub cumulative_percent: f64,
}

/// Lead-time statistics for one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadTimeStats {
    pub total_items: u64,
    pub mean: f64,
    pub p50: f64,
    pub p90: f64,
    pub stddev: f64,
    pub buckets: LeadTimeBuckets,
    pub distribution: Vec<CumulativePoint>,
}

/// Count and share of one ticket type.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TypeShare {
    pub ticket_type: TicketType,
    pub count: usize,
    pub percent: f64,
}

/// Count and share of one epic among attributed tickets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpicShare {
    pub epic: String,
    pub count: usize,
    pub percent: f64,
}

/// How the cycle's tickets split by type and by epic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TicketDistribution {
    pub total: usize,
    /// Types present in the cycle, in declaration order of [`TicketType`].
    pub by_type: Vec<TypeShare>,
    /// Ranked by count descending, then epic name ascending.
    pub by_epic: Vec<EpicShare>,
    pub unattributed_total: usize,
    pub unattributed_by_type: Vec<TypeShare>,
}

impl TicketDistribution {
    /// Share of the given type among all tickets, in percent.
    pub fn percent_of(&self, ticket_type: TicketType) -> Metric<f64> {
        if self.total == 0 {
            return Metric::InsufficientData;
        }
        let percent = self
            .by_type
            .iter()
            .find(|s| s.ticket_type == ticket_type)
            .map(|s| s.percent)
            .unwrap_or(0.0);
        Metric::Value(percent)
    }
}

/// Alert preconditions evaluated while computing the metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertFlags {
    pub elevated_bug_ratio: bool,
    pub elevated_incident_ratio: bool,
}

/// Everything computed for one cycle. Built once by the calculator and only
/// read afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleMetrics {
    pub label: String,
    pub wip_average: Metric<f64>,
    pub throughput: Metric<ThroughputStats>,
    pub lead_time: Metric<LeadTimeStats>,
    pub tickets: TicketDistribution,
    pub flags: AlertFlags,
}

/// Metadata about a generated report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Team directory name, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team: Option<String>,
    /// Quarter directory name, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quarter: Option<String>,
    pub generated_at: DateTime<Utc>,
    pub tool_version: String,
}

/// The single-cycle retrospective report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetroReport {
    pub metadata: ReportMetadata,
    pub metrics: CycleMetrics,
    /// Absent when the cycle has no predecessor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comparison: Option<Comparison>,
    pub alerts: Vec<Alert>,
    pub recommendations: Vec<String>,
}

impl RetroReport {
    /// Number of warning-level alerts.
    pub fn warning_count(&self) -> usize {
        self.alerts.iter().filter(|a| a.is_warning()).count()
    }
}

/// The quarter rollup report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuarterReport {
    pub metadata: ReportMetadata,
    pub rollup: QuarterRollup,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn snapshot(d: &str, stages: &[(&str, u32)]) -> CfdSnapshot {
        CfdSnapshot {
            date: date(d),
            stages: stages.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        }
    }

    #[test]
    fn test_ticket_type_from_str() {
        assert_eq!(TicketType::from("Bug"), TicketType::Bug);
        assert_eq!(TicketType::from("Incidente"), TicketType::Incident);
        assert_eq!(TicketType::from("História"), TicketType::Feature);
        assert_eq!(TicketType::from("Sub-tarefa"), TicketType::Task);
        assert_eq!(TicketType::from(" TASK "), TicketType::Task);
        assert_eq!(TicketType::from("Melhoria"), TicketType::Other);
    }

    #[test]
    fn test_metric_map_keeps_markers() {
        let value: Metric<f64> = Metric::Value(2.0);
        assert_eq!(value.map(|v| v * 2.0), Metric::Value(4.0));

        let na: Metric<f64> = Metric::NotApplicable;
        assert_eq!(na.map(|v| v * 2.0), Metric::NotApplicable);
        assert_eq!(na.get(), None);
    }

    #[test]
    fn test_metric_serializes_with_status() {
        let json = serde_json::to_string(&Metric::Value(1.5)).unwrap();
        assert_eq!(json, r#"{"status":"value","value":1.5}"#);

        let json = serde_json::to_string(&Metric::<f64>::NotApplicable).unwrap();
        assert_eq!(json, r#"{"status":"not_applicable"}"#);
    }

    #[test]
    fn test_validate_accepts_empty_cycle() {
        assert!(CycleData::new("2026-01-15").validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_unordered_throughput() {
        let mut cycle = CycleData::new("c");
        cycle.throughput = vec![
            ThroughputSample {
                period: date("2026-01-12"),
                count: 4,
            },
            ThroughputSample {
                period: date("2026-01-05"),
                count: 6,
            },
        ];

        let err = cycle.validate().unwrap_err();
        assert_eq!(
            err,
            DataFormatError::OutOfOrder {
                series: Series::Throughput,
                row: 2,
                date: date("2026-01-05"),
            }
        );
    }

    #[test]
    fn test_validate_rejects_stage_set_change() {
        let mut cycle = CycleData::new("c");
        cycle.cfd = vec![
            snapshot("2026-01-01", &[("IN PROGRESS", 2), ("DONE", 1)]),
            snapshot("2026-01-02", &[("IN PROGRESS", 3), ("TESTING", 1)]),
        ];

        assert_eq!(
            cycle.validate().unwrap_err(),
            DataFormatError::StageMismatch { row: 2 }
        );
    }

    #[test]
    fn test_validate_rejects_non_positive_lead_time() {
        let mut cycle = CycleData::new("c");
        cycle.lead_time = vec![
            LeadTimeSample {
                days: 3.0,
                item_count: 1,
            },
            LeadTimeSample {
                days: 0.0,
                item_count: 2,
            },
        ];

        match cycle.validate() {
            Err(DataFormatError::InvalidValue { series, row, .. }) => {
                assert_eq!(series, Series::LeadTime);
                assert_eq!(row, 2);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_percent_of_missing_type_is_zero() {
        let dist = TicketDistribution {
            total: 4,
            by_type: vec![TypeShare {
                ticket_type: TicketType::Task,
                count: 4,
                percent: 100.0,
            }],
            ..TicketDistribution::default()
        };
        assert_eq!(dist.percent_of(TicketType::Bug), Metric::Value(0.0));
        assert_eq!(
            TicketDistribution::default().percent_of(TicketType::Bug),
            Metric::InsufficientData
        );
    }

    #[test]
    fn test_bucket_slow_share() {
        let buckets = LeadTimeBuckets {
            fast: 6,
            normal: 2,
            slow: 2,
        };
        assert_eq!(buckets.total(), 10);
        assert_eq!(buckets.slow_share(), Metric::Value(20.0));
    }
}
