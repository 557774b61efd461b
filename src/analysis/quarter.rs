//! Quarter-level rollups across several cycles.
//!
//! The aggregator expects its input already in chronological order and
//! never reorders it.

use crate::analysis::metrics::rolling_cv;
use crate::analysis::trend::{self, TrendAnalysis};
use crate::config::Config;
use crate::models::{CycleMetrics, Metric, ThroughputSample};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// A per-cycle value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleValue {
    pub label: String,
    pub value: Metric<f64>,
}

/// Lead-time velocity (p50) and consistency (p90) of one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadTimePoint {
    pub label: String,
    pub p50: Metric<f64>,
    pub p90: Metric<f64>,
}

/// Tickets delivered under one epic across the quarter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpicTotal {
    pub epic: String,
    pub count: usize,
}

/// The quarter view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuarterRollup {
    /// Cycle labels in input order.
    pub cycles: Vec<String>,
    pub throughput_means: Vec<CycleValue>,
    pub throughput_trend: TrendAnalysis,
    /// Weekly throughput across all cycles, one entry per week.
    pub weekly_throughput: Vec<ThroughputSample>,
    /// Rolling CV of the weekly series.
    pub weekly_rolling_cv: Vec<Metric<f64>>,
    /// Per-cycle throughput CV.
    pub variability: Vec<CycleValue>,
    pub variability_improving: Metric<bool>,
    pub lead_time: Vec<LeadTimePoint>,
    pub p50_trend: TrendAnalysis,
    pub p90_trend: TrendAnalysis,
    pub top_epics: Vec<EpicTotal>,
}

/// Fraction of consecutive pairs that must not increase for variability to
/// count as improving, as numerator/denominator.
const IMPROVING_PAIRS: (usize, usize) = (3, 5);

/// Builds a [`QuarterRollup`].
#[derive(Debug, Clone)]
pub struct QuarterAggregator {
    top_epics: usize,
    rolling_window: usize,
}

impl Default for QuarterAggregator {
    fn default() -> Self {
        Self {
            top_epics: 10,
            rolling_window: 3,
        }
    }
}

impl From<&Config> for QuarterAggregator {
    fn from(config: &Config) -> Self {
        Self::new(config.report.top_epics, config.workflow.rolling_window)
    }
}

impl QuarterAggregator {
    pub fn new(top_epics: usize, rolling_window: usize) -> Self {
        Self {
            top_epics,
            rolling_window,
        }
    }

    pub fn aggregate(&self, cycles: &[CycleMetrics]) -> QuarterRollup {
        let throughput_means: Vec<CycleValue> = cycles
            .iter()
            .map(|c| CycleValue {
                label: c.label.clone(),
                value: c.throughput.as_ref().map(|t| t.mean),
            })
            .collect();

        let variability: Vec<CycleValue> = cycles
            .iter()
            .map(|c| CycleValue {
                label: c.label.clone(),
                value: match c.throughput.value() {
                    Some(t) => t.cv,
                    None => Metric::InsufficientData,
                },
            })
            .collect();

        let lead_time: Vec<LeadTimePoint> = cycles
            .iter()
            .map(|c| LeadTimePoint {
                label: c.label.clone(),
                p50: c.lead_time.as_ref().map(|l| l.p50),
                p90: c.lead_time.as_ref().map(|l| l.p90),
            })
            .collect();

        let weekly_throughput = merge_weeks(cycles);
        let weekly_values: Vec<f64> = weekly_throughput.iter().map(|w| w.count as f64).collect();

        let rollup = QuarterRollup {
            cycles: cycles.iter().map(|c| c.label.clone()).collect(),
            throughput_trend: trend::analyze_sparse(&by_cycle(
                throughput_means.iter().map(|c| c.value),
            )),
            variability_improving: variability_improving(&variability),
            p50_trend: trend::analyze_sparse(&by_cycle(lead_time.iter().map(|p| p.p50))),
            p90_trend: trend::analyze_sparse(&by_cycle(lead_time.iter().map(|p| p.p90))),
            weekly_rolling_cv: rolling_cv(&weekly_values, self.rolling_window),
            top_epics: top_epics(cycles, self.top_epics),
            throughput_means,
            weekly_throughput,
            variability,
            lead_time,
        };

        debug!(
            "Aggregated {} cycles, {} weeks, {} epics",
            rollup.cycles.len(),
            rollup.weekly_throughput.len(),
            rollup.top_epics.len()
        );

        rollup
    }
}

fn by_cycle(values: impl Iterator<Item = Metric<f64>>) -> Vec<Option<f64>> {
    values.map(|v| v.get()).collect()
}

/// Concatenate weekly samples; a later cycle's value for a week replaces an
/// earlier one in place.
fn merge_weeks(cycles: &[CycleMetrics]) -> Vec<ThroughputSample> {
    let mut weeks: Vec<ThroughputSample> = Vec::new();
    let mut index: HashMap<NaiveDate, usize> = HashMap::new();

    for sample in cycles
        .iter()
        .filter_map(|c| c.throughput.value())
        .flat_map(|t| t.weekly.iter())
    {
        match index.get(&sample.period) {
            Some(&i) => weeks[i].count = sample.count,
            None => {
                index.insert(sample.period, weeks.len());
                weeks.push(*sample);
            }
        }
    }

    weeks
}

/// Whether CV did not increase across enough consecutive cycle pairs.
pub fn variability_improving(series: &[CycleValue]) -> Metric<bool> {
    let pairs: Vec<(f64, f64)> = series
        .windows(2)
        .filter_map(|w| Some((w[0].value.get()?, w[1].value.get()?)))
        .collect();

    if pairs.is_empty() {
        return Metric::InsufficientData;
    }

    let non_increasing = pairs.iter().filter(|(prev, next)| next <= prev).count();
    let (num, den) = IMPROVING_PAIRS;
    Metric::Value(non_increasing * den >= pairs.len() * num)
}

/// Merge per-cycle epic counts and keep the `n` largest.
pub fn top_epics(cycles: &[CycleMetrics], n: usize) -> Vec<EpicTotal> {
    let mut totals: HashMap<&str, usize> = HashMap::new();
    for share in cycles.iter().flat_map(|c| c.tickets.by_epic.iter()) {
        *totals.entry(share.epic.as_str()).or_default() += share.count;
    }

    let mut ranked: Vec<EpicTotal> = totals
        .into_iter()
        .map(|(epic, count)| EpicTotal {
            epic: epic.to_string(),
            count,
        })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.epic.cmp(&b.epic)));
    ranked.truncate(n);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::metrics::MetricsCalculator;
    use crate::analysis::trend::Trend;
    use crate::models::{CycleData, LeadTimeSample, TicketRecord, TicketType};
    use chrono::Duration;

    fn build_cycle(
        label: &str,
        first_week: &str,
        weekly: &[u32],
        lead: &[(f64, u32)],
        epics: &[(&str, usize)],
    ) -> CycleMetrics {
        let start = NaiveDate::parse_from_str(first_week, "%Y-%m-%d").unwrap();
        let mut cycle = CycleData::new(label);
        cycle.throughput = weekly
            .iter()
            .enumerate()
            .map(|(i, count)| ThroughputSample {
                period: start + Duration::weeks(i as i64),
                count: *count,
            })
            .collect();
        cycle.lead_time = lead
            .iter()
            .map(|(days, item_count)| LeadTimeSample {
                days: *days,
                item_count: *item_count,
            })
            .collect();
        for (epic, count) in epics {
            cycle.tickets.extend((0..*count).map(|_| TicketRecord {
                key: None,
                ticket_type: TicketType::Feature,
                epic: Some(epic.to_string()),
            }));
        }
        MetricsCalculator::default().calculate(&cycle).unwrap()
    }

    fn cv_series(values: &[Option<f64>]) -> Vec<CycleValue> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| CycleValue {
                label: format!("c{}", i),
                value: match v {
                    Some(v) => Metric::Value(*v),
                    None => Metric::InsufficientData,
                },
            })
            .collect()
    }

    #[test]
    fn test_throughput_evolution() {
        let cycles = vec![
            build_cycle("2026-01-14", "2026-01-05", &[8, 10], &[(5.0, 3)], &[]),
            build_cycle("2026-01-28", "2026-01-19", &[10, 12], &[(4.0, 3)], &[]),
            build_cycle("2026-02-11", "2026-02-02", &[12, 14], &[(3.0, 3)], &[]),
        ];
        let rollup = QuarterAggregator::default().aggregate(&cycles);

        let means: Vec<Option<f64>> =
            rollup.throughput_means.iter().map(|c| c.value.get()).collect();
        assert_eq!(means, vec![Some(9.0), Some(11.0), Some(13.0)]);
        assert_eq!(rollup.throughput_trend.trend, Trend::Growing);
        assert_eq!(rollup.p50_trend.trend, Trend::Declining);
        assert_eq!(rollup.cycles, vec!["2026-01-14", "2026-01-28", "2026-02-11"]);
        assert_eq!(rollup.weekly_throughput.len(), 6);
        assert_eq!(rollup.weekly_rolling_cv.len(), 6);
    }

    #[test]
    fn test_trends_keep_cycle_positions() {
        let cycles = vec![
            build_cycle("a", "2026-01-05", &[10], &[(4.0, 1)], &[]),
            build_cycle("b", "2026-01-19", &[], &[], &[]),
            build_cycle("c", "2026-02-02", &[11], &[(5.0, 1)], &[]),
        ];
        let rollup = QuarterAggregator::default().aggregate(&cycles);

        assert_eq!(rollup.throughput_means[1].value, Metric::InsufficientData);
        assert_eq!(rollup.throughput_trend.slope, Some(0.5));
        assert_eq!(rollup.throughput_trend.trend, Trend::Stable);
        assert_eq!(rollup.p50_trend.slope, Some(0.5));
        assert_eq!(rollup.p90_trend.trend, Trend::Stable);
    }

    #[test]
    fn test_overlapping_weeks_are_merged() {
        let cycles = vec![
            build_cycle("a", "2026-01-05", &[5, 6, 7], &[(2.0, 1)], &[]),
            build_cycle("b", "2026-01-12", &[9, 8], &[(2.0, 1)], &[]),
        ];
        let rollup = QuarterAggregator::default().aggregate(&cycles);

        let counts: Vec<u32> = rollup.weekly_throughput.iter().map(|w| w.count).collect();
        assert_eq!(counts, vec![5, 9, 8]);
    }

    #[test]
    fn test_variability_majority_rule() {
        // 3 of 4 pairs non-increasing.
        let series = cv_series(&[Some(40.0), Some(35.0), Some(38.0), Some(30.0), Some(30.0)]);
        assert_eq!(variability_improving(&series), Metric::Value(true));

        // 1 of 3 pairs non-increasing.
        let series = cv_series(&[Some(20.0), Some(25.0), Some(22.0), Some(28.0)]);
        assert_eq!(variability_improving(&series), Metric::Value(false));

        // Exactly 60%: 3 of 5 pairs.
        let series = cv_series(&[
            Some(50.0),
            Some(45.0),
            Some(40.0),
            Some(42.0),
            Some(38.0),
            Some(39.0),
        ]);
        assert_eq!(variability_improving(&series), Metric::Value(true));
    }

    #[test]
    fn test_variability_needs_a_pair() {
        assert_eq!(variability_improving(&cv_series(&[Some(10.0)])), Metric::InsufficientData);
        assert_eq!(
            variability_improving(&cv_series(&[Some(10.0), None, Some(8.0)])),
            Metric::InsufficientData
        );
    }

    #[test]
    fn test_lead_time_series() {
        let cycles = vec![
            build_cycle("a", "2026-01-05", &[5], &[(2.0, 5), (8.0, 5)], &[]),
            build_cycle("b", "2026-01-19", &[5], &[], &[]),
        ];
        let rollup = QuarterAggregator::default().aggregate(&cycles);

        assert_eq!(rollup.lead_time[0].p50, Metric::Value(5.0));
        assert_eq!(rollup.lead_time[0].p90, Metric::Value(8.0));
        assert_eq!(rollup.lead_time[1].p50, Metric::InsufficientData);
        assert_eq!(rollup.p50_trend.trend, Trend::InsufficientData);
    }

    #[test]
    fn test_top_epics_merge_and_rank() {
        let cycles = vec![
            build_cycle(
                "a",
                "2026-01-05",
                &[5],
                &[(2.0, 1)],
                &[("Payments", 3), ("Search", 2)],
            ),
            build_cycle(
                "b",
                "2026-01-19",
                &[5],
                &[(2.0, 1)],
                &[("Search", 2), ("payments", 1), ("Billing", 4)],
            ),
        ];
        let rollup = QuarterAggregator::default().aggregate(&cycles);

        let ranked: Vec<(&str, usize)> = rollup
            .top_epics
            .iter()
            .map(|e| (e.epic.as_str(), e.count))
            .collect();
        assert_eq!(
            ranked,
            vec![("Billing", 4), ("Search", 4), ("Payments", 3), ("payments", 1)]
        );
    }

    #[test]
    fn test_top_epics_truncates() {
        let epics: Vec<(String, usize)> =
            (0..12).map(|i| (format!("Epic {:02}", i), 12 - i)).collect();
        let epic_refs: Vec<(&str, usize)> = epics.iter().map(|(e, c)| (e.as_str(), *c)).collect();
        let cycles = vec![build_cycle("a", "2026-01-05", &[5], &[(2.0, 1)], &epic_refs)];

        let top = top_epics(&cycles, 10);
        assert_eq!(top.len(), 10);
        assert_eq!(top[0].epic, "Epic 00");
        assert_eq!(top[9].epic, "Epic 09");
    }

    #[test]
    fn test_empty_quarter() {
        let rollup = QuarterAggregator::default().aggregate(&[]);
        assert!(rollup.cycles.is_empty());
        assert_eq!(rollup.throughput_trend.trend, Trend::InsufficientData);
        assert_eq!(rollup.variability_improving, Metric::InsufficientData);
        assert!(rollup.top_epics.is_empty());
    }
}
