//! Per-cycle statistics.
//!
//! The calculator turns one cycle's raw series into an immutable
//! [`CycleMetrics`]: WIP average, throughput variability and predictability,
//! lead-time percentiles and buckets, and the ticket/epic distribution.

use crate::analysis::trend;
use crate::error::DataFormatError;
use crate::models::{
    AlertFlags, CfdSnapshot, ConfidenceBand, CumulativePoint, CycleData, CycleMetrics,
    EpicShare, LeadTimeBuckets, LeadTimeSample, LeadTimeStats, Metric, Predictability,
    ThroughputSample, ThroughputStats, TicketDistribution, TicketRecord, TicketType, TypeShare,
};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// z-score of the one-sided 85% confidence band.
pub const CONFIDENCE_Z: f64 = 1.44;

/// Upper CV bound (inclusive) of the High predictability tier.
pub const HIGH_PREDICTABILITY_MAX_CV: f64 = 25.0;

/// Upper CV bound (inclusive) of the Medium predictability tier.
pub const MEDIUM_PREDICTABILITY_MAX_CV: f64 = 50.0;

/// Lead times up to this many days are fast.
pub const FAST_MAX_DAYS: f64 = 5.0;

/// Lead times above this many days are slow.
pub const NORMAL_MAX_DAYS: f64 = 10.0;

/// Settings the calculator needs.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// CFD stages that do not count as work in progress (case-insensitive).
    pub excluded_stages: Vec<String>,
    /// Window of the rolling throughput average, in weeks.
    pub rolling_window: usize,
    /// Bug share (percent) above which the bug-ratio flag is raised.
    pub bug_percent_threshold: f64,
    /// Incident share (percent) above which the incident-ratio flag is raised.
    pub incident_percent_threshold: f64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            excluded_stages: vec!["DONE".to_string(), "READY TO DEV".to_string()],
            rolling_window: 3,
            bug_percent_threshold: 15.0,
            incident_percent_threshold: 10.0,
        }
    }
}

impl From<&crate::config::Config> for MetricsConfig {
    fn from(config: &crate::config::Config) -> Self {
        Self {
            excluded_stages: config.workflow.excluded_stages.clone(),
            rolling_window: config.workflow.rolling_window,
            bug_percent_threshold: config.thresholds.bug_percent,
            incident_percent_threshold: config.thresholds.incident_percent,
        }
    }
}

/// Stateless calculator for [`CycleMetrics`].
#[derive(Debug, Clone, Default)]
pub struct MetricsCalculator {
    config: MetricsConfig,
}

impl MetricsCalculator {
    pub fn new(config: MetricsConfig) -> Self {
        Self { config }
    }

    /// Validate the cycle's series and compute its metrics.
    pub fn calculate(&self, cycle: &CycleData) -> Result<CycleMetrics, DataFormatError> {
        cycle.validate()?;

        let tickets = ticket_distribution(&cycle.tickets);
        let flags = AlertFlags {
            elevated_bug_ratio: exceeds(
                tickets.percent_of(TicketType::Bug),
                self.config.bug_percent_threshold,
            ),
            elevated_incident_ratio: exceeds(
                tickets.percent_of(TicketType::Incident),
                self.config.incident_percent_threshold,
            ),
        };

        let metrics = CycleMetrics {
            label: cycle.label.clone(),
            wip_average: wip_average(&cycle.cfd, &self.config.excluded_stages),
            throughput: throughput_stats(&cycle.throughput, self.config.rolling_window),
            lead_time: lead_time_stats(&cycle.lead_time),
            tickets,
            flags,
        };

        debug!(
            "Computed metrics for cycle {}: {} tickets, flags {:?}",
            metrics.label, metrics.tickets.total, metrics.flags
        );

        Ok(metrics)
    }
}

fn exceeds(value: Metric<f64>, threshold: f64) -> bool {
    value.get().is_some_and(|v| v > threshold)
}

/// Arithmetic mean, `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Population standard deviation, `None` for an empty slice.
pub fn population_stddev(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    Some(variance.sqrt())
}

/// `stddev / mean × 100`; not applicable when the mean is zero.
pub fn coefficient_of_variation(mean: f64, stddev: f64) -> Metric<f64> {
    if mean == 0.0 {
        Metric::NotApplicable
    } else {
        Metric::Value(stddev / mean * 100.0)
    }
}

/// Predictability tier for a CV; each boundary belongs to the lower tier.
pub fn predictability(cv: f64) -> Predictability {
    if cv <= HIGH_PREDICTABILITY_MAX_CV {
        Predictability::High
    } else if cv <= MEDIUM_PREDICTABILITY_MAX_CV {
        Predictability::Medium
    } else {
        Predictability::Low
    }
}

pub fn confidence_band(mean: f64, stddev: f64) -> ConfidenceBand {
    ConfidenceBand {
        lower: (mean - CONFIDENCE_Z * stddev).max(0.0),
        upper: mean + CONFIDENCE_Z * stddev,
    }
}

/// Trailing mean over at most `window` values ending at each position.
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    let window = window.max(1);
    (0..values.len())
        .map(|i| {
            let start = (i + 1).saturating_sub(window);
            let slice = &values[start..=i];
            slice.iter().sum::<f64>() / slice.len() as f64
        })
        .collect()
}

/// Trailing CV over at most `window` values ending at each position.
pub fn rolling_cv(values: &[f64], window: usize) -> Vec<Metric<f64>> {
    let window = window.max(1);
    (0..values.len())
        .map(|i| {
            let start = (i + 1).saturating_sub(window);
            let slice = &values[start..=i];
            match (mean(slice), population_stddev(slice)) {
                (Some(m), Some(sd)) => coefficient_of_variation(m, sd),
                _ => Metric::InsufficientData,
            }
        })
        .collect()
}

/// Mean over snapshots of the summed counts of in-flight stages.
pub fn wip_average(cfd: &[CfdSnapshot], excluded_stages: &[String]) -> Metric<f64> {
    let totals: Vec<f64> = cfd
        .iter()
        .map(|snapshot| {
            snapshot
                .stages
                .iter()
                .filter(|(stage, _)| {
                    !excluded_stages
                        .iter()
                        .any(|excluded| excluded.eq_ignore_ascii_case(stage))
                })
                .map(|(_, count)| *count as f64)
                .sum()
        })
        .collect();

    match mean(&totals) {
        Some(m) => Metric::Value(m),
        None => Metric::InsufficientData,
    }
}

/// Weekly throughput statistics.
pub fn throughput_stats(
    samples: &[ThroughputSample],
    rolling_window: usize,
) -> Metric<ThroughputStats> {
    let values: Vec<f64> = samples.iter().map(|s| s.count as f64).collect();

    let (Some(mean), Some(stddev)) = (mean(&values), population_stddev(&values)) else {
        return Metric::InsufficientData;
    };

    let cv = coefficient_of_variation(mean, stddev);

    let accumulated_average = values
        .iter()
        .scan(0.0, |sum, v| {
            *sum += v;
            Some(*sum)
        })
        .enumerate()
        .map(|(i, sum)| sum / (i + 1) as f64)
        .collect();

    Metric::Value(ThroughputStats {
        weekly: samples.to_vec(),
        total: samples.iter().map(|s| s.count as u64).sum(),
        mean,
        stddev,
        cv,
        predictability: cv.map(predictability),
        confidence_band: confidence_band(mean, stddev),
        trend: trend::analyze(&values),
        rolling_average: rolling_mean(&values, rolling_window),
        accumulated_average,
    })
}

/// Merge duplicate `days` buckets and sort ascending, dropping empty ones.
fn histogram(samples: &[LeadTimeSample]) -> Vec<(f64, u64)> {
    let mut buckets: Vec<(f64, u64)> = Vec::new();
    let mut sorted: Vec<&LeadTimeSample> = samples.iter().filter(|s| s.item_count > 0).collect();
    sorted.sort_by(|a, b| a.days.total_cmp(&b.days));

    for sample in sorted {
        match buckets.last_mut() {
            Some((days, count)) if *days == sample.days => *count += sample.item_count as u64,
            _ => buckets.push((sample.days, sample.item_count as u64)),
        }
    }

    buckets
}

/// Value of the `k`-th (0-based) order statistic of the expanded histogram.
fn order_statistic(histogram: &[(f64, u64)], k: u64) -> f64 {
    let mut cumulative: u64 = 0;
    for (days, count) in histogram {
        cumulative += *count;
        if cumulative > k {
            return *days;
        }
    }
    histogram.last().map(|(days, _)| *days).unwrap_or(0.0)
}

/// Percentile of the expanded histogram with linear interpolation between
/// the order statistics around rank `p/100 × (n−1)`.
pub fn histogram_percentile(histogram: &[(f64, u64)], p: f64) -> Option<f64> {
    let n: u64 = histogram.iter().map(|(_, count)| count).sum();
    if n == 0 {
        return None;
    }

    let rank = p.clamp(0.0, 100.0) / 100.0 * (n - 1) as f64;
    let lower = rank.floor();
    let fraction = rank - lower;

    let lo = order_statistic(histogram, lower as u64);
    let hi = order_statistic(histogram, rank.ceil() as u64);

    Some(lo + (hi - lo) * fraction)
}

/// Lead-time statistics from histogram buckets.
pub fn lead_time_stats(samples: &[LeadTimeSample]) -> Metric<LeadTimeStats> {
    let histogram = histogram(samples);
    let total_items: u64 = histogram.iter().map(|(_, count)| count).sum();

    let (Some(p50), Some(p90)) = (
        histogram_percentile(&histogram, 50.0),
        histogram_percentile(&histogram, 90.0),
    ) else {
        return Metric::InsufficientData;
    };

    let n = total_items as f64;
    let mean = histogram.iter().map(|(d, c)| d * *c as f64).sum::<f64>() / n;
    let variance = histogram
        .iter()
        .map(|(d, c)| (d - mean).powi(2) * *c as f64)
        .sum::<f64>()
        / n;

    let mut buckets = LeadTimeBuckets::default();
    for (days, count) in &histogram {
        if *days <= FAST_MAX_DAYS {
            buckets.fast += count;
        } else if *days <= NORMAL_MAX_DAYS {
            buckets.normal += count;
        } else {
            buckets.slow += count;
        }
    }

    let mut cumulative: u64 = 0;
    let distribution = histogram
        .iter()
        .map(|(days, count)| {
            cumulative += *count;
            CumulativePoint {
                days: *days,
                count: *count,
                cumulative_percent: cumulative as f64 / n * 100.0,
            }
        })
        .collect();

    Metric::Value(LeadTimeStats {
        total_items,
        mean,
        p50,
        p90,
        stddev: variance.sqrt(),
        buckets,
        distribution,
    })
}

fn type_shares<'a>(tickets: impl Iterator<Item = &'a TicketRecord>) -> (usize, Vec<TypeShare>) {
    let mut counts: BTreeMap<TicketType, usize> = BTreeMap::new();
    for ticket in tickets {
        *counts.entry(ticket.ticket_type).or_default() += 1;
    }

    let total: usize = counts.values().sum();
    let shares = counts
        .into_iter()
        .map(|(ticket_type, count)| TypeShare {
            ticket_type,
            count,
            percent: count as f64 * 100.0 / total as f64,
        })
        .collect();

    (total, shares)
}

fn epic_of(ticket: &TicketRecord) -> Option<&str> {
    ticket
        .epic
        .as_deref()
        .map(str::trim)
        .filter(|epic| !epic.is_empty())
}

/// Group tickets by type and by epic.
pub fn ticket_distribution(tickets: &[TicketRecord]) -> TicketDistribution {
    let (total, by_type) = type_shares(tickets.iter());

    let mut epic_counts: HashMap<&str, usize> = HashMap::new();
    for epic in tickets.iter().filter_map(epic_of) {
        *epic_counts.entry(epic).or_default() += 1;
    }

    let attributed: usize = epic_counts.values().sum();
    let mut by_epic: Vec<EpicShare> = epic_counts
        .into_iter()
        .map(|(epic, count)| EpicShare {
            epic: epic.to_string(),
            count,
            percent: count as f64 * 100.0 / attributed as f64,
        })
        .collect();
    by_epic.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.epic.cmp(&b.epic)));

    let (unattributed_total, unattributed_by_type) =
        type_shares(tickets.iter().filter(|t| epic_of(t).is_none()));

    TicketDistribution {
        total,
        by_type,
        by_epic,
        unattributed_total,
        unattributed_by_type,
    }
}
