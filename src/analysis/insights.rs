//! Rule-based alerts and recommendations.
//!
//! Each rule reads already-computed metrics (and the comparison, when there
//! is one) and yields at most one alert. Rules run in a fixed order, and the
//! alert list keeps that order.

use crate::analysis::comparison::{Comparison, Direction, TrackedMetric};
use crate::models::{CycleMetrics, Metric, Predictability, TicketType};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertSeverity::Info => write!(f, "Info"),
            AlertSeverity::Warning => write!(f, "Warning"),
        }
    }
}

impl AlertSeverity {
    pub fn emoji(&self) -> &'static str {
        match self {
            AlertSeverity::Info => "ℹ️",
            AlertSeverity::Warning => "⚠️",
        }
    }
}

/// What an alert is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertCode {
    ElevatedBugRatio,
    ElevatedIncidentRatio,
    LowPredictability,
    MetricRegression,
    LeadTimeOutliers,
}

impl AlertCode {
    /// Follow-up suggested for this kind of alert.
    pub fn recommendation(&self) -> &'static str {
        match self {
            AlertCode::ElevatedBugRatio => {
                "Investigate the root causes of the bugs delivered this cycle and strengthen testing before release."
            }
            AlertCode::ElevatedIncidentRatio => {
                "Review incident post-mortems and reserve capacity for reliability work."
            }
            AlertCode::LowPredictability => {
                "Limit work in progress and split work into smaller items to stabilize weekly throughput."
            }
            AlertCode::MetricRegression => {
                "Discuss what changed since the previous cycle for the metrics that worsened."
            }
            AlertCode::LeadTimeOutliers => {
                "Review items that took more than 10 days and look for blockers or oversized work."
            }
        }
    }
}

impl fmt::Display for AlertCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertCode::ElevatedBugRatio => write!(f, "elevated_bug_ratio"),
            AlertCode::ElevatedIncidentRatio => write!(f, "elevated_incident_ratio"),
            AlertCode::LowPredictability => write!(f, "low_predictability"),
            AlertCode::MetricRegression => write!(f, "metric_regression"),
            AlertCode::LeadTimeOutliers => write!(f, "lead_time_outliers"),
        }
    }
}

/// A raised alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub severity: AlertSeverity,
    pub code: AlertCode,
    /// Name of the metric that triggered the alert.
    pub metric: String,
    /// Value of that metric (percent for ratios, CV and changes).
    pub value: f64,
    pub message: String,
}

impl Alert {
    pub fn is_warning(&self) -> bool {
        self.severity == AlertSeverity::Warning
    }
}

/// What a rule can look at.
pub struct InsightContext<'a> {
    pub metrics: &'a CycleMetrics,
    pub comparison: Option<&'a Comparison>,
}

/// A single alerting rule.
pub trait Rule: Send + Sync {
    fn evaluate(&self, ctx: &InsightContext<'_>) -> Option<Alert>;
}

/// Bug share above the configured threshold.
pub struct BugRatioRule {
    pub threshold: f64,
}

impl Rule for BugRatioRule {
    fn evaluate(&self, ctx: &InsightContext<'_>) -> Option<Alert> {
        let value = ctx.metrics.tickets.percent_of(TicketType::Bug).get()?;
        if value <= self.threshold {
            return None;
        }
        Some(Alert {
            severity: AlertSeverity::Warning,
            code: AlertCode::ElevatedBugRatio,
            metric: "bug_percent".to_string(),
            value,
            message: format!(
                "Elevated bug ratio: {:.1}% of completed tickets are bugs (threshold {:.0}%)",
                value, self.threshold
            ),
        })
    }
}

/// Incident share above the configured threshold.
pub struct IncidentRatioRule {
    pub threshold: f64,
}

impl Rule for IncidentRatioRule {
    fn evaluate(&self, ctx: &InsightContext<'_>) -> Option<Alert> {
        let value = ctx.metrics.tickets.percent_of(TicketType::Incident).get()?;
        if value <= self.threshold {
            return None;
        }
        Some(Alert {
            severity: AlertSeverity::Warning,
            code: AlertCode::ElevatedIncidentRatio,
            metric: "incident_percent".to_string(),
            value,
            message: format!(
                "Elevated incident ratio: {:.1}% of completed tickets are incidents (threshold {:.0}%)",
                value, self.threshold
            ),
        })
    }
}

/// Throughput predictability in the Low tier.
pub struct LowPredictabilityRule;

impl Rule for LowPredictabilityRule {
    fn evaluate(&self, ctx: &InsightContext<'_>) -> Option<Alert> {
        let throughput = ctx.metrics.throughput.value()?;
        if throughput.predictability != Metric::Value(Predictability::Low) {
            return None;
        }
        let cv = throughput.cv.get()?;
        Some(Alert {
            severity: AlertSeverity::Warning,
            code: AlertCode::LowPredictability,
            metric: "throughput_cv".to_string(),
            value: cv,
            message: format!(
                "Low predictability: weekly throughput varies by {:.1}% (CV above 50%)",
                cv
            ),
        })
    }
}

/// One tracked metric worsened beyond its threshold.
pub struct RegressionRule {
    pub metric: TrackedMetric,
}

impl Rule for RegressionRule {
    fn evaluate(&self, ctx: &InsightContext<'_>) -> Option<Alert> {
        let result = ctx.comparison?.result_for(self.metric)?;
        if result.direction != Metric::Value(Direction::Worsened) {
            return None;
        }
        let change = result.percent_change.get()?;
        Some(Alert {
            severity: AlertSeverity::Warning,
            code: AlertCode::MetricRegression,
            metric: self.metric.to_string(),
            value: change,
            message: format!(
                "{} worsened by {:+.1}% compared to the previous cycle",
                self.metric, change
            ),
        })
    }
}

/// Too many items in the slow (>10 days) lead-time bucket.
pub struct LeadTimeOutlierRule {
    /// Maximum tolerated slow share in percent.
    pub max_slow_share: f64,
}

impl Rule for LeadTimeOutlierRule {
    fn evaluate(&self, ctx: &InsightContext<'_>) -> Option<Alert> {
        let lead_time = ctx.metrics.lead_time.value()?;
        let share = lead_time.buckets.slow_share().get()?;
        if share <= self.max_slow_share {
            return None;
        }
        Some(Alert {
            severity: AlertSeverity::Info,
            code: AlertCode::LeadTimeOutliers,
            metric: "slow_lead_time_share".to_string(),
            value: share,
            message: format!(
                "Lead-time outliers: {:.1}% of items took more than 10 days (limit {:.1}%)",
                share, self.max_slow_share
            ),
        })
    }
}

/// Settings for the rule set.
#[derive(Debug, Clone)]
pub struct InsightConfig {
    pub bug_percent_threshold: f64,
    pub incident_percent_threshold: f64,
    /// Slow lead-time share in percent; the outlier rule is off when unset.
    pub slow_lead_time_share: Option<f64>,
}

impl Default for InsightConfig {
    fn default() -> Self {
        Self {
            bug_percent_threshold: 15.0,
            incident_percent_threshold: 10.0,
            slow_lead_time_share: None,
        }
    }
}

impl From<&crate::config::Config> for InsightConfig {
    fn from(config: &crate::config::Config) -> Self {
        Self {
            bug_percent_threshold: config.thresholds.bug_percent,
            incident_percent_threshold: config.thresholds.incident_percent,
            slow_lead_time_share: config.thresholds.slow_lead_time_share,
        }
    }
}

/// Runs the ordered rule set.
pub struct InsightGenerator {
    rules: Vec<Box<dyn Rule>>,
}

impl InsightGenerator {
    pub fn new(config: &InsightConfig) -> Self {
        let mut rules: Vec<Box<dyn Rule>> = vec![
            Box::new(BugRatioRule {
                threshold: config.bug_percent_threshold,
            }),
            Box::new(IncidentRatioRule {
                threshold: config.incident_percent_threshold,
            }),
            Box::new(LowPredictabilityRule),
        ];

        for metric in TrackedMetric::ALL {
            rules.push(Box::new(RegressionRule { metric }));
        }

        if let Some(max_slow_share) = config.slow_lead_time_share {
            rules.push(Box::new(LeadTimeOutlierRule { max_slow_share }));
        }

        Self { rules }
    }

    /// Evaluate every rule, keeping rule order.
    pub fn generate(&self, metrics: &CycleMetrics, comparison: Option<&Comparison>) -> Vec<Alert> {
        let ctx = InsightContext {
            metrics,
            comparison,
        };
        self.rules.iter().filter_map(|rule| rule.evaluate(&ctx)).collect()
    }
}

/// One recommendation per distinct alert code, in alert order.
pub fn recommendations(alerts: &[Alert]) -> Vec<String> {
    let mut seen = Vec::new();
    for alert in alerts {
        if !seen.contains(&alert.code) {
            seen.push(alert.code);
        }
    }
    seen.iter().map(|code| code.recommendation().to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::comparison::ComparisonEngine;
    use crate::analysis::metrics::MetricsCalculator;
    use crate::models::{CycleData, LeadTimeSample, ThroughputSample, TicketRecord};
    use chrono::{Duration, NaiveDate};

    fn config() -> InsightConfig {
        InsightConfig {
            bug_percent_threshold: 15.0,
            incident_percent_threshold: 10.0,
            slow_lead_time_share: None,
        }
    }

    fn build_cycle(
        label: &str,
        weekly: &[u32],
        lead: &[(f64, u32)],
        tickets: &[(TicketType, usize)],
    ) -> CycleMetrics {
        let start = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
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
        for (ticket_type, count) in tickets {
            cycle.tickets.extend((0..*count).map(|_| TicketRecord {
                key: None,
                ticket_type: *ticket_type,
                epic: None,
            }));
        }
        MetricsCalculator::default().calculate(&cycle).unwrap()
    }

    fn codes(alerts: &[Alert]) -> Vec<AlertCode> {
        alerts.iter().map(|a| a.code).collect()
    }

    #[test]
    fn test_healthy_cycle_has_no_alerts() {
        let metrics = build_cycle(
            "a",
            &[10, 11, 10, 12],
            &[(3.0, 5)],
            &[(TicketType::Feature, 90), (TicketType::Bug, 10)],
        );
        let alerts = InsightGenerator::new(&config()).generate(&metrics, None);
        assert!(alerts.is_empty());
    }

    #[test]
    fn test_bug_ratio_alert() {
        let metrics = build_cycle(
            "a",
            &[10, 10],
            &[(3.0, 5)],
            &[(TicketType::Feature, 80), (TicketType::Bug, 20)],
        );
        let alert = BugRatioRule { threshold: 15.0 }
            .evaluate(&InsightContext {
                metrics: &metrics,
                comparison: None,
            })
            .unwrap();

        assert_eq!(alert.severity, AlertSeverity::Warning);
        assert_eq!(alert.code, AlertCode::ElevatedBugRatio);
        assert_eq!(alert.value, 20.0);
        assert!(alert.message.contains("bug ratio"));
    }

    #[test]
    fn test_ratio_rules_apply_their_own_threshold() {
        let metrics = build_cycle(
            "a",
            &[10, 10],
            &[(3.0, 5)],
            &[
                (TicketType::Feature, 72),
                (TicketType::Bug, 20),
                (TicketType::Incident, 8),
            ],
        );
        let ctx = InsightContext {
            metrics: &metrics,
            comparison: None,
        };

        assert!(BugRatioRule { threshold: 25.0 }.evaluate(&ctx).is_none());
        assert!(BugRatioRule { threshold: 20.0 }.evaluate(&ctx).is_none());

        let alert = IncidentRatioRule { threshold: 5.0 }.evaluate(&ctx).unwrap();
        assert_eq!(alert.value, 8.0);
        assert!(alert.message.contains("(threshold 5%)"));
    }

    #[test]
    fn test_incident_ratio_alert() {
        let metrics = build_cycle(
            "a",
            &[10, 10],
            &[(3.0, 5)],
            &[(TicketType::Task, 85), (TicketType::Incident, 15)],
        );
        let alerts = InsightGenerator::new(&config()).generate(&metrics, None);
        assert_eq!(codes(&alerts), vec![AlertCode::ElevatedIncidentRatio]);
    }

    #[test]
    fn test_low_predictability_alert() {
        // mean 5, stddev 4.47 -> CV ~ 89%
        let metrics = build_cycle("a", &[1, 9, 1, 9, 0, 10], &[(3.0, 5)], &[]);
        let alerts = InsightGenerator::new(&config()).generate(&metrics, None);

        assert_eq!(codes(&alerts), vec![AlertCode::LowPredictability]);
        assert!(alerts[0].value > 50.0);
    }

    #[test]
    fn test_regression_alert_per_metric() {
        let previous = build_cycle("a", &[10, 10], &[(4.0, 10)], &[]);
        let current = build_cycle("b", &[8, 8], &[(4.0, 10)], &[]);
        let comparison = ComparisonEngine::default().compare(&current, Some(&previous));

        let alerts = InsightGenerator::new(&config()).generate(&current, comparison.as_ref());
        assert_eq!(codes(&alerts), vec![AlertCode::MetricRegression]);
        assert_eq!(alerts[0].metric, TrackedMetric::ThroughputMean.to_string());
        assert!((alerts[0].value + 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_outlier_rule_needs_configured_share() {
        let metrics = build_cycle("a", &[10, 10], &[(3.0, 6), (14.0, 4)], &[]);

        let inert = InsightGenerator::new(&config()).generate(&metrics, None);
        assert!(inert.is_empty());

        let configured = InsightConfig {
            slow_lead_time_share: Some(30.0),
            ..config()
        };
        let alerts = InsightGenerator::new(&configured).generate(&metrics, None);
        assert_eq!(codes(&alerts), vec![AlertCode::LeadTimeOutliers]);
        assert_eq!(alerts[0].severity, AlertSeverity::Info);
        assert_eq!(alerts[0].value, 40.0);

        let lenient = InsightConfig {
            slow_lead_time_share: Some(40.0),
            ..config()
        };
        assert!(InsightGenerator::new(&lenient)
            .generate(&metrics, None)
            .is_empty());
    }

    #[test]
    fn test_alerts_follow_rule_order() {
        let previous = build_cycle("a", &[10, 10], &[(2.0, 5), (4.0, 5)], &[]);
        let current = build_cycle(
            "b",
            &[1, 9, 0, 10],
            &[(3.0, 5), (20.0, 5)],
            &[
                (TicketType::Incident, 20),
                (TicketType::Bug, 30),
                (TicketType::Feature, 50),
            ],
        );
        let comparison = ComparisonEngine::default().compare(&current, Some(&previous));
        let configured = InsightConfig {
            slow_lead_time_share: Some(10.0),
            ..config()
        };

        let alerts = InsightGenerator::new(&configured).generate(&current, comparison.as_ref());
        assert_eq!(
            codes(&alerts),
            vec![
                AlertCode::ElevatedBugRatio,
                AlertCode::ElevatedIncidentRatio,
                AlertCode::LowPredictability,
                AlertCode::MetricRegression,
                AlertCode::MetricRegression,
                AlertCode::MetricRegression,
                AlertCode::MetricRegression,
                AlertCode::LeadTimeOutliers,
            ]
        );

        let recs = recommendations(&alerts);
        assert_eq!(recs.len(), 5);
        assert_eq!(recs[0], AlertCode::ElevatedBugRatio.recommendation());
    }
}
