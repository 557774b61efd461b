//! Markdown report generation.
//!
//! This module renders the cycle and quarter reports as Markdown, plus a
//! pretty-printed JSON form for tooling.

use crate::analysis::comparison::Comparison;
use crate::analysis::insights::Alert;
use crate::analysis::quarter::QuarterRollup;
use crate::analysis::trend::TrendAnalysis;
use crate::models::{
    CycleMetrics, LeadTimeStats, Metric, QuarterReport, ReportMetadata, RetroReport,
    ThroughputStats, TicketDistribution, TypeShare,
};
use anyhow::Result;
use serde::Serialize;

/// Generate the Markdown report for one cycle.
pub fn generate_markdown_report(report: &RetroReport) -> String {
    let mut output = String::new();

    // Title
    output.push_str(&format!(
        "# Retrospective Metrics: {}\n\n",
        report.metrics.label
    ));

    output.push_str(&generate_metadata_section(&report.metadata));
    output.push_str(&generate_table_of_contents(report));
    output.push_str(&generate_summary_section(&report.metrics));
    output.push_str(&generate_throughput_section(&report.metrics.throughput));
    output.push_str(&generate_lead_time_section(&report.metrics.lead_time));
    output.push_str(&generate_tickets_section(&report.metrics.tickets));

    if let Some(ref comparison) = report.comparison {
        output.push_str(&generate_comparison_section(comparison));
    }

    output.push_str(&generate_alerts_section(&report.alerts));
    output.push_str(&generate_recommendations_section(&report.recommendations));
    output.push_str(&generate_footer());

    output
}

/// Generate the Markdown report for a quarter.
pub fn generate_quarter_markdown_report(report: &QuarterReport) -> String {
    let mut output = String::new();
    let rollup = &report.rollup;

    let title = report.metadata.quarter.as_deref().unwrap_or("Quarter");
    output.push_str(&format!("# Quarter Rollup: {}\n\n", title));

    output.push_str(&generate_metadata_section(&report.metadata));
    output.push_str(&format!(
        "Cycles analyzed: {}\n\n",
        if rollup.cycles.is_empty() {
            "none".to_string()
        } else {
            rollup.cycles.join(", ")
        }
    ));

    output.push_str(&generate_evolution_section(rollup));
    output.push_str(&generate_weekly_section(rollup));
    output.push_str(&generate_quarter_lead_time_section(rollup));
    output.push_str(&generate_epics_section(rollup));
    output.push_str(&generate_footer());

    output
}

/// Format a metric with one decimal, or its marker.
fn fmt_metric(metric: Metric<f64>) -> String {
    fmt_metric_with(metric, "")
}

fn fmt_metric_with(metric: Metric<f64>, suffix: &str) -> String {
    match metric {
        Metric::Value(v) => format!("{:.1}{}", v, suffix),
        Metric::NotApplicable => "n/a".to_string(),
        Metric::InsufficientData => "insufficient data".to_string(),
    }
}

fn fmt_change(metric: Metric<f64>) -> String {
    match metric {
        Metric::Value(v) => format!("{:+.1}%", v),
        other => fmt_metric(other),
    }
}

fn fmt_trend(analysis: &TrendAnalysis) -> String {
    match analysis.slope {
        Some(slope) => format!(
            "{} {} (slope {:+.2})",
            analysis.trend.arrow(),
            analysis.trend,
            slope
        ),
        None => format!("{} {}", analysis.trend.arrow(), analysis.trend),
    }
}

/// Generate the metadata section.
fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    if let Some(ref team) = metadata.team {
        section.push_str(&format!("- **Team:** {}\n", team));
    }
    if let Some(ref quarter) = metadata.quarter {
        section.push_str(&format!("- **Quarter:** {}\n", quarter));
    }
    section.push_str(&format!(
        "- **Generated:** {}\n",
        metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Version:** {}\n", metadata.tool_version));
    section.push('\n');

    section
}

/// Generate the table of contents.
fn generate_table_of_contents(report: &RetroReport) -> String {
    let mut toc = String::new();

    toc.push_str("## Table of Contents\n\n");
    toc.push_str("- [Metadata](#metadata)\n");
    toc.push_str("- [Summary](#summary)\n");
    toc.push_str("- [Throughput](#throughput)\n");
    toc.push_str("- [Lead Time](#lead-time)\n");
    toc.push_str("- [Tickets](#tickets)\n");

    if report.comparison.is_some() {
        toc.push_str("- [Comparison](#comparison)\n");
    }

    toc.push_str("- [Alerts](#alerts)\n");

    if !report.recommendations.is_empty() {
        toc.push_str("- [Recommendations](#recommendations)\n");
    }

    toc.push('\n');

    toc
}

/// Generate the headline numbers.
fn generate_summary_section(metrics: &CycleMetrics) -> String {
    let mut section = String::new();

    section.push_str("## Summary\n\n");
    section.push_str("| Metric | Value |\n");
    section.push_str("|:---|:---:|\n");
    section.push_str(&format!(
        "| WIP (average) | {} |\n",
        fmt_metric(metrics.wip_average)
    ));

    let throughput = metrics.throughput.as_ref();
    section.push_str(&format!(
        "| Throughput (mean/week) | {} |\n",
        fmt_metric(throughput.map(|t| t.mean))
    ));
    section.push_str(&format!(
        "| Predictability | {} |\n",
        match throughput.value() {
            Some(t) => match t.predictability {
                Metric::Value(p) => p.to_string(),
                _ => "n/a".to_string(),
            },
            None => "insufficient data".to_string(),
        }
    ));

    let lead_time = metrics.lead_time.as_ref();
    section.push_str(&format!(
        "| Lead time p50 | {} |\n",
        fmt_metric_with(lead_time.map(|l| l.p50), " d")
    ));
    section.push_str(&format!(
        "| Lead time p90 | {} |\n",
        fmt_metric_with(lead_time.map(|l| l.p90), " d")
    ));
    section.push_str(&format!(
        "| Tickets completed | {} |\n",
        metrics.tickets.total
    ));
    section.push('\n');

    section
}

/// Generate the throughput section.
fn generate_throughput_section(throughput: &Metric<ThroughputStats>) -> String {
    let mut section = String::new();

    section.push_str("## Throughput\n\n");

    let stats = match throughput.value() {
        Some(stats) => stats,
        None => {
            section.push_str("No throughput data for this cycle.\n\n");
            return section;
        }
    };

    section.push_str(&format!("- **Total delivered:** {}\n", stats.total));
    section.push_str(&format!("- **Mean per week:** {:.1}\n", stats.mean));
    section.push_str(&format!("- **Standard deviation:** {:.2}\n", stats.stddev));
    section.push_str(&format!(
        "- **Coefficient of variation:** {}\n",
        fmt_metric_with(stats.cv, "%")
    ));
    section.push_str(&format!(
        "- **85% confidence band:** {:.1} to {:.1} per week\n",
        stats.confidence_band.lower, stats.confidence_band.upper
    ));
    section.push_str(&format!("- **Trend:** {}\n\n", fmt_trend(&stats.trend)));

    section.push_str("| Week | Throughput | Rolling avg | Accumulated avg |\n");
    section.push_str("|:---|:---:|:---:|:---:|\n");
    for (i, week) in stats.weekly.iter().enumerate() {
        section.push_str(&format!(
            "| {} | {} | {:.1} | {:.1} |\n",
            week.period,
            week.count,
            stats.rolling_average.get(i).copied().unwrap_or_default(),
            stats.accumulated_average.get(i).copied().unwrap_or_default(),
        ));
    }
    section.push('\n');

    section
}

/// Generate the lead-time section.
fn generate_lead_time_section(lead_time: &Metric<LeadTimeStats>) -> String {
    let mut section = String::new();

    section.push_str("## Lead Time\n\n");

    let stats = match lead_time.value() {
        Some(stats) => stats,
        None => {
            section.push_str("No lead-time data for this cycle.\n\n");
            return section;
        }
    };

    section.push_str(&format!("- **Items:** {}\n", stats.total_items));
    section.push_str(&format!("- **Mean:** {:.1} days\n", stats.mean));
    section.push_str(&format!("- **p50:** {:.1} days\n", stats.p50));
    section.push_str(&format!("- **p90:** {:.1} days\n", stats.p90));
    section.push_str(&format!(
        "- **Standard deviation:** {:.2} days\n\n",
        stats.stddev
    ));

    section.push_str("### Buckets\n\n");
    section.push_str("| Fast (≤5d) | Normal (5-10d) | Slow (>10d) |\n");
    section.push_str("|:---:|:---:|:---:|\n");
    section.push_str(&format!(
        "| {} | {} | {} |\n\n",
        stats.buckets.fast, stats.buckets.normal, stats.buckets.slow
    ));

    if !stats.distribution.is_empty() {
        section.push_str("### Cumulative Distribution\n\n");
        section.push_str("| Days | Items | Cumulative |\n");
        section.push_str("|:---|:---:|:---:|\n");
        for point in &stats.distribution {
            section.push_str(&format!(
                "| {} | {} | {:.1}% |\n",
                point.days, point.count, point.cumulative_percent
            ));
        }
        section.push('\n');
    }

    section
}

fn type_table(shares: &[TypeShare]) -> String {
    let mut table = String::new();

    table.push_str("| Type | Count | Share |\n");
    table.push_str("|:---|:---:|:---:|\n");
    for share in shares {
        table.push_str(&format!(
            "| {} | {} | {:.1}% |\n",
            share.ticket_type, share.count, share.percent
        ));
    }
    table.push('\n');

    table
}

/// Generate the ticket mix section.
fn generate_tickets_section(tickets: &TicketDistribution) -> String {
    let mut section = String::new();

    section.push_str("## Tickets\n\n");

    if tickets.total == 0 {
        section.push_str("No tickets were completed in this cycle.\n\n");
        return section;
    }

    section.push_str("### By Type\n\n");
    section.push_str(&type_table(&tickets.by_type));

    if !tickets.by_epic.is_empty() {
        section.push_str("### By Epic\n\n");
        section.push_str("| Epic | Count | Share |\n");
        section.push_str("|:---|:---:|:---:|\n");
        for share in &tickets.by_epic {
            section.push_str(&format!(
                "| {} | {} | {:.1}% |\n",
                share.epic, share.count, share.percent
            ));
        }
        section.push('\n');
    }

    if tickets.unattributed_total > 0 {
        section.push_str(&format!(
            "### Without Epic ({})\n\n",
            tickets.unattributed_total
        ));
        section.push_str(&type_table(&tickets.unattributed_by_type));
    }

    section
}

/// Generate the cycle-over-cycle comparison.
fn generate_comparison_section(comparison: &Comparison) -> String {
    let mut section = String::new();

    section.push_str("## Comparison\n\n");
    section.push_str(&format!(
        "Compared with cycle {}.\n\n",
        comparison.previous_label
    ));
    section.push_str("| Metric | Previous | Current | Change | Direction |\n");
    section.push_str("|:---|:---:|:---:|:---:|:---:|\n");

    for result in &comparison.results {
        let direction = match result.direction {
            Metric::Value(d) => format!("{} {}", d.emoji(), d),
            other => fmt_metric(other.map(|_| 0.0)),
        };
        section.push_str(&format!(
            "| {} | {} | {} | {} | {} |\n",
            result.metric,
            fmt_metric(result.previous_value),
            fmt_metric(result.current_value),
            fmt_change(result.percent_change),
            direction
        ));
    }
    section.push('\n');

    section
}

/// Generate the alerts section.
fn generate_alerts_section(alerts: &[Alert]) -> String {
    let mut section = String::new();

    section.push_str("## Alerts\n\n");

    if alerts.is_empty() {
        section.push_str("No alerts were raised for this cycle. 🎉\n\n");
        return section;
    }

    for alert in alerts {
        section.push_str(&format!(
            "- {} **{}** {}\n",
            alert.severity.emoji(),
            alert.code,
            alert.message
        ));
    }
    section.push('\n');

    section
}

/// Generate the recommendations section.
fn generate_recommendations_section(recommendations: &[String]) -> String {
    if recommendations.is_empty() {
        return String::new();
    }

    let mut section = String::new();

    section.push_str("## Recommendations\n\n");

    for (i, rec) in recommendations.iter().enumerate() {
        section.push_str(&format!("{}. {}\n", i + 1, rec));
    }
    section.push('\n');

    section
}

/// Throughput means and variability across the quarter.
fn generate_evolution_section(rollup: &QuarterRollup) -> String {
    let mut section = String::new();

    section.push_str("## Throughput Evolution\n\n");
    section.push_str("| Cycle | Mean/week | CV |\n");
    section.push_str("|:---|:---:|:---:|\n");
    for (mean, cv) in rollup.throughput_means.iter().zip(&rollup.variability) {
        section.push_str(&format!(
            "| {} | {} | {} |\n",
            mean.label,
            fmt_metric(mean.value),
            fmt_metric_with(cv.value, "%")
        ));
    }
    section.push('\n');

    section.push_str(&format!(
        "- **Throughput trend:** {}\n",
        fmt_trend(&rollup.throughput_trend)
    ));
    section.push_str(&format!(
        "- **Variability improving:** {}\n\n",
        match rollup.variability_improving {
            Metric::Value(true) => "yes",
            Metric::Value(false) => "no",
            _ => "insufficient data",
        }
    ));

    section
}

/// Weekly throughput with its rolling CV.
fn generate_weekly_section(rollup: &QuarterRollup) -> String {
    let mut section = String::new();

    section.push_str("## Weekly Throughput\n\n");

    if rollup.weekly_throughput.is_empty() {
        section.push_str("No weekly throughput data.\n\n");
        return section;
    }

    section.push_str("| Week | Throughput | Rolling CV |\n");
    section.push_str("|:---|:---:|:---:|\n");
    for (week, cv) in rollup.weekly_throughput.iter().zip(&rollup.weekly_rolling_cv) {
        section.push_str(&format!(
            "| {} | {} | {} |\n",
            week.period,
            week.count,
            fmt_metric_with(*cv, "%")
        ));
    }
    section.push('\n');

    section
}

/// Lead-time velocity (p50) and consistency (p90) per cycle.
fn generate_quarter_lead_time_section(rollup: &QuarterRollup) -> String {
    let mut section = String::new();

    section.push_str("## Lead Time\n\n");
    section.push_str("| Cycle | p50 (days) | p90 (days) |\n");
    section.push_str("|:---|:---:|:---:|\n");
    for point in &rollup.lead_time {
        section.push_str(&format!(
            "| {} | {} | {} |\n",
            point.label,
            fmt_metric(point.p50),
            fmt_metric(point.p90)
        ));
    }
    section.push('\n');

    section.push_str(&format!("- **Velocity (p50):** {}\n", fmt_trend(&rollup.p50_trend)));
    section.push_str(&format!(
        "- **Consistency (p90):** {}\n\n",
        fmt_trend(&rollup.p90_trend)
    ));

    section
}

/// Epic ranking for the quarter.
fn generate_epics_section(rollup: &QuarterRollup) -> String {
    let mut section = String::new();

    section.push_str("## Top Epics\n\n");

    if rollup.top_epics.is_empty() {
        section.push_str("No tickets were attributed to an epic.\n\n");
        return section;
    }

    section.push_str("| # | Epic | Tickets |\n");
    section.push_str("|:---:|:---|:---:|\n");
    for (i, epic) in rollup.top_epics.iter().enumerate() {
        section.push_str(&format!("| {} | {} | {} |\n", i + 1, epic.epic, epic.count));
    }
    section.push('\n');

    section
}

/// Generate the report footer.
fn generate_footer() -> String {
    let mut footer = String::new();

    footer.push_str("---\n\n");
    footer.push_str("*Report generated by RetroLens*\n");

    footer
}

/// Generate a JSON report.
pub fn generate_json_report<T: Serialize>(report: &T) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}
