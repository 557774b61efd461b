//! Analysis modules.
//!
//! Pure computations over in-memory series: per-cycle statistics, trends,
//! cycle-over-cycle comparison, alert rules and quarter rollups.

pub mod comparison;
pub mod insights;
pub mod metrics;
pub mod quarter;
pub mod trend;

pub use comparison::{ComparisonConfig, ComparisonEngine};
pub use insights::{InsightConfig, InsightGenerator};
pub use metrics::{MetricsCalculator, MetricsConfig};
pub use quarter::QuarterAggregator;
