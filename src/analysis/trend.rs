//! Linear-regression trend classification over ordered series.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Slope magnitude above which a series counts as moving.
pub const SLOPE_THRESHOLD: f64 = 0.5;

/// Direction of an ordered series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Growing,
    Stable,
    Declining,
    InsufficientData,
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trend::Growing => write!(f, "Growing"),
            Trend::Stable => write!(f, "Stable"),
            Trend::Declining => write!(f, "Declining"),
            Trend::InsufficientData => write!(f, "Insufficient data"),
        }
    }
}

impl Trend {
    pub fn arrow(&self) -> &'static str {
        match self {
            Trend::Growing => "↗",
            Trend::Stable => "→",
            Trend::Declining => "↘",
            Trend::InsufficientData => "·",
        }
    }
}

/// Fitted slope and its classification.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendAnalysis {
    /// Units per step; `None` with fewer than two points.
    pub slope: Option<f64>,
    pub trend: Trend,
}

/// Ordinary-least-squares slope of `values` against their indices.
///
/// Returns `None` for fewer than two points.
pub fn ols_slope(values: &[f64]) -> Option<f64> {
    let points: Vec<(f64, f64)> = values
        .iter()
        .enumerate()
        .map(|(i, y)| (i as f64, *y))
        .collect();
    ols_slope_xy(&points)
}

/// Ordinary-least-squares slope of `(x, y)` points.
///
/// Returns `None` for fewer than two points or when every x is equal.
pub fn ols_slope_xy(points: &[(f64, f64)]) -> Option<f64> {
    if points.len() < 2 {
        return None;
    }

    let n = points.len() as f64;
    let mean_x = points.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = points.iter().map(|(_, y)| y).sum::<f64>() / n;

    let (sxy, sxx) = points.iter().fold((0.0, 0.0), |(sxy, sxx), (x, y)| {
        let dx = x - mean_x;
        (sxy + dx * (y - mean_y), sxx + dx * dx)
    });

    if sxx == 0.0 {
        return None;
    }
    Some(sxy / sxx)
}

/// Classify a slope. Exactly ±threshold is stable.
pub fn classify(slope: f64) -> Trend {
    if slope > SLOPE_THRESHOLD {
        Trend::Growing
    } else if slope < -SLOPE_THRESHOLD {
        Trend::Declining
    } else {
        Trend::Stable
    }
}

/// Fit and classify an ordered series.
pub fn analyze(values: &[f64]) -> TrendAnalysis {
    from_slope(ols_slope(values))
}

/// Fit and classify a series with gaps, keeping each value at its index.
pub fn analyze_sparse(values: &[Option<f64>]) -> TrendAnalysis {
    let points: Vec<(f64, f64)> = values
        .iter()
        .enumerate()
        .filter_map(|(i, v)| v.map(|y| (i as f64, y)))
        .collect();
    from_slope(ols_slope_xy(&points))
}

fn from_slope(slope: Option<f64>) -> TrendAnalysis {
    match slope {
        Some(slope) => TrendAnalysis {
            slope: Some(slope),
            trend: classify(slope),
        },
        None => TrendAnalysis {
            slope: None,
            trend: Trend::InsufficientData,
        },
    }
}
