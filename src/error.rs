//! Error types for series ingestion and validation.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// The input series a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Series {
    Cfd,
    Throughput,
    LeadTime,
    Tickets,
}

impl fmt::Display for Series {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Series::Cfd => write!(f, "cfd"),
            Series::Throughput => write!(f, "throughput"),
            Series::LeadTime => write!(f, "leadtime"),
            Series::Tickets => write!(f, "tickets"),
        }
    }
}

/// A malformed record in one of the input series.
///
/// Row indices are 1-based and count data rows only (the header is not row 1).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataFormatError {
    #[error("{series} row {row}: missing required field '{field}'")]
    MissingField {
        series: Series,
        row: usize,
        field: String,
    },

    #[error("{series} row {row}: invalid value '{value}' for field '{field}'")]
    InvalidValue {
        series: Series,
        row: usize,
        field: String,
        value: String,
    },

    #[error("{series} row {row}: date {date} is not after the previous row")]
    OutOfOrder {
        series: Series,
        row: usize,
        date: chrono::NaiveDate,
    },

    #[error("cfd row {row}: stage set differs from the first snapshot")]
    StageMismatch { row: usize },

    #[error("{series}: missing required column '{column}'")]
    MissingColumn { series: Series, column: String },
}

/// Failures while locating or reading a cycle directory.
#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("cycle directory not found: {0}")]
    NotFound(PathBuf),

    #[error("not a cycle directory (expected a YYYY-MM-DD name): {0}")]
    NotACycle(PathBuf),

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("{path}: {source}")]
    Format {
        path: PathBuf,
        #[source]
        source: DataFormatError,
    },
}
