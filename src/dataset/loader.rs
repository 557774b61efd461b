//! CSV ingestion for the four series of a cycle directory.
//!
//! Headers are matched after trimming, case-insensitively. Row numbers in
//! errors are 1-based and count data rows only.

use crate::error::{DataFormatError, DatasetError, Series};
use crate::models::{
    CfdSnapshot, CycleData, LeadTimeSample, ThroughputSample, TicketRecord, TicketType,
};
use chrono::{NaiveDate, NaiveDateTime};
use csv::{Reader, ReaderBuilder, StringRecord, Trim};
use std::collections::BTreeMap;
use std::io;
use std::path::Path;
use tracing::{debug, warn};

pub const CFD_FILE: &str = "cfd.csv";
pub const THROUGHPUT_FILE: &str = "throughput.csv";
pub const LEAD_TIME_FILE: &str = "leadtime.csv";
pub const TICKETS_FILE: &str = "tickets.csv";

const DATE_COLUMN: &[&str] = &["Date"];
const PERIOD_COLUMN: &[&str] = &["Period"];
const THROUGHPUT_COLUMN: &[&str] = &["Throughput"];
const LEAD_TIME_COLUMN: &[&str] = &["Leadtime", "Lead time"];
const ITEM_COUNT_COLUMN: &[&str] = &["item count"];
const TYPE_COLUMN: &[&str] = &["Tipo de item", "Issue Type"];
const KEY_COLUMN: &[&str] = &["Chave da item", "Issue key"];
const EPIC_COLUMN: &[&str] = &["Parent summary"];

/// Failure while parsing one series, before the file path is attached.
#[derive(Debug)]
pub enum ParseError {
    Csv(csv::Error),
    Format(DataFormatError),
}

impl From<csv::Error> for ParseError {
    fn from(err: csv::Error) -> Self {
        ParseError::Csv(err)
    }
}

impl From<DataFormatError> for ParseError {
    fn from(err: DataFormatError) -> Self {
        ParseError::Format(err)
    }
}

impl ParseError {
    fn at(self, path: &Path) -> DatasetError {
        match self {
            ParseError::Csv(source) => DatasetError::Read {
                path: path.to_path_buf(),
                source,
            },
            ParseError::Format(source) => DatasetError::Format {
                path: path.to_path_buf(),
                source,
            },
        }
    }
}

/// Read every series of the cycle in `dir` and validate the result.
///
/// A missing file yields an empty series.
pub fn load_cycle(dir: &Path, label: &str) -> Result<CycleData, DatasetError> {
    if !dir.is_dir() {
        return Err(DatasetError::NotFound(dir.to_path_buf()));
    }

    let mut cycle = CycleData::new(label);
    cycle.cfd = load_series(&dir.join(CFD_FILE), parse_cfd)?;
    cycle.throughput = load_series(&dir.join(THROUGHPUT_FILE), parse_throughput)?;
    cycle.lead_time = load_series(&dir.join(LEAD_TIME_FILE), parse_lead_time)?;
    cycle.tickets = load_series(&dir.join(TICKETS_FILE), parse_tickets)?;

    cycle.validate().map_err(|source| DatasetError::Format {
        path: dir.to_path_buf(),
        source,
    })?;

    debug!(
        "Loaded cycle {}: {} cfd rows, {} weeks, {} lead-time buckets, {} tickets",
        label,
        cycle.cfd.len(),
        cycle.throughput.len(),
        cycle.lead_time.len(),
        cycle.tickets.len()
    );

    Ok(cycle)
}

fn load_series<T>(
    path: &Path,
    parse: fn(&mut Reader<std::fs::File>) -> Result<Vec<T>, ParseError>,
) -> Result<Vec<T>, DatasetError> {
    if !path.is_file() {
        warn!("{} not found, treating the series as empty", path.display());
        return Ok(Vec::new());
    }

    let mut reader = reader_builder()
        .from_path(path)
        .map_err(|source| DatasetError::Read {
            path: path.to_path_buf(),
            source,
        })?;

    parse(&mut reader).map_err(|e| e.at(path))
}

fn reader_builder() -> ReaderBuilder {
    let mut builder = ReaderBuilder::new();
    builder.trim(Trim::All).flexible(true);
    builder
}

/// Parse `cfd.csv`: a `Date` column followed by one count column per stage.
pub fn parse_cfd<R: io::Read>(reader: &mut Reader<R>) -> Result<Vec<CfdSnapshot>, ParseError> {
    let headers = reader.headers()?.clone();
    let date_idx = require_column(&headers, DATE_COLUMN, Series::Cfd)?;
    let stages: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .filter(|(i, name)| *i != date_idx && !name.trim().is_empty())
        .map(|(i, name)| (i, name.trim().to_string()))
        .collect();

    let mut snapshots = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record?;
        let row = i + 1;
        let date = date_field(&record, date_idx, Series::Cfd, row, "Date")?;

        let mut counts = BTreeMap::new();
        for (idx, stage) in &stages {
            let count = count_field(&record, *idx, Series::Cfd, row, stage)?;
            counts.insert(stage.clone(), count);
        }

        snapshots.push(CfdSnapshot {
            date,
            stages: counts,
        });
    }

    Ok(snapshots)
}

/// Parse `throughput.csv`: `Period`, `Throughput`.
pub fn parse_throughput<R: io::Read>(
    reader: &mut Reader<R>,
) -> Result<Vec<ThroughputSample>, ParseError> {
    let headers = reader.headers()?.clone();
    let period_idx = require_column(&headers, PERIOD_COLUMN, Series::Throughput)?;
    let count_idx = require_column(&headers, THROUGHPUT_COLUMN, Series::Throughput)?;

    let mut samples = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record?;
        let row = i + 1;
        samples.push(ThroughputSample {
            period: date_field(&record, period_idx, Series::Throughput, row, "Period")?,
            count: count_field(&record, count_idx, Series::Throughput, row, "Throughput")?,
        });
    }

    Ok(samples)
}

/// Parse `leadtime.csv`: `Leadtime` (days), `item count`.
pub fn parse_lead_time<R: io::Read>(
    reader: &mut Reader<R>,
) -> Result<Vec<LeadTimeSample>, ParseError> {
    let headers = reader.headers()?.clone();
    let days_idx = require_column(&headers, LEAD_TIME_COLUMN, Series::LeadTime)?;
    let count_idx = require_column(&headers, ITEM_COUNT_COLUMN, Series::LeadTime)?;

    let mut samples = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record?;
        let row = i + 1;
        let raw = text_field(&record, days_idx, Series::LeadTime, row, "Leadtime")?;
        let days = raw
            .parse::<f64>()
            .ok()
            .filter(|d| d.is_finite() && *d > 0.0)
            .ok_or_else(|| invalid(Series::LeadTime, row, "Leadtime", raw))?;

        samples.push(LeadTimeSample {
            days,
            item_count: count_field(&record, count_idx, Series::LeadTime, row, "item count")?,
        });
    }

    Ok(samples)
}

/// Parse `tickets.csv`, keeping the type, key and parent epic of each row.
pub fn parse_tickets<R: io::Read>(
    reader: &mut Reader<R>,
) -> Result<Vec<TicketRecord>, ParseError> {
    let headers = reader.headers()?.clone();
    let type_idx = require_column(&headers, TYPE_COLUMN, Series::Tickets)?;
    let key_idx = find_column(&headers, KEY_COLUMN);
    let epic_idx = find_column(&headers, EPIC_COLUMN);

    let mut tickets = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record?;
        let row = i + 1;
        let label = text_field(&record, type_idx, Series::Tickets, row, TYPE_COLUMN[0])?;

        tickets.push(TicketRecord {
            key: optional_field(&record, key_idx),
            ticket_type: TicketType::from(label),
            epic: optional_field(&record, epic_idx),
        });
    }

    Ok(tickets)
}

fn find_column(headers: &StringRecord, names: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|h| names.iter().any(|name| h.trim().eq_ignore_ascii_case(name)))
}

fn require_column(
    headers: &StringRecord,
    names: &[&str],
    series: Series,
) -> Result<usize, DataFormatError> {
    find_column(headers, names).ok_or_else(|| DataFormatError::MissingColumn {
        series,
        column: names[0].to_string(),
    })
}

fn text_field<'r>(
    record: &'r StringRecord,
    idx: usize,
    series: Series,
    row: usize,
    field: &str,
) -> Result<&'r str, DataFormatError> {
    match record.get(idx).map(str::trim) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(DataFormatError::MissingField {
            series,
            row,
            field: field.to_string(),
        }),
    }
}

fn optional_field(record: &StringRecord, idx: Option<usize>) -> Option<String> {
    idx.and_then(|i| record.get(i))
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(String::from)
}

fn date_field(
    record: &StringRecord,
    idx: usize,
    series: Series,
    row: usize,
    field: &str,
) -> Result<NaiveDate, DataFormatError> {
    let raw = text_field(record, idx, series, row, field)?;
    parse_date(raw).ok_or_else(|| invalid(series, row, field, raw))
}

/// Counts may be exported as `3` or `3.0`; anything fractional or negative
/// is rejected.
fn count_field(
    record: &StringRecord,
    idx: usize,
    series: Series,
    row: usize,
    field: &str,
) -> Result<u32, DataFormatError> {
    let raw = text_field(record, idx, series, row, field)?;
    if let Ok(count) = raw.parse::<u32>() {
        return Ok(count);
    }

    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0 && v.fract() == 0.0 && *v <= u32::MAX as f64)
        .map(|v| v as u32)
        .ok_or_else(|| invalid(series, row, field, raw))
}

fn invalid(series: Series, row: usize, field: &str, value: &str) -> DataFormatError {
    DataFormatError::InvalidValue {
        series,
        row,
        field: field.to_string(),
        value: value.to_string(),
    }
}

/// Accepts ISO dates, optionally with a time part.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| {
            ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"]
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
                .map(|dt| dt.date())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn reader_from_str(data: &str) -> Reader<&[u8]> {
        reader_builder().from_reader(data.as_bytes())
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_parse_cfd() {
        let data = "\"Date\",\"DONE\",\"TESTING\",\"IN PROGRESS\"\n\
                    2026-01-05,10,2,3\n\
                    2026-01-06,11,1.0,4\n";
        let snapshots = parse_cfd(&mut reader_from_str(data)).unwrap();

        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].date, date("2026-01-05"));
        assert_eq!(snapshots[1].stages["TESTING"], 1);
        assert_eq!(snapshots[1].stages["IN PROGRESS"], 4);
        assert_eq!(snapshots[0].stages.len(), 3);
    }

    #[test]
    fn test_parse_cfd_invalid_count() {
        let data = "Date,DONE\n2026-01-05,10\n2026-01-06,abc\n";
        let err = parse_cfd(&mut reader_from_str(data)).unwrap_err();
        match err {
            ParseError::Format(DataFormatError::InvalidValue { row, field, .. }) => {
                assert_eq!(row, 2);
                assert_eq!(field, "DONE");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_parse_throughput_headers_are_lenient() {
        let data = " period , THROUGHPUT \n2026-01-05,10\n2026-01-12 00:00:00,12\n";
        let samples = parse_throughput(&mut reader_from_str(data)).unwrap();

        assert_eq!(samples.len(), 2);
        assert_eq!(samples[1].period, date("2026-01-12"));
        assert_eq!(samples[1].count, 12);
    }

    #[test]
    fn test_parse_throughput_missing_column() {
        let data = "Week,Throughput\n2026-01-05,10\n";
        let err = parse_throughput(&mut reader_from_str(data)).unwrap_err();
        assert!(matches!(
            err,
            ParseError::Format(DataFormatError::MissingColumn {
                series: Series::Throughput,
                ..
            })
        ));
    }

    #[test]
    fn test_parse_throughput_missing_value() {
        let data = "Period,Throughput\n2026-01-05,10\n2026-01-12,\n";
        let err = parse_throughput(&mut reader_from_str(data)).unwrap_err();
        assert!(matches!(
            err,
            ParseError::Format(DataFormatError::MissingField { row: 2, .. })
        ));
    }

    #[test]
    fn test_parse_lead_time() {
        let data = "Leadtime, item count\n2,3\n4.5,5\n";
        let samples = parse_lead_time(&mut reader_from_str(data)).unwrap();

        assert_eq!(samples.len(), 2);
        assert_eq!(samples[1].days, 4.5);
        assert_eq!(samples[1].item_count, 5);
    }

    #[test]
    fn test_parse_lead_time_rejects_non_positive() {
        let data = "Leadtime,item count\n2,3\n0,1\n";
        let err = parse_lead_time(&mut reader_from_str(data)).unwrap_err();
        assert!(matches!(
            err,
            ParseError::Format(DataFormatError::InvalidValue { row: 2, .. })
        ));
    }

    #[test]
    fn test_parse_tickets() {
        let data = "Tipo de item,Chave da item,Resumo,Parent summary\n\
                    História,PAY-1,\"Checkout, step 2\",Payments\n\
                    Bug,PAY-2,Fix rounding,\n\
                    Incidente,PAY-3,Outage,Payments\n";
        let tickets = parse_tickets(&mut reader_from_str(data)).unwrap();

        assert_eq!(tickets.len(), 3);
        assert_eq!(tickets[0].ticket_type, TicketType::Feature);
        assert_eq!(tickets[0].key.as_deref(), Some("PAY-1"));
        assert_eq!(tickets[0].epic.as_deref(), Some("Payments"));
        assert_eq!(tickets[1].ticket_type, TicketType::Bug);
        assert_eq!(tickets[1].epic, None);
        assert_eq!(tickets[2].ticket_type, TicketType::Incident);
    }

    #[test]
    fn test_parse_tickets_english_headers() {
        let data = "Issue Type,Issue key,Summary\nTask,OPS-9,Rotate keys\n";
        let tickets = parse_tickets(&mut reader_from_str(data)).unwrap();

        assert_eq!(tickets[0].ticket_type, TicketType::Task);
        assert_eq!(tickets[0].key.as_deref(), Some("OPS-9"));
        assert_eq!(tickets[0].epic, None);
    }

    #[test]
    fn test_load_cycle_missing_files_are_empty() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(
            temp_dir.path().join(THROUGHPUT_FILE),
            "Period,Throughput\n2026-01-05,10\n2026-01-12,12\n",
        )
        .unwrap();

        let cycle = load_cycle(temp_dir.path(), "2026-01-14").unwrap();
        assert_eq!(cycle.label, "2026-01-14");
        assert_eq!(cycle.throughput.len(), 2);
        assert!(cycle.cfd.is_empty());
        assert!(cycle.lead_time.is_empty());
        assert!(cycle.tickets.is_empty());
    }

    #[test]
    fn test_load_cycle_reports_path_and_order() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(
            temp_dir.path().join(THROUGHPUT_FILE),
            "Period,Throughput\n2026-01-12,10\n2026-01-05,12\n",
        )
        .unwrap();

        let err = load_cycle(temp_dir.path(), "x").unwrap_err();
        match err {
            DatasetError::Format { source, .. } => assert_eq!(
                source,
                DataFormatError::OutOfOrder {
                    series: Series::Throughput,
                    row: 2,
                    date: date("2026-01-05"),
                }
            ),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_load_cycle_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let err = load_cycle(&temp_dir.path().join("nope"), "x").unwrap_err();
        assert!(matches!(err, DatasetError::NotFound(_)));
    }
}
