//! Cycle directory discovery.
//!
//! Exports are laid out as `<root>/<team>/<YYYY-QN>/<YYYY-MM-DD>/`, one
//! directory per retrospective.

pub mod loader;

pub use loader::load_cycle;

use crate::error::DatasetError;
use crate::models::CycleData;
use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Format of cycle directory names.
pub const CYCLE_DATE_FORMAT: &str = "%Y-%m-%d";

/// A dated cycle directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleDirectory {
    pub team: Option<String>,
    pub quarter: Option<String>,
    pub date: NaiveDate,
    pub path: PathBuf,
}

impl CycleDirectory {
    /// Interpret `path` as a cycle directory. Relative paths are resolved
    /// so that the team and quarter come from the real parents.
    pub fn from_path(path: &Path) -> Result<Self, DatasetError> {
        if !path.is_dir() {
            return Err(DatasetError::NotFound(path.to_path_buf()));
        }
        let path = &std::fs::canonicalize(path)
            .map_err(|_| DatasetError::NotFound(path.to_path_buf()))?;

        let date = dir_date(path).ok_or_else(|| DatasetError::NotACycle(path.to_path_buf()))?;
        let quarter_dir = path.parent();
        let team_dir = quarter_dir.and_then(Path::parent);

        Ok(Self {
            team: team_dir.and_then(dir_name),
            quarter: quarter_dir.and_then(dir_name),
            date,
            path: path.to_path_buf(),
        })
    }

    /// The cycle label used in reports.
    pub fn label(&self) -> String {
        self.date.format(CYCLE_DATE_FORMAT).to_string()
    }

    /// Read this cycle's series.
    pub fn load(&self) -> Result<CycleData, DatasetError> {
        load_cycle(&self.path, &self.label())
    }
}

fn dir_name(path: &Path) -> Option<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .filter(|name| !name.is_empty())
}

fn dir_date(path: &Path) -> Option<NaiveDate> {
    let name = path.file_name()?.to_str()?;
    NaiveDate::parse_from_str(name, CYCLE_DATE_FORMAT).ok()
}

/// Dated subdirectories of `dir` at exactly `depth`, in walk order.
fn dated_dirs(dir: &Path, depth: usize) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .min_depth(depth)
        .max_depth(depth)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!("Skipping unreadable entry under {}: {}", dir.display(), e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_dir())
        .map(|entry| entry.into_path())
        .filter(|path| dir_date(path).is_some())
        .collect()
}

/// All cycles of a quarter directory, oldest first.
pub fn discover_cycles(quarter_dir: &Path) -> Result<Vec<CycleDirectory>, DatasetError> {
    if !quarter_dir.is_dir() {
        return Err(DatasetError::NotFound(quarter_dir.to_path_buf()));
    }

    let mut cycles = dated_dirs(quarter_dir, 1)
        .iter()
        .map(|path| CycleDirectory::from_path(path))
        .collect::<Result<Vec<_>, _>>()?;
    cycles.sort_by(|a, b| a.date.cmp(&b.date));

    debug!(
        "Discovered {} cycles under {}",
        cycles.len(),
        quarter_dir.display()
    );

    Ok(cycles)
}

/// The latest cycle of the same team dated strictly before `current`,
/// searching every quarter.
pub fn resolve_previous(current: &CycleDirectory) -> Option<CycleDirectory> {
    let team_dir = current.path.parent()?.parent()?;

    let previous = dated_dirs(team_dir, 2)
        .iter()
        .filter_map(|path| CycleDirectory::from_path(path).ok())
        .filter(|cycle| cycle.date < current.date)
        .max_by(|a, b| a.date.cmp(&b.date));

    match &previous {
        Some(cycle) => debug!("Previous cycle of {}: {}", current.label(), cycle.path.display()),
        None => debug!("No cycle before {} in {}", current.label(), team_dir.display()),
    }

    previous
}
