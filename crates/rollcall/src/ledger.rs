//! CSV attendance ledger.
//!
//! One row per person per day, header `Name,Date,Time`. The in-memory table
//! is authoritative; the file is rewritten in full after every change.

use chrono::{Local, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const REQUIRED_COLUMNS: [&str; 3] = ["Name", "Date", "Time"];
pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M:%S";

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("ledger file not found")]
    Missing,
    #[error("ledger is missing required column {0:?}")]
    MissingColumn(&'static str),
    #[error("csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Date")]
    pub date: String,
    #[serde(rename = "Time")]
    pub time: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkOutcome {
    /// A row for this (name, date) already exists; nothing changed.
    AlreadyPresent,
    /// A row was appended. `persisted` is false when the file write failed.
    Recorded { persisted: bool },
}

/// Source of wall-clock time for attendance stamps.
pub trait Clock {
    fn now(&self) -> NaiveDateTime;
}

/// Local system time.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Ledger file for `date`: `base` itself, or `stem_YYYY-MM-DD.ext` under
/// daily rotation (`.csv` when `base` has no extension).
pub fn current_path(base: &Path, daily_rotation: bool, date: NaiveDate) -> PathBuf {
    if !daily_rotation {
        return base.to_path_buf();
    }
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "Attendance".to_string());
    let ext = base
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "csv".to_string());
    base.with_file_name(format!("{stem}_{}.{ext}", date.format(DATE_FORMAT)))
}

/// In-memory attendance table bound to one file.
#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    records: Vec<AttendanceRecord>,
}

impl Ledger {
    /// Load the ledger at `path`, or start an empty one.
    ///
    /// Never fails: a missing, unreadable or malformed file (including one
    /// lacking any of the required columns) yields an empty table.
    pub fn load_or_init(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let records = match read_records(&path) {
            Ok(records) => {
                tracing::info!(path = %path.display(), rows = records.len(), "ledger loaded");
                records
            }
            Err(LedgerError::Missing) => {
                tracing::info!(path = %path.display(), "starting new ledger");
                Vec::new()
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ledger unreadable, reinitializing");
                Vec::new()
            }
        };
        Self { path, records }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> &[AttendanceRecord] {
        &self.records
    }

    pub fn contains(&self, name: &str, date: &str) -> bool {
        self.records.iter().any(|r| r.name == name && r.date == date)
    }

    /// Record `name` at `date`/`time` unless already present for `date`.
    ///
    /// The row stays in memory even if writing the file fails, so the
    /// person is not re-marked for the rest of the day.
    pub fn mark(&mut self, name: &str, date: &str, time: &str) -> MarkOutcome {
        if self.contains(name, date) {
            return MarkOutcome::AlreadyPresent;
        }
        self.records.push(AttendanceRecord {
            name: name.to_string(),
            date: date.to_string(),
            time: time.to_string(),
        });

        let persisted = match self.save() {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(path = %self.path.display(), error = %e, "failed to write ledger");
                false
            }
        };
        MarkOutcome::Recorded { persisted }
    }

    /// Rewrite the whole file: header, then every row.
    pub fn save(&self) -> Result<(), LedgerError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp = PathBuf::from(tmp_name);

        let result = write_records(&tmp, &self.records)
            .and_then(|()| std::fs::rename(&tmp, &self.path).map_err(LedgerError::from));
        if result.is_err() && tmp.exists() {
            if let Err(e) = std::fs::remove_file(&tmp) {
                tracing::warn!(path = %tmp.display(), error = %e, "failed to remove temporary ledger");
            }
        }
        result
    }
}

fn write_records(path: &Path, records: &[AttendanceRecord]) -> Result<(), LedgerError> {
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_path(path)?;
    writer.write_record(REQUIRED_COLUMNS)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

fn read_records(path: &Path) -> Result<Vec<AttendanceRecord>, LedgerError> {
    if !path.exists() {
        return Err(LedgerError::Missing);
    }
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)?;

    let headers = reader.headers()?.clone();
    for column in REQUIRED_COLUMNS {
        if !headers.iter().any(|h| h == column) {
            return Err(LedgerError::MissingColumn(column));
        }
    }

    reader
        .deserialize()
        .collect::<Result<Vec<AttendanceRecord>, _>>()
        .map_err(LedgerError::from)
}

/// The ledger for the current day, switching files when rotation is on and
/// the date changes.
#[derive(Debug)]
pub struct Attendance {
    base: PathBuf,
    daily_rotation: bool,
    ledger: Ledger,
}

impl Attendance {
    pub fn open(base: impl Into<PathBuf>, daily_rotation: bool, today: NaiveDate) -> Self {
        let base = base.into();
        let ledger = Ledger::load_or_init(current_path(&base, daily_rotation, today));
        Self {
            base,
            daily_rotation,
            ledger,
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Mark `name` present at `now`, rotating to that day's file first if needed.
    pub fn record(&mut self, name: &str, now: NaiveDateTime) -> MarkOutcome {
        let path = current_path(&self.base, self.daily_rotation, now.date());
        if path != self.ledger.path() {
            tracing::info!(from = %self.ledger.path().display(), to = %path.display(), "rotating ledger");
            self.ledger = Ledger::load_or_init(path);
        }

        let date = now.format(DATE_FORMAT).to_string();
        let time = now.format(TIME_FORMAT).to_string();
        self.ledger.mark(name, &date, &time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, s)
            .unwrap()
    }

    #[test]
    fn test_current_path() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let base = Path::new("logs/Attendance.csv");
        assert_eq!(current_path(base, false, date), PathBuf::from("logs/Attendance.csv"));
        assert_eq!(current_path(base, true, date), PathBuf::from("logs/Attendance_2024-03-01.csv"));
        assert_eq!(
            current_path(Path::new("roll"), true, date),
            PathBuf::from("roll_2024-03-01.csv")
        );
    }

    #[test]
    fn test_new_ledger_writes_header_and_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Attendance.csv");
        let mut ledger = Ledger::load_or_init(&path);
        assert!(ledger.records().is_empty());

        let outcome = ledger.mark("John Doe", "2024-03-01", "09:15:02");
        assert_eq!(outcome, MarkOutcome::Recorded { persisted: true });

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "Name,Date,Time\nJohn Doe,2024-03-01,09:15:02\n");
    }

    #[test]
    fn test_mark_is_idempotent_per_day() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Attendance.csv");
        let mut ledger = Ledger::load_or_init(&path);

        ledger.mark("John Doe", "2024-03-01", "09:15:02");
        assert_eq!(
            ledger.mark("John Doe", "2024-03-01", "11:00:00"),
            MarkOutcome::AlreadyPresent
        );
        assert_eq!(
            ledger.mark("John Doe", "2024-03-02", "09:00:00"),
            MarkOutcome::Recorded { persisted: true }
        );
        assert_eq!(ledger.records().len(), 2);
    }

    #[test]
    fn test_reload_preserves_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Attendance.csv");
        {
            let mut ledger = Ledger::load_or_init(&path);
            ledger.mark("John Doe", "2024-03-01", "09:15:02");
            ledger.mark("Jane Roe", "2024-03-01", "09:16:00");
        }
        let mut ledger = Ledger::load_or_init(&path);
        assert_eq!(ledger.records().len(), 2);
        assert_eq!(ledger.records()[1].name, "Jane Roe");
        assert_eq!(
            ledger.mark("John Doe", "2024-03-01", "10:00:00"),
            MarkOutcome::AlreadyPresent
        );
    }

    #[test]
    fn test_missing_column_reinitializes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Attendance.csv");
        std::fs::write(&path, "Name,Date\nJohn Doe,2024-03-01\n").unwrap();

        let mut ledger = Ledger::load_or_init(&path);
        assert!(ledger.records().is_empty());

        ledger.mark("Jane Roe", "2024-03-01", "08:00:00");
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "Name,Date,Time\nJane Roe,2024-03-01,08:00:00\n");
    }

    #[test]
    fn test_extra_columns_are_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Attendance.csv");
        std::fs::write(&path, "Name,Date,Time,Room\nJohn Doe,2024-03-01,09:00:00,B12\n").unwrap();

        let ledger = Ledger::load_or_init(&path);
        assert_eq!(ledger.records().len(), 1);
        assert!(ledger.contains("John Doe", "2024-03-01"));
    }

    #[test]
    fn test_write_failure_keeps_row_in_memory() {
        let dir = tempfile::tempdir().unwrap();
        // A directory at the ledger path makes the final rename fail.
        let path = dir.path().join("Attendance.csv");
        std::fs::create_dir(&path).unwrap();

        let mut ledger = Ledger::load_or_init(&path);
        assert_eq!(
            ledger.mark("John Doe", "2024-03-01", "09:00:00"),
            MarkOutcome::Recorded { persisted: false }
        );
        assert_eq!(
            ledger.mark("John Doe", "2024-03-01", "09:05:00"),
            MarkOutcome::AlreadyPresent
        );

        let mut entries: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        entries.sort();
        assert_eq!(entries, vec!["Attendance.csv".to_string()]);
    }

    #[test]
    fn test_short_row_reinitializes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Attendance.csv");
        std::fs::write(&path, "Name,Date,Time\nJohn Doe,2024-03-01\n").unwrap();

        let mut ledger = Ledger::load_or_init(&path);
        assert!(ledger.records().is_empty());

        assert_eq!(
            ledger.mark("Jane Roe", "2024-03-01", "08:00:00"),
            MarkOutcome::Recorded { persisted: true }
        );
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "Name,Date,Time\nJane Roe,2024-03-01,08:00:00\n");
    }

    #[test]
    fn test_rotation_across_midnight() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("Attendance.csv");
        let mut attendance = Attendance::open(&base, true, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());

        attendance.record("John Doe", at(2024, 3, 1, 23, 59, 58));
        attendance.record("John Doe", at(2024, 3, 2, 0, 0, 3));

        let day1 = std::fs::read_to_string(dir.path().join("Attendance_2024-03-01.csv")).unwrap();
        let day2 = std::fs::read_to_string(dir.path().join("Attendance_2024-03-02.csv")).unwrap();
        assert_eq!(day1, "Name,Date,Time\nJohn Doe,2024-03-01,23:59:58\n");
        assert_eq!(day2, "Name,Date,Time\nJohn Doe,2024-03-02,00:00:03\n");
        assert!(!base.exists());
    }

    #[test]
    fn test_single_file_without_rotation() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("Attendance.csv");
        let mut attendance = Attendance::open(&base, false, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());

        attendance.record("John Doe", at(2024, 3, 1, 9, 0, 0));
        attendance.record("John Doe", at(2024, 3, 1, 12, 0, 0));
        attendance.record("John Doe", at(2024, 3, 2, 9, 0, 0));

        assert_eq!(attendance.ledger().path(), base.as_path());
        assert_eq!(attendance.ledger().records().len(), 2);
    }
}
