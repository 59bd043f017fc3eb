//! Core types for dw-export

use crate::error::{Error, Result};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// A calendar month, ordered by `(year, month)`
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Month {
    year: i32,
    month: u32,
}

impl Month {
    /// Create a month, rejecting anything outside 1..=12
    pub fn new(year: i32, month: u32) -> Result<Self> {
        if !(1..=12).contains(&month) {
            return Err(Error::config(
                format!("month must be between 1 and 12, got {month}"),
                "month",
            ));
        }
        Ok(Self { year, month })
    }

    /// Current month in UTC
    pub fn current_utc() -> Self {
        use chrono::Datelike;
        let today = chrono::Utc::now().date_naive();
        Self {
            year: today.year(),
            month: today.month(),
        }
    }

    /// Year component
    pub fn year(&self) -> i32 {
        self.year
    }

    /// Month component (1..=12)
    pub fn month(&self) -> u32 {
        self.month
    }

    /// The month after this one, `None` past December of `i32::MAX`
    pub fn succ(&self) -> Option<Self> {
        if self.month == 12 {
            Some(Self {
                year: self.year.checked_add(1)?,
                month: 1,
            })
        } else {
            Some(Self {
                year: self.year,
                month: self.month + 1,
            })
        }
    }

    /// Closed range `self..=end` in ascending order (empty if `end < self`)
    pub fn through(self, end: Month) -> MonthRange {
        MonthRange {
            next: Some(self),
            end,
        }
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for Month {
    type Err = Error;

    /// Parses `YYYY-MM`
    fn from_str(s: &str) -> Result<Self> {
        let bad = || Error::config(format!("expected YYYY-MM, got '{s}'"), "month");
        let (year, month) = s.trim().split_once('-').ok_or_else(bad)?;
        let year = year.parse::<i32>().map_err(|_| bad())?;
        let month = month.parse::<u32>().map_err(|_| bad())?;
        Month::new(year, month)
    }
}

/// Iterator over a closed month interval
#[derive(Clone, Debug)]
pub struct MonthRange {
    next: Option<Month>,
    end: Month,
}

impl Iterator for MonthRange {
    type Item = Month;

    fn next(&mut self) -> Option<Month> {
        let current = self.next.filter(|m| *m <= self.end)?;
        self.next = current.succ();
        Some(current)
    }
}

/// Result of one export attempt for one month
///
/// Produced once per export; the export is never retried as a whole. Transport
/// and I/O failures travel separately as [`Error`] values.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExportOutcome {
    /// The structured export was written to disk
    Success {
        /// Bytes written
        bytes_written: u64,
        /// Output file
        path: PathBuf,
    },
    /// The session was redirected to a login page
    NotAuthenticated,
    /// The export page answered with a non-200 status
    BadStatus(u16),
    /// The export form could not be located or read
    ParseFailure(String),
    /// The submission answered with something other than the structured export
    FormatMismatch,
}

impl ExportOutcome {
    /// Whether the month was exported
    pub fn is_success(&self) -> bool {
        matches!(self, ExportOutcome::Success { .. })
    }

    /// Reason string for the failure ledger
    pub fn reason(&self) -> String {
        match self {
            ExportOutcome::Success { .. } => "ok".into(),
            ExportOutcome::NotAuthenticated => "not_authenticated".into(),
            ExportOutcome::BadStatus(code) => format!("bad_status_{code}"),
            ExportOutcome::ParseFailure(_) => "parse_failure".into(),
            ExportOutcome::FormatMismatch => "format_mismatch".into(),
        }
    }

    /// Process exit code for a single-month run
    pub fn exit_code(&self) -> u8 {
        match self {
            ExportOutcome::Success { .. } => 0,
            ExportOutcome::ParseFailure(_) => 1,
            ExportOutcome::NotAuthenticated | ExportOutcome::BadStatus(_) => 3,
            ExportOutcome::FormatMismatch => 4,
        }
    }
}
