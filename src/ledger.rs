//! Append-only failure ledger
//!
//! One line per failed month: `year,month,timestampUTC,reason`. The file is
//! opened, appended to, and closed for every record so nothing is buffered
//! across months.

use crate::error::{Error, Result};
use crate::types::Month;
use chrono::{DateTime, NaiveDateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Timestamp format used in every ledger (`2024-01-31T12:00:00Z`)
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Format a UTC timestamp for a ledger line
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// One failed month
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FailureRecord {
    /// Month that failed
    pub month: Month,
    /// When the failure was recorded, to the second
    pub timestamp: DateTime<Utc>,
    /// Outcome reason or error code
    pub reason: String,
}

impl FailureRecord {
    /// Record a failure now
    pub fn now(month: Month, reason: impl Into<String>) -> Self {
        let now = Utc::now();
        // Ledger lines carry whole seconds
        let timestamp = DateTime::from_timestamp(now.timestamp(), 0).unwrap_or(now);
        Self {
            month,
            timestamp,
            reason: reason.into(),
        }
    }

    /// Ledger line, without the trailing newline
    pub fn to_line(&self) -> String {
        format!(
            "{:04},{:02},{},{}",
            self.month.year(),
            self.month.month(),
            format_timestamp(self.timestamp),
            self.reason
        )
    }

    /// Parse a ledger line
    ///
    /// The reason is everything after the third comma, so it may itself
    /// contain commas.
    pub fn parse_line(line: &str) -> Result<Self> {
        let bad = |what: &str| Error::Parse(format!("ledger line '{line}': {what}"));

        let mut parts = line.trim_end_matches(['\r', '\n']).splitn(4, ',');
        let year = parts
            .next()
            .and_then(|y| y.trim().parse::<i32>().ok())
            .ok_or_else(|| bad("bad year"))?;
        let month = parts
            .next()
            .and_then(|m| m.trim().parse::<u32>().ok())
            .ok_or_else(|| bad("bad month"))?;
        let timestamp = parts
            .next()
            .and_then(|t| NaiveDateTime::parse_from_str(t.trim(), TIMESTAMP_FORMAT).ok())
            .map(|t| t.and_utc())
            .ok_or_else(|| bad("bad timestamp"))?;
        let reason = parts.next().ok_or_else(|| bad("missing reason"))?;

        Ok(Self {
            month: Month::new(year, month).map_err(|_| bad("month out of range"))?,
            timestamp,
            reason: reason.to_string(),
        })
    }
}

/// Append one newline-terminated line, creating the file and its parents
pub async fn append_line(path: &Path, line: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(format!("{line}\n").as_bytes()).await?;
    file.flush().await?;
    Ok(())
}

/// Failure ledger for month exports
#[derive(Clone, Debug)]
pub struct FailureLedger {
    path: PathBuf,
}

impl FailureLedger {
    /// Ledger at `path`; nothing is created until the first append
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Ledger file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record
    pub async fn append(&self, record: &FailureRecord) -> Result<()> {
        append_line(&self.path, &record.to_line()).await
    }

    /// Every record in file order; an absent file is an empty ledger
    pub async fn read_all(&self) -> Result<Vec<FailureRecord>> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        text.lines()
            .filter(|l| !l.trim().is_empty())
            .map(FailureRecord::parse_line)
            .collect()
    }
}
