//! Batch export over a month range
//!
//! Months run strictly in ascending order, one at a time. A month whose output
//! file already exists is skipped, so an interrupted run resumes where it
//! stopped. Every failure goes to the ledger; enough failures in a row trip
//! the circuit breaker and end the run, since that usually means the session
//! expired or the page changed.

use crate::config::{BatchConfig, PauseRange};
use crate::error::Result;
use crate::export::MonthExporter;
use crate::ledger::{FailureLedger, FailureRecord};
use crate::transport::uniform_duration;
use crate::types::Month;
use tracing::{error, info, warn};

/// How a batch run ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatchStop {
    /// Every month in the range was visited
    Completed,
    /// Too many consecutive failures
    CircuitBreakerTripped {
        /// Failures in a row when the run stopped
        consecutive_failures: u32,
        /// Month whose failure tripped the breaker
        at: Month,
    },
}

/// Summary of a batch run
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchReport {
    /// Months exported in this run
    pub exported: Vec<Month>,
    /// Months skipped because their output already existed
    pub skipped: Vec<Month>,
    /// Months that failed, in order
    pub failed: Vec<Month>,
    /// Why the run ended
    pub stop: BatchStop,
}

impl BatchReport {
    /// Whether the circuit breaker ended the run
    pub fn tripped(&self) -> bool {
        matches!(self.stop, BatchStop::CircuitBreakerTripped { .. })
    }

    /// Process exit code: 0 on completion, 3 when the breaker tripped
    pub fn exit_code(&self) -> u8 {
        if self.tripped() { 3 } else { 0 }
    }
}

/// Pause reason logged after a failure
pub fn grumpy_reason(consecutive_failures: u32) -> String {
    format!("grumpy (consecutive failures: {consecutive_failures})")
}

/// Sleep a random duration from `range`, logging why
pub async fn polite_pause(range: PauseRange, reason: &str) {
    let delay = uniform_duration(range.min, range.max);
    info!(delay_secs = delay.as_secs_f64(), reason, "Pausing");
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

/// Drives an exporter over a month range
pub struct BatchDriver<E> {
    exporter: E,
    ledger: FailureLedger,
    config: BatchConfig,
}

impl<E: MonthExporter> BatchDriver<E> {
    /// Create a driver; the ledger lives at `config.failure_log`
    pub fn new(exporter: E, config: BatchConfig) -> Self {
        Self {
            exporter,
            ledger: FailureLedger::new(config.failure_log.clone()),
            config,
        }
    }

    /// The failure ledger
    pub fn ledger(&self) -> &FailureLedger {
        &self.ledger
    }

    /// Export every month from `start` through `end` inclusive
    ///
    /// Per-month failures never end the run by themselves; only the
    /// consecutive count does. An `Err` here means the ledger itself could
    /// not be written.
    pub async fn run(&self, start: Month, end: Month) -> Result<BatchReport> {
        let threshold = self.config.max_consecutive_failures;
        let mut report = BatchReport {
            exported: Vec::new(),
            skipped: Vec::new(),
            failed: Vec::new(),
            stop: BatchStop::Completed,
        };
        let mut consecutive_failures: u32 = 0;

        info!(start = %start, end = %end, "Starting batch export");

        for month in start.through(end) {
            let output = self.exporter.output_path(month);
            if output.exists() {
                info!(month = %month, "Skipping (already exists)");
                report.skipped.push(month);
                continue;
            }

            info!(month = %month, "Exporting");
            let reason = match self.exporter.export_month(month).await {
                Ok(outcome) if outcome.is_success() && output.exists() => None,
                Ok(outcome) if outcome.is_success() => Some("output_missing".to_string()),
                Ok(outcome) => Some(outcome.reason()),
                Err(e) => Some(e.code().to_string()),
            };

            let Some(reason) = reason else {
                info!(month = %month, "Success");
                report.exported.push(month);
                consecutive_failures = 0;
                polite_pause(self.config.normal_pause, "normal").await;
                continue;
            };

            consecutive_failures += 1;
            warn!(month = %month, reason = %reason, consecutive_failures, "Failure exporting month");
            self.ledger.append(&FailureRecord::now(month, reason)).await?;
            report.failed.push(month);

            polite_pause(self.config.grumpy_pause, &grumpy_reason(consecutive_failures)).await;

            if consecutive_failures >= threshold {
                error!(consecutive_failures, "Too many consecutive failures, stopping batch run");
                report.stop = BatchStop::CircuitBreakerTripped {
                    consecutive_failures,
                    at: month,
                };
                break;
            }
        }

        info!(
            exported = report.exported.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            ledger = %self.ledger.path().display(),
            "Batch export finished"
        );
        Ok(report)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::types::ExportOutcome;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Replays a fixed list of outcomes; `true` writes the output file
    struct Scripted {
        dir: PathBuf,
        script: Mutex<VecDeque<bool>>,
        calls: Mutex<Vec<Month>>,
    }

    impl Scripted {
        fn new(dir: &Path, script: &[bool]) -> Self {
            Self {
                dir: dir.to_path_buf(),
                script: Mutex::new(script.iter().copied().collect()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<Month> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MonthExporter for Scripted {
        fn output_path(&self, month: Month) -> PathBuf {
            self.dir.join(format!("{month}.xml"))
        }

        async fn export_month(&self, month: Month) -> Result<ExportOutcome> {
            self.calls.lock().unwrap().push(month);
            let ok = self.script.lock().unwrap().pop_front().unwrap_or(true);
            if ok {
                let path = self.output_path(month);
                std::fs::write(&path, "<livejournal/>").unwrap();
                Ok(ExportOutcome::Success {
                    bytes_written: 14,
                    path,
                })
            } else {
                Ok(ExportOutcome::NotAuthenticated)
            }
        }
    }

    fn config(dir: &Path) -> BatchConfig {
        BatchConfig {
            failure_log: dir.join("failed_months.csv"),
            max_consecutive_failures: 5,
            normal_pause: PauseRange::ZERO,
            grumpy_pause: PauseRange::ZERO,
        }
    }

    fn m(y: i32, mo: u32) -> Month {
        Month::new(y, mo).unwrap()
    }

    #[test]
    fn grumpy_reason_carries_the_failure_count() {
        assert_eq!(grumpy_reason(1), "grumpy (consecutive failures: 1)");
        assert_eq!(grumpy_reason(4), "grumpy (consecutive failures: 4)");
    }

    #[tokio::test]
    async fn success_resets_the_consecutive_count() {
        let dir = TempDir::new().unwrap();
        let script = [false, false, false, false, true, false, false, false, false, false, true];
        let driver = BatchDriver::new(Scripted::new(dir.path(), &script), config(dir.path()));

        let report = driver.run(m(2006, 12), m(2008, 12)).await.unwrap();

        assert_eq!(
            report.stop,
            BatchStop::CircuitBreakerTripped {
                consecutive_failures: 5,
                at: m(2007, 9),
            }
        );
        assert_eq!(report.exit_code(), 3);
        assert_eq!(report.exported, vec![m(2007, 4)]);
        assert_eq!(report.failed.len(), 9);
        assert_eq!(driver.exporter.calls().len(), 10, "nothing runs after the trip");
        assert_eq!(driver.ledger().read_all().await.unwrap().len(), 9);
    }

    #[tokio::test]
    async fn existing_outputs_are_skipped_without_calling_the_exporter() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("2010-02.xml"), "done").unwrap();
        let driver = BatchDriver::new(Scripted::new(dir.path(), &[]), config(dir.path()));

        let report = driver.run(m(2010, 1), m(2010, 3)).await.unwrap();

        assert_eq!(report.stop, BatchStop::Completed);
        assert_eq!(report.skipped, vec![m(2010, 2)]);
        assert_eq!(driver.exporter.calls(), vec![m(2010, 1), m(2010, 3)]);
        assert!(!driver.ledger().path().exists());
    }

    #[tokio::test]
    async fn months_run_in_ascending_order_across_years() {
        let dir = TempDir::new().unwrap();
        let driver = BatchDriver::new(Scripted::new(dir.path(), &[]), config(dir.path()));

        driver.run(m(2006, 11), m(2007, 2)).await.unwrap();

        assert_eq!(
            driver.exporter.calls(),
            vec![m(2006, 11), m(2006, 12), m(2007, 1), m(2007, 2)]
        );
    }

    #[tokio::test]
    async fn failures_below_threshold_complete_with_ledger_rows() {
        let dir = TempDir::new().unwrap();
        let script = [true, false, true, false];
        let driver = BatchDriver::new(Scripted::new(dir.path(), &script), config(dir.path()));

        let report = driver.run(m(2011, 1), m(2011, 4)).await.unwrap();

        assert_eq!(report.exit_code(), 0);
        let rows = driver.ledger().read_all().await.unwrap();
        assert_eq!(
            rows.iter().map(|r| r.month).collect::<Vec<_>>(),
            vec![m(2011, 2), m(2011, 4)]
        );
        assert!(rows.iter().all(|r| r.reason == "not_authenticated"));
    }

    struct AlwaysErr;

    #[async_trait]
    impl MonthExporter for AlwaysErr {
        fn output_path(&self, _month: Month) -> PathBuf {
            PathBuf::from("/nonexistent/never.xml")
        }

        async fn export_month(&self, _month: Month) -> Result<ExportOutcome> {
            Err(Error::TransportExhausted {
                method: "GET".into(),
                url: "https://www.dreamwidth.org/export".into(),
                attempts: 6,
            })
        }
    }

    #[tokio::test]
    async fn errors_count_as_failures_and_record_their_code() {
        let dir = TempDir::new().unwrap();
        let mut cfg = config(dir.path());
        cfg.max_consecutive_failures = 2;
        let driver = BatchDriver::new(AlwaysErr, cfg);

        let report = driver.run(m(2012, 1), m(2012, 12)).await.unwrap();

        assert!(report.tripped());
        assert_eq!(report.failed, vec![m(2012, 1), m(2012, 2)]);
        let rows = driver.ledger().read_all().await.unwrap();
        assert!(rows.iter().all(|r| r.reason == "transport_exhausted"));
    }
}
