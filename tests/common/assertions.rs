//! Custom assertions for exported files and ledgers

use dw_export::{FailureLedger, Month};
use std::path::Path;

/// Months recorded in the failure ledger, in file order
pub async fn ledger_months(path: &Path) -> Vec<Month> {
    FailureLedger::new(path)
        .read_all()
        .await
        .expect("Failed to read ledger")
        .into_iter()
        .map(|r| r.month)
        .collect()
}

/// Assert that `path` holds the export for `month`
pub fn assert_exported(path: &Path, month: Month) {
    let body = std::fs::read_to_string(path)
        .unwrap_or_else(|e| panic!("missing export {}: {e}", path.display()));
    assert!(body.starts_with("<?xml"), "not an XML export: {}", path.display());
    assert!(
        body.contains(&format!("Hello from {month}")),
        "export at {} is not for {month}",
        path.display()
    );
}

/// Number of files in a directory (0 when it does not exist)
pub fn file_count(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}
