//! # dw-export
//!
//! Month-by-month export of a Dreamwidth journal to the site's XML format.
//!
//! The site only offers its export one month at a time, through an HTML form
//! behind a logged-in session. This crate drives that form the way a browser
//! would: it reuses cookies from a real browser session, finds the export form
//! on the page, fills in year, month and the XML format, and writes each
//! month's response to disk.
//!
//! ## Design
//!
//! - **Polite** - one request at a time, with randomized pauses between
//!   requests and between months
//! - **Resumable** - a month whose file exists is never fetched again
//! - **Fail-fast** - consecutive failures stop a batch before the server is
//!   hammered with a stale session
//! - **Inspectable** - every failure leaves the raw response and its headers
//!   on disk
//!
//! ## Quick Start
//!
//! ```no_run
//! use dw_export::{BatchDriver, Config, CookieSource, Exporter, Month, Transport};
//! use dw_export::session::bootstrap;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let cookies = CookieSource::File("cookies.txt".into());
//!
//!     let client = bootstrap(&cookies, &config.site, config.retry.request_timeout).await?;
//!     let transport = Transport::new(client, config.retry.clone());
//!     let exporter = Exporter::new(transport, config.site.clone(), config.export.clone());
//!
//!     let driver = BatchDriver::new(exporter, config.batch.clone());
//!     let report = driver.run(Month::new(2006, 12)?, Month::current_utc()).await?;
//!     println!("exported {} months", report.exported.len());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Batch driver with circuit breaker
pub mod batch;
/// Response classification
pub mod classify;
/// Configuration types
pub mod config;
/// Failure diagnostics
pub mod diagnostics;
/// Error types
pub mod error;
/// Single-month export session
pub mod export;
/// Export form discovery
pub mod form;
/// Content-addressed image fetching
pub mod images;
/// Append-only failure ledger
pub mod ledger;
/// Form payload construction
pub mod payload;
/// Cookie session bootstrap
pub mod session;
/// Retrying HTTP transport
pub mod transport;
/// Core types
pub mod types;

// Re-export commonly used types
pub use batch::{BatchDriver, BatchReport, BatchStop};
pub use config::{BatchConfig, Config, ExportConfig, ImageConfig, PauseRange, RetryPolicy, SiteConfig};
pub use error::{Error, Result};
pub use export::{Exporter, MonthExporter};
pub use ledger::{FailureLedger, FailureRecord};
pub use session::{CookieSet, CookieSource};
pub use transport::{HttpResponse, Transport};
pub use types::{ExportOutcome, Month};
