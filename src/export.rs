//! Single-month export session
//!
//! One call to [`Exporter::export_month`] walks the export flow for one month:
//!
//! 1. GET the export page (scoped to a journal when configured)
//! 2. bail out with diagnostics if the session bounced to a login page or the
//!    status is not 200
//! 3. locate the export form, build its payload, set year/month, force XML
//! 4. POST the payload
//! 5. bail out with diagnostics unless the response looks like the export
//! 6. write the body verbatim to the month's output file
//!
//! Retries happen per request inside the transport; the flow itself is never
//! retried.

use crate::classify::{is_authenticated, looks_like_structured_export};
use crate::config::{ExportConfig, SiteConfig};
use crate::diagnostics::{Stage, write_debug_artifacts};
use crate::error::Result;
use crate::form::locate_export_form;
use crate::payload::{
    FormSpec, FormatCoercion, apply_month, force_output_format_xml, guess_year_month_field_names,
};
use crate::transport::{HttpResponse, Transport};
use crate::types::{ExportOutcome, Month};
use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use url::Url;

/// Characters of a mismatching response printed with `print_snippet`
const SNIPPET_CHARS: usize = 2000;

/// Something that can export one month
///
/// The batch driver only needs this seam, which keeps it testable without a
/// server.
#[async_trait]
pub trait MonthExporter: Send + Sync {
    /// Where the month's export lives once written
    fn output_path(&self, month: Month) -> PathBuf;

    /// Run the export for one month
    async fn export_month(&self, month: Month) -> Result<ExportOutcome>;
}

/// Output file for a month: `dw_export_{journal|default}_{YYYY-MM}.xml`
pub fn output_path(output_dir: &Path, journal: Option<&str>, month: Month) -> PathBuf {
    let name = journal.filter(|j| !j.is_empty()).unwrap_or("default");
    output_dir.join(format!("dw_export_{name}_{month}.xml"))
}

/// Write through a `.part` file and rename, so a crash never leaves a
/// truncated file where a finished export is expected
pub async fn write_atomically(path: &Path, bytes: &[u8]) -> Result<u64> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".part");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(bytes.len() as u64)
}

/// Framed leading text of a rejected response, for `print_snippet`
pub fn response_snippet(text: &str) -> String {
    let head: String = text.chars().take(SNIPPET_CHARS).collect();
    format!("\n--- response snippet (first {SNIPPET_CHARS} chars) ---\n\n{head}\n\n--- end snippet ---\n")
}

/// Payload ready to submit
#[derive(Clone, Debug)]
pub struct Submission {
    /// Resolved POST target
    pub url: Url,
    /// Form fields
    pub form: FormSpec,
    /// Whether the XML format was selected
    pub format: FormatCoercion,
}

/// Turn the export page into a submission for `month`
///
/// The form action is resolved against `base_url`; an empty action lands on
/// the site root.
pub fn prepare_submission(base_url: &Url, html: &str, month: Month) -> Result<Submission> {
    let form = locate_export_form(html)?;
    let mut spec = FormSpec::from_form(&form);

    let names = guess_year_month_field_names(&form);
    apply_month(&mut spec.fields, &names, month);
    let format = force_output_format_xml(&form, &mut spec.fields);

    let url = base_url.join(spec.action.trim())?;

    Ok(Submission {
        url,
        form: spec,
        format,
    })
}

/// Exports months from the remote site
#[derive(Clone, Debug)]
pub struct Exporter {
    transport: Transport,
    site: SiteConfig,
    config: ExportConfig,
}

impl Exporter {
    /// Create an exporter over an authenticated transport
    pub fn new(transport: Transport, site: SiteConfig, config: ExportConfig) -> Self {
        Self {
            transport,
            site,
            config,
        }
    }

    /// Export page URL, with `?journal=` when a journal is configured
    pub fn export_url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.site.base_url)?.join(&self.site.export_path)?;
        if let Some(journal) = self.config.journal.as_deref().filter(|j| !j.is_empty()) {
            url.query_pairs_mut().append_pair("journal", journal);
        }
        Ok(url)
    }

    async fn capture(&self, month: Month, stage: Stage, response: &HttpResponse) {
        if let Err(e) = write_debug_artifacts(&self.config.debug_dir, month, stage, response).await {
            warn!(error = %e, stage = %stage, "Failed to write debug artifacts");
        }
    }

    async fn run(&self, month: Month) -> Result<ExportOutcome> {
        let base_url = Url::parse(&self.site.base_url)?;
        let export_url = self.export_url()?;

        info!(month = %month, "Fetching export page");
        let page = self
            .transport
            .execute(Method::GET, export_url.as_str(), None)
            .await?;

        if !is_authenticated(&page) {
            self.capture(month, Stage::GetExportRedirect, &page).await;
            error!(final_url = %page.final_url, "Not authenticated (redirected to login); re-export cookies");
            return Ok(ExportOutcome::NotAuthenticated);
        }

        if page.status != StatusCode::OK {
            self.capture(month, Stage::GetExportBadStatus, &page).await;
            error!(status = page.status.as_u16(), "Export page returned unexpected status");
            return Ok(ExportOutcome::BadStatus(page.status.as_u16()));
        }

        let submission = match prepare_submission(&base_url, &page.text(), month) {
            Ok(submission) => submission,
            Err(e) => {
                self.capture(month, Stage::GetExportParseFail, &page).await;
                error!(error = %e, "Could not build export request from page");
                return Ok(ExportOutcome::ParseFailure(e.to_string()));
            }
        };

        debug!(url = %submission.url, "POST url");
        debug!(
            keys = ?submission.form.fields.keys().collect::<Vec<_>>(),
            "POST payload keys"
        );

        info!(month = %month, "Requesting export");
        let pairs = submission.form.pairs();
        let response = self
            .transport
            .execute(Method::POST, submission.url.as_str(), Some(pairs.as_slice()))
            .await?;

        if !looks_like_structured_export(&response) {
            self.capture(month, Stage::PostExportNotXml, &response).await;
            if self.config.print_snippet {
                println!("{}", response_snippet(&response.text()));
            }
            error!(
                status = response.status.as_u16(),
                content_type = response.content_type(),
                "Response does not look like an XML export"
            );
            return Ok(ExportOutcome::FormatMismatch);
        }

        let path = MonthExporter::output_path(self, month);
        let bytes_written = write_atomically(&path, &response.body).await?;
        info!(path = %path.display(), bytes = bytes_written, "Saved export");
        Ok(ExportOutcome::Success {
            bytes_written,
            path,
        })
    }
}

#[async_trait]
impl MonthExporter for Exporter {
    fn output_path(&self, month: Month) -> PathBuf {
        output_path(&self.config.output_dir, self.config.journal.as_deref(), month)
    }

    async fn export_month(&self, month: Month) -> Result<ExportOutcome> {
        let result = self.run(month).await;
        if let Err(e) = &result {
            error!(month = %month, error = %e, code = e.code(), "Export failed");
        }
        result
    }
}
