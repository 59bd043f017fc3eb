//! Failure diagnostics
//!
//! When a month fails in a way a human needs to look at, the raw response body
//! and a metadata block are dumped side by side. File names carry the stage so
//! failures at different stages of the same month never overwrite each other.

use crate::error::Result;
use crate::transport::HttpResponse;
use crate::types::Month;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::error;

/// Where in the export flow a failure was captured
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Export page fetch ended on a login page
    GetExportRedirect,
    /// Export page fetch returned a non-200 status
    GetExportBadStatus,
    /// Export page could not be turned into a payload
    GetExportParseFail,
    /// Submission returned something other than the export
    PostExportNotXml,
}

impl Stage {
    /// Stable name used in file names
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::GetExportRedirect => "get_export_redirect",
            Stage::GetExportBadStatus => "get_export_badstatus",
            Stage::GetExportParseFail => "get_export_parsefail",
            Stage::PostExportNotXml => "post_export_notxml",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Paths of one body/metadata pair
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DebugArtifacts {
    /// Raw response body
    pub body: PathBuf,
    /// Request/response metadata
    pub meta: PathBuf,
}

/// File paths for a stage and month
pub fn artifact_paths(debug_dir: &Path, stage: Stage, month: Month, content_type: &str) -> DebugArtifacts {
    let ext = if content_type.to_lowercase().contains("xml") {
        "xml"
    } else {
        "html"
    };
    DebugArtifacts {
        body: debug_dir.join(format!("{stage}_{month}_body.{ext}")),
        meta: debug_dir.join(format!("{stage}_{month}_meta.txt")),
    }
}

/// Metadata block: stage, URLs, status, and every response header
pub fn render_metadata(stage: Stage, response: &HttpResponse) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "stage: {stage}");
    let _ = writeln!(out, "request_url: {}", response.request_url);
    let _ = writeln!(out, "final_url: {}", response.final_url);
    let _ = writeln!(out, "status_code: {}", response.status.as_u16());
    let _ = writeln!(out, "content_type: {}", response.content_type());
    out.push_str("---- response headers ----");
    for (name, value) in &response.headers {
        let value = String::from_utf8_lossy(value.as_bytes());
        let _ = write!(out, "\n{name}: {value}");
    }
    out
}

/// Write the body and metadata for a failed stage
pub async fn write_debug_artifacts(
    debug_dir: &Path,
    month: Month,
    stage: Stage,
    response: &HttpResponse,
) -> Result<DebugArtifacts> {
    tokio::fs::create_dir_all(debug_dir).await?;
    let paths = artifact_paths(debug_dir, stage, month, response.content_type());

    tokio::fs::write(&paths.body, &response.body).await?;
    tokio::fs::write(&paths.meta, render_metadata(stage, response)).await?;

    error!(path = %paths.body.display(), "Wrote debug body");
    error!(path = %paths.meta.display(), "Wrote debug meta");
    Ok(paths)
}
