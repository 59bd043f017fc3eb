//! Response classification
//!
//! The server does not reliably set status codes or content types, so both
//! checks here are heuristics over the final URL and the start of the body.

use crate::transport::HttpResponse;

/// Query fragment the site appends when bouncing to the login page
pub const RETURN_TO_EXPORT_MARKER: &str = "returnto=/export";

/// Characters of the body inspected for export markers
const SNIFF_CHARS: usize = 5000;

/// Lowercased markers of the structured export's root elements
const EXPORT_MARKERS: [&str; 5] = ["<?xml", "<livejournal", "<lj:livejournal", "<event", "<entry"];

/// False when the request ended up on a login page
///
/// Status is ignored: a login page is served with 200.
pub fn is_authenticated(response: &HttpResponse) -> bool {
    let url = response.final_url.to_lowercase();
    !(url.contains(RETURN_TO_EXPORT_MARKER) || url.contains("login"))
}

/// Whether the response is plausibly the structured (XML) export
pub fn looks_like_structured_export(response: &HttpResponse) -> bool {
    if response.content_type().to_lowercase().contains("xml") {
        return true;
    }
    let text = response.text();
    let head: String = text
        .trim_start()
        .chars()
        .take(SNIFF_CHARS)
        .collect::<String>()
        .to_lowercase();
    EXPORT_MARKERS.iter().any(|m| head.contains(m))
}
