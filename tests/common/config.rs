//! Test configuration helpers for building exporters against a mock server

use super::fixtures::SESSION_COOKIE;
use dw_export::session::bootstrap;
use dw_export::{Config, CookieSource, Exporter, PauseRange, Transport};
use std::path::Path;
use std::time::Duration;
use wiremock::MockServer;

/// Configuration pointed at `server` with every delay disabled
///
/// All output (exports, diagnostics, ledgers) lands under `dir`.
pub fn fast_config(server: &MockServer, dir: &Path) -> Config {
    let mut config = Config::default();

    config.retry.min_delay = Duration::ZERO;
    config.retry.max_delay = Duration::ZERO;
    config.retry.max_retries = 2;
    config.retry.backoff_base = 0.001;
    config.retry.backoff_jitter = Duration::ZERO;
    config.retry.request_timeout = Duration::from_secs(5);

    config.site.base_url = server.uri();

    config.export.output_dir = dir.join("dw_exports");
    config.export.debug_dir = dir.join("dw_debug");

    config.batch.failure_log = dir.join("failed_months.csv");
    config.batch.normal_pause = PauseRange::ZERO;
    config.batch.grumpy_pause = PauseRange::ZERO;

    config
}

/// Exporter with the mock session cookie
pub async fn create_exporter(config: &Config) -> Exporter {
    let source = CookieSource::Header(SESSION_COOKIE.to_string());
    let client = bootstrap(&source, &config.site, config.retry.request_timeout)
        .await
        .expect("Failed to bootstrap session");
    let transport = Transport::new(client, config.retry.clone());
    Exporter::new(transport, config.site.clone(), config.export.clone())
}
