//! Content-addressed image fetching
//!
//! Downloads every unique URL in a newline-delimited list into
//! `image_dir/<hash[..2]>/<hash><ext>`, where `hash` is the SHA-256 of the URL.
//! Existing files are skipped, so reruns only fetch what is missing. Failed
//! URLs go to a separate ledger as `timestampUTC,url,reason`.

use crate::batch::polite_pause;
use crate::config::ImageConfig;
use crate::error::{Error, Result};
use crate::ledger::{append_line, format_timestamp};
use chrono::Utc;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{error, info, warn};

/// Longest file extension kept from a URL, dot included
const MAX_EXTENSION_CHARS: usize = 5;

/// Extension used when the URL has none worth keeping
const FALLBACK_EXTENSION: &str = ".bin";

/// Hex SHA-256 of a URL
pub fn url_hash(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Extension (with dot) taken from the URL path, or `.bin`
pub fn url_extension(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| {
            Path::new(u.path())
                .extension()
                .map(|ext| format!(".{}", ext.to_string_lossy()))
        })
        .filter(|ext| ext.chars().count() <= MAX_EXTENSION_CHARS)
        .unwrap_or_else(|| FALLBACK_EXTENSION.to_string())
}

/// Destination of a URL inside `image_dir`
pub fn url_to_path(image_dir: &Path, url: &str) -> PathBuf {
    let hash = url_hash(url);
    image_dir
        .join(&hash[..2])
        .join(format!("{hash}{}", url_extension(url)))
}

/// Read the URL list: trimmed, blank lines dropped, first occurrence kept
pub async fn read_url_list(path: &Path) -> Result<Vec<String>> {
    let text = match tokio::fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::config(
                format!("{} not found", path.display()),
                "images.url_list",
            ));
        }
        Err(e) => return Err(e.into()),
    };
    let mut seen = HashSet::new();
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| seen.insert(line.to_string()))
        .map(str::to_string)
        .collect())
}

/// Counts from one image run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ImageReport {
    /// Images downloaded in this run
    pub stored: usize,
    /// URLs whose file already existed
    pub skipped: usize,
    /// URLs that failed
    pub failed: usize,
}

/// Result of fetching one URL
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FetchResult {
    /// File written
    Stored(u64),
    /// Destination already existed
    Skipped,
    /// Ledger reason, `request_error:<msg>` or `http_<code>`
    Failed(String),
}

/// Downloads images one at a time with polite pauses
pub struct ImageFetcher {
    client: reqwest::Client,
    config: ImageConfig,
}

impl ImageFetcher {
    /// Build a fetcher with its own client (no cookies)
    pub fn new(config: ImageConfig, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .default_headers(headers)
            .timeout(timeout)
            .build()?;
        Ok(Self { client, config })
    }

    /// Fetch one URL into its content-addressed path
    ///
    /// Request failures come back as [`FetchResult::Failed`]; only local
    /// filesystem errors are returned as `Err`.
    pub async fn fetch(&self, url: &str) -> Result<FetchResult> {
        let dest = url_to_path(&self.config.image_dir, url);
        if dest.exists() {
            return Ok(FetchResult::Skipped);
        }

        let mut response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => return Ok(FetchResult::Failed(format!("request_error:{e}"))),
        };
        if response.status() != StatusCode::OK {
            return Ok(FetchResult::Failed(format!(
                "http_{}",
                response.status().as_u16()
            )));
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut tmp = dest.as_os_str().to_owned();
        tmp.push(".part");
        let tmp = PathBuf::from(tmp);

        let mut file = tokio::fs::File::create(&tmp).await?;
        let mut written = 0u64;
        loop {
            match response.chunk().await {
                Ok(Some(chunk)) => {
                    file.write_all(&chunk).await?;
                    written += chunk.len() as u64;
                }
                Ok(None) => break,
                Err(e) => {
                    drop(file);
                    let _ = tokio::fs::remove_file(&tmp).await;
                    return Ok(FetchResult::Failed(format!("request_error:{e}")));
                }
            }
        }
        file.flush().await?;
        drop(file);
        tokio::fs::rename(&tmp, &dest).await?;
        Ok(FetchResult::Stored(written))
    }

    async fn record_failure(&self, url: &str, reason: &str) -> Result<()> {
        let line = format!("{},{url},{reason}", format_timestamp(Utc::now()));
        append_line(&self.config.failure_log, &line).await
    }

    /// Fetch every URL in order
    pub async fn run(&self, urls: &[String]) -> Result<ImageReport> {
        let mut report = ImageReport::default();
        let total = urls.len();
        info!(count = total, "Starting image download");

        for (idx, url) in urls.iter().enumerate() {
            let n = idx + 1;
            match self.fetch(url).await? {
                FetchResult::Skipped => {
                    info!(n, total, url = %url, "Skip (exists)");
                    report.skipped += 1;
                }
                FetchResult::Stored(bytes) => {
                    info!(n, total, url = %url, bytes, "Downloaded");
                    report.stored += 1;
                    polite_pause(self.config.normal_pause, "normal").await;
                }
                FetchResult::Failed(reason) => {
                    warn!(n, total, url = %url, reason = %reason, "Download failed");
                    if let Err(e) = self.record_failure(url, &reason).await {
                        error!(error = %e, path = %self.config.failure_log.display(), "Failed to record image failure");
                        return Err(e);
                    }
                    report.failed += 1;
                    polite_pause(self.config.failure_pause, "failure").await;
                }
            }
        }

        info!(
            success = report.stored,
            skipped = report.skipped,
            failures = report.failed,
            "Image download finished"
        );
        Ok(report)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PauseRange;
    use tempfile::TempDir;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(dir: &Path) -> ImageConfig {
        ImageConfig {
            url_list: dir.join("image_urls.txt"),
            image_dir: dir.join("dw_images"),
            failure_log: dir.join("image_failures.csv"),
            normal_pause: PauseRange::ZERO,
            failure_pause: PauseRange::ZERO,
            ..Default::default()
        }
    }

    #[test]
    fn path_is_sharded_by_hash_prefix() {
        let url = "https://pics.example.com/u/42/cat.JPG?size=large";
        let path = url_to_path(Path::new("img"), url);
        let hash = url_hash(url);

        assert_eq!(hash.len(), 64);
        assert_eq!(path, Path::new("img").join(&hash[..2]).join(format!("{hash}.JPG")));
        assert_eq!(path, url_to_path(Path::new("img"), url), "deterministic");
    }

    #[test]
    fn extension_rules() {
        assert_eq!(url_extension("https://x.org/a/b.png"), ".png");
        assert_eq!(url_extension("https://x.org/a/b.jpeg"), ".jpeg");
        assert_eq!(url_extension("https://x.org/a/b.tiff2"), ".bin", "six chars with the dot");
        assert_eq!(url_extension("https://x.org/a/image"), ".bin");
        assert_eq!(url_extension("https://x.org/"), ".bin");
        assert_eq!(url_extension("not a url"), ".bin");
    }

    #[tokio::test]
    async fn url_list_is_trimmed_and_deduplicated() {
        let dir = TempDir::new().unwrap();
        let list = dir.path().join("urls.txt");
        std::fs::write(&list, "  https://a/1.png\n\nhttps://b/2.gif\nhttps://a/1.png \n   \n").unwrap();

        assert_eq!(
            read_url_list(&list).await.unwrap(),
            vec!["https://a/1.png".to_string(), "https://b/2.gif".to_string()]
        );
    }

    #[tokio::test]
    async fn missing_url_list_is_a_configuration_error() {
        let err = read_url_list(Path::new("/definitely/not/here.txt"))
            .await
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn stores_skips_and_records_failures() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ok.gif"))
            .and(header("user-agent", "dw-image-archiver/1.0"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"GIF89a".to_vec()))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/gone.png"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/already.jpg"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let cfg = config(dir.path());
        let ok = format!("{}/ok.gif", server.uri());
        let gone = format!("{}/gone.png", server.uri());
        let already = format!("{}/already.jpg", server.uri());

        let existing = url_to_path(&cfg.image_dir, &already);
        std::fs::create_dir_all(existing.parent().unwrap()).unwrap();
        std::fs::write(&existing, "old").unwrap();

        let fetcher = ImageFetcher::new(cfg.clone(), Duration::from_secs(5)).unwrap();
        let report = fetcher
            .run(&[ok.clone(), gone.clone(), already.clone()])
            .await
            .unwrap();

        assert_eq!(
            report,
            ImageReport {
                stored: 1,
                skipped: 1,
                failed: 1
            }
        );
        assert_eq!(std::fs::read(url_to_path(&cfg.image_dir, &ok)).unwrap(), b"GIF89a");
        assert!(!url_to_path(&cfg.image_dir, &gone).exists());

        let ledger = std::fs::read_to_string(&cfg.failure_log).unwrap();
        let line = ledger.lines().next().unwrap();
        let (_, rest) = line.split_once(',').unwrap();
        assert_eq!(rest, format!("{gone},http_404"));
        assert_eq!(ledger.lines().count(), 1);
    }

    #[tokio::test]
    async fn connection_error_is_recorded_as_request_error() {
        let dir = TempDir::new().unwrap();
        let cfg = config(dir.path());
        let fetcher = ImageFetcher::new(cfg.clone(), Duration::from_secs(2)).unwrap();

        let result = fetcher.fetch("http://127.0.0.1:1/x.png").await.unwrap();

        match result {
            FetchResult::Failed(reason) => assert!(reason.starts_with("request_error:")),
            other => panic!("expected failure, got {other:?}"),
        }
    }
}
