//! Configuration types for dw-export
//!
//! Every component receives its slice of [`Config`] explicitly. All fields have
//! defaults, so an empty TOML file (or no file at all) yields a working setup
//! against dreamwidth.org.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Retry and pacing policy shared by every request
///
/// Backoff for retry attempt `n` (1-indexed) is `backoff_base^n` seconds plus
/// a uniform jitter in `[0, backoff_jitter]`. It is not capped.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Lower bound of the pacing delay after every request (default: 0.8s)
    #[serde(default = "default_min_delay", with = "secs_f64_serde")]
    pub min_delay: Duration,

    /// Upper bound of the pacing delay after every request (default: 2.0s)
    #[serde(default = "default_max_delay", with = "secs_f64_serde")]
    pub max_delay: Duration,

    /// Total attempts per request before giving up (default: 6)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base of the exponential backoff, in seconds (default: 1.6)
    #[serde(default = "default_backoff_base")]
    pub backoff_base: f64,

    /// Upper bound of the random jitter added to each backoff (default: 0.4s)
    #[serde(default = "default_backoff_jitter", with = "secs_f64_serde")]
    pub backoff_jitter: Duration,

    /// Per-request timeout (default: 30s)
    #[serde(default = "default_request_timeout", with = "secs_f64_serde")]
    pub request_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            min_delay: default_min_delay(),
            max_delay: default_max_delay(),
            max_retries: default_max_retries(),
            backoff_base: default_backoff_base(),
            backoff_jitter: default_backoff_jitter(),
            request_timeout: default_request_timeout(),
        }
    }
}

/// Inclusive range for a randomized pause
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PauseRange {
    /// Shortest pause
    #[serde(with = "secs_f64_serde")]
    pub min: Duration,
    /// Longest pause
    #[serde(with = "secs_f64_serde")]
    pub max: Duration,
}

impl PauseRange {
    /// Range from whole seconds
    pub const fn from_secs(min: u64, max: u64) -> Self {
        Self {
            min: Duration::from_secs(min),
            max: Duration::from_secs(max),
        }
    }

    /// A range that never sleeps
    pub const ZERO: PauseRange = PauseRange {
        min: Duration::ZERO,
        max: Duration::ZERO,
    };

    fn check(&self, key: &str) -> Result<()> {
        if self.min > self.max {
            return Err(Error::config(
                format!("{key}: min ({:?}) exceeds max ({:?})", self.min, self.max),
                key,
            ));
        }
        Ok(())
    }
}

/// Remote site settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Site root; form actions are resolved against it (default: "https://www.dreamwidth.org")
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Path of the export page (default: "/export")
    #[serde(default = "default_export_path")]
    pub export_path: String,

    /// Substring a cookie-file domain column must contain (default: "dreamwidth.org")
    #[serde(default = "default_cookie_domain")]
    pub cookie_domain: String,

    /// User-Agent sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Accept header sent with every request
    #[serde(default = "default_accept")]
    pub accept: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            export_path: default_export_path(),
            cookie_domain: default_cookie_domain(),
            user_agent: default_user_agent(),
            accept: default_accept(),
        }
    }
}

/// Per-month export settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Directory for exported months (default: "dw_exports")
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Directory for failure diagnostics (default: "dw_debug")
    #[serde(default = "default_debug_dir")]
    pub debug_dir: PathBuf,

    /// Journal or community to export (None = the logged-in account)
    #[serde(default)]
    pub journal: Option<String>,

    /// Print the start of a non-export response to stdout
    #[serde(default)]
    pub print_snippet: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            debug_dir: default_debug_dir(),
            journal: None,
            print_snippet: false,
        }
    }
}

/// Batch driver settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Append-only ledger of failed months (default: "failed_months.csv")
    #[serde(default = "default_failure_log")]
    pub failure_log: PathBuf,

    /// Consecutive failures that abort the run (default: 5)
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,

    /// Pause after a successful month (default: 5-10s)
    #[serde(default = "default_normal_pause")]
    pub normal_pause: PauseRange,

    /// Pause after a failed month (default: 30-60s)
    #[serde(default = "default_grumpy_pause")]
    pub grumpy_pause: PauseRange,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            failure_log: default_failure_log(),
            max_consecutive_failures: default_max_consecutive_failures(),
            normal_pause: default_normal_pause(),
            grumpy_pause: default_grumpy_pause(),
        }
    }
}

/// Image fetch settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImageConfig {
    /// Newline-delimited list of image URLs (default: "image_urls.txt")
    #[serde(default = "default_url_list")]
    pub url_list: PathBuf,

    /// Root of the content-addressed store (default: "dw_images")
    #[serde(default = "default_image_dir")]
    pub image_dir: PathBuf,

    /// Append-only ledger of failed URLs (default: "image_failures.csv")
    #[serde(default = "default_image_failure_log")]
    pub failure_log: PathBuf,

    /// Pause after a stored image (default: 1-3s)
    #[serde(default = "default_image_normal_pause")]
    pub normal_pause: PauseRange,

    /// Pause after a failed fetch (default: 10-20s)
    #[serde(default = "default_image_failure_pause")]
    pub failure_pause: PauseRange,

    /// User-Agent for image requests
    #[serde(default = "default_image_user_agent")]
    pub user_agent: String,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            url_list: default_url_list(),
            image_dir: default_image_dir(),
            failure_log: default_image_failure_log(),
            normal_pause: default_image_normal_pause(),
            failure_pause: default_image_failure_pause(),
            user_agent: default_image_user_agent(),
        }
    }
}

/// Main configuration
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Retry and pacing policy
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Remote site settings
    #[serde(default)]
    pub site: SiteConfig,

    /// Per-month export settings
    #[serde(default)]
    pub export: ExportConfig,

    /// Batch driver settings
    #[serde(default)]
    pub batch: BatchConfig,

    /// Image fetch settings
    #[serde(default)]
    pub images: ImageConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("failed to read config file '{}': {}", path.display(), e),
            key: None,
        })?;
        Self::from_toml_str(&text)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would panic or make no sense at runtime
    pub fn validate(&self) -> Result<()> {
        let retry = &self.retry;
        if retry.max_retries == 0 {
            return Err(Error::config(
                "max_retries must be at least 1",
                "retry.max_retries",
            ));
        }
        if !(retry.backoff_base.is_finite() && retry.backoff_base > 0.0) {
            return Err(Error::config(
                format!("backoff_base must be positive, got {}", retry.backoff_base),
                "retry.backoff_base",
            ));
        }
        PauseRange {
            min: retry.min_delay,
            max: retry.max_delay,
        }
        .check("retry.min_delay")?;

        if url::Url::parse(&self.site.base_url).is_err() {
            return Err(Error::config(
                format!("base_url '{}' is not an absolute URL", self.site.base_url),
                "site.base_url",
            ));
        }

        if self.batch.max_consecutive_failures == 0 {
            return Err(Error::config(
                "max_consecutive_failures must be at least 1",
                "batch.max_consecutive_failures",
            ));
        }
        self.batch.normal_pause.check("batch.normal_pause")?;
        self.batch.grumpy_pause.check("batch.grumpy_pause")?;
        self.images.normal_pause.check("images.normal_pause")?;
        self.images.failure_pause.check("images.failure_pause")?;
        Ok(())
    }
}

fn default_min_delay() -> Duration {
    Duration::from_millis(800)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(2)
}

fn default_max_retries() -> u32 {
    6
}

fn default_backoff_base() -> f64 {
    1.6
}

fn default_backoff_jitter() -> Duration {
    Duration::from_millis(400)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_base_url() -> String {
    "https://www.dreamwidth.org".into()
}

fn default_export_path() -> String {
    "/export".into()
}

fn default_cookie_domain() -> String {
    "dreamwidth.org".into()
}

fn default_user_agent() -> String {
    concat!("dw-export/", env!("CARGO_PKG_VERSION")).into()
}

fn default_accept() -> String {
    "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8".into()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("dw_exports")
}

fn default_debug_dir() -> PathBuf {
    PathBuf::from("dw_debug")
}

fn default_failure_log() -> PathBuf {
    PathBuf::from("failed_months.csv")
}

fn default_max_consecutive_failures() -> u32 {
    5
}

fn default_normal_pause() -> PauseRange {
    PauseRange::from_secs(5, 10)
}

fn default_grumpy_pause() -> PauseRange {
    PauseRange::from_secs(30, 60)
}

fn default_url_list() -> PathBuf {
    PathBuf::from("image_urls.txt")
}

fn default_image_dir() -> PathBuf {
    PathBuf::from("dw_images")
}

fn default_image_failure_log() -> PathBuf {
    PathBuf::from("image_failures.csv")
}

fn default_image_normal_pause() -> PauseRange {
    PauseRange::from_secs(1, 3)
}

fn default_image_failure_pause() -> PauseRange {
    PauseRange::from_secs(10, 20)
}

fn default_image_user_agent() -> String {
    "dw-image-archiver/1.0".into()
}

// Durations as fractional seconds
mod secs_f64_serde {
    use serde::{Deserialize, Deserializer, Serializer, de};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(de::Error::custom)
    }
}
