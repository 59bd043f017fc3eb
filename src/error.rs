//! Error types for dw-export
//!
//! Every failure the exporter can hit is one variant of [`Error`]. Per-month
//! failures (transport exhaustion, parse failures, I/O) are surfaced to the
//! batch driver as values and recorded in the failure ledger; only
//! configuration errors are fatal to a run.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for dw-export operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for dw-export
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key or flag that caused the error (e.g., "cookie_file")
        key: Option<String>,
    },

    /// Cookie file does not exist
    #[error("cookie file not found: {}", .0.display())]
    CookieFileNotFound(PathBuf),

    /// Cookie file exists but holds nothing for the authentication domain
    #[error("no cookies for domain containing '{domain}' found in {}", path.display())]
    NoCookiesForDomain {
        /// Domain substring that was searched for
        domain: String,
        /// The cookie file that was read
        path: PathBuf,
    },

    /// A request kept failing with retryable errors until the retry budget ran out
    #[error("failed after {attempts} attempts: {method} {url}")]
    TransportExhausted {
        /// HTTP method of the request
        method: String,
        /// Request URL
        url: String,
        /// Number of attempts made
        attempts: u32,
    },

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The export page contained no `<form>` element
    #[error("no <form> found on export page; are you logged in?")]
    NoFormFound,

    /// Export page markup did not match expectations
    #[error("parse error: {0}")]
    Parse(String),

    /// A URL could not be built or resolved
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Configuration file could not be parsed
    #[error("invalid configuration file: {0}")]
    ConfigFile(#[from] toml::de::Error),
}

impl Error {
    /// Shorthand for a configuration error tied to a key
    pub fn config(message: impl Into<String>, key: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// Machine-readable error code
    ///
    /// Written to the failure ledger as the reason column, so codes must stay
    /// stable and must not contain commas.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::CookieFileNotFound(_) => "cookie_file_not_found",
            Error::NoCookiesForDomain { .. } => "no_cookies_for_domain",
            Error::TransportExhausted { .. } => "transport_exhausted",
            Error::Network(_) => "network_error",
            Error::Io(_) => "io_error",
            Error::NoFormFound => "no_form_found",
            Error::Parse(_) => "parse_error",
            Error::InvalidUrl(_) => "invalid_url",
            Error::ConfigFile(_) => "config_file_error",
        }
    }

    /// Whether this error means the operator has to fix the inputs before anything can run
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::Config { .. }
                | Error::CookieFileNotFound(_)
                | Error::NoCookiesForDomain { .. }
                | Error::ConfigFile(_)
        )
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn all_error_variants() -> Vec<(Error, &'static str, bool)> {
        vec![
            (Error::config("bad value", "max_retries"), "config_error", true),
            (
                Error::CookieFileNotFound(PathBuf::from("/tmp/cookies.txt")),
                "cookie_file_not_found",
                true,
            ),
            (
                Error::NoCookiesForDomain {
                    domain: "dreamwidth.org".into(),
                    path: PathBuf::from("/tmp/cookies.txt"),
                },
                "no_cookies_for_domain",
                true,
            ),
            (
                Error::TransportExhausted {
                    method: "GET".into(),
                    url: "https://example.com/export".into(),
                    attempts: 6,
                },
                "transport_exhausted",
                false,
            ),
            (
                Error::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone")),
                "io_error",
                false,
            ),
            (Error::NoFormFound, "no_form_found", false),
            (Error::Parse("bad selector".into()), "parse_error", false),
            (
                Error::InvalidUrl(url::Url::parse("not a url").unwrap_err()),
                "invalid_url",
                false,
            ),
            (
                Error::ConfigFile(toml::from_str::<toml::Value>("= broken").unwrap_err()),
                "config_file_error",
                true,
            ),
        ]
    }

    #[test]
    fn every_variant_has_expected_code_and_class() {
        for (err, code, is_config) in all_error_variants() {
            assert_eq!(err.code(), code, "code mismatch for {err}");
            assert_eq!(
                err.is_configuration(),
                is_config,
                "configuration class mismatch for {err}"
            );
        }
    }

    #[test]
    fn codes_are_ledger_safe() {
        for (err, _, _) in all_error_variants() {
            assert!(!err.code().contains(','), "{} contains a comma", err.code());
        }
    }

    #[test]
    fn transport_exhausted_message_names_method_and_url() {
        let err = Error::TransportExhausted {
            method: "POST".into(),
            url: "https://www.dreamwidth.org/export_do".into(),
            attempts: 6,
        };
        assert_eq!(
            err.to_string(),
            "failed after 6 attempts: POST https://www.dreamwidth.org/export_do"
        );
    }

    #[test]
    fn config_helper_sets_key() {
        match Error::config("must be positive", "backoff_base") {
            Error::Config { message, key } => {
                assert_eq!(message, "must be positive");
                assert_eq!(key.as_deref(), Some("backoff_base"));
            }
            other => panic!("expected Config, got {other:?}"),
        }
    }
}
