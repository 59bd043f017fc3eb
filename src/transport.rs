//! Retrying HTTP transport with exponential backoff
//!
//! Every request to the remote site goes through [`Transport::execute`]. A
//! request is retried when the server answers 429 or a 5xx gateway status, or
//! when the connection itself fails transiently. Any other status, including
//! 403 and 404, is handed straight back to the caller: deciding whether a body
//! is usable is the classifier's job, not this layer's.
//!
//! After each `execute` call returns, successful or not, a randomized pacing
//! delay keeps the request cadence irregular.

use crate::config::RetryPolicy;
use crate::error::{Error, Result};
use rand::Rng;
use reqwest::header::{CONTENT_TYPE, HeaderMap};
use reqwest::{Method, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};

/// Statuses that indicate a busy or briefly broken server
const RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (timeouts, refused or reset connections) should return `true`.
/// Permanent failures (bad URL, configuration, parse errors) should return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the request should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Network(e) => {
                e.is_timeout() || e.is_connect() || e.is_request() || e.is_body() || e.is_decode()
            }
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::Interrupted
            ),
            Error::Config { .. }
            | Error::CookieFileNotFound(_)
            | Error::NoCookiesForDomain { .. }
            | Error::TransportExhausted { .. }
            | Error::NoFormFound
            | Error::Parse(_)
            | Error::InvalidUrl(_)
            | Error::ConfigFile(_) => false,
        }
    }
}

/// Whether an HTTP status should be retried
pub fn is_retryable_status(status: u16) -> bool {
    RETRYABLE_STATUSES.contains(&status)
}

/// A fully read HTTP response
///
/// The body is buffered so the response can be classified, written to disk,
/// and dumped for diagnostics without holding a connection open.
#[derive(Clone, Debug)]
pub struct HttpResponse {
    /// URL the request was sent to
    pub request_url: String,
    /// URL after following redirects
    pub final_url: String,
    /// HTTP status
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Raw body
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Body decoded as UTF-8, invalid sequences replaced
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// The Content-Type header, or "" when absent or not valid text
    pub fn content_type(&self) -> &str {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
    }

    async fn read(request_url: &str, response: reqwest::Response) -> Result<Self> {
        let final_url = response.url().to_string();
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();
        Ok(Self {
            request_url: request_url.to_string(),
            final_url,
            status,
            headers,
            body,
        })
    }
}

/// HTTP transport that retries transient failures
#[derive(Clone, Debug)]
pub struct Transport {
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl Transport {
    /// Wrap an (authenticated) client with a retry policy
    pub fn new(client: reqwest::Client, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    /// The retry policy in use
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Send one request, retrying up to `policy.max_retries` attempts in total
    ///
    /// `form`, when given, is sent as an `application/x-www-form-urlencoded` body.
    pub async fn execute(
        &self,
        method: Method,
        url: &str,
        form: Option<&[(String, String)]>,
    ) -> Result<HttpResponse> {
        let result = self.execute_with_retries(&method, url, form).await;
        jitter_sleep(&self.policy).await;
        result
    }

    async fn execute_with_retries(
        &self,
        method: &Method,
        url: &str,
        form: Option<&[(String, String)]>,
    ) -> Result<HttpResponse> {
        let max = self.policy.max_retries;

        for attempt in 1..=max {
            let mut request = self.client.request(method.clone(), url);
            if let Some(fields) = form {
                request = request.form(fields);
            }

            let outcome = match request.send().await {
                Ok(response) => HttpResponse::read(url, response).await,
                Err(e) => Err(Error::Network(e)),
            };

            match outcome {
                Ok(response) if is_retryable_status(response.status.as_u16()) => {
                    let delay = backoff_delay(&self.policy, attempt);
                    warn!(
                        status = response.status.as_u16(),
                        method = %method,
                        url,
                        attempt,
                        max_attempts = max,
                        delay_ms = delay.as_millis(),
                        "Retryable HTTP status, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Ok(response) => {
                    if attempt > 1 {
                        debug!(attempts = attempt, url, "Request succeeded after retry");
                    }
                    return Ok(response);
                }
                Err(e) if e.is_retryable() => {
                    let delay = backoff_delay(&self.policy, attempt);
                    warn!(
                        error = %e,
                        method = %method,
                        url,
                        attempt,
                        max_attempts = max,
                        delay_ms = delay.as_millis(),
                        "Request failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    warn!(error = %e, method = %method, url, "Request failed with non-retryable error");
                    return Err(e);
                }
            }
        }

        Err(Error::TransportExhausted {
            method: method.to_string(),
            url: url.to_string(),
            attempts: max,
        })
    }
}

/// Backoff before retrying after failed attempt `attempt` (1-indexed)
///
/// `backoff_base^attempt` seconds plus uniform jitter in `[0, backoff_jitter]`.
pub fn backoff_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let base = policy.backoff_base.powi(exponent);
    let base = Duration::try_from_secs_f64(base).unwrap_or(Duration::MAX);
    base.saturating_add(uniform_duration(Duration::ZERO, policy.backoff_jitter))
}

/// Uniformly random duration in `[min, max]`; `min` when the range is empty
pub fn uniform_duration(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    let secs = rand::thread_rng().gen_range(min.as_secs_f64()..=max.as_secs_f64());
    Duration::from_secs_f64(secs)
}

/// Short randomized pause between requests
pub async fn jitter_sleep(policy: &RetryPolicy) {
    let delay = uniform_duration(policy.min_delay, policy.max_delay);
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}
