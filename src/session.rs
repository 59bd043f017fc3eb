//! Cookie-based session bootstrap
//!
//! The export page is only reachable with a logged-in browser session. Cookies
//! come either from a Netscape `cookies.txt` export or from a raw `Cookie:`
//! header copied out of browser devtools. Exactly one source must be given.

use crate::config::SiteConfig;
use crate::error::{Error, Result};
use reqwest::cookie::Jar;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Where the session cookies come from
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CookieSource {
    /// Netscape-format cookie file
    File(PathBuf),
    /// Raw `Cookie:` header value
    Header(String),
}

impl CookieSource {
    /// Pick the cookie source from the two mutually exclusive options
    pub fn from_options(file: Option<PathBuf>, header: Option<String>) -> Result<Self> {
        match (file, header) {
            (Some(file), None) => Ok(CookieSource::File(file)),
            (None, Some(header)) => Ok(CookieSource::Header(header)),
            (None, None) => Err(Error::config(
                "you must supply a cookie file or a cookie header",
                "cookies",
            )),
            (Some(_), Some(_)) => Err(Error::config(
                "supply either a cookie file or a cookie header, not both",
                "cookies",
            )),
        }
    }
}

/// Session cookies for one authentication domain
///
/// Built once per run and read-only afterwards.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CookieSet {
    cookies: BTreeMap<String, String>,
}

impl CookieSet {
    /// Number of cookies
    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    /// Whether no cookies were found
    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    /// Look up a cookie value by name
    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    /// Iterate `(name, value)` pairs in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.cookies.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Load cookies from the given source
    pub async fn load(source: &CookieSource, domain: &str) -> Result<Self> {
        match source {
            CookieSource::File(path) => load_netscape_cookie_file(path, domain).await,
            CookieSource::Header(header) => Ok(parse_cookie_header(header)),
        }
    }
}

impl FromIterator<(String, String)> for CookieSet {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            cookies: iter.into_iter().collect(),
        }
    }
}

/// Parse a raw `Cookie:` header
///
/// Segments without `=` are skipped; later duplicates win.
pub fn parse_cookie_header(header: &str) -> CookieSet {
    header
        .split(';')
        .map(str::trim)
        .filter_map(|part| part.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .filter(|(k, _)| !k.is_empty())
        .collect()
}

/// Read a Netscape `cookies.txt` file, keeping lines whose domain contains `domain`
///
/// Columns: domain, include-subdomains, path, secure, expiry, name, value.
pub async fn load_netscape_cookie_file(path: &Path, domain: &str) -> Result<CookieSet> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::CookieFileNotFound(path.to_path_buf()));
        }
        Err(e) => return Err(e.into()),
    };
    let text = String::from_utf8_lossy(&bytes);

    let cookies: CookieSet = text
        .lines()
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let fields: Vec<&str> = line.split('\t').collect();
            (fields.len() >= 7 && fields[0].contains(domain))
                .then(|| (fields[5].to_string(), fields[6].to_string()))
        })
        .collect();

    if cookies.is_empty() {
        return Err(Error::NoCookiesForDomain {
            domain: domain.to_string(),
            path: path.to_path_buf(),
        });
    }
    Ok(cookies)
}

/// Build the reusable HTTP client carrying the session cookies
///
/// Cookies are scoped to the site's base URL host so redirects elsewhere never
/// receive them.
pub fn build_client(
    cookies: &CookieSet,
    site: &SiteConfig,
    timeout: Duration,
) -> Result<reqwest::Client> {
    let base = url::Url::parse(&site.base_url)?;
    let jar = Arc::new(Jar::default());
    for (name, value) in cookies.iter() {
        jar.add_cookie_str(&format!("{name}={value}; Path=/"), &base);
    }

    let mut headers = HeaderMap::new();
    let accept = HeaderValue::from_str(&site.accept)
        .map_err(|e| Error::config(format!("invalid Accept header: {e}"), "site.accept"))?;
    headers.insert(ACCEPT, accept);

    let client = reqwest::Client::builder()
        .user_agent(site.user_agent.as_str())
        .default_headers(headers)
        .cookie_provider(jar)
        .timeout(timeout)
        .build()?;
    Ok(client)
}

/// Load cookies and build the authenticated client in one step
pub async fn bootstrap(
    source: &CookieSource,
    site: &SiteConfig,
    timeout: Duration,
) -> Result<reqwest::Client> {
    let cookies = CookieSet::load(source, &site.cookie_domain).await?;
    match source {
        CookieSource::File(path) => {
            info!(path = %path.display(), count = cookies.len(), "Loaded cookies from file")
        }
        CookieSource::Header(_) => {
            info!(count = cookies.len(), "Loaded cookies from header")
        }
    }
    build_client(&cookies, site, timeout)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const COOKIES_TXT: &str = "# Netscape HTTP Cookie File\n\
        \n\
        .dreamwidth.org\tTRUE\t/\tTRUE\t0\tljloggedin\tu1:s2\n\
        www.dreamwidth.org\tFALSE\t/\tFALSE\t0\tljmastersession\tv1:abc\n\
        .example.com\tTRUE\t/\tFALSE\t0\ttracker\tnope\n\
        .dreamwidth.org\tTRUE\t/\tFALSE\t0\tshort\n";

    #[test]
    fn header_parsing_trims_and_skips_malformed_segments() {
        let cookies = parse_cookie_header(" a = 1 ; junk ;b=two=2;; =empty ; c=");
        assert_eq!(cookies.get("a"), Some("1"));
        assert_eq!(cookies.get("b"), Some("two=2"), "split only on the first '='");
        assert_eq!(cookies.get("c"), Some(""));
        assert_eq!(cookies.get("junk"), None);
        assert_eq!(cookies.len(), 3);
    }

    #[tokio::test]
    async fn cookie_file_keeps_only_matching_domain_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cookies.txt");
        fs::write(&path, COOKIES_TXT).unwrap();

        let cookies = load_netscape_cookie_file(&path, "dreamwidth.org").await.unwrap();
        assert_eq!(cookies.len(), 2);
        assert_eq!(cookies.get("ljloggedin"), Some("u1:s2"));
        assert_eq!(cookies.get("ljmastersession"), Some("v1:abc"));
        assert_eq!(cookies.get("tracker"), None);
        assert_eq!(cookies.get("short"), None, "lines with < 7 fields are ignored");
    }

    #[tokio::test]
    async fn missing_cookie_file_is_not_found() {
        let err = load_netscape_cookie_file(Path::new("/nonexistent/cookies.txt"), "x")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CookieFileNotFound(_)));
    }

    #[tokio::test]
    async fn cookie_file_without_domain_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cookies.txt");
        fs::write(&path, COOKIES_TXT).unwrap();

        let err = load_netscape_cookie_file(&path, "livejournal.com").await.unwrap_err();
        match err {
            Error::NoCookiesForDomain { domain, .. } => assert_eq!(domain, "livejournal.com"),
            other => panic!("expected NoCookiesForDomain, got {other:?}"),
        }
    }

    #[test]
    fn source_requires_exactly_one_option() {
        assert!(matches!(
            CookieSource::from_options(None, None),
            Err(Error::Config { .. })
        ));
        assert!(matches!(
            CookieSource::from_options(Some("a".into()), Some("b=1".into())),
            Err(Error::Config { .. })
        ));
        assert_eq!(
            CookieSource::from_options(None, Some("b=1".into())).unwrap(),
            CookieSource::Header("b=1".into())
        );
    }

    #[tokio::test]
    async fn client_sends_cookies_user_agent_and_accept() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/export"))
            .and(header("cookie", "ljsession=abc"))
            .and(header("user-agent", "dw-export-test/1.0"))
            .and(header("accept", "text/html"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let site = SiteConfig {
            base_url: server.uri(),
            user_agent: "dw-export-test/1.0".into(),
            accept: "text/html".into(),
            ..Default::default()
        };
        let client = bootstrap(
            &CookieSource::Header("ljsession=abc".into()),
            &site,
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        let resp = client
            .get(format!("{}/export", server.uri()))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
    }
}
