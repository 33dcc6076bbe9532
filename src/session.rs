//! Authenticated session: the cookies that requests carry and the base URL
//! that relative entries are resolved against.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use reqwest::cookie::Jar;

use crate::config::SessionConfig;
use crate::error::{Error, Result};

/// Environment variable the binary reads extra `name=value; name2=value2`
/// cookies from.
pub const COOKIE_ENV: &str = "LOGGED_DL_COOKIE";

/// One line of a Netscape `cookies.txt` export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetscapeCookie {
    pub domain: String,
    pub include_subdomains: bool,
    pub path: String,
    pub secure: bool,
    pub name: String,
    pub value: String,
}

impl NetscapeCookie {
    fn host(&self) -> &str {
        self.domain.trim_start_matches('.')
    }

    /// Renders the cookie as a `Set-Cookie` value.
    fn set_cookie(&self) -> String {
        let mut s = format!("{}={}; Path={}", self.name, self.value, self.path);
        if self.include_subdomains {
            s.push_str("; Domain=");
            s.push_str(self.host());
        }
        if self.secure {
            s.push_str("; Secure");
        }
        s
    }

    /// URL the cookie is attributed to when added to the jar.
    fn origin(&self) -> Option<Url> {
        let scheme = if self.secure { "https" } else { "http" };
        Url::parse(&format!("{scheme}://{}{}", self.host(), self.path)).ok()
    }
}

/// Parses a Netscape `cookies.txt` file as exported by browsers.
///
/// Comment and blank lines are skipped, except for the `#HttpOnly_` prefix
/// which marks an ordinary cookie line. Malformed lines are ignored.
#[must_use]
pub fn parse_cookies_txt(contents: &str) -> Vec<NetscapeCookie> {
    contents
        .lines()
        .filter_map(|line| {
            let line = line.trim_end_matches('\r');
            let line = line.strip_prefix("#HttpOnly_").unwrap_or(line);
            if line.trim().is_empty() || line.starts_with('#') {
                return None;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            let &[domain, include_subdomains, path, secure, _expires, name, value] = fields.as_slice()
            else {
                log::debug!("Skipping malformed cookies.txt line");
                return None;
            };
            Some(NetscapeCookie {
                domain: domain.to_string(),
                include_subdomains: include_subdomains.eq_ignore_ascii_case("TRUE"),
                path: path.to_string(),
                secure: secure.eq_ignore_ascii_case("TRUE"),
                name: name.to_string(),
                value: value.to_string(),
            })
        })
        .collect()
}

/// The ambient session shared by every request of a run.
#[derive(Debug, Clone)]
pub struct Session {
    config: SessionConfig,
    base: Option<Url>,
    timeout: Option<Duration>,
}

impl Session {
    /// Creates a session from its configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the base URL does not parse, or if inline
    /// cookies are configured without a base URL to scope them to.
    pub fn new(config: SessionConfig, timeout: Option<Duration>) -> Result<Self> {
        let base = config
            .base_url
            .as_deref()
            .map(|b| {
                Url::parse(b).map_err(|e| Error::Config(format!("session.base_url {b:?}: {e}")))
            })
            .transpose()?;

        let session = Self {
            config,
            base,
            timeout,
        };
        if session.base.is_none() && !session.inline_cookies().is_empty() {
            return Err(Error::Config(
                "inline session cookies require session.base_url".to_string(),
            ));
        }
        Ok(session)
    }

    /// Returns the base URL, if configured.
    #[must_use]
    pub const fn base_url(&self) -> Option<&Url> {
        self.base.as_ref()
    }

    /// Resolves a URL entry against the base URL. Absolute entries, and all
    /// entries when no base is configured, are returned unchanged.
    #[must_use]
    pub fn resolve(&self, entry: &str) -> String {
        match &self.base {
            Some(base) => base
                .join(entry)
                .map_or_else(|_| entry.to_string(), String::from),
            None => entry.to_string(),
        }
    }

    /// Inline `name=value` cookies.
    #[must_use]
    pub fn inline_cookies(&self) -> Vec<String> {
        self.config
            .cookies
            .iter()
            .map(|c| c.trim())
            .filter(|c| c.contains('='))
            .map(String::from)
            .collect()
    }

    /// Builds a cookie jar from inline cookies and, optionally, the contents
    /// of a `cookies.txt` export.
    #[must_use]
    pub fn jar(&self, cookies_txt: Option<&str>) -> Arc<Jar> {
        let jar = Jar::default();
        if let Some(base) = &self.base {
            for cookie in self.inline_cookies() {
                jar.add_cookie_str(&cookie, base);
            }
        }
        if let Some(contents) = cookies_txt {
            let cookies = parse_cookies_txt(contents);
            log::info!("Imported {} cookie(s) from cookies file", cookies.len());
            for cookie in &cookies {
                if let Some(origin) = cookie.origin() {
                    jar.add_cookie_str(&cookie.set_cookie(), &origin);
                }
            }
        }
        Arc::new(jar)
    }

    /// Builds an HTTP client that sends the cookies in `jar`.
    ///
    /// # Errors
    ///
    /// Returns an error if the client cannot be constructed.
    pub fn client_with(&self, jar: Arc<Jar>) -> Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder().cookie_provider(jar);
        if let Some(agent) = &self.config.user_agent {
            builder = builder.user_agent(agent.clone());
        }
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        Ok(builder.build()?)
    }

    /// Builds a client with every configured cookie source.
    ///
    /// # Errors
    ///
    /// Returns an error if the cookies file cannot be read or the client
    /// cannot be constructed.
    pub async fn load_client(&self) -> Result<reqwest::Client> {
        let contents = match &self.config.cookies_file {
            Some(path) => Some(tokio::fs::read_to_string(path).await?),
            None => None,
        };
        self.client_with(self.jar(contents.as_deref()))
    }

    /// Builds a client carrying only the inline cookies.
    ///
    /// # Errors
    ///
    /// Returns an error if the client cannot be constructed.
    pub fn build_inline_client(&self) -> Result<reqwest::Client> {
        self.client_with(self.jar(None))
    }
}
