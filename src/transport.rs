//! Transport strategies: how a single URL is fetched and classified.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;

use crate::error::Error;

/// Fetched content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Textual content, saved through a data URL.
    Text(String),
    /// Binary content, saved by reference.
    Binary(Bytes),
}

impl Payload {
    /// Returns the payload size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(bytes) => bytes.len(),
        }
    }

    /// Returns true if the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Why a fetch failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The server answered with a status other than 200.
    Http,
    /// No usable response was received.
    Transport,
    /// A 200 response carried no content.
    EmptyPayload,
}

/// Result of one fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// HTTP 200 with content.
    Success {
        payload: Payload,
        /// URL the content was finally served from, after redirects.
        effective_url: String,
    },
    /// Anything else.
    Failure {
        kind: FailureKind,
        effective_url: Option<String>,
        status: Option<u16>,
        reason: Option<String>,
    },
}

impl FetchOutcome {
    /// Returns true for [`FetchOutcome::Success`].
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Fetches one URL at a time.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issues a single GET for `url` and classifies the result.
    async fn fetch(&self, url: &str) -> FetchOutcome;
}

/// The available transport strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StrategyKind {
    /// Text only; binary content does not survive the round trip.
    TextFetch,
    /// Binary on success, text otherwise.
    BlobFetch,
    /// Binary request saved by reference.
    #[default]
    DirectBinary,
}

impl StrategyKind {
    /// All strategies.
    pub const ALL: [Self; 3] = [Self::TextFetch, Self::BlobFetch, Self::DirectBinary];

    /// Returns the configuration name of the strategy.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::TextFetch => "text",
            Self::BlobFetch => "blob",
            Self::DirectBinary => "direct",
        }
    }

    /// Returns true if the strategy runs on the helper client.
    #[must_use]
    pub const fn needs_helper(self) -> bool {
        matches!(self, Self::TextFetch | Self::BlobFetch)
    }

    /// Builds the transport for this strategy on top of `client`.
    #[must_use]
    pub fn transport(self, client: reqwest::Client) -> Box<dyn Transport> {
        match self {
            Self::TextFetch => Box::new(TextFetch::new(client)),
            Self::BlobFetch => Box::new(BlobFetch::new(client)),
            Self::DirectBinary => Box::new(DirectBinary::new(client)),
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StrategyKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::UnsupportedStrategy(s.to_string()))
    }
}

/// Short name of a transport error, used as the failure reason.
fn transport_error_kind(e: &reqwest::Error) -> &'static str {
    if e.is_timeout() {
        "timeout"
    } else if e.is_connect() {
        "connect"
    } else if e.is_redirect() {
        "redirect"
    } else if e.is_body() {
        "body"
    } else if e.is_decode() {
        "decode"
    } else if e.is_builder() {
        "builder"
    } else if e.is_request() {
        "request"
    } else {
        "error"
    }
}

fn transport_failure(url: &str, e: &reqwest::Error) -> FetchOutcome {
    log::debug!("Transport error for {url}: {e}");
    FetchOutcome::Failure {
        kind: FailureKind::Transport,
        effective_url: e.url().map(ToString::to_string),
        status: e.status().map(|s| s.as_u16()),
        reason: Some(transport_error_kind(e).to_string()),
    }
}

/// Drains the body of a non-200 response and classifies it.
async fn http_failure(response: reqwest::Response) -> FetchOutcome {
    let effective_url = response.url().to_string();
    let status = response.status();
    let drained = response.bytes().await.map_or(0, |b| b.len());
    log::debug!("{effective_url} answered {status} ({drained} bytes)");
    FetchOutcome::Failure {
        kind: FailureKind::Http,
        effective_url: Some(effective_url),
        status: Some(status.as_u16()),
        reason: None,
    }
}

fn empty_payload(effective_url: String) -> FetchOutcome {
    FetchOutcome::Failure {
        kind: FailureKind::EmptyPayload,
        effective_url: Some(effective_url),
        status: None,
        reason: Some("empty response body".to_string()),
    }
}

/// Retrieves textual content only.
#[derive(Debug, Clone)]
pub struct TextFetch {
    client: reqwest::Client,
}

impl TextFetch {
    /// Creates the strategy on top of `client`.
    #[must_use]
    pub const fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for TextFetch {
    async fn fetch(&self, url: &str) -> FetchOutcome {
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => return transport_failure(url, &e),
        };
        if response.status() != StatusCode::OK {
            return http_failure(response).await;
        }

        let effective_url = response.url().to_string();
        match response.text().await {
            Ok(text) if text.is_empty() => empty_payload(effective_url),
            Ok(text) => FetchOutcome::Success {
                payload: Payload::Text(text),
                effective_url,
            },
            Err(e) => transport_failure(url, &e),
        }
    }
}

/// Retrieves binary content when the server answers 200, text otherwise.
#[derive(Debug, Clone)]
pub struct BlobFetch {
    client: reqwest::Client,
}

impl BlobFetch {
    /// Creates the strategy on top of `client`.
    #[must_use]
    pub const fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for BlobFetch {
    async fn fetch(&self, url: &str) -> FetchOutcome {
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => return transport_failure(url, &e),
        };
        if response.status() != StatusCode::OK {
            return http_failure(response).await;
        }

        let effective_url = response.url().to_string();
        match response.bytes().await {
            Ok(bytes) if bytes.is_empty() => empty_payload(effective_url),
            Ok(bytes) => FetchOutcome::Success {
                payload: Payload::Binary(bytes),
                effective_url,
            },
            Err(e) => transport_failure(url, &e),
        }
    }
}

/// Issues a binary request and hands the body over untouched.
#[derive(Debug, Clone)]
pub struct DirectBinary {
    client: reqwest::Client,
}

impl DirectBinary {
    /// Creates the strategy on top of `client`.
    #[must_use]
    pub const fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for DirectBinary {
    async fn fetch(&self, url: &str) -> FetchOutcome {
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => return transport_failure(url, &e),
        };
        if response.status() != StatusCode::OK {
            return http_failure(response).await;
        }

        let effective_url = response.url().to_string();
        match response.bytes().await {
            Ok(bytes) => FetchOutcome::Success {
                payload: Payload::Binary(bytes),
                effective_url,
            },
            Err(e) => transport_failure(url, &e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_names_round_trip() {
        for kind in StrategyKind::ALL {
            assert_eq!(kind.name().parse::<StrategyKind>().unwrap(), kind);
        }
        assert_eq!("  Blob ".parse::<StrategyKind>().unwrap(), StrategyKind::BlobFetch);
    }

    #[test]
    fn unknown_strategy() {
        assert!(matches!(
            "ajax".parse::<StrategyKind>(),
            Err(Error::UnsupportedStrategy(name)) if name == "ajax"
        ));
    }

    #[test]
    fn helper_requirements() {
        assert!(StrategyKind::TextFetch.needs_helper());
        assert!(StrategyKind::BlobFetch.needs_helper());
        assert!(!StrategyKind::DirectBinary.needs_helper());
        assert_eq!(StrategyKind::default(), StrategyKind::DirectBinary);
    }

    #[test]
    fn payload_len() {
        assert_eq!(Payload::Text("héllo".into()).len(), 6);
        assert!(Payload::Binary(Bytes::new()).is_empty());
    }

    #[tokio::test]
    async fn direct_success_keeps_bytes() {
        let mut server = mockito::Server::new_async().await;
        let _ok = server
            .mock("GET", "/200.txt")
            .with_status(200)
            .with_body("0123456789")
            .create_async()
            .await;

        let url = format!("{}/200.txt", server.url());
        let outcome = DirectBinary::new(reqwest::Client::new()).fetch(&url).await;
        assert_eq!(
            outcome,
            FetchOutcome::Success {
                payload: Payload::Binary(Bytes::from_static(b"0123456789")),
                effective_url: url,
            }
        );
    }

    #[tokio::test]
    async fn direct_non_200_is_failure() {
        let mut server = mockito::Server::new_async().await;
        let _missing = server
            .mock("GET", "/missing.txt")
            .with_status(404)
            .with_body("not here")
            .create_async()
            .await;
        let _created = server
            .mock("GET", "/created")
            .with_status(201)
            .with_body("made")
            .create_async()
            .await;

        let transport = DirectBinary::new(reqwest::Client::new());
        let url = format!("{}/missing.txt", server.url());
        assert_eq!(
            transport.fetch(&url).await,
            FetchOutcome::Failure {
                kind: FailureKind::Http,
                effective_url: Some(url),
                status: Some(404),
                reason: None,
            }
        );

        let created = transport.fetch(&format!("{}/created", server.url())).await;
        assert!(matches!(
            created,
            FetchOutcome::Failure { status: Some(201), .. }
        ));
    }

    #[tokio::test]
    async fn direct_empty_body_still_succeeds() {
        let mut server = mockito::Server::new_async().await;
        let _empty = server
            .mock("GET", "/empty")
            .with_status(200)
            .create_async()
            .await;

        let url = format!("{}/empty", server.url());
        let outcome = DirectBinary::new(reqwest::Client::new()).fetch(&url).await;
        assert!(outcome.is_success());
    }

    #[tokio::test]
    async fn redirect_reports_effective_url() {
        let mut server = mockito::Server::new_async().await;
        let _old = server
            .mock("GET", "/old")
            .with_status(302)
            .with_header("location", "/files/new.bin")
            .create_async()
            .await;
        let _new = server
            .mock("GET", "/files/new.bin")
            .with_status(200)
            .with_body("data")
            .create_async()
            .await;

        let outcome = DirectBinary::new(reqwest::Client::new())
            .fetch(&format!("{}/old", server.url()))
            .await;
        let FetchOutcome::Success { effective_url, .. } = outcome else {
            panic!("expected success, got {outcome:?}");
        };
        assert_eq!(effective_url, format!("{}/files/new.bin", server.url()));
    }

    #[tokio::test]
    async fn connection_refused_is_transport_failure() {
        let outcome = DirectBinary::new(reqwest::Client::new())
            .fetch("http://127.0.0.1:1/file.bin")
            .await;
        assert!(matches!(
            outcome,
            FetchOutcome::Failure {
                kind: FailureKind::Transport,
                status: None,
                reason: Some(ref reason),
                ..
            } if reason == "connect"
        ));
    }

    #[tokio::test]
    async fn malformed_url_is_transport_failure() {
        let outcome = TextFetch::new(reqwest::Client::new())
            .fetch("index.html")
            .await;
        assert!(matches!(
            outcome,
            FetchOutcome::Failure {
                kind: FailureKind::Transport,
                status: None,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn text_fetch_returns_text() {
        let mut server = mockito::Server::new_async().await;
        let _page = server
            .mock("GET", "/page.html")
            .with_status(200)
            .with_header("content-type", "text/html; charset=utf-8")
            .with_body("<p>hej</p>")
            .create_async()
            .await;

        let outcome = TextFetch::new(reqwest::Client::new())
            .fetch(&format!("{}/page.html", server.url()))
            .await;
        assert!(matches!(
            outcome,
            FetchOutcome::Success { payload: Payload::Text(ref t), .. } if t == "<p>hej</p>"
        ));
    }

    #[tokio::test]
    async fn empty_payload_is_failure_for_text_and_blob() {
        let mut server = mockito::Server::new_async().await;
        let _empty = server
            .mock("GET", "/empty")
            .with_status(200)
            .expect(2)
            .create_async()
            .await;
        let url = format!("{}/empty", server.url());

        for transport in [
            StrategyKind::TextFetch.transport(reqwest::Client::new()),
            StrategyKind::BlobFetch.transport(reqwest::Client::new()),
        ] {
            let outcome = transport.fetch(&url).await;
            assert!(matches!(
                outcome,
                FetchOutcome::Failure {
                    kind: FailureKind::EmptyPayload,
                    status: None,
                    ..
                }
            ));
        }
    }

    #[tokio::test]
    async fn blob_fetch_error_status() {
        let mut server = mockito::Server::new_async().await;
        let _broken = server
            .mock("GET", "/broken")
            .with_status(500)
            .with_body("Internal error")
            .create_async()
            .await;

        let outcome = BlobFetch::new(reqwest::Client::new())
            .fetch(&format!("{}/broken", server.url()))
            .await;
        assert!(matches!(
            outcome,
            FetchOutcome::Failure {
                kind: FailureKind::Http,
                status: Some(500),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn blob_fetch_returns_binary() {
        let mut server = mockito::Server::new_async().await;
        let _blob = server
            .mock("GET", "/blob.bin")
            .with_status(200)
            .with_header("content-type", "application/octet-stream")
            .with_body([0u8, 159, 146, 150])
            .create_async()
            .await;

        let url = format!("{}/blob.bin", server.url());
        let outcome = BlobFetch::new(reqwest::Client::new()).fetch(&url).await;
        assert_eq!(
            outcome,
            FetchOutcome::Success {
                payload: Payload::Binary(Bytes::from_static(&[0, 159, 146, 150])),
                effective_url: url,
            }
        );
    }

    #[tokio::test]
    async fn text_fetch_non_200_is_failure() {
        let mut server = mockito::Server::new_async().await;
        let _missing = server
            .mock("GET", "/missing.html")
            .with_status(404)
            .with_body("<h1>Not Found</h1>")
            .create_async()
            .await;

        let url = format!("{}/missing.html", server.url());
        let outcome = TextFetch::new(reqwest::Client::new()).fetch(&url).await;
        assert_eq!(
            outcome,
            FetchOutcome::Failure {
                kind: FailureKind::Http,
                effective_url: Some(url),
                status: Some(404),
                reason: None,
            }
        );
    }

    #[tokio::test]
    async fn helper_strategies_report_transport_errors() {
        for kind in [StrategyKind::TextFetch, StrategyKind::BlobFetch] {
            let outcome = kind
                .transport(reqwest::Client::new())
                .fetch("http://127.0.0.1:1/file.bin")
                .await;
            assert!(
                matches!(
                    outcome,
                    FetchOutcome::Failure {
                        kind: FailureKind::Transport,
                        status: None,
                        reason: Some(ref reason),
                        ..
                    } if reason == "connect"
                ),
                "{kind}: {outcome:?}"
            );
        }
    }
}
