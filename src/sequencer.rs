//! The download sequencer: one URL at a time, in input order.

use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::bootstrap::{BootstrapOutcome, Bootstrapper, HelperHost};
use crate::config::BootstrapConfig;
use crate::error::{Error, Result};
use crate::filename::derive_file_name;
use crate::save::SaveTrigger;
use crate::shell::ProgressSurface;
use crate::transport::{FetchOutcome, StrategyKind, Transport};

/// One failed URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    /// Effective URL, or the requested one when no response URL is known.
    pub url: String,
    /// HTTP status, if a response was received.
    pub status: Option<u16>,
    /// Status text or transport error description.
    pub status_text: Option<String>,
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}  =>  ", self.url)?;
        let text = self.status_text.as_deref().filter(|t| !t.is_empty());
        match (self.status, text) {
            (Some(status), Some(text)) => write!(f, "{status}: {text}"),
            (Some(status), None) => write!(f, "{status}"),
            (None, Some(text)) => f.write_str(text),
            (None, None) => Ok(()),
        }
    }
}

/// Summary of a finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    pub succeeded: usize,
    pub failed: usize,
    /// Failures in the order they occurred.
    pub errors: Vec<ErrorRecord>,
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Download complete.\nOk: {}.\nErrors: {}.",
            self.succeeded, self.failed
        )?;
        if !self.errors.is_empty() {
            f.write_str("\nError URL(s):")?;
            for error in &self.errors {
                write!(f, "\n{error}")?;
            }
        }
        Ok(())
    }
}

/// State of one download invocation.
#[derive(Debug, Clone)]
pub struct Run {
    urls: Vec<String>,
    index: usize,
    succeeded: usize,
    failed: usize,
    errors: Vec<ErrorRecord>,
    cancelled: bool,
}

impl Run {
    /// Creates a run over `urls`, dropping blank entries.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyInput`] if no URL is left.
    pub fn new<I, S>(urls: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let urls: Vec<String> = urls
            .into_iter()
            .map(|u| u.as_ref().trim().to_string())
            .filter(|u| !u.is_empty())
            .collect();
        if urls.is_empty() {
            return Err(Error::EmptyInput);
        }
        Ok(Self {
            urls,
            index: 0,
            succeeded: 0,
            failed: 0,
            errors: Vec::new(),
            cancelled: false,
        })
    }

    #[must_use]
    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.urls.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub const fn succeeded(&self) -> usize {
        self.succeeded
    }

    #[must_use]
    pub const fn failed(&self) -> usize {
        self.failed
    }

    #[must_use]
    pub fn errors(&self) -> &[ErrorRecord] {
        &self.errors
    }

    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Returns true once every URL has an outcome or the run was cancelled.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.cancelled || self.index >= self.urls.len()
    }

    /// Returns the URL to fetch next.
    #[must_use]
    pub fn current(&self) -> Option<&str> {
        if self.cancelled {
            return None;
        }
        self.urls.get(self.index).map(String::as_str)
    }

    fn record_success(&mut self) {
        self.succeeded += 1;
        self.index += 1;
    }

    fn record_failure(&mut self, record: ErrorRecord) {
        self.failed += 1;
        self.index += 1;
        self.errors.push(record);
    }

    fn cancel(&mut self) {
        self.cancelled = true;
    }

    /// Builds the report for the outcomes recorded so far.
    #[must_use]
    pub fn report(&self) -> Report {
        Report {
            succeeded: self.succeeded,
            failed: self.failed,
            errors: self.errors.clone(),
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every URL has an outcome.
    Completed(Report),
    /// The user cancelled before every URL was processed.
    Cancelled {
        processed: usize,
        total: usize,
        report: Report,
    },
}

/// Drives runs: bootstraps the helper when the strategy needs it, then
/// fetches, classifies and saves each URL in turn.
pub struct Sequencer {
    strategy: StrategyKind,
    client: reqwest::Client,
    helper: Arc<dyn HelperHost>,
    bootstrapper: Bootstrapper,
    saver: SaveTrigger,
}

impl Sequencer {
    /// Creates a sequencer.
    ///
    /// `client` serves the strategies that need no helper; `helper` provides
    /// the client for the others.
    #[must_use]
    pub fn new(
        strategy: StrategyKind,
        client: reqwest::Client,
        helper: Arc<dyn HelperHost>,
        bootstrap: BootstrapConfig,
        saver: SaveTrigger,
    ) -> Self {
        Self {
            strategy,
            client,
            helper,
            bootstrapper: Bootstrapper::new(bootstrap),
            saver,
        }
    }

    /// Returns the configured strategy.
    #[must_use]
    pub const fn strategy(&self) -> StrategyKind {
        self.strategy
    }

    /// Downloads `urls` in order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyInput`] when no URL is left after blank entries
    /// are removed, [`Error::Cancelled`] when the user cancels while the
    /// helper is loading, and [`Error::HelperUnavailable`] when the helper
    /// never becomes available. Per-URL failures are part of the report.
    pub async fn run<I, S>(
        &mut self,
        urls: I,
        surface: &dyn ProgressSurface,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut run = Run::new(urls)?;
        log::info!(
            "Starting run of {} URL(s) with the {} strategy",
            run.len(),
            self.strategy
        );
        surface.set_status("Starting:");

        let transport = self.transport(surface, cancel).await?;
        Ok(self.drive(&mut run, transport.as_ref(), surface, cancel).await)
    }

    async fn transport(
        &mut self,
        surface: &dyn ProgressSurface,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn Transport>> {
        if !self.strategy.needs_helper() {
            return Ok(self.strategy.transport(self.client.clone()));
        }
        match self
            .bootstrapper
            .ensure_ready(self.helper.as_ref(), cancel, surface)
            .await
        {
            BootstrapOutcome::Ready(client) => Ok(self.strategy.transport(client)),
            BootstrapOutcome::Cancelled => Err(Error::Cancelled),
            BootstrapOutcome::GaveUp { attempts } => Err(Error::HelperUnavailable { attempts }),
        }
    }

    /// Advances `run` until it is complete or cancelled.
    ///
    /// Exactly one fetch is outstanding at a time. Cancellation is checked
    /// before each fetch and never interrupts one in flight.
    pub async fn drive(
        &self,
        run: &mut Run,
        transport: &dyn Transport,
        surface: &dyn ProgressSurface,
        cancel: &CancellationToken,
    ) -> RunOutcome {
        loop {
            if cancel.is_cancelled() {
                run.cancel();
                log::info!("Run cancelled after {} of {} URL(s)", run.index(), run.len());
                return RunOutcome::Cancelled {
                    processed: run.index(),
                    total: run.len(),
                    report: run.report(),
                };
            }

            let Some(url) = run.current().map(str::to_owned) else {
                let report = run.report();
                log::info!("Ok: {}. Errors: {}.", report.succeeded, report.failed);
                return RunOutcome::Completed(report);
            };

            surface.set_status(&format!("Downloading {} of {}", run.index() + 1, run.len()));
            log::debug!("Fetching {url}");

            match transport.fetch(&url).await {
                FetchOutcome::Success {
                    payload,
                    effective_url,
                } => {
                    run.record_success();
                    let name = derive_file_name(&effective_url);
                    log::debug!("{effective_url}: {} bytes as {name}", payload.len());
                    self.saver.save_to_disk(payload, &name).await;
                }
                FetchOutcome::Failure {
                    kind,
                    effective_url,
                    status,
                    reason,
                } => {
                    let record = ErrorRecord {
                        url: effective_url.filter(|u| !u.is_empty()).unwrap_or(url),
                        status,
                        status_text: reason,
                    };
                    log::warn!("Error ({kind:?}) for {record}");
                    run.record_failure(record);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use bytes::Bytes;

    use crate::save::{SaveRef, Saver};
    use crate::transport::{FailureKind, Payload};

    /// Serves scripted outcomes and records every request.
    #[derive(Default)]
    struct ScriptedTransport {
        outcomes: HashMap<String, FetchOutcome>,
        requests: Mutex<Vec<String>>,
        cancel_on: Option<(String, CancellationToken)>,
    }

    impl ScriptedTransport {
        fn ok(mut self, url: &str, body: &'static [u8]) -> Self {
            self.outcomes.insert(
                url.to_string(),
                FetchOutcome::Success {
                    payload: Payload::Binary(Bytes::from_static(body)),
                    effective_url: url.to_string(),
                },
            );
            self
        }

        fn status(mut self, url: &str, status: u16) -> Self {
            self.outcomes.insert(
                url.to_string(),
                FetchOutcome::Failure {
                    kind: FailureKind::Http,
                    effective_url: Some(url.to_string()),
                    status: Some(status),
                    reason: None,
                },
            );
            self
        }

        fn requests(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn fetch(&self, url: &str) -> FetchOutcome {
            self.requests.lock().unwrap().push(url.to_string());
            if let Some((trigger, token)) = &self.cancel_on
                && trigger == url
            {
                token.cancel();
            }
            self.outcomes
                .get(url)
                .cloned()
                .unwrap_or_else(|| FetchOutcome::Failure {
                    kind: FailureKind::Transport,
                    effective_url: None,
                    status: None,
                    reason: Some("error".to_string()),
                })
        }
    }

    /// Keeps saved files in memory.
    #[derive(Default)]
    struct MemorySaver {
        saved: Mutex<Vec<(String, Bytes)>>,
    }

    #[async_trait]
    impl Saver for MemorySaver {
        async fn activate(&self, reference: &SaveRef, suggested_name: &str) -> Result<PathBuf> {
            let bytes = reference.resolve().unwrap();
            self.saved
                .lock()
                .unwrap()
                .push((suggested_name.to_string(), bytes));
            Ok(PathBuf::from(suggested_name))
        }
    }

    #[derive(Default)]
    struct Statuses(Mutex<Vec<String>>);

    impl ProgressSurface for Statuses {
        fn set_status(&self, status: &str) {
            self.0.lock().unwrap().push(status.to_string());
        }
    }

    /// A helper host that never provides a client.
    struct AbsentHelper;

    impl HelperHost for AbsentHelper {
        fn probe(&self, _fallback: bool) -> Option<reqwest::Client> {
            None
        }
        fn request_load(&self) {}
        fn activate_fallback(&self) {}
    }

    fn sequencer(strategy: StrategyKind, saver: Arc<MemorySaver>) -> Sequencer {
        Sequencer::new(
            strategy,
            reqwest::Client::new(),
            Arc::new(AbsentHelper),
            BootstrapConfig {
                poll_interval_ms: 1,
                fallback_threshold: 2,
                give_up_threshold: 5,
            },
            SaveTrigger::new(saver),
        )
    }

    #[test]
    fn run_strips_blank_entries() {
        let run = Run::new(["", "  a  ", "\r", "b", ""]).unwrap();
        assert_eq!(run.urls(), ["a".to_string(), "b".to_string()]);
        assert_eq!(run.index(), 0);
        assert!(!run.is_complete());
    }

    #[test]
    fn run_rejects_only_blank_input() {
        assert!(matches!(Run::new(["", " ", "\n"]), Err(Error::EmptyInput)));
        assert!(matches!(Run::new(Vec::<String>::new()), Err(Error::EmptyInput)));
    }

    #[test]
    fn report_without_errors() {
        let report = Report {
            succeeded: 3,
            failed: 0,
            errors: vec![],
        };
        assert_eq!(report.to_string(), "Download complete.\nOk: 3.\nErrors: 0.");
    }

    #[test]
    fn report_lists_errors_in_order() {
        let report = Report {
            succeeded: 0,
            failed: 3,
            errors: vec![
                ErrorRecord {
                    url: "https://a/1".into(),
                    status: Some(404),
                    status_text: None,
                },
                ErrorRecord {
                    url: "https://a/2".into(),
                    status: Some(403),
                    status_text: Some("Forbidden".into()),
                },
                ErrorRecord {
                    url: "https://a/3".into(),
                    status: None,
                    status_text: Some("connect".into()),
                },
            ],
        };
        assert_eq!(
            report.to_string(),
            "Download complete.\nOk: 0.\nErrors: 3.\nError URL(s):\n\
             https://a/1  =>  404\n\
             https://a/2  =>  403: Forbidden\n\
             https://a/3  =>  connect"
        );
    }

    #[tokio::test]
    async fn ok_and_missing_scenario() {
        let saver = Arc::new(MemorySaver::default());
        let sequencer = sequencer(StrategyKind::DirectBinary, Arc::clone(&saver));
        let transport = ScriptedTransport::default()
            .ok("https://ok.example/200.txt", b"0123456789")
            .status("https://ok.example/missing.txt", 404);
        let urls = ["https://ok.example/200.txt", "https://ok.example/missing.txt"];
        let mut run = Run::new(urls).unwrap();
        let surface = Statuses::default();

        let outcome = sequencer
            .drive(&mut run, &transport, &surface, &CancellationToken::new())
            .await;

        let RunOutcome::Completed(report) = outcome else {
            panic!("expected completion");
        };
        let text = report.to_string();
        assert!(text.contains("Ok: 1."));
        assert!(text.contains("Errors: 1."));
        assert!(text.ends_with("\nhttps://ok.example/missing.txt  =>  404"));

        assert_eq!(run.index(), 2);
        assert_eq!(run.succeeded() + run.failed(), run.len());
        assert_eq!(transport.requests(), urls);
        assert_eq!(
            *saver.saved.lock().unwrap(),
            vec![("200.txt".to_string(), Bytes::from_static(b"0123456789"))]
        );
        assert_eq!(
            *surface.0.lock().unwrap(),
            vec!["Downloading 1 of 2".to_string(), "Downloading 2 of 2".to_string()]
        );
    }

    #[tokio::test]
    async fn file_name_comes_from_effective_url() {
        let saver = Arc::new(MemorySaver::default());
        let sequencer = sequencer(StrategyKind::DirectBinary, Arc::clone(&saver));
        let mut transport = ScriptedTransport::default();
        transport.outcomes.insert(
            "https://a.example/download?id=7".to_string(),
            FetchOutcome::Success {
                payload: Payload::Binary(Bytes::from_static(b"pdf")),
                effective_url: "https://cdn.example/files/report.pdf".to_string(),
            },
        );
        let mut run = Run::new(["https://a.example/download?id=7"]).unwrap();

        sequencer
            .drive(&mut run, &transport, &Statuses::default(), &CancellationToken::new())
            .await;

        assert_eq!(saver.saved.lock().unwrap()[0].0, "report.pdf");
    }

    #[tokio::test]
    async fn failure_without_effective_url_uses_requested_url() {
        let sequencer = sequencer(StrategyKind::DirectBinary, Arc::default());
        let transport = ScriptedTransport::default();
        let mut run = Run::new(["https://down.example/x"]).unwrap();

        sequencer
            .drive(&mut run, &transport, &Statuses::default(), &CancellationToken::new())
            .await;

        assert_eq!(
            run.errors(),
            [ErrorRecord {
                url: "https://down.example/x".to_string(),
                status: None,
                status_text: Some("error".to_string()),
            }]
        );
    }

    #[tokio::test]
    async fn cancellation_stops_before_next_fetch() {
        let saver = Arc::new(MemorySaver::default());
        let sequencer = sequencer(StrategyKind::DirectBinary, Arc::clone(&saver));
        let cancel = CancellationToken::new();
        let transport = ScriptedTransport {
            cancel_on: Some(("https://a/2".to_string(), cancel.clone())),
            ..ScriptedTransport::default()
        }
        .ok("https://a/1", b"1")
        .ok("https://a/2", b"2")
        .ok("https://a/3", b"3");
        let mut run = Run::new(["https://a/1", "https://a/2", "https://a/3"]).unwrap();

        let outcome = sequencer
            .drive(&mut run, &transport, &Statuses::default(), &cancel)
            .await;

        assert!(matches!(
            outcome,
            RunOutcome::Cancelled {
                processed: 2,
                total: 3,
                ..
            }
        ));
        // The in-flight fetch finished and was recorded; nothing after it ran.
        assert_eq!(transport.requests(), ["https://a/1", "https://a/2"]);
        assert_eq!(saver.saved.lock().unwrap().len(), 2);
        assert!(run.is_cancelled());
        assert!(run.is_complete());
        assert_eq!(run.current(), None);
    }

    #[tokio::test]
    async fn empty_input_creates_no_run() {
        let mut sequencer = sequencer(StrategyKind::DirectBinary, Arc::default());
        let result = sequencer
            .run(["", "   "], &Statuses::default(), &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(Error::EmptyInput)));
    }

    #[tokio::test]
    async fn helper_give_up_processes_nothing() {
        let saver = Arc::new(MemorySaver::default());
        let mut sequencer = sequencer(StrategyKind::TextFetch, Arc::clone(&saver));
        let surface = Statuses::default();
        let result = sequencer
            .run(
                ["https://ok.example/200.txt"],
                &surface,
                &CancellationToken::new(),
            )
            .await;

        assert!(matches!(result, Err(Error::HelperUnavailable { attempts: 6 })));
        assert!(saver.saved.lock().unwrap().is_empty());
        assert!(
            !surface
                .0
                .lock()
                .unwrap()
                .iter()
                .any(|s| s.starts_with("Downloading"))
        );
    }

    #[tokio::test]
    async fn cancel_during_bootstrap() {
        let mut sequencer = sequencer(StrategyKind::BlobFetch, Arc::default());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = sequencer
            .run(["https://ok.example/a"], &Statuses::default(), &cancel)
            .await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn run_end_to_end_against_local_server() {
        let mut server = mockito::Server::new_async().await;
        let _ok = server
            .mock("GET", "/200.txt")
            .with_status(200)
            .with_body("0123456789")
            .create_async()
            .await;
        let _missing = server
            .mock("GET", "/missing.txt")
            .with_status(404)
            .create_async()
            .await;

        let saver = Arc::new(MemorySaver::default());
        let mut sequencer = sequencer(StrategyKind::DirectBinary, Arc::clone(&saver));
        let ok = format!("{}/200.txt", server.url());
        let missing = format!("{}/missing.txt", server.url());

        let outcome = sequencer
            .run(
                [ok.as_str(), "", missing.as_str()],
                &Statuses::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let RunOutcome::Completed(report) = outcome else {
            panic!("expected completion");
        };
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.errors[0].to_string(), format!("{missing}  =>  404"));
        assert_eq!(saver.saved.lock().unwrap()[0].1.len(), 10);
    }

    mod property_tests {
        use super::*;
        use crate::shell::NoProgress;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn every_url_gets_exactly_one_outcome(results in proptest::collection::vec(any::<bool>(), 1..20)) {
                let urls: Vec<String> = (0..results.len()).map(|i| format!("https://p.example/{i}")).collect();
                let transport = urls.iter().zip(&results).fold(
                    ScriptedTransport::default(),
                    |t, (url, ok)| if *ok { t.ok(url, b"x") } else { t.status(url, 500) },
                );
                let sequencer = sequencer(StrategyKind::DirectBinary, Arc::default());
                let mut run = Run::new(&urls).unwrap();

                let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
                let outcome = runtime.block_on(sequencer.drive(
                    &mut run,
                    &transport,
                    &NoProgress,
                    &CancellationToken::new(),
                ));

                prop_assert!(matches!(outcome, RunOutcome::Completed(_)));
                prop_assert_eq!(run.index(), urls.len());
                prop_assert_eq!(run.succeeded() + run.failed(), urls.len());
                prop_assert_eq!(run.succeeded(), results.iter().filter(|ok| **ok).count());
                prop_assert_eq!(transport.requests(), urls);
            }
        }
    }
}
