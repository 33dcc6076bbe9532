//! Application controller: the input loop around the sequencer.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::bootstrap::ClientLoader;
use crate::config::{AppConfig, URL_COOKIE_EXPIRES_DAYS, URL_COOKIE_NAME};
use crate::error::{Error, Result};
use crate::save::{DiskSaver, SaveTrigger};
use crate::sequencer::{RunOutcome, Sequencer};
use crate::session::Session;
use crate::shell::Shell;
use crate::store::{CookieStore, FileCookieStore};

/// URLs handed to [`App::start_downloading`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlInput {
    /// Newline-separated block, as typed into the input surface.
    Text(String),
    /// One URL per entry.
    List(Vec<String>),
}

impl UrlInput {
    /// Returns the non-blank entries, trimmed, in order.
    #[must_use]
    pub fn into_urls(self) -> Vec<String> {
        let entries: Vec<String> = match self {
            Self::Text(text) => text.lines().map(String::from).collect(),
            Self::List(list) => list,
        };
        entries
            .into_iter()
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty())
            .collect()
    }
}

impl From<&str> for UrlInput {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for UrlInput {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Vec<String>> for UrlInput {
    fn from(list: Vec<String>) -> Self {
        Self::List(list)
    }
}

/// Ties the shell, the URL store and the sequencer together.
pub struct App {
    shell: Arc<dyn Shell>,
    store: Arc<dyn CookieStore>,
    session: Session,
    sequencer: Sequencer,
}

impl App {
    /// Builds the application from a loaded config.
    ///
    /// # Errors
    ///
    /// Returns an error if the config is invalid, the session cannot be set
    /// up or the HTTP client cannot be built.
    pub async fn from_config(config: &AppConfig, shell: Arc<dyn Shell>) -> Result<Self> {
        config.validate()?;
        let strategy = config.download.strategy_kind()?;
        let session = Session::new(config.session.clone(), config.download.timeout())?;
        let client = session.load_client().await?;

        let saver = DiskSaver::new(
            &config.paths.download_dir,
            config.download.force_overwrite,
        );
        log::info!("Saving to {}", saver.dir().display());
        let sequencer = Sequencer::new(
            strategy,
            client,
            Arc::new(ClientLoader::new(session.clone())),
            config.bootstrap.clone(),
            SaveTrigger::new(Arc::new(saver)),
        );
        log::info!("Using the {} strategy", sequencer.strategy());
        let store = Arc::new(FileCookieStore::new(config.paths.cookie_store_path()));

        Ok(Self::with_parts(shell, store, session, sequencer))
    }

    /// Assembles the application from its parts.
    #[must_use]
    pub fn with_parts(
        shell: Arc<dyn Shell>,
        store: Arc<dyn CookieStore>,
        session: Session,
        sequencer: Sequencer,
    ) -> Self {
        Self {
            shell,
            store,
            session,
            sequencer,
        }
    }

    /// Returns the URL block remembered from the last submission.
    #[must_use]
    pub fn saved_urls(&self) -> Option<String> {
        self.store.get(URL_COOKIE_NAME)
    }

    fn remember(&self, text: &str) {
        if let Err(e) = self.store.set(URL_COOKIE_NAME, text, URL_COOKIE_EXPIRES_DAYS) {
            log::warn!("Could not remember URLs: {e}");
        }
    }

    /// Shows the input surface until the user closes it, running a download
    /// for every submitted block.
    ///
    /// # Errors
    ///
    /// Returns the first error that is not reported to the user as a notice.
    pub async fn start(&mut self) -> Result<()> {
        loop {
            let saved = self.saved_urls();
            let Some(text) = self.shell.input(saved.as_deref()).await else {
                self.shell.close();
                log::debug!("Input closed");
                return Ok(());
            };
            self.remember(&text);
            self.start_downloading(UrlInput::Text(text)).await?;
        }
    }

    /// Runs one download over `input`.
    ///
    /// Returns `Ok(None)` when the run ended early with a condition that was
    /// shown to the user: empty input, cancellation or a helper that never
    /// loaded.
    ///
    /// # Errors
    ///
    /// Returns any other error.
    pub async fn start_downloading(&mut self, input: UrlInput) -> Result<Option<RunOutcome>> {
        let urls: Vec<String> = input
            .into_urls()
            .iter()
            .map(|u| self.session.resolve(u))
            .collect();
        if urls.is_empty() {
            self.shell.notify(&Error::EmptyInput.to_string()).await;
            return Ok(None);
        }

        self.shell.close();
        let cancel = CancellationToken::new();
        let surface = self.shell.open_progress(cancel.clone());
        let result = self.sequencer.run(&urls, surface.as_ref(), &cancel).await;
        drop(surface);
        self.shell.close();

        match result {
            Ok(RunOutcome::Completed(report)) => {
                self.shell.notify(&report.to_string()).await;
                Ok(Some(RunOutcome::Completed(report)))
            }
            Ok(RunOutcome::Cancelled {
                processed,
                total,
                report,
            }) => {
                self.shell
                    .notify(&format!("Cancelled after {processed} of {total} URL(s)"))
                    .await;
                Ok(Some(RunOutcome::Cancelled {
                    processed,
                    total,
                    report,
                }))
            }
            Err(Error::Cancelled) => {
                log::info!("Cancelled while loading the helper");
                Ok(None)
            }
            Err(e) if e.is_recoverable() => {
                log::error!("{e}");
                self.shell.notify(&e.to_string()).await;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}
