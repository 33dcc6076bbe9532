//! Acquisition of the helper request client used by the text and blob
//! strategies.
//!
//! The helper is loaded in the background and detected only by polling. If
//! it has not shown up after `fallback_threshold` polls, a fallback handle is
//! requested once. After `give_up_threshold` polls the run is abandoned.

use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

use crate::config::BootstrapConfig;
use crate::session::Session;
use crate::shell::ProgressSurface;

/// The environment the helper client is loaded into.
pub trait HelperHost: Send + Sync {
    /// Returns the helper client if it is present and usable. With `fallback`
    /// set, the fallback handle is probed instead of the primary one.
    fn probe(&self, fallback: bool) -> Option<reqwest::Client>;

    /// Starts loading the helper. Completion is not signalled; presence is
    /// detected by later probes.
    fn request_load(&self);

    /// Requests the fallback handle.
    fn activate_fallback(&self);
}

/// Bootstrap progress. The two flags live as long as the [`Bootstrapper`];
/// `attempts` restarts with every run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BootstrapState {
    /// The helper load has been requested.
    pub script_requested: bool,
    /// The fallback handle is in use.
    pub fallback_active: bool,
    /// Failed polls in the current run.
    pub attempts: u32,
}

/// Result of [`Bootstrapper::ensure_ready`].
#[derive(Debug)]
pub enum BootstrapOutcome {
    /// The helper client is available.
    Ready(reqwest::Client),
    /// The user cancelled while polling.
    Cancelled,
    /// The helper never showed up.
    GaveUp {
        /// Failed polls before giving up.
        attempts: u32,
    },
}

/// Polls a [`HelperHost`] until the helper client is usable.
#[derive(Debug)]
pub struct Bootstrapper {
    config: BootstrapConfig,
    state: BootstrapState,
}

impl Bootstrapper {
    /// Creates a bootstrapper with fresh state.
    #[must_use]
    pub fn new(config: BootstrapConfig) -> Self {
        Self {
            config,
            state: BootstrapState::default(),
        }
    }

    /// Returns the current bootstrap state.
    #[must_use]
    pub const fn state(&self) -> BootstrapState {
        self.state
    }

    /// Polls until the helper is ready, the user cancels, or the give-up
    /// threshold is exceeded.
    pub async fn ensure_ready(
        &mut self,
        host: &dyn HelperHost,
        cancel: &CancellationToken,
        surface: &dyn ProgressSurface,
    ) -> BootstrapOutcome {
        let give_up = self.config.give_up_threshold;
        self.state.attempts = 0;

        loop {
            if cancel.is_cancelled() {
                log::info!("Helper bootstrap cancelled");
                return BootstrapOutcome::Cancelled;
            }

            if let Some(client) = host.probe(self.state.fallback_active) {
                log::debug!(
                    "Helper ready after {} failed poll(s) (fallback: {})",
                    self.state.attempts,
                    self.state.fallback_active
                );
                return BootstrapOutcome::Ready(client);
            }

            if !self.state.script_requested {
                log::info!("Loading helper client...");
                host.request_load();
                self.state.script_requested = true;
            } else if !self.state.fallback_active
                && self.state.attempts == self.config.fallback_threshold
            {
                log::warn!("Helper still missing, switching to fallback handle");
                host.activate_fallback();
                self.state.fallback_active = true;
            }

            surface.set_status(&format!(
                "Helper missing ({} / {give_up})",
                self.state.attempts
            ));
            log::debug!("Helper missing, poll {}", self.state.attempts);

            if self.state.attempts > give_up {
                log::error!("Helper loading failed!");
                return BootstrapOutcome::GaveUp {
                    attempts: self.state.attempts,
                };
            }
            self.state.attempts += 1;

            tokio::select! {
                () = cancel.cancelled() => {}
                () = tokio::time::sleep(self.config.poll_interval()) => {}
            }
        }
    }
}

/// A [`HelperHost`] that builds the session client on a background task.
///
/// The fallback handle is a client built in place from the inline session
/// cookies only, skipping the cookies file.
pub struct ClientLoader {
    session: Session,
    primary: Arc<Mutex<Option<reqwest::Client>>>,
    fallback: Mutex<Option<reqwest::Client>>,
}

impl ClientLoader {
    /// Creates a loader for `session`. Nothing is loaded until requested.
    #[must_use]
    pub fn new(session: Session) -> Self {
        Self {
            session,
            primary: Arc::new(Mutex::new(None)),
            fallback: Mutex::new(None),
        }
    }
}

impl HelperHost for ClientLoader {
    fn probe(&self, fallback: bool) -> Option<reqwest::Client> {
        let slot = if fallback {
            &self.fallback
        } else {
            &*self.primary
        };
        slot.lock().ok()?.clone()
    }

    fn request_load(&self) {
        let session = self.session.clone();
        let slot = Arc::clone(&self.primary);
        tokio::spawn(async move {
            match session.load_client().await {
                Ok(client) => {
                    if let Ok(mut guard) = slot.lock() {
                        *guard = Some(client);
                    }
                    log::info!("Helper client loaded");
                }
                Err(e) => log::warn!("Helper client failed to load: {e}"),
            }
        });
    }

    fn activate_fallback(&self) {
        match self.session.build_inline_client() {
            Ok(client) => {
                if let Ok(mut guard) = self.fallback.lock() {
                    *guard = Some(client);
                }
            }
            Err(e) => log::warn!("Fallback helper client failed: {e}"),
        }
    }
}
