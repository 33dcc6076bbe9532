//! logged-dl - Fetch a list of URLs one at a time and save each response.
//!
//! URLs are fetched sequentially with a configurable transport strategy and
//! the session's cookies. Each payload is saved into the download directory
//! under a name derived from its effective URL. Failures are collected and
//! reported once the run is over.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use logged_dl::{
//!     BootstrapConfig, ClientLoader, DiskSaver, NoProgress, SaveTrigger, Sequencer, Session,
//!     SessionConfig, StrategyKind,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> logged_dl::Result<()> {
//! let session = Session::new(SessionConfig::default(), None)?;
//! let client = session.load_client().await?;
//!
//! let mut sequencer = Sequencer::new(
//!     StrategyKind::DirectBinary,
//!     client,
//!     Arc::new(ClientLoader::new(session)),
//!     BootstrapConfig::default(),
//!     SaveTrigger::new(Arc::new(DiskSaver::new("downloads", false))),
//! );
//!
//! let urls = ["https://example.org/a.pdf", "https://example.org/b.pdf"];
//! let outcome = sequencer.run(urls, &NoProgress, &CancellationToken::new()).await?;
//! println!("{outcome:?}");
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod app;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod filename;
pub mod fs;
pub mod save;
pub mod sequencer;
pub mod session;
pub mod shell;
pub mod store;
pub mod transport;

#[cfg(feature = "cli")]
pub mod cli;

// Re-export main types for convenience
pub use app::{App, UrlInput};
pub use bootstrap::{BootstrapOutcome, BootstrapState, Bootstrapper, ClientLoader, HelperHost};
pub use config::{AppConfig, BootstrapConfig, DownloadConfig, PathConfig, SessionConfig};
pub use error::{Error, Result};
pub use filename::derive_file_name;
pub use fs::{FileSystem, TokioFileSystem};
pub use save::{DiskSaver, SaveRef, SaveTrigger, Saver};
pub use sequencer::{ErrorRecord, Report, Run, RunOutcome, Sequencer};
pub use session::Session;
pub use shell::{NoProgress, ProgressSurface, Shell};
pub use store::{CookieStore, FileCookieStore};
pub use transport::{FetchOutcome, Payload, StrategyKind, Transport};
