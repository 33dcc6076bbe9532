//! Error types for the logged-dl library.

use thiserror::Error;

/// Errors that halt a download run or the application.
///
/// Per-URL failures are not represented here: they are recorded on the run
/// as [`ErrorRecord`](crate::ErrorRecord)s and never stop it.
#[derive(Error, Debug)]
pub enum Error {
    /// No URLs were left after blank entries were stripped.
    #[error("No URLs were entered")]
    EmptyInput,

    /// The helper request client never became available.
    #[error("Helper client loading failed after {attempts} attempts")]
    HelperUnavailable {
        /// Number of polls made before giving up.
        attempts: u32,
    },

    /// The configured transport strategy name is not known.
    #[error("Unknown transport strategy: {0}")]
    UnsupportedStrategy(String),

    /// The user cancelled the run.
    #[error("Cancelled")]
    Cancelled,

    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client construction or request error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// TOML file could not be parsed.
    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    /// TOML file could not be written.
    #[error("TOML write error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

impl Error {
    /// Returns true if the error ends the run but the user should simply be
    /// returned to the input surface.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::EmptyInput | Self::HelperUnavailable { .. } | Self::Cancelled
        )
    }
}

/// A specialized `Result` type for logged-dl operations.
pub type Result<T> = std::result::Result<T, Error>;
