//! Configuration types, loaded from a TOML file with defaults for every field.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::transport::StrategyKind;

/// Name of the cookie that remembers the last entered URL block.
pub const URL_COOKIE_NAME: &str = "URLs";

/// Default lifetime of the remembered URL block, in days.
pub const URL_COOKIE_EXPIRES_DAYS: u32 = 400;

/// Configuration for the download sequencer and save trigger.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Transport strategy name: `text`, `blob` or `direct`.
    pub strategy: String,
    /// Whether to overwrite existing files instead of picking a free name.
    pub force_overwrite: bool,
    /// Per-request timeout in seconds. `0` disables the timeout.
    pub timeout_secs: u64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::default().name().to_string(),
            force_overwrite: false,
            timeout_secs: 0,
        }
    }
}

impl DownloadConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the transport strategy name.
    #[must_use]
    pub fn with_strategy(mut self, strategy: impl Into<String>) -> Self {
        self.strategy = strategy.into();
        self
    }

    /// Sets whether to force overwrite existing files.
    #[must_use]
    pub const fn with_force_overwrite(mut self, force: bool) -> Self {
        self.force_overwrite = force;
        self
    }

    /// Sets the per-request timeout in seconds.
    #[must_use]
    pub const fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Parses the configured strategy name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedStrategy`] if the name is unknown.
    pub fn strategy_kind(&self) -> Result<StrategyKind> {
        self.strategy.parse()
    }

    /// Returns the request timeout, if one is configured.
    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        if self.timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.timeout_secs))
        }
    }
}

/// Polling parameters for acquiring the helper request client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    /// Delay between two polls, in milliseconds.
    pub poll_interval_ms: u64,
    /// Failed polls after which the fallback handle is requested.
    pub fallback_threshold: u32,
    /// Failed polls after which loading is abandoned.
    pub give_up_threshold: u32,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 200,
            fallback_threshold: 10,
            give_up_threshold: 50,
        }
    }
}

impl BootstrapConfig {
    /// Returns the poll interval as a [`Duration`].
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Checks that the fallback threshold is below the give-up threshold.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the thresholds are out of order.
    pub fn validate(&self) -> Result<()> {
        if self.fallback_threshold >= self.give_up_threshold {
            return Err(Error::Config(format!(
                "bootstrap.fallback_threshold ({}) must be less than bootstrap.give_up_threshold ({})",
                self.fallback_threshold, self.give_up_threshold
            )));
        }
        Ok(())
    }
}

/// Session settings: where the authenticated cookies come from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Base URL that relative entries are resolved against and that inline
    /// cookies are scoped to.
    pub base_url: Option<String>,
    /// Inline `name=value` cookies.
    pub cookies: Vec<String>,
    /// Netscape `cookies.txt` export from the browser.
    pub cookies_file: Option<PathBuf>,
    /// User agent sent with every request.
    pub user_agent: Option<String>,
}

impl SessionConfig {
    /// Appends the cookies of a `name=value; name2=value2` header string.
    #[must_use]
    pub fn with_cookie_header(mut self, header: &str) -> Self {
        self.cookies.extend(
            header
                .split(';')
                .map(str::trim)
                .filter(|c| c.contains('='))
                .map(String::from),
        );
        self
    }
}

/// Path configuration for download and state directories.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathConfig {
    /// Directory where downloaded files are saved.
    pub download_dir: PathBuf,
    /// Directory where the remembered URL block is kept.
    pub state_dir: PathBuf,
}

impl Default for PathConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
        let download_dir = dirs::download_dir().unwrap_or_else(|| PathBuf::from("."));

        Self {
            download_dir,
            state_dir: data_dir.join("logged-dl"),
        }
    }
}

impl PathConfig {
    /// Returns the path of the cookie store file.
    #[must_use]
    pub fn cookie_store_path(&self) -> PathBuf {
        self.state_dir.join("cookies.toml")
    }
}

/// Complete application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Open the input surface on launch when no URLs are given.
    pub auto_start: bool,
    /// Download configuration.
    pub download: DownloadConfig,
    /// Helper bootstrap configuration.
    pub bootstrap: BootstrapConfig,
    /// Session configuration.
    pub session: SessionConfig,
    /// Path configuration.
    pub paths: PathConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            auto_start: true,
            download: DownloadConfig::default(),
            bootstrap: BootstrapConfig::default(),
            session: SessionConfig::default(),
            paths: PathConfig::default(),
        }
    }
}

impl AppConfig {
    /// Creates a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the default config file location.
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("logged-dl")
            .join("config.toml")
    }

    /// Loads the config file at `path`, or defaults if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read, parsed or
    /// validated.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&contents)?;
            log::info!("Loaded config from {}", path.display());
            config
        } else {
            log::debug!("No config at {}, using defaults", path.display());
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Writes the config to `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Validates cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown strategy or out-of-order thresholds.
    pub fn validate(&self) -> Result<()> {
        self.download.strategy_kind()?;
        self.bootstrap.validate()
    }
}
