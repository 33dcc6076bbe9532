//! Cookie-style key/value persistence for remembering input between runs.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Characters left unescaped by `encodeURIComponent`.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Key/value persistence with expiry.
pub trait CookieStore: Send + Sync {
    /// Returns the value stored under `name`, if present and not expired.
    fn get(&self, name: &str) -> Option<String>;

    /// Stores `value` under `name` for `expires_in_days` days.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be persisted.
    fn set(&self, name: &str, value: &str, expires_in_days: u32) -> Result<()>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CookieEntry {
    name: String,
    /// Percent-encoded value.
    value: String,
    expires: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CookieFile {
    #[serde(default, rename = "cookie")]
    cookies: Vec<CookieEntry>,
}

/// A [`CookieStore`] kept in a TOML file.
#[derive(Debug, Clone)]
pub struct FileCookieStore {
    path: PathBuf,
}

impl FileCookieStore {
    /// Creates a store backed by the file at `path`. The file is created on
    /// the first write.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> CookieFile {
        let Ok(contents) = std::fs::read_to_string(&self.path) else {
            return CookieFile::default();
        };
        toml::from_str(&contents).unwrap_or_else(|e| {
            log::warn!("Ignoring unreadable cookie store {}: {e}", self.path.display());
            CookieFile::default()
        })
    }

    /// Writes the file atomically (write tmp + rename).
    fn write(&self, file: &CookieFile) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let tmp_path = self.path.with_extension("toml.tmp");
        std::fs::write(&tmp_path, toml::to_string(file)?)?;

        // Stored values can contain session URLs
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&tmp_path, perms)?;
        }

        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

/// Latest expiry written to the store.
fn far_future() -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(9999, 12, 31)
        .and_then(|d| d.and_hms_opt(23, 59, 59))
        .map_or(DateTime::<Utc>::MAX_UTC, |t| t.and_utc())
}

/// Returns `now` plus `days`, capped at [`far_future`].
fn expiry(now: DateTime<Utc>, days: u32) -> DateTime<Utc> {
    let limit = far_future();
    Duration::try_days(i64::from(days))
        .and_then(|d| now.checked_add_signed(d))
        .filter(|e| *e < limit)
        .unwrap_or(limit)
}

impl CookieStore for FileCookieStore {
    fn get(&self, name: &str) -> Option<String> {
        let now = Utc::now();
        self.read()
            .cookies
            .into_iter()
            .find(|c| c.name == name && c.expires > now)
            .map(|c| {
                percent_decode_str(&c.value)
                    .decode_utf8_lossy()
                    .into_owned()
            })
    }

    fn set(&self, name: &str, value: &str, expires_in_days: u32) -> Result<()> {
        let now = Utc::now();
        let mut file = self.read();
        file.cookies.retain(|c| c.name != name && c.expires > now);
        file.cookies.push(CookieEntry {
            name: name.to_string(),
            value: utf8_percent_encode(value, COMPONENT).to_string(),
            expires: expiry(now, expires_in_days),
        });
        self.write(&file)?;
        log::debug!("Stored cookie {name} for {expires_in_days} days");
        Ok(())
    }
}
