//! Save trigger: turns a fetched payload into a file on disk.
//!
//! A payload is first wrapped in a transient [`SaveRef`] (a base64 data URL
//! for text, an object reference for bytes). The reference is activated once
//! against a [`Saver`] and then dropped. Save failures are logged and never
//! reported back to the caller.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use percent_encoding::percent_decode_str;

use crate::error::{Error, Result};
use crate::fs::{FileSystem, TokioFileSystem};
use crate::transport::Payload;

/// Prefix of the data URLs produced for text payloads.
pub const TEXT_DATA_URL_PREFIX: &str = "data:text/html;base64,";

/// Name used when the suggested name is unusable.
const DEFAULT_NAME: &str = "download";

/// Transient reference to content that is about to be saved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveRef {
    /// Content encoded into a `data:` URL.
    DataUrl(String),
    /// Content held by reference.
    Object(Bytes),
}

impl SaveRef {
    /// Wraps a payload: text is encoded into a data URL, bytes are kept as is.
    #[must_use]
    pub fn from_payload(payload: Payload) -> Self {
        match payload {
            Payload::Text(text) => Self::DataUrl(encode_text(&text)),
            Payload::Binary(bytes) => Self::Object(bytes),
        }
    }

    /// Returns the referenced content, or `None` for an undecodable data URL.
    #[must_use]
    pub fn resolve(&self) -> Option<Bytes> {
        match self {
            Self::DataUrl(url) => decode_data_url(url).map(Bytes::from),
            Self::Object(bytes) => Some(bytes.clone()),
        }
    }
}

/// Encodes text as a base64 `data:text/html` URL.
#[must_use]
pub fn encode_text(text: &str) -> String {
    format!("{TEXT_DATA_URL_PREFIX}{}", BASE64.encode(text.as_bytes()))
}

/// Decodes a `data:` URL, base64 or percent-encoded.
#[must_use]
pub fn decode_data_url(url: &str) -> Option<Vec<u8>> {
    let (meta, data) = url.strip_prefix("data:")?.split_once(',')?;
    if meta.ends_with(";base64") {
        BASE64.decode(data).ok()
    } else {
        Some(percent_decode_str(data).collect())
    }
}

/// Persists activated references.
#[async_trait]
pub trait Saver: Send + Sync {
    /// Saves the referenced content under `suggested_name` and returns where
    /// it ended up.
    async fn activate(&self, reference: &SaveRef, suggested_name: &str) -> Result<PathBuf>;
}

/// Saves into a download directory the way a browser does: an existing name
/// gets a ` (n)` suffix unless overwriting is enabled.
#[derive(Debug, Clone)]
pub struct DiskSaver<F: FileSystem = TokioFileSystem> {
    dir: PathBuf,
    overwrite: bool,
    fs: F,
}

impl DiskSaver<TokioFileSystem> {
    /// Creates a saver writing into `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, overwrite: bool) -> Self {
        Self::with_fs(dir, overwrite, TokioFileSystem)
    }
}

impl<F: FileSystem> DiskSaver<F> {
    /// Creates a saver with a custom file system implementation.
    #[must_use]
    pub fn with_fs(dir: impl Into<PathBuf>, overwrite: bool, fs: F) -> Self {
        Self {
            dir: dir.into(),
            overwrite,
            fs,
        }
    }

    /// Returns the download directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Picks the path to save `name` to.
    async fn target_path(&self, name: &str) -> PathBuf {
        let name = match name {
            "" | "." | ".." => DEFAULT_NAME,
            other => other,
        };
        let path = self.dir.join(name);
        if self.overwrite || !self.fs.file_exists(&path).await {
            return path;
        }

        let as_path = Path::new(name);
        let stem = as_path
            .file_stem()
            .map_or_else(|| name.to_string(), |s| s.to_string_lossy().into_owned());
        let ext = as_path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();

        let mut n = 1u32;
        loop {
            let candidate = self.dir.join(format!("{stem} ({n}){ext}"));
            if !self.fs.file_exists(&candidate).await {
                return candidate;
            }
            n += 1;
        }
    }
}

#[async_trait]
impl<F: FileSystem> Saver for DiskSaver<F> {
    async fn activate(&self, reference: &SaveRef, suggested_name: &str) -> Result<PathBuf> {
        let contents = reference.resolve().ok_or_else(|| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "undecodable data URL",
            ))
        })?;
        self.fs.create_dir_all(&self.dir).await?;
        let path = self.target_path(suggested_name).await;
        self.fs.write_file(&path, &contents).await?;
        Ok(path)
    }
}

/// Fire-and-forget save entry point used by the sequencer.
#[derive(Clone)]
pub struct SaveTrigger {
    saver: Arc<dyn Saver>,
}

impl SaveTrigger {
    /// Creates a trigger that activates references against `saver`.
    #[must_use]
    pub fn new(saver: Arc<dyn Saver>) -> Self {
        Self { saver }
    }

    /// Saves `payload` under `suggested_name`. Failures are only logged.
    pub async fn save_to_disk(&self, payload: Payload, suggested_name: &str) {
        let size = payload.len();
        let reference = SaveRef::from_payload(payload);
        match self.saver.activate(&reference, suggested_name).await {
            Ok(path) => log::info!("Saved {} ({size} bytes)", path.display()),
            Err(e) => log::error!("Saving {suggested_name} failed: {e}"),
        }
    }
}
