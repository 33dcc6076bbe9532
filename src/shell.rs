//! The user-facing surfaces the application drives.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Receives status lines while a run is in progress.
pub trait ProgressSurface: Send + Sync {
    /// Replaces the displayed status.
    fn set_status(&self, status: &str);
}

/// A progress surface that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSurface for NoProgress {
    fn set_status(&self, _status: &str) {}
}

/// Input, progress and notice surfaces.
#[async_trait]
pub trait Shell: Send + Sync {
    /// Shows the input surface, pre-filled with `initial`, and returns the
    /// submitted text. Returns `None` when the user closes the surface.
    async fn input(&self, initial: Option<&str>) -> Option<String>;

    /// Shows the progress surface. `cancel` is cancelled when the user asks
    /// to stop.
    fn open_progress(&self, cancel: CancellationToken) -> Box<dyn ProgressSurface>;

    /// Shows a notice the user has to acknowledge.
    async fn notify(&self, message: &str);

    /// Closes any open surface.
    fn close(&self);
}
