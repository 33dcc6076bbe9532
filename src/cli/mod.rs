//! Console shell: reads URL blocks from stdin and shows progress with a spinner.

mod progress;

use std::sync::Mutex;

use async_trait::async_trait;
use indicatif::ProgressBar;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::shell::{ProgressSurface, Shell};

use progress::{SpinnerSurface, make_spinner, print_cancelled, print_notice, print_prompt};

/// Line that submits the block typed so far.
pub const SUBMIT_LINE: &str = ".";

struct ActiveProgress {
    bar: ProgressBar,
    listener: JoinHandle<()>,
}

/// A [`Shell`] on the terminal.
///
/// Input is a block of lines terminated by [`SUBMIT_LINE`]. End of input or
/// Ctrl-C at the prompt closes the shell. Ctrl-C while a run is in progress
/// cancels it.
pub struct ConsoleShell {
    lines: tokio::sync::Mutex<Lines<BufReader<Stdin>>>,
    active: Mutex<Option<ActiveProgress>>,
}

impl ConsoleShell {
    #[must_use]
    pub fn new() -> Self {
        Self {
            lines: tokio::sync::Mutex::new(BufReader::new(tokio::io::stdin()).lines()),
            active: Mutex::new(None),
        }
    }
}

impl Default for ConsoleShell {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Shell for ConsoleShell {
    async fn input(&self, initial: Option<&str>) -> Option<String> {
        print_prompt(initial);
        let mut lines = self.lines.lock().await;
        let mut block: Vec<String> = Vec::new();

        loop {
            let line = tokio::select! {
                line = lines.next_line() => line,
                _ = tokio::signal::ctrl_c() => {
                    println!();
                    return None;
                }
            };
            match line {
                Ok(Some(line)) if line.trim() == SUBMIT_LINE => {
                    if block.is_empty()
                        && let Some(saved) = initial
                    {
                        return Some(saved.to_string());
                    }
                    return Some(block.join("\n"));
                }
                Ok(Some(line)) => block.push(line),
                Ok(None) => return (!block.is_empty()).then(|| block.join("\n")),
                Err(e) => {
                    log::warn!("Reading input failed: {e}");
                    return None;
                }
            }
        }
    }

    fn open_progress(&self, cancel: CancellationToken) -> Box<dyn ProgressSurface> {
        self.close();

        let bar = make_spinner();
        let notice_bar = bar.clone();
        let listener = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
                print_cancelled(&notice_bar);
            }
        });

        if let Ok(mut active) = self.active.lock() {
            *active = Some(ActiveProgress {
                bar: bar.clone(),
                listener,
            });
        }
        Box::new(SpinnerSurface::new(bar))
    }

    async fn notify(&self, message: &str) {
        print_notice(message);
    }

    fn close(&self) {
        let Ok(mut active) = self.active.lock() else {
            return;
        };
        if let Some(progress) = active.take() {
            progress.listener.abort();
            progress.bar.finish_and_clear();
        }
    }
}
