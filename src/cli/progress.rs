//! Spinner and notice rendering for the console shell.

use std::time::Duration;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::shell::ProgressSurface;

const SEPARATOR: &str = "────────────────────────────────────────────────────────────";

/// Creates the spinner shown while a run is in progress.
pub fn make_spinner() -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg} [{elapsed}]  (Ctrl-C to cancel)")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

/// Status line backed by a spinner.
pub struct SpinnerSurface {
    bar: ProgressBar,
}

impl SpinnerSurface {
    pub const fn new(bar: ProgressBar) -> Self {
        Self { bar }
    }
}

impl ProgressSurface for SpinnerSurface {
    fn set_status(&self, status: &str) {
        self.bar.set_message(status.to_string());
    }
}

/// Prints the input prompt, listing the saved URLs if there are any.
pub fn print_prompt(initial: Option<&str>) {
    println!("\n{SEPARATOR}");
    println!("{}", style("Logged in file downloader").cyan().bold());
    println!("{SEPARATOR}");
    if let Some(saved) = initial.filter(|s| !s.trim().is_empty()) {
        println!("Saved URL(s):");
        for line in saved.lines() {
            println!("  {}", style(line).dim());
        }
        println!("Enter \".\" alone to download these again.");
    }
    println!("URL(s) to download, one per line. Finish with a line containing only \".\".");
    println!("Ctrl-D closes.");
}

/// Prints a framed notice.
pub fn print_notice(message: &str) {
    println!("\n{SEPARATOR}");
    for line in message.lines() {
        if line.contains("  =>  ") {
            println!("  {}", style(line).red());
        } else {
            println!("  {line}");
        }
    }
    println!("{SEPARATOR}");
}

/// Prints the cancellation notice above `bar`.
pub fn print_cancelled(bar: &ProgressBar) {
    bar.println(format!("{}", style("Cancelled").yellow().bold()));
}
