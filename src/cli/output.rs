//! Output formatting and progress display

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use crate::core::orchestrator::StatusReporter;
use crate::core::progress::{format_bytes_per_second, Progress, ProgressSink};

const BAR_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta}) {msg}";
const SPINNER_TEMPLATE: &str = "{spinner:.green} [{elapsed_precise}] {bytes} {msg}";

/// Console output for a download run
pub struct OutputFormatter {
    hidden: bool,
    ignore_errors: bool,
    progress_bar: Mutex<Option<ProgressBar>>,
}

impl OutputFormatter {
    /// `hidden` silences status and progress; `ignore_errors` also silences
    /// expected skip and failure notices
    pub fn new(hidden: bool, ignore_errors: bool) -> Self {
        Self {
            hidden,
            ignore_errors,
            progress_bar: Mutex::new(None),
        }
    }

    /// Print info message
    pub fn info(&self, message: &str) {
        if !self.hidden {
            println!("{} {}", "ℹ".blue(), message);
        }
    }

    /// Print warning message
    pub fn warning(&self, message: &str) {
        if !self.hidden && !self.ignore_errors {
            eprintln!("{} {}", "⚠".yellow(), message);
        }
    }

    /// Print error message
    pub fn error(&self, message: &str) {
        eprintln!("{} {}", "✗".red(), message);
    }

    /// Per-URL result line, printed even when hidden
    pub fn print_page_result(&self, saved: Option<&Path>, elapsed: Duration) {
        let seconds = elapsed.as_secs_f64();
        match saved {
            Some(path) => println!(
                "{} Download completed in {:.2} seconds: {}",
                "✓".green(),
                seconds,
                path.display()
            ),
            None => println!("{} Download failed in {:.2} seconds.", "✗".red(), seconds),
        }
    }

    fn create_progress_bar(&self, total: Option<u64>) -> ProgressBar {
        let (bar, template) = match total {
            Some(total) => (ProgressBar::new(total), BAR_TEMPLATE),
            None => (ProgressBar::new_spinner(), SPINNER_TEMPLATE),
        };
        let style = ProgressStyle::default_bar()
            .template(template)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");
        bar.set_style(style);
        bar.enable_steady_tick(Duration::from_millis(120));
        bar
    }

    fn with_bar(&self, f: impl FnOnce(&mut Option<ProgressBar>)) {
        if let Ok(mut guard) = self.progress_bar.lock() {
            f(&mut guard);
        }
    }
}

impl ProgressSink for OutputFormatter {
    fn started(&self, target: &Path, total: Option<u64>) {
        if self.hidden {
            return;
        }
        let bar = self.create_progress_bar(total);
        if let Some(name) = target.file_name() {
            bar.set_message(name.to_string_lossy().into_owned());
        }
        self.with_bar(|slot| {
            if let Some(previous) = slot.replace(bar) {
                previous.finish_and_clear();
            }
        });
    }

    fn advanced(&self, progress: &Progress) {
        self.with_bar(|slot| {
            if let Some(bar) = slot {
                bar.set_position(progress.downloaded);
                if let Some(speed) = progress.speed {
                    bar.set_message(format_bytes_per_second(speed));
                }
            }
        });
    }

    fn finished(&self, progress: &Progress) {
        self.with_bar(|slot| {
            if let Some(bar) = slot.take() {
                // Short bodies leave the bar where it stopped
                if progress.is_complete() || progress.total.is_none() {
                    bar.finish_with_message(progress.summary());
                } else {
                    bar.abandon_with_message(progress.summary());
                }
            }
        });
    }
}

impl StatusReporter for OutputFormatter {
    fn status(&self, message: &str) {
        self.info(message);
    }

    fn notice(&self, message: &str) {
        self.warning(message);
    }
}
