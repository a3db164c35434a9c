//! Display utilities for progress bars, console prompts and formatting helpers.

use console::{Term, style};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use ad_core::short_host;
use ad_io::{
    LockDecision, LockingProcess, MismatchResolution, ProgressCallback, Prompt, TransferProgress,
};

/// Create progress styles used by the install command.
pub struct ProgressStyles {
    pub download: ProgressStyle,
    pub spinner: ProgressStyle,
    pub done: ProgressStyle,
}

impl Default for ProgressStyles {
    fn default() -> Self {
        Self {
            download: ProgressStyle::default_bar()
                .template(
                    "    {prefix:<16} {bar:25.cyan/dim} {bytes:>10}/{total_bytes:<10} {eta:>6}",
                )
                .unwrap()
                .progress_chars("━━╸"),
            spinner: ProgressStyle::default_spinner()
                .template("    {prefix:<16} {spinner:.cyan} {msg}")
                .unwrap()
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
            done: ProgressStyle::default_spinner()
                .template("    {prefix:<16} {msg}")
                .unwrap(),
        }
    }
}

pub type ProgressBars = Arc<Mutex<HashMap<String, ProgressBar>>>;

/// Create a progress callback that draws one bar per source URL.
pub fn create_progress_callback(
    multi: MultiProgress,
    styles: ProgressStyles,
) -> (ProgressCallback, ProgressBars) {
    let bars: ProgressBars = Arc::new(Mutex::new(HashMap::new()));

    let bars_clone = bars.clone();
    let download_style = styles.download;
    let spinner_style = styles.spinner;
    let done_style = styles.done;

    let callback: ProgressCallback = Arc::new(move |event: TransferProgress| {
        let mut bars = bars_clone.lock().unwrap();
        match event {
            TransferProgress::Started { url, total_bytes } => {
                let pb = if let Some(total) = total_bytes {
                    let pb = multi.add(ProgressBar::new(total));
                    pb.set_style(download_style.clone());
                    pb
                } else {
                    let pb = multi.add(ProgressBar::new_spinner());
                    pb.set_style(spinner_style.clone());
                    pb.set_message("downloading...");
                    pb.enable_steady_tick(std::time::Duration::from_millis(80));
                    pb
                };
                pb.set_prefix(bar_label(&url));
                bars.insert(url, pb);
            }
            TransferProgress::Progress {
                url,
                downloaded,
                total_bytes,
            } => {
                if let Some(pb) = bars.get(&url)
                    && total_bytes.is_some()
                {
                    pb.set_position(downloaded);
                }
            }
            TransferProgress::Completed { url, bytes } => {
                if let Some(pb) = bars.get(&url) {
                    pb.set_style(done_style.clone());
                    pb.set_message(format!(
                        "{} downloaded {}",
                        style("✓").green(),
                        format_bytes(bytes)
                    ));
                    pb.finish();
                }
            }
            TransferProgress::Failed { url, message } => {
                if let Some(pb) = bars.get(&url) {
                    pb.set_style(done_style.clone());
                    pb.abandon_with_message(format!("{} {}", style("✗").red(), message));
                }
            }
        }
    });

    (callback, bars)
}

/// Finish any remaining progress bars.
pub fn finish_progress_bars(bars: &ProgressBars) {
    let bars = bars.lock().unwrap();
    for (_, pb) in bars.iter() {
        if !pb.is_finished() {
            pb.finish();
        }
    }
}

/// Label for a source's progress bar: its host.
fn bar_label(url: &str) -> String {
    let host = short_host(url);
    if host.is_empty() {
        url.to_string()
    } else {
        host
    }
}

/// Format bytes into a human-readable string (e.g., "1.5 GB").
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

// ============================================================================
// Console prompt
// ============================================================================

/// Interactive [`Prompt`] reading answers from the terminal.
///
/// An unreadable terminal counts as the safe answer: abort on mismatch,
/// keep processes running.
#[derive(Default)]
pub struct ConsolePrompt;

impl ConsolePrompt {
    pub fn new() -> Self {
        Self
    }

    fn ask(&self, question: &str) -> Option<String> {
        let term = Term::stderr();
        term.write_str(&format!("{} {} ", style("?").yellow().bold(), question))
            .ok()?;
        term.read_line().ok()
    }
}

impl Prompt for ConsolePrompt {
    fn resolve_checksum_mismatch(
        &self,
        file_name: &str,
        expected: &str,
        actual: &str,
    ) -> MismatchResolution {
        eprintln!(
            "{} checksum mismatch for {}",
            style("==>").yellow().bold(),
            style(file_name).bold()
        );
        eprintln!("    expected: {}", expected);
        eprintln!("    got:      {}", style(actual).red());

        loop {
            let Some(answer) = self.ask("[i]gnore, [r]etry or [a]bort?") else {
                return MismatchResolution::Abort;
            };
            if let Some(resolution) = parse_mismatch_answer(&answer) {
                return resolution;
            }
        }
    }

    fn confirm_lock_release(&self, path: &Path, processes: &[LockingProcess]) -> LockDecision {
        eprintln!(
            "{} {} is in use by:",
            style("==>").yellow().bold(),
            style(path.display()).bold()
        );
        for process in processes {
            eprintln!("    {} ({})", process.name, style(process.pid).dim());
        }

        loop {
            let Some(answer) = self.ask("Close these programs? [y/n]") else {
                return LockDecision::Cancel;
            };
            if let Some(accept) = parse_yes_no(&answer) {
                return if accept {
                    LockDecision::Accept
                } else {
                    LockDecision::Cancel
                };
            }
        }
    }

    fn notify_install_skipped(&self, name: &str) {
        eprintln!(
            "    {} {} was not installed because its files are still in use",
            style("→").dim(),
            name
        );
    }
}

pub fn parse_mismatch_answer(answer: &str) -> Option<MismatchResolution> {
    match answer.trim().to_ascii_lowercase().as_str() {
        "i" | "ignore" => Some(MismatchResolution::Ignore),
        "r" | "retry" => Some(MismatchResolution::Retry),
        "a" | "abort" => Some(MismatchResolution::Abort),
        _ => None,
    }
}

pub fn parse_yes_no(answer: &str) -> Option<bool> {
    match answer.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Some(true),
        "n" | "no" => Some(false),
        _ => None,
    }
}
