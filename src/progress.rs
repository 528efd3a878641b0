//! Progress reporting for the startup index walk
//!
//! Provides real-time progress display using indicatif progress bars.

use crate::walker::{WalkProgress, WalkStats};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Progress reporter that displays walk status
pub struct ProgressReporter {
    bar: ProgressBar,
}

impl ProgressReporter {
    /// Create a new progress reporter
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();

        // Template is a literal; fall back to the default style rather than fail
        if let Ok(style) = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
        {
            bar.set_style(style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"));
        }

        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Update the progress display
    pub fn update(&self, progress: &WalkProgress) {
        self.bar.set_message(progress_message(progress));
    }

    /// Finish and clear the progress display
    pub fn finish_and_clear(&self) {
        self.bar.finish_and_clear();
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

fn progress_message(progress: &WalkProgress) -> String {
    format!(
        "Dirs: {} | With images: {} | Errors: {} | Rate: {:.0}/s | Queue: {}",
        format_number(progress.dirs_listed),
        format_number(progress.image_dirs),
        progress.errors,
        progress.dirs_per_second(),
        progress.pending,
    )
}

/// Format a number with thousands separators
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let bytes: Vec<_> = s.bytes().rev().collect();

    let chunks: Vec<String> = bytes
        .chunks(3)
        .map(|chunk| chunk.iter().rev().map(|&b| b as char).collect::<String>())
        .collect();

    chunks.into_iter().rev().collect::<Vec<_>>().join(",")
}

/// Print a summary of the index walk
pub fn print_summary(stats: &WalkStats) {
    let duration_secs = stats.duration.as_secs_f64();
    let rate = if duration_secs > 0.0 {
        stats.dirs_listed as f64 / duration_secs
    } else {
        0.0
    };

    println!();
    if stats.completed {
        println!("{}", style("Index Complete").green().bold());
    } else {
        println!("{}", style("Index Interrupted").yellow().bold());
    }
    println!("{}", style("─".repeat(50)).dim());
    println!(
        "  {} {}",
        style("Directories:").bold(),
        format_number(stats.dirs_listed)
    );
    println!(
        "  {} {}",
        style("With images:").bold(),
        format_number(stats.image_dirs)
    );
    println!(
        "  {} {}",
        style("Images seen:").bold(),
        format_number(stats.image_files)
    );
    println!(
        "  {} {:.1}s ({:.0} dirs/sec)",
        style("Duration:").bold(),
        duration_secs,
        rate
    );
    if stats.errors > 0 {
        println!(
            "  {} {}",
            style("Errors:").yellow().bold(),
            format_number(stats.errors)
        );
        if stats.session_errors > 0 {
            println!(
                "  {} {}",
                style("Session errors:").red().bold(),
                format_number(stats.session_errors)
            );
        }
        for failure in stats.failures.iter().take(5) {
            println!("    {}", style(failure).dim());
        }
        if stats.failures.len() > 5 {
            println!("    {}", style(format!("... and {} more", stats.failures.len() - 5)).dim());
        }
    }
    println!();
}

/// Print a header before the walk starts
pub fn print_header(source: &str, root: &str, workers: usize, bind: &str) {
    println!();
    println!(
        "{} {}",
        style("sftp-image-server").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Source:").bold(), source);
    println!("  {} {}", style("Root:").bold(), root);
    println!("  {} {}", style("Workers:").bold(), workers);
    println!("  {} {}", style("Listen:").bold(), bind);
    println!();
}
