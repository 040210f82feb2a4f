//! Terminal progress for a running batch.
//!
//! [`BatchProgress`] renders a bar driven by [`BatchState`] updates, then a
//! colored summary with one line per failed item.

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::engine::BatchState;

/// Progress bar and summary for one batch run.
pub struct BatchProgress {
    // indicatif bar, one tick per settled job.
    pb: ProgressBar,
    // Summary style when every job succeeded.
    green: Style,
    // Failure lines, and the summary when every job failed.
    red: Style,
    // Summary style for a partial failure.
    yellow: Style,
}

impl BatchProgress {
    pub fn start(total: usize, label: &str) -> Self {
        let pb = ProgressBar::new(total as u64);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.cyan} {prefix} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        pb.set_style(style);
        pb.set_prefix(label.to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
        }
    }

    pub fn update<O>(&self, state: &BatchState<O>) {
        self.pb.set_length(state.total as u64);
        self.pb.set_position(state.completed as u64);
        self.pb.set_message(status_line(state));
    }

    /// Clear the bar and print the outcome of the run.
    pub fn finish<O>(&self, state: &BatchState<O>) {
        self.pb.finish_and_clear();
        let style = if state.failures.is_empty() {
            &self.green
        } else if state.successes.is_empty() {
            &self.red
        } else {
            &self.yellow
        };
        println!("  {} {}", style.apply_to("■"), state.summary());
        for failure in state.failures_by_index() {
            println!(
                "  {} item {}: {}",
                self.red.apply_to("✗"),
                failure.index + 1,
                failure.error
            );
        }
    }

    pub fn abandon(&self) {
        self.pb.abandon();
    }
}

/// "processing item k of N · ~P% (estimated)".
pub fn status_line<O>(state: &BatchState<O>) -> String {
    if state.total == 0 {
        return String::from("idle");
    }
    format!(
        "processing item {} of {} · ~{}% (estimated)",
        (state.current_index + 1).min(state.total),
        state.total,
        state.estimated_progress_percent
    )
}
