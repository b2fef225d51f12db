//! Terminal UI helpers for the command-line interface.
//!
//! Progress is drawn on stderr so that reports written to stdout stay
//! machine-readable.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use owo_colors::OwoColorize;
use std::io::IsTerminal;

use crate::models::VerificationStatus;
use crate::verify::{ProgressCallback, VerificationEvent};

/// Check if stdout is a terminal.
pub fn is_terminal() -> bool {
    std::io::stdout().is_terminal()
}

/// Status types for colored messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    Error,
    Warning,
    Info,
}

/// Icon for a message status.
pub fn status_icon(status: Status) -> &'static str {
    match status {
        Status::Success => "✓",
        Status::Error => "✗",
        Status::Warning => "⚠",
        Status::Info => "ℹ",
    }
}

/// Print a styled status message to stderr.
pub fn print_status(status: Status, msg: &str) {
    let icon = status_icon(status);
    match status {
        Status::Success => eprintln!("{} {}", icon.green().bold(), msg),
        Status::Error => eprintln!("{} {}", icon.red().bold(), msg),
        Status::Warning => eprintln!("{} {}", icon.yellow().bold(), msg),
        Status::Info => eprintln!("{} {}", icon.cyan().bold(), msg),
    }
}

/// Progress bar tracking a verification run
pub struct VerificationProgress {
    pb: ProgressBar,
}

impl VerificationProgress {
    /// Create a bar for `total` references; hidden when stderr is not a terminal
    pub fn new(total: usize) -> Self {
        let pb = ProgressBar::new(total as u64);
        if !std::io::stderr().is_terminal() {
            pb.set_draw_target(ProgressDrawTarget::hidden());
        }
        pb.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg} {bar:40.cyan/blue} {pos}/{len}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
                .progress_chars("█▓▒░ "),
        );
        pb.set_message("Verifying references");

        Self { pb }
    }

    /// Callback that advances this bar from orchestrator events
    pub fn callback(&self) -> ProgressCallback {
        let pb = self.pb.clone();
        std::sync::Arc::new(move |event: VerificationEvent| match event {
            VerificationEvent::Started {
                reference_index,
                total,
            } => {
                pb.set_length(total as u64);
                pb.set_message(format!("Verifying [{}]", reference_index));
            }
            VerificationEvent::Finished {
                reference_index,
                status,
                completed,
                ..
            } => {
                pb.set_position(completed as u64);
                if status != VerificationStatus::Verified {
                    pb.println(format!("  [{}] {}", reference_index, status));
                }
            }
        })
    }

    /// Finish the bar with a summary message
    pub fn finish(&self, verified: usize, total: usize) {
        self.pb
            .finish_with_message(format!("✓ {} of {} references verified", verified, total));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_icon() {
        assert_eq!(status_icon(Status::Success), "✓");
        assert_eq!(status_icon(Status::Error), "✗");
    }

    #[test]
    fn test_progress_callback_advances() {
        let progress = VerificationProgress::new(2);
        let callback = progress.callback();
        callback(VerificationEvent::Finished {
            reference_index: 1,
            status: VerificationStatus::Verified,
            completed: 1,
            total: 2,
        });
        assert_eq!(progress.pb.position(), 1);
    }
}
