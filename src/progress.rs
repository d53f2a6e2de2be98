//! Operator status line: a single count bar redrawn in place.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Running and pending blobs by category, plus finished count.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub running_whole: usize,
    pub running_range: usize,
    pub pending_whole: usize,
    pub pending_range: usize,
    pub completed: usize,
}

impl StatusCounts {
    pub fn running(&self) -> usize { self.running_whole + self.running_range }
    pub fn pending(&self) -> usize { self.pending_whole + self.pending_range }

    pub fn message(&self) -> String {
        format!(
            "running {} (whole {} / range {}) | pending {} (whole {} / range {})",
            self.running(),
            self.running_whole,
            self.running_range,
            self.pending(),
            self.pending_whole,
            self.pending_range
        )
    }
}

pub struct StatusLine {
    pb: ProgressBar,
}

impl StatusLine {
    pub fn new(total: u64, visible: bool) -> Self {
        if !visible {
            return Self { pb: ProgressBar::hidden() };
        }
        let pb = ProgressBar::new(total);
        let style = ProgressStyle::with_template(
            "{spinner:.green} {pos}/{len} [{bar:30.cyan/blue}] {msg}  elapsed: {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ");
        pb.set_style(style);
        pb.enable_steady_tick(Duration::from_millis(100));
        Self { pb }
    }

    pub fn update(&self, counts: &StatusCounts) {
        self.pb.set_position(counts.completed as u64);
        self.pb.set_message(counts.message());
    }

    pub fn finish(&self, msg: impl Into<String>) {
        self.pb.finish_with_message(msg.into());
    }

    /// Leave the last state on screen after a failure.
    pub fn abandon(&self, msg: impl Into<String>) {
        self.pb.abandon_with_message(msg.into());
    }
}
