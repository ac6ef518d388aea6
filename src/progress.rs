//! Progress reporting for apply runs

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use blueprint::{ChangeStatus, ProgressCallback, Urn};

const TEMPLATE: &str = "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}";

/// Drives one progress bar across every level of a plan
pub struct LevelProgress {
    bar: ProgressBar,
    quiet: bool,
}

impl LevelProgress {
    pub fn new(total: usize, quiet: bool) -> Self {
        let bar = if quiet {
            ProgressBar::hidden()
        } else {
            ProgressBar::new(total as u64)
        };
        let style = ProgressStyle::default_bar()
            .template(TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-");
        bar.set_style(style);
        Self { bar, quiet }
    }

    /// Clear the bar once the run is over
    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressCallback for LevelProgress {
    fn on_level_start(&mut self, level: usize, count: usize) {
        self.bar.set_message(format!("level {level} ({count} changes)"));
    }

    fn on_change_complete(&mut self, urn: &Urn, status: &ChangeStatus) {
        if !self.quiet {
            match status {
                ChangeStatus::Applied => {}
                ChangeStatus::Failed { error } => self.bar.suspend(|| {
                    eprintln!("  {} {} ({})", "✗".red(), urn, error);
                }),
                ChangeStatus::Skipped { reason } => self.bar.suspend(|| {
                    eprintln!("  {} {} ({})", "⊘".yellow(), urn, reason.dimmed());
                }),
            }
        }
        self.bar.inc(1);
    }

    fn on_level_complete(&mut self, level: usize) {
        log::debug!("Level {level} complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_every_change() {
        let mut progress = LevelProgress::new(3, true);
        let urn: Urn = "urn::ABC123:role/ANALYST".parse().unwrap();
        progress.on_level_start(0, 3);
        progress.on_change_complete(&urn, &ChangeStatus::Applied);
        progress.on_change_complete(&urn, &ChangeStatus::Failed { error: "boom".into() });
        progress.on_change_complete(&urn, &ChangeStatus::Skipped { reason: "dep".into() });
        progress.on_level_complete(0);
        assert_eq!(progress.bar.position(), 3);
        progress.finish();
    }
}
