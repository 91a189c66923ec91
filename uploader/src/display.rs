use indicatif::{ProgressBar, ProgressStyle};

use crate::constants::ACCENT_256;

/// Step progress bar pinned to the bottom of the terminal
///
/// External tools write straight to the console, so the bar is suspended
/// while one of them is running.
pub struct StepDisplay {
    pb: ProgressBar,
}

impl StepDisplay {
    pub fn new(total_steps: usize) -> Self {
        let pb = ProgressBar::new(total_steps as u64);
        let template = format!(
            "{{spinner:.{ACCENT_256}}} [{{pos}}/{{len}}] {{msg}} [{{bar:20.{ACCENT_256}}}] {{percent}}%"
        );
        if let Ok(style) = ProgressStyle::default_bar().template(&template) {
            pb.set_style(
                style
                    .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", " "])
                    .progress_chars("█░ "),
            );
        }
        pb.enable_steady_tick(std::time::Duration::from_millis(80));

        Self { pb }
    }

    /// A display that draws nothing
    #[cfg(test)]
    pub fn hidden() -> Self {
        Self {
            pb: ProgressBar::hidden(),
        }
    }

    pub fn update(&self, step: usize, description: &str) {
        self.pb.set_position(step as u64);
        self.pb.set_message(description.to_string());
    }

    /// Hide the bar while `f` owns the console, then restore it
    pub fn suspend<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        self.pb.suspend(f)
    }

    pub fn finish(&self) {
        self.pb.finish_and_clear();
    }
}
