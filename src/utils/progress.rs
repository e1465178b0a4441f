//! Progress reporting for long corpus builds; becomes no-op when the `progress`
//! feature is disabled

#[cfg(feature = "progress")]
pub use indicatif::{ProgressBar, ProgressStyle};

#[cfg(not(feature = "progress"))]
pub use self::noop::ProgressBar;

#[cfg(feature = "progress")]
use std::time::Duration;

/// Byte-counting bar for reading an input file, hidden when `quiet`
#[cfg(feature = "progress")]
pub fn byte_bar(total_bytes: u64, message: &'static str, quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(total_bytes);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓▒░  "),
    );
    pb.set_message(message);
    pb
}

/// Indeterminate spinner, hidden when `quiet`
#[cfg(feature = "progress")]
pub fn spinner(message: &'static str, quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}

#[cfg(not(feature = "progress"))]
pub fn byte_bar(_total_bytes: u64, _message: &'static str, _quiet: bool) -> ProgressBar {
    ProgressBar::hidden()
}

#[cfg(not(feature = "progress"))]
pub fn spinner(_message: &'static str, _quiet: bool) -> ProgressBar {
    ProgressBar::hidden()
}

#[cfg(not(feature = "progress"))]
mod noop {
    use std::borrow::Cow;

    /// Stand-in for `indicatif::ProgressBar`; every bar is hidden
    pub struct ProgressBar;

    impl ProgressBar {
        pub fn hidden() -> Self {
            ProgressBar
        }

        pub fn inc(&self, _delta: u64) {}
        pub fn set_message(&self, _msg: impl Into<Cow<'static, str>>) {}
        pub fn finish_with_message(&self, _msg: impl Into<Cow<'static, str>>) {}
    }
}
