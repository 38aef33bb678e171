//! Progress bar utilities for CLI operations
//!
//! The bar draws to stderr and stays hidden when stderr is not a terminal.

use indicatif::{ProgressBar, ProgressStyle};

const RUN_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} jobs {msg}";

/// Create a progress bar counting finished jobs
pub fn create_run_progress(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::default_bar().template(RUN_TEMPLATE) {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb.enable_steady_tick(std::time::Duration::from_millis(120));
    pb
}
