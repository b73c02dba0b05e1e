//! Progress bars for the permutation loops.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

const PERMUTATION_TEMPLATE: &str =
    "{msg} [{elapsed_precise}] {wide_bar:.cyan/blue} {pos}/{len} ({eta})";

/// Bar over `permutations` draws, drawn only while info logging is enabled
#[must_use]
pub fn permutation_progress(permutations: usize, label: &str) -> ProgressBar {
    let target = if log::log_enabled!(log::Level::Info) {
        ProgressDrawTarget::stderr()
    } else {
        ProgressDrawTarget::hidden()
    };
    let pb = ProgressBar::with_draw_target(Some(permutations as u64), target);
    if let Ok(style) = ProgressStyle::with_template(PERMUTATION_TEMPLATE) {
        pb.set_style(style.progress_chars("=> "));
    }
    pb.set_message(label.to_string());
    pb
}

/// Leave `summary` in place of the label
pub fn finish_permutations(pb: &ProgressBar, summary: &str) {
    pb.finish_with_message(summary.to_string());
}
