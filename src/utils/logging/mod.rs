//! Logging of file operations and progress of the permutation loops

pub mod log;
pub mod progress;

pub use self::log::{log_batch_summary, log_operation_complete, log_operation_start};
pub use progress::{finish_permutations, permutation_progress};
