//! Module for bringing join keys from different sources to a common type.

pub mod compatibility;
pub mod conversions;
pub mod types;

pub use compatibility::{check_type_compatibility, determine_adaptation_strategy, is_text};
pub use conversions::{cast_column, convert_array};
pub use types::{AdaptationStrategy, TypeCompatibility};
