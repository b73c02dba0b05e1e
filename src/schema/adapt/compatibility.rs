//! Which key column types can be reconciled, and how.

use arrow::datatypes::DataType;

use super::types::{AdaptationStrategy, TypeCompatibility};

/// `Utf8` or `LargeUtf8`
#[must_use]
pub const fn is_text(data_type: &DataType) -> bool {
    matches!(data_type, DataType::Utf8 | DataType::LargeUtf8)
}

/// Whether a column of type `from` can stand in for a key of type `to`
///
/// Tract identifiers arrive as integers from the census tables, as
/// zero-padded text from dBase attribute tables and as floats from
/// spreadsheets. Any of these converts to any other; booleans, dates and
/// nested types never do.
#[must_use]
pub fn check_type_compatibility(from: &DataType, to: &DataType) -> TypeCompatibility {
    let keylike = |t: &DataType| t.is_numeric() || is_text(t);
    if from == to {
        TypeCompatibility::Exact
    } else if keylike(from) && keylike(to) {
        TypeCompatibility::Compatible
    } else {
        TypeCompatibility::Incompatible
    }
}

/// Conversion that brings a column of type `from` to `to`, if any
#[must_use]
pub fn determine_adaptation_strategy(
    from: &DataType,
    to: &DataType,
) -> Option<AdaptationStrategy> {
    match check_type_compatibility(from, to) {
        TypeCompatibility::Exact => Some(AdaptationStrategy::Identity),
        TypeCompatibility::Incompatible => None,
        TypeCompatibility::Compatible => Some(match (is_text(from), is_text(to)) {
            (false, false) => AdaptationStrategy::NumericConversion,
            (true, false) => AdaptationStrategy::StringParsing,
            (_, true) => AdaptationStrategy::StringConversion,
        }),
    }
}
