//! Outcomes of comparing two key column types.

/// How far apart two column types are
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCompatibility {
    /// Same Arrow type
    Exact,
    /// Different types that [`cast_column`](super::cast_column) reconciles
    Compatible,
    /// No conversion leaves the values usable as keys
    Incompatible,
}

/// Conversion applied by [`convert_array`](super::convert_array)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdaptationStrategy {
    Identity,
    /// Arrow cast between integer and floating types
    NumericConversion,
    /// Trimmed text parsed as a number; anything unparsable is an error
    StringParsing,
    /// Values rendered as text
    StringConversion,
}
