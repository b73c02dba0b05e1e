//! Column type handling shared by the readers and the joins.

pub mod adapt;

pub use adapt::{
    AdaptationStrategy, TypeCompatibility, cast_column, check_type_compatibility, convert_array,
};
