//! Arrow data handling utilities
//!
//! Helpers for pulling typed values and join keys out of record batches.

pub mod array_utils;

pub use array_utils::{
    KeyValue, column_f64, column_index, column_keys, get_column, numeric_columns,
    required_f64,
};
