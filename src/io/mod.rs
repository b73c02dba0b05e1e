//! Reading and writing the input layers, tables and outputs.

pub mod tabular;
pub mod vector;

pub use tabular::{mask_sentinel, read_csv, read_csv_headerless, read_table, read_xlsx, write_csv};
pub use vector::{read_shapefile, write_shapefile};
