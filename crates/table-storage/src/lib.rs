//! CSV storage for the table engine.

pub mod csv;

pub use csv::{read_csv, write_csv, CsvReadOptions, CsvWriteOptions};
