//! Acquired data: snapshot tables and their export.
pub mod storage;
pub mod table;

pub use storage::{generate_file_name, CsvExporter};
pub use table::{Row, Table};
