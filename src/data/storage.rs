//! CSV export of acquisition tables.
//!
//! Files start with a commented block of physical settings, followed by a
//! header row (`Time (s)` and one column per channel) and one record per row:
//!
//! ```text
//! # Physical settings:
//! #    board: 0
//! #    rate_hz: 1000
//! #
//! Time (s),ch0,ch1
//! 0,0.012,0.70
//! ```
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::data::table::Table;
use crate::error::{AppResult, DaqError};

/// Header of the time column.
pub const TIME_COLUMN: &str = "Time (s)";

/// Build `dir/data_<YYYY-MM-DD_HH-MM-SS>.csv`, creating `dir` if needed.
pub fn generate_file_name(dir: impl AsRef<Path>) -> AppResult<PathBuf> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;
    let stamp = chrono::Local::now().format("%Y-%m-%d_%H-%M-%S");
    Ok(dir.join(format!("data_{stamp}.csv")))
}

/// Writes a [`Table`] to a CSV file.
#[derive(Debug, Clone)]
pub struct CsvExporter {
    path: PathBuf,
    settings: Vec<(String, String)>,
    downsample: usize,
}

impl CsvExporter {
    /// Export to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            settings: Vec::new(),
            downsample: 1,
        }
    }

    /// Record a physical setting in the comment header.
    pub fn with_setting(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.settings.push((key.into(), value.to_string()));
        self
    }

    /// Keep only every `step`-th row.
    pub fn with_downsample(mut self, step: usize) -> Self {
        self.downsample = step.max(1);
        self
    }

    /// Target path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the table, replacing any existing file.
    ///
    /// Returns the number of data rows written.
    ///
    /// # Errors
    ///
    /// [`DaqError::Storage`] if the table has no rows, or on CSV/I/O failure.
    pub fn write(&self, table: &Table) -> AppResult<usize> {
        if table.is_empty() {
            return Err(DaqError::Storage("No data available to save".to_string()));
        }

        #[cfg(not(feature = "storage_csv"))]
        return Err(DaqError::FeatureNotEnabled("storage_csv".to_string()));

        #[cfg(feature = "storage_csv")]
        {
            let table = table.downsample(self.downsample);
            let mut file = File::create(&self.path)?;
            writeln!(file, "# Physical settings:")?;
            for (key, value) in &self.settings {
                writeln!(file, "#    {key}: {value}")?;
            }
            writeln!(file, "#")?;

            let mut writer = csv::Writer::from_writer(file);
            let mut header = vec![TIME_COLUMN.to_string()];
            header.extend(table.columns().iter().cloned());
            writer.write_record(&header)?;

            for row in table.rows() {
                let mut record = Vec::with_capacity(row.values.len() + 1);
                record.push(row.elapsed_secs().to_string());
                record.extend(row.values.iter().map(f64::to_string));
                writer.write_record(&record)?;
            }
            writer.flush()?;

            info!(path = %self.path.display(), rows = table.len(), "Data saved");
            Ok(table.len())
        }
    }
}
