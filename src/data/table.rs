//! Read-only tables of sampled rows.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// One sampling cycle: elapsed time since `start` and one value per channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    /// Time since the session was started
    pub elapsed: Duration,
    /// Values in column order, in volts
    pub values: Vec<f64>,
}

impl Row {
    /// Elapsed time in seconds.
    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }
}

/// Snapshot of a session buffer.
///
/// Columns are channel names in ascending channel-index order. Every row has
/// exactly one value per column.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl Table {
    /// Build a table from column names and rows.
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        debug_assert!(rows.iter().all(|r| r.values.len() == columns.len()));
        Self { columns, rows }
    }

    /// Column names.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Rows in acquisition order.
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True if no rows were captured.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column by name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// All values of one column.
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|r| r.values[idx]).collect())
    }

    /// Value at `row` for column `name`.
    pub fn value(&self, row: usize, name: &str) -> Option<f64> {
        let idx = self.column_index(name)?;
        self.rows.get(row).map(|r| r.values[idx])
    }

    /// Row timestamps in seconds.
    pub fn times_secs(&self) -> Vec<f64> {
        self.rows.iter().map(Row::elapsed_secs).collect()
    }

    /// Keep every `step`-th row, starting with the first. A step of 0 is
    /// treated as 1.
    #[must_use]
    pub fn downsample(&self, step: usize) -> Table {
        let step = step.max(1);
        Table {
            columns: self.columns.clone(),
            rows: self.rows.iter().step_by(step).cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> Table {
        let rows = (0..5)
            .map(|i| Row {
                elapsed: Duration::from_millis(i * 10),
                values: vec![i as f64, -(i as f64)],
            })
            .collect();
        Table::new(vec!["ch0".into(), "ch1".into()], rows)
    }

    #[test]
    fn column_access_by_name() {
        let t = table();
        assert_eq!(t.column("ch1").unwrap(), vec![0.0, -1.0, -2.0, -3.0, -4.0]);
        assert_eq!(t.value(3, "ch0"), Some(3.0));
        assert_eq!(t.value(9, "ch0"), None);
        assert!(t.column("missing").is_none());
    }

    #[test]
    fn times_in_seconds() {
        let t = table();
        assert_eq!(t.times_secs()[2], 0.02);
    }

    #[test]
    fn downsample_keeps_first_and_every_nth() {
        let t = table();
        let d = t.downsample(2);
        assert_eq!(d.len(), 3);
        assert_eq!(d.column("ch0").unwrap(), vec![0.0, 2.0, 4.0]);
        assert_eq!(t.downsample(0), t);
    }

    #[test]
    fn empty_table() {
        let t = Table::new(vec!["a".into()], Vec::new());
        assert!(t.is_empty());
        assert_eq!(t.column("a").unwrap(), Vec::<f64>::new());
    }
}
