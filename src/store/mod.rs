//! Result ingestion and aggregation
//!
//! The benchmark binaries append headerless CSV rows into the result
//! directory; the schema lives in a separate one-line `header` file, with
//! `compile_params` / `runtime_params` declaring the category subsets.
//! [`ResultTable`] concatenates the per-run files against the declared
//! schema, re-materializes `result.csv` / `concat.csv`, and exposes the
//! grouped/filtered views the plotting stage consumes.
//!
//! Row order across input files does not affect downstream correctness;
//! column alignment is checked exactly and a mismatched file is an ingest
//! error naming that file. Grouping key equality is exact (string/number
//! equality after parsing) and grouped output preserves first-appearance
//! order of each distinct key.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::{Error, Result};

/// One CSV cell: numeric if it parses as `f64`, categorical text otherwise.
#[derive(Debug, Clone)]
pub enum Value {
    /// Numeric cell.
    Num(f64),
    /// Categorical cell.
    Text(String),
}

impl Value {
    /// Parse a raw cell. Numbers win; anything else stays text.
    #[must_use]
    pub fn parse(cell: &str) -> Self {
        let trimmed = cell.trim();
        trimmed
            .parse::<f64>()
            .map_or_else(|_| Self::Text(trimmed.to_string()), Self::Num)
    }

    /// Numeric view of the cell, if it is numeric.
    #[must_use]
    pub const fn as_num(&self) -> Option<f64> {
        match self {
            Self::Num(n) => Some(*n),
            Self::Text(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Num(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            // Bit equality keeps NaN keys self-consistent with Hash.
            (Self::Num(a), Self::Num(b)) => a.to_bits() == b.to_bits(),
            (Self::Text(a), Self::Text(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Self::Num(n) => {
                state.write_u8(0);
                state.write_u64(n.to_bits());
            }
            Self::Text(s) => {
                state.write_u8(1);
                s.hash(state);
            }
        }
    }
}

/// Ordered rows plus the declared schema.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultTable {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl ResultTable {
    /// Create an empty table with the declared schema.
    #[must_use]
    pub const fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Declared column names, in order.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// All rows, in order.
    #[must_use]
    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    /// Number of rows.
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /// Append a row.
    ///
    /// # Errors
    ///
    /// `Error::Ingest` if the row does not have exactly the declared columns.
    pub fn push_row(&mut self, row: Vec<Value>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(Error::Ingest(format!(
                "row has {} cells, schema declares {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    /// Index of a named column.
    ///
    /// # Errors
    ///
    /// `Error::Ingest` if the column is not in the schema.
    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| Error::Ingest(format!("column not found: {name}")))
    }

    /// Read headerless per-run CSV files against the declared schema and
    /// concatenate their rows.
    ///
    /// # Errors
    ///
    /// `Error::Ingest` for a missing file or a row whose cell count does not
    /// match the schema (naming the file); `Error::Csv` for malformed CSV.
    pub fn ingest<P: AsRef<Path>>(paths: &[P], schema: &[String]) -> Result<Self> {
        let mut table = Self::new(schema.to_vec());
        for path in paths {
            let path = path.as_ref();
            if !path.is_file() {
                return Err(Error::Ingest(format!(
                    "missing result file: {}",
                    path.display()
                )));
            }
            debug!("ingesting {}", path.display());
            let mut reader = csv::ReaderBuilder::new()
                .has_headers(false)
                .flexible(true)
                .from_path(path)?;
            for record in reader.records() {
                let record = record?;
                if record.len() != schema.len() {
                    return Err(Error::Ingest(format!(
                        "{}: row has {} cells, schema declares {} columns",
                        path.display(),
                        record.len(),
                        schema.len()
                    )));
                }
                table.rows.push(record.iter().map(Value::parse).collect());
            }
        }
        Ok(table)
    }

    /// Collect the per-run `*.csv` files of a result directory, sorted by
    /// name. The re-materialized `result.csv` / `concat.csv` are excluded.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read.
    pub fn discover_csv(dir: &Path) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if path.extension().and_then(|e| e.to_str()) == Some("csv")
                && name != "result.csv"
                && name != "concat.csv"
            {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Parse a one-line comma-separated parameter file (`header`,
    /// `compile_params`, `runtime_params`).
    ///
    /// # Errors
    ///
    /// `Error::Ingest` if the file is missing or empty.
    pub fn read_params(path: &Path) -> Result<Vec<String>> {
        if !path.is_file() {
            return Err(Error::Ingest(format!(
                "missing parameter file: {}",
                path.display()
            )));
        }
        let line = std::fs::read_to_string(path)?;
        let columns: Vec<String> = line
            .lines()
            .next()
            .unwrap_or("")
            .split(',')
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
        if columns.is_empty() {
            return Err(Error::Ingest(format!(
                "empty parameter file: {}",
                path.display()
            )));
        }
        Ok(columns)
    }

    /// Re-materialize the merged rows as `result.csv` (rows only) and
    /// `concat.csv` (header line prepended) in `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if either file cannot be written.
    pub fn write_concat(&self, dir: &Path) -> Result<()> {
        let mut result = csv::Writer::from_path(dir.join("result.csv"))?;
        for row in &self.rows {
            result.write_record(row.iter().map(ToString::to_string))?;
        }
        result.flush()?;

        let mut concat = csv::Writer::from_path(dir.join("concat.csv"))?;
        concat.write_record(&self.columns)?;
        for row in &self.rows {
            concat.write_record(row.iter().map(ToString::to_string))?;
        }
        concat.flush()?;
        Ok(())
    }

    /// Combine rows sharing identical values across `group_columns` via
    /// column-wise numeric sum over every other column.
    ///
    /// Used both to merge per-core counters into per-configuration totals and
    /// to merge repeated trials. Output row order is first appearance of each
    /// distinct key; grouping never changes the grouping columns' values.
    ///
    /// # Errors
    ///
    /// `Error::Ingest` if a grouping column is not in the schema;
    /// `Error::Aggregation` if a summed column holds a non-numeric cell.
    pub fn group_and_sum(&self, group_columns: &[String]) -> Result<Self> {
        let group_idx: Vec<usize> = group_columns
            .iter()
            .map(|c| self.column_index(c))
            .collect::<Result<_>>()?;

        let mut out = Self::new(self.columns.clone());
        let mut seen: HashMap<Vec<Value>, usize> = HashMap::new();

        for row in &self.rows {
            let key: Vec<Value> = group_idx.iter().map(|&i| row[i].clone()).collect();
            if let Some(&at) = seen.get(&key) {
                let target = &mut out.rows[at];
                for (i, cell) in row.iter().enumerate() {
                    if group_idx.contains(&i) {
                        continue;
                    }
                    let (Some(acc), Some(add)) = (target[i].as_num(), cell.as_num()) else {
                        return Err(Error::Aggregation(format!(
                            "non-numeric cell in summed column '{}'",
                            self.columns[i]
                        )));
                    };
                    target[i] = Value::Num(acc + add);
                }
            } else {
                seen.insert(key, out.rows.len());
                out.rows.push(row.clone());
            }
        }
        Ok(out)
    }

    /// Keep only the rows whose `column` cell equals `value` (compared after
    /// parsing, so `"0.5"` matches a numeric `0.5`). Column order and cell
    /// types are preserved.
    ///
    /// # Errors
    ///
    /// `Error::Ingest` if the column is not in the schema.
    pub fn select_by(&self, column: &str, value: &str) -> Result<Self> {
        let idx = self.column_index(column)?;
        let needle = Value::parse(value);
        Ok(Self {
            columns: self.columns.clone(),
            rows: self
                .rows
                .iter()
                .filter(|row| row[idx] == needle)
                .cloned()
                .collect(),
        })
    }

    /// Rows sorted numerically by `column`. Ties keep their original order.
    ///
    /// # Errors
    ///
    /// `Error::Ingest` if the column is not in the schema;
    /// `Error::Aggregation` if a cell in the column is non-numeric.
    pub fn sort_by_numeric(&self, column: &str, descending: bool) -> Result<Self> {
        let idx = self.column_index(column)?;
        let mut keyed: Vec<(f64, &Vec<Value>)> = Vec::with_capacity(self.rows.len());
        for row in &self.rows {
            let key = row[idx].as_num().ok_or_else(|| {
                Error::Aggregation(format!("non-numeric cell in sort column '{column}'"))
            })?;
            keyed.push((key, row));
        }
        keyed.sort_by(|a, b| {
            let ord = a.0.total_cmp(&b.0);
            if descending {
                ord.reverse()
            } else {
                ord
            }
        });
        Ok(Self {
            columns: self.columns.clone(),
            rows: keyed.into_iter().map(|(_, row)| row.clone()).collect(),
        })
    }

    /// Distinct values of `column`, in first-appearance order.
    ///
    /// # Errors
    ///
    /// `Error::Ingest` if the column is not in the schema.
    pub fn distinct(&self, column: &str) -> Result<Vec<Value>> {
        let idx = self.column_index(column)?;
        let mut out: Vec<Value> = Vec::new();
        for row in &self.rows {
            if !out.contains(&row[idx]) {
                out.push(row[idx].clone());
            }
        }
        Ok(out)
    }
}
