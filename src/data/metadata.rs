//! Sample metadata with typed columns.

use crate::error::{FmtError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// A single metadata value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Numeric value (e.g. days post transplant).
    Numeric(f64),
    /// Categorical value (e.g. subject or donor ID).
    Categorical(String),
    /// Missing value.
    Missing,
}

impl Value {
    /// Check if this is a missing value.
    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }

    /// Try to get as categorical string.
    pub fn as_categorical(&self) -> Option<&str> {
        match self {
            Value::Categorical(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as numeric f64.
    pub fn as_numeric(&self) -> Option<f64> {
        match self {
            Value::Numeric(v) => Some(*v),
            _ => None,
        }
    }
}

/// Kind of a metadata column, fixed when the metadata is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnKind {
    Numeric,
    Categorical,
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnKind::Numeric => write!(f, "numeric"),
            ColumnKind::Categorical => write!(f, "categorical"),
        }
    }
}

/// One metadata column extracted by name, in metadata sample order.
#[derive(Debug, Clone)]
pub struct Column<T> {
    name: String,
    ids: Vec<String>,
    values: Vec<Option<T>>,
    index: HashMap<String, usize>,
}

impl<T> Column<T> {
    fn new(name: &str, entries: Vec<(String, Option<T>)>) -> Self {
        let mut ids = Vec::with_capacity(entries.len());
        let mut values = Vec::with_capacity(entries.len());
        let mut index = HashMap::with_capacity(entries.len());
        for (i, (id, value)) in entries.into_iter().enumerate() {
            index.insert(id.clone(), i);
            ids.push(id);
            values.push(value);
        }
        Self {
            name: name.to_string(),
            ids,
            values,
            index,
        }
    }

    /// Column name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Value for a sample; `None` when the sample is absent or the value missing.
    pub fn get(&self, sample_id: &str) -> Option<&T> {
        self.index
            .get(sample_id)
            .and_then(|&i| self.values[i].as_ref())
    }

    /// Iterate `(sample_id, value)` pairs in metadata order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&T>)> + '_ {
        self.ids
            .iter()
            .zip(self.values.iter())
            .map(|(id, v)| (id.as_str(), v.as_ref()))
    }

    /// Iterate only the non-missing entries.
    pub fn present(&self) -> impl Iterator<Item = (&str, &T)> + '_ {
        self.iter().filter_map(|(id, v)| v.map(|v| (id, v)))
    }

    /// Number of samples in the column (missing included).
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Check if the column has no samples.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Sample metadata: one row per sample, typed columns.
#[derive(Debug, Clone)]
pub struct Metadata {
    /// Header of the ID column.
    id_header: String,
    /// Sample IDs in order.
    sample_ids: Vec<String>,
    /// Column names.
    column_names: Vec<String>,
    /// Data stored as sample_id -> column_name -> Value.
    data: HashMap<String, HashMap<String, Value>>,
    /// Kind of each column.
    column_kinds: HashMap<String, ColumnKind>,
}

fn is_missing_token(raw: &str) -> bool {
    raw.is_empty() || raw == "NA" || raw == "na" || raw == "nan" || raw == "NaN"
}

/// Column kinds from a `#q2:types` row. Blank entries leave a column to inference.
fn parse_types_row(line: &str, column_names: &[String]) -> Result<HashMap<String, ColumnKind>> {
    let mut kinds = HashMap::new();
    for (col_idx, raw) in line.split('\t').skip(1).enumerate() {
        let Some(col_name) = column_names.get(col_idx) else {
            break;
        };
        let kind = match raw.trim().to_ascii_lowercase().as_str() {
            "" => continue,
            "numeric" => ColumnKind::Numeric,
            "categorical" => ColumnKind::Categorical,
            other => {
                return Err(FmtError::InvalidValue {
                    value: other.to_string(),
                    row: 1,
                    col: col_idx + 1,
                })
            }
        };
        kinds.insert(col_name.clone(), kind);
    }
    Ok(kinds)
}

impl Metadata {
    /// Build metadata from raw string cells.
    ///
    /// `rows` holds `(sample_id, values)` with one value per column. Column kinds
    /// are inferred: numeric when every non-missing value parses as a number.
    pub fn from_rows(
        id_header: &str,
        column_names: Vec<String>,
        rows: Vec<(String, Vec<String>)>,
    ) -> Result<Self> {
        Self::from_typed_rows(id_header, column_names, rows, &HashMap::new())
    }

    /// Like [`Metadata::from_rows`], but columns listed in `declared` take the
    /// given kind instead of an inferred one.
    pub fn from_typed_rows(
        id_header: &str,
        column_names: Vec<String>,
        rows: Vec<(String, Vec<String>)>,
        declared: &HashMap<String, ColumnKind>,
    ) -> Result<Self> {
        if rows.is_empty() {
            return Err(FmtError::EmptyData("No samples in metadata".to_string()));
        }

        let mut seen = HashSet::new();
        for (sample_id, _) in &rows {
            if !seen.insert(sample_id.as_str()) {
                return Err(FmtError::DuplicateSampleId(sample_id.clone()));
            }
        }

        let mut column_kinds = HashMap::new();
        for (col_idx, col_name) in column_names.iter().enumerate() {
            if let Some(&kind) = declared.get(col_name) {
                column_kinds.insert(col_name.clone(), kind);
                continue;
            }
            let all_numeric = rows.iter().all(|(_, values)| match values.get(col_idx) {
                None => true,
                Some(v) => {
                    let v = v.trim();
                    is_missing_token(v) || v.parse::<f64>().is_ok()
                }
            });
            let kind = if all_numeric {
                ColumnKind::Numeric
            } else {
                ColumnKind::Categorical
            };
            column_kinds.insert(col_name.clone(), kind);
        }

        let mut sample_ids = Vec::with_capacity(rows.len());
        let mut data = HashMap::with_capacity(rows.len());
        for (sample_id, values) in rows {
            let mut sample_data = HashMap::new();
            for (col_idx, col_name) in column_names.iter().enumerate() {
                let value = match values.get(col_idx).map(|v| v.trim()) {
                    None => Value::Missing,
                    Some(raw) if is_missing_token(raw) => Value::Missing,
                    Some(raw) => match column_kinds.get(col_name) {
                        Some(ColumnKind::Numeric) => raw
                            .parse::<f64>()
                            .map(Value::Numeric)
                            .unwrap_or(Value::Missing),
                        Some(ColumnKind::Categorical) | None => {
                            Value::Categorical(raw.to_string())
                        }
                    },
                };
                sample_data.insert(col_name.clone(), value);
            }
            sample_ids.push(sample_id.clone());
            data.insert(sample_id, sample_data);
        }

        Ok(Self {
            id_header: id_header.to_string(),
            sample_ids,
            column_names,
            data,
            column_kinds,
        })
    }

    /// Load metadata from a TSV file.
    ///
    /// Expected format:
    /// - First row: header with column names (first column is the sample ID header)
    /// - Subsequent rows: sample ID followed by values
    ///
    /// A `#q2:types` row directly after the header declares column kinds
    /// (`numeric` or `categorical`); undeclared columns are inferred. Other
    /// lines starting with `#` are skipped.
    pub fn from_tsv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut lines = reader.lines();

        let header_line = lines
            .next()
            .ok_or_else(|| FmtError::EmptyData("Empty metadata file".to_string()))??;
        let header: Vec<&str> = header_line.split('\t').collect();
        if header.len() < 2 {
            return Err(FmtError::EmptyData(
                "Metadata must have at least one column besides the ID column".to_string(),
            ));
        }
        let id_header = header[0].trim().to_string();
        let column_names: Vec<String> = header[1..].iter().map(|s| s.trim().to_string()).collect();

        let mut declared = HashMap::new();
        let mut rows = Vec::new();
        for (i, line_result) in lines.enumerate() {
            let line = line_result?;
            if i == 0 && line.starts_with("#q2:types") {
                declared = parse_types_row(&line, &column_names)?;
                continue;
            }
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            let sample_id = fields[0].trim().to_string();
            let values = fields[1..].iter().map(|s| s.to_string()).collect();
            rows.push((sample_id, values));
        }

        Self::from_typed_rows(&id_header, column_names, rows, &declared)
    }

    /// Override column kinds, re-interpreting existing values.
    ///
    /// Numeric values become their decimal rendering when forced categorical;
    /// categorical values that do not parse become missing when forced numeric.
    pub fn with_column_kinds(mut self, kinds: HashMap<String, ColumnKind>) -> Self {
        for (col_name, kind) in &kinds {
            if !self.column_kinds.contains_key(col_name) {
                continue;
            }
            self.column_kinds.insert(col_name.clone(), *kind);
            for sample_data in self.data.values_mut() {
                if let Some(value) = sample_data.get_mut(col_name) {
                    *value = match (&*value, kind) {
                        (Value::Categorical(s), ColumnKind::Numeric) => s
                            .trim()
                            .parse::<f64>()
                            .map(Value::Numeric)
                            .unwrap_or(Value::Missing),
                        (Value::Numeric(v), ColumnKind::Categorical) => {
                            Value::Categorical(v.to_string())
                        }
                        (other, _) => other.clone(),
                    };
                }
            }
        }
        self
    }

    /// Header of the ID column.
    pub fn id_header(&self) -> &str {
        &self.id_header
    }

    /// Sample IDs in order.
    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    /// Column names.
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    /// Number of samples.
    pub fn n_samples(&self) -> usize {
        self.sample_ids.len()
    }

    /// Get a value for a specific sample and column.
    pub fn get(&self, sample_id: &str, column: &str) -> Option<&Value> {
        self.data.get(sample_id).and_then(|m| m.get(column))
    }

    /// Kind of a column.
    pub fn column_kind(&self, column: &str) -> Option<ColumnKind> {
        self.column_kinds.get(column).copied()
    }

    /// Check if a sample exists.
    pub fn has_sample(&self, sample_id: &str) -> bool {
        self.data.contains_key(sample_id)
    }

    /// Check if a column exists.
    pub fn has_column(&self, column: &str) -> bool {
        self.column_kinds.contains_key(column)
    }

    /// Extract a column by name, checking it has the expected kind.
    pub fn get_column(&self, name: &str, expected: ColumnKind) -> Result<Column<Value>> {
        let found = self.column_kinds.get(name).copied().ok_or_else(|| {
            FmtError::ColumnNotFound {
                column: name.to_string(),
                is_id_column: name == self.id_header,
            }
        })?;
        if found != expected {
            return Err(FmtError::WrongColumnType {
                column: name.to_string(),
                expected,
                found,
            });
        }

        let entries = self
            .sample_ids
            .iter()
            .map(|sid| {
                let value = self
                    .get(sid, name)
                    .filter(|v| !v.is_missing())
                    .cloned();
                (sid.clone(), value)
            })
            .collect();
        Ok(Column::new(name, entries))
    }

    /// Extract a numeric column.
    pub fn numeric_column(&self, name: &str) -> Result<Column<f64>> {
        let column = self.get_column(name, ColumnKind::Numeric)?;
        let entries = column
            .iter()
            .map(|(id, v)| (id.to_string(), v.and_then(Value::as_numeric)))
            .collect();
        Ok(Column::new(name, entries))
    }

    /// Extract a categorical column.
    pub fn categorical_column(&self, name: &str) -> Result<Column<String>> {
        let column = self.get_column(name, ColumnKind::Categorical)?;
        let entries = column
            .iter()
            .map(|(id, v)| {
                (
                    id.to_string(),
                    v.and_then(Value::as_categorical).map(String::from),
                )
            })
            .collect();
        Ok(Column::new(name, entries))
    }

    /// Subset metadata to the given samples, preserving their given order.
    pub fn subset_samples(&self, sample_ids: &[String]) -> Result<Self> {
        let mut new_data = HashMap::with_capacity(sample_ids.len());
        let mut new_sample_ids = Vec::with_capacity(sample_ids.len());

        for sid in sample_ids {
            match self.data.get(sid) {
                Some(sample_data) => {
                    new_data.insert(sid.clone(), sample_data.clone());
                    new_sample_ids.push(sid.clone());
                }
                None => {
                    return Err(FmtError::InvalidParameter(format!(
                        "Sample '{}' not found in metadata",
                        sid
                    )))
                }
            }
        }

        Ok(Self {
            id_header: self.id_header.clone(),
            sample_ids: new_sample_ids,
            column_names: self.column_names.clone(),
            data: new_data,
            column_kinds: self.column_kinds.clone(),
        })
    }

    /// Keep only the samples for which `keep` returns true.
    pub fn filter_samples<F>(&self, keep: F) -> Result<Self>
    where
        F: Fn(&str) -> bool,
    {
        let kept: Vec<String> = self
            .sample_ids
            .iter()
            .filter(|sid| keep(sid))
            .cloned()
            .collect();
        self.subset_samples(&kept)
    }
}
