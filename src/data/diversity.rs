//! Diversity measures: per-sample alpha values and pairwise beta distances.

use crate::error::{FmtError, Result};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

/// A scalar diversity value per sample.
#[derive(Debug, Clone)]
pub struct AlphaDiversity {
    /// Metric name (e.g. `shannon_entropy`).
    name: String,
    sample_ids: Vec<String>,
    values: Vec<f64>,
    index: HashMap<String, usize>,
}

impl AlphaDiversity {
    /// Create an alpha vector from `(sample_id, value)` pairs.
    pub fn new(name: &str, entries: Vec<(String, f64)>) -> Result<Self> {
        let mut sample_ids = Vec::with_capacity(entries.len());
        let mut values = Vec::with_capacity(entries.len());
        let mut index = HashMap::with_capacity(entries.len());
        for (id, value) in entries {
            if index.insert(id.clone(), sample_ids.len()).is_some() {
                return Err(FmtError::InvalidParameter(format!(
                    "Sample '{}' occurs more than once in the alpha diversity vector",
                    id
                )));
            }
            sample_ids.push(id);
            values.push(value);
        }
        Ok(Self {
            name: name.to_string(),
            sample_ids,
            values,
            index,
        })
    }

    /// Load from a two-column TSV (`id<TAB>value`) with a header row.
    ///
    /// The header of the value column becomes the metric name.
    pub fn from_tsv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .comment(Some(b'#'))
            .from_path(path)?;
        let name = reader
            .headers()?
            .get(1)
            .ok_or_else(|| FmtError::EmptyData("Alpha diversity file needs a value column".to_string()))?
            .to_string();

        let mut entries = Vec::new();
        for (row, record) in reader.records().enumerate() {
            let record = record?;
            let id = record.get(0).unwrap_or_default().to_string();
            let raw = record.get(1).unwrap_or_default();
            let value = raw.trim().parse::<f64>().map_err(|_| FmtError::InvalidValue {
                value: raw.to_string(),
                row,
                col: 1,
            })?;
            entries.push((id, value));
        }
        Self::new(&name, entries)
    }

    /// Metric name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Value for a sample.
    pub fn get(&self, sample_id: &str) -> Option<f64> {
        self.index.get(sample_id).map(|&i| self.values[i])
    }

    /// Sample IDs in order.
    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Pairwise distances keyed by unordered sample pairs.
///
/// Pairs may be stored in a single orientation; lookups resolve both.
#[derive(Debug, Clone)]
pub struct DistanceMatrix {
    name: String,
    ids: BTreeSet<String>,
    values: HashMap<(String, String), f64>,
}

impl DistanceMatrix {
    /// Build from `(a, b, distance)` triples.
    pub fn from_pairs(name: &str, pairs: Vec<(String, String, f64)>) -> Self {
        let mut ids = BTreeSet::new();
        let mut values = HashMap::with_capacity(pairs.len());
        for (a, b, d) in pairs {
            ids.insert(a.clone());
            ids.insert(b.clone());
            values.insert((a, b), d);
        }
        Self {
            name: name.to_string(),
            ids,
            values,
        }
    }

    /// Build from a square matrix, keeping only the upper triangle.
    pub fn from_square(name: &str, ids: Vec<String>, data: &[Vec<f64>]) -> Result<Self> {
        if data.len() != ids.len() {
            return Err(FmtError::DimensionMismatch {
                expected: ids.len(),
                actual: data.len(),
            });
        }
        if let Some(row) = data.iter().find(|row| row.len() != ids.len()) {
            return Err(FmtError::DimensionMismatch {
                expected: ids.len(),
                actual: row.len(),
            });
        }

        let mut pairs = Vec::with_capacity(ids.len() * ids.len().saturating_sub(1) / 2);
        for (i, row) in data.iter().enumerate() {
            for j in (i + 1)..ids.len() {
                if (row[j] - data[j][i]).abs() > 1e-12 {
                    return Err(FmtError::InvalidParameter(format!(
                        "Distance matrix is not symmetric at ({}, {})",
                        ids[i], ids[j]
                    )));
                }
                pairs.push((ids[i].clone(), ids[j].clone(), row[j]));
            }
        }
        let mut matrix = Self::from_pairs(name, pairs);
        matrix.ids.extend(ids);
        Ok(matrix)
    }

    /// Load a square lsmat TSV (header of IDs, one row per ID).
    pub fn from_tsv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .from_path(path)?;
        let ids: Vec<String> = reader
            .headers()?
            .iter()
            .skip(1)
            .map(|s| s.trim().to_string())
            .collect();

        let mut data = Vec::with_capacity(ids.len());
        for (row, record) in reader.records().enumerate() {
            let record = record?;
            let row_id = record.get(0).unwrap_or_default().trim();
            if ids.get(row).map(String::as_str) != Some(row_id) {
                return Err(FmtError::InvalidParameter(format!(
                    "Distance matrix row {} is '{}', expected the same order as the header",
                    row, row_id
                )));
            }
            let values = record
                .iter()
                .skip(1)
                .enumerate()
                .map(|(col, raw)| {
                    raw.trim().parse::<f64>().map_err(|_| FmtError::InvalidValue {
                        value: raw.to_string(),
                        row,
                        col: col + 1,
                    })
                })
                .collect::<Result<Vec<f64>>>()?;
            data.push(values);
        }
        Self::from_square("distance", ids, &data)
    }

    /// Metric name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rename the metric.
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Distance between two samples, in either orientation.
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        if a == b {
            return self.ids.contains(a).then_some(0.0);
        }
        let key = (a.to_string(), b.to_string());
        self.values.get(&key).copied().or_else(|| {
            let reversed = (key.1, key.0);
            self.values.get(&reversed).copied()
        })
    }

    /// Look up a pair after ordering its IDs lexically.
    pub fn get_sorted(&self, a: &str, b: &str) -> Option<f64> {
        let (first, second) = if a <= b { (a, b) } else { (b, a) };
        self.get(first, second)
    }

    /// Sample IDs in sorted order.
    pub fn ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.ids.iter().map(String::as_str)
    }

    /// Check if a sample is part of the matrix.
    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Number of stored pairs.
    pub fn n_pairs(&self) -> usize {
        self.values.len()
    }

    /// Check if no pairs are stored.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Either an alpha vector or a beta distance matrix.
#[derive(Debug, Clone)]
pub enum DiversityMeasure {
    Alpha(AlphaDiversity),
    Beta(DistanceMatrix),
}

impl DiversityMeasure {
    /// Metric name, used as the title of the `measure` column.
    pub fn name(&self) -> &str {
        match self {
            DiversityMeasure::Alpha(a) => a.name(),
            DiversityMeasure::Beta(b) => b.name(),
        }
    }

    /// Check if the measure holds no values.
    pub fn is_empty(&self) -> bool {
        match self {
            DiversityMeasure::Alpha(a) => a.is_empty(),
            DiversityMeasure::Beta(b) => b.is_empty(),
        }
    }

    /// Check if a sample belongs to the measure's universe.
    pub fn contains(&self, id: &str) -> bool {
        match self {
            DiversityMeasure::Alpha(a) => a.get(id).is_some(),
            DiversityMeasure::Beta(b) => b.contains(id),
        }
    }

    /// Whether this is a pairwise measure.
    pub fn is_beta(&self) -> bool {
        matches!(self, DiversityMeasure::Beta(_))
    }
}

impl From<AlphaDiversity> for DiversityMeasure {
    fn from(alpha: AlphaDiversity) -> Self {
        DiversityMeasure::Alpha(alpha)
    }
}

impl From<DistanceMatrix> for DiversityMeasure {
    fn from(beta: DistanceMatrix) -> Self {
        DiversityMeasure::Beta(beta)
    }
}
