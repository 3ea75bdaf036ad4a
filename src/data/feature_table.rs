//! Sparse feature table and presence/absence views for engraftment analysis.

use crate::error::{FmtError, Result};
use nalgebra::DMatrix;
use sprs::{CsMat, TriMat};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// A sparse feature table of observed frequencies.
///
/// Rows represent samples, columns represent features (strains, ASVs, MAGs).
/// Stored in CSR format so that a sample's features are one outer view.
#[derive(Debug, Clone)]
pub struct FeatureTable {
    /// Sparse matrix in CSR format (samples × features)
    data: CsMat<f64>,
    sample_ids: Vec<String>,
    feature_ids: Vec<String>,
    sample_index: HashMap<String, usize>,
}

impl FeatureTable {
    /// Create a new FeatureTable from a sparse matrix and identifiers.
    pub fn new(data: CsMat<f64>, sample_ids: Vec<String>, feature_ids: Vec<String>) -> Result<Self> {
        let (nrows, ncols) = data.shape();
        if nrows != sample_ids.len() {
            return Err(FmtError::DimensionMismatch {
                expected: nrows,
                actual: sample_ids.len(),
            });
        }
        if ncols != feature_ids.len() {
            return Err(FmtError::DimensionMismatch {
                expected: ncols,
                actual: feature_ids.len(),
            });
        }
        let mut sample_index = HashMap::with_capacity(sample_ids.len());
        for (i, sid) in sample_ids.iter().enumerate() {
            if sample_index.insert(sid.clone(), i).is_some() {
                return Err(FmtError::InvalidParameter(format!(
                    "Sample '{}' occurs more than once in the feature table",
                    sid
                )));
            }
        }
        Ok(Self {
            data: if data.is_csr() { data } else { data.to_csr() },
            sample_ids,
            feature_ids,
            sample_index,
        })
    }

    /// Create from a dense matrix (samples × features).
    pub fn from_dense(
        data: &DMatrix<f64>,
        sample_ids: Vec<String>,
        feature_ids: Vec<String>,
    ) -> Result<Self> {
        let (nrows, ncols) = data.shape();
        let mut tri_mat = TriMat::new((nrows, ncols));
        for row in 0..nrows {
            for col in 0..ncols {
                let val = data[(row, col)];
                if val != 0.0 {
                    tri_mat.add_triplet(row, col, val);
                }
            }
        }
        Self::new(tri_mat.to_csr(), sample_ids, feature_ids)
    }

    /// Load a feature table from a TSV file.
    ///
    /// Expected format (as exported from BIOM):
    /// - Optional leading comment line (`# Constructed from biom file`)
    /// - Header: feature ID header followed by sample IDs
    /// - Subsequent rows: feature ID followed by frequencies
    pub fn from_tsv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut lines = reader
            .lines()
            .filter(|l| l.as_ref().map_or(true, |l| !l.starts_with("# ")));

        let header_line = lines
            .next()
            .ok_or_else(|| FmtError::EmptyData("Empty TSV file".to_string()))??;
        let header: Vec<&str> = header_line.split('\t').collect();
        if header.len() < 2 {
            return Err(FmtError::EmptyData(
                "TSV must have at least one sample".to_string(),
            ));
        }
        let sample_ids: Vec<String> = header[1..].iter().map(|s| s.trim().to_string()).collect();
        let n_samples = sample_ids.len();

        // Transposed on the way in: file rows are features.
        let mut triplets: Vec<(usize, usize, f64)> = Vec::new();
        let mut feature_ids: Vec<String> = Vec::new();

        for line_result in lines {
            let line = line_result?;
            if line.trim().is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            let feature_idx = feature_ids.len();
            feature_ids.push(fields[0].trim().to_string());

            for (sample_idx, value_str) in fields[1..].iter().enumerate().take(n_samples) {
                let value: f64 = value_str.trim().parse().map_err(|_| FmtError::InvalidValue {
                    value: value_str.to_string(),
                    row: feature_idx,
                    col: sample_idx,
                })?;
                if value != 0.0 {
                    triplets.push((sample_idx, feature_idx, value));
                }
            }
        }

        let n_features = feature_ids.len();
        if n_features == 0 {
            return Err(FmtError::EmptyData("No features in TSV".to_string()));
        }

        let mut tri_mat = TriMat::new((n_samples, n_features));
        for (row, col, val) in triplets {
            tri_mat.add_triplet(row, col, val);
        }

        Self::new(tri_mat.to_csr(), sample_ids, feature_ids)
    }

    /// Write the table to a TSV file (features as rows).
    pub fn to_tsv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        write!(writer, "feature_id")?;
        for sample_id in &self.sample_ids {
            write!(writer, "\t{}", sample_id)?;
        }
        writeln!(writer)?;

        for (col, feature_id) in self.feature_ids.iter().enumerate() {
            write!(writer, "{}", feature_id)?;
            for row in 0..self.n_samples() {
                write!(writer, "\t{}", self.get(row, col))?;
            }
            writeln!(writer)?;
        }

        Ok(())
    }

    /// Get the value at (sample, feature), returning 0 for missing entries.
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data.get(row, col).copied().unwrap_or(0.0)
    }

    /// Number of samples (rows).
    pub fn n_samples(&self) -> usize {
        self.sample_ids.len()
    }

    /// Number of features (columns).
    pub fn n_features(&self) -> usize {
        self.feature_ids.len()
    }

    /// Sample IDs.
    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    /// Feature IDs.
    pub fn feature_ids(&self) -> &[String] {
        &self.feature_ids
    }

    /// Check if a sample is present.
    pub fn has_sample(&self, sample_id: &str) -> bool {
        self.sample_index.contains_key(sample_id)
    }

    /// Presence/absence rows (value > 0) for the given samples, in the given order.
    ///
    /// Every requested sample must be present; misses are reported together.
    pub fn presence(&self, sample_ids: &[String]) -> Result<PresenceMatrix> {
        let missing: Vec<String> = sample_ids
            .iter()
            .filter(|sid| !self.has_sample(sid))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(FmtError::SamplesNotInTable(missing));
        }

        let mut data = DMatrix::<u8>::zeros(sample_ids.len(), self.n_features());
        for (new_row, sid) in sample_ids.iter().enumerate() {
            let row = self.sample_index[sid];
            if let Some(row_vec) = self.data.outer_view(row) {
                for (col, &val) in row_vec.iter() {
                    if val > 0.0 {
                        data[(new_row, col)] = 1;
                    }
                }
            }
        }

        Ok(PresenceMatrix {
            row_ids: sample_ids.to_vec(),
            feature_ids: self.feature_ids.clone(),
            data,
        })
    }
}

/// Dense 0/1 presence matrix (rows × features) with row labels.
#[derive(Debug, Clone, PartialEq)]
pub struct PresenceMatrix {
    row_ids: Vec<String>,
    feature_ids: Vec<String>,
    data: DMatrix<u8>,
}

impl PresenceMatrix {
    /// Build from parts; the matrix shape must match the labels.
    pub fn new(row_ids: Vec<String>, feature_ids: Vec<String>, data: DMatrix<u8>) -> Result<Self> {
        if data.nrows() != row_ids.len() {
            return Err(FmtError::DimensionMismatch {
                expected: data.nrows(),
                actual: row_ids.len(),
            });
        }
        if data.ncols() != feature_ids.len() {
            return Err(FmtError::DimensionMismatch {
                expected: data.ncols(),
                actual: feature_ids.len(),
            });
        }
        Ok(Self {
            row_ids,
            feature_ids,
            data,
        })
    }

    /// Row labels.
    pub fn row_ids(&self) -> &[String] {
        &self.row_ids
    }

    /// Feature labels.
    pub fn feature_ids(&self) -> &[String] {
        &self.feature_ids
    }

    /// Underlying 0/1 matrix.
    pub fn data(&self) -> &DMatrix<u8> {
        &self.data
    }

    /// Number of rows.
    pub fn nrows(&self) -> usize {
        self.data.nrows()
    }

    /// Present-feature count per row.
    pub fn row_counts(&self) -> Vec<usize> {
        self.data
            .row_iter()
            .map(|row| row.iter().map(|&v| v as usize).sum())
            .collect()
    }

    /// Present count per feature column.
    pub fn col_counts(&self) -> Vec<usize> {
        self.data
            .column_iter()
            .map(|col| col.iter().map(|&v| v as usize).sum())
            .collect()
    }

    /// Elementwise AND with another matrix of the same shape.
    pub fn and(&self, other: &PresenceMatrix) -> Result<PresenceMatrix> {
        if self.data.shape() != other.data.shape() {
            return Err(FmtError::DimensionMismatch {
                expected: self.data.len(),
                actual: other.data.len(),
            });
        }
        Ok(PresenceMatrix {
            row_ids: self.row_ids.clone(),
            feature_ids: self.feature_ids.clone(),
            data: self.data.component_mul(&other.data),
        })
    }
}
