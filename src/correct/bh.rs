//! Benjamini-Hochberg false discovery rate control across a family of tests.
//!
//! In the permutation test each recipient sample is one test, so the family is
//! every recipient with a defined engraftment value.

use crate::error::{FmtError, Result};
use serde::{Deserialize, Serialize};

/// q-values for a family of tests, in the order the tests were given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BhCorrected {
    /// Test labels, e.g. recipient sample IDs.
    pub ids: Vec<String>,
    pub p_values: Vec<f64>,
    pub q_values: Vec<f64>,
}

impl BhCorrected {
    /// Number of tests in the family.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// q-value of the test labelled `id`.
    pub fn q_value(&self, id: &str) -> Option<f64> {
        self.ids
            .iter()
            .zip(&self.q_values)
            .find(|(test, _)| *test == id)
            .map(|(_, &q)| q)
    }

    /// Labels of the tests with a q-value below `alpha`, in input order.
    pub fn discoveries(&self, alpha: f64) -> Vec<&str> {
        self.ids
            .iter()
            .zip(&self.q_values)
            .filter(|&(_, &q)| q < alpha)
            .map(|(id, _)| id.as_str())
            .collect()
    }
}

/// Step-up q-values: the p-value of rank `k` (of `m`, ascending) becomes
/// `min over j >= k of p(j) * m / j`, capped at 1. Output follows input order.
pub fn bh_qvalues(p_values: &[f64]) -> Vec<f64> {
    let m = p_values.len();
    let mut order: Vec<usize> = (0..m).collect();
    order.sort_by(|&a, &b| p_values[a].total_cmp(&p_values[b]));

    let mut q_values = vec![0.0; m];
    let mut running = 1.0_f64;
    for (rank, &idx) in order.iter().enumerate().rev() {
        running = running.min(p_values[idx] * m as f64 / (rank + 1) as f64);
        q_values[idx] = running;
    }
    q_values
}

/// Correct one family of labelled p-values.
///
/// Fails with [`FmtError::DimensionMismatch`] when labels and p-values differ
/// in length.
pub fn correct_bh(p_values: &[f64], ids: &[String]) -> Result<BhCorrected> {
    if ids.len() != p_values.len() {
        return Err(FmtError::DimensionMismatch {
            expected: p_values.len(),
            actual: ids.len(),
        });
    }
    Ok(BhCorrected {
        ids: ids.to_vec(),
        p_values: p_values.to_vec(),
        q_values: bh_qvalues(p_values),
    })
}
