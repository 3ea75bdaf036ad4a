//! Stouffer's inverse-normal combination of p-values.

use crate::error::{FmtError, Result};
use statrs::distribution::{ContinuousCDF, Normal};

/// Combined Z-statistic and p-value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StoufferResult {
    pub statistic: f64,
    pub p_value: f64,
}

/// Combine one-sided p-values: `Z = sum(Phi^-1(1 - p_i)) / sqrt(k)` and
/// `p = 1 - Phi(Z)`.
///
/// A p-value of 1 maps to `-inf`, which makes the combined p-value 1.
pub fn combine_stouffer(p_values: &[f64]) -> Result<StoufferResult> {
    if p_values.is_empty() {
        return Err(FmtError::EmptyData(
            "No p-values to combine".to_string(),
        ));
    }
    if let Some(p) = p_values.iter().find(|p| !(0.0..=1.0).contains(*p)) {
        return Err(FmtError::InvalidParameter(format!(
            "p-values must lie in [0, 1], got {}",
            p
        )));
    }

    let normal = Normal::new(0.0, 1.0)
        .map_err(|e| FmtError::InvalidParameter(format!("Normal distribution: {}", e)))?;

    let sum: f64 = p_values
        .iter()
        .map(|&p| normal.inverse_cdf(1.0 - p))
        .sum();
    let statistic = sum / (p_values.len() as f64).sqrt();

    let p_value = if statistic.is_nan() {
        // +inf and -inf together; no evidence either way
        1.0
    } else {
        normal.sf(statistic)
    };

    Ok(StoufferResult { statistic, p_value })
}
