//! Proportional engraftment (PEDS) and persistence (PPRS).
//!
//! Both statistics compare feature presence (value > 0) between a recipient
//! sample and its reference: the donor for PEDS, the subject's own baseline
//! sample for PPRS. The measure is the fraction of reference features that are
//! also present in the recipient.
//!
//! # Example
//!
//! ```ignore
//! use composable_fmt::engraftment::{compute_peds, PedsLevel, PedsParams};
//!
//! let params = PedsParams::new("week", "donor", "subject");
//! let peds = compute_peds(&table, &metadata, &params, PedsLevel::Sample)?;
//! ```

pub(crate) mod matrix;
pub(crate) mod peds;
mod pprs;

pub use peds::compute_peds;
pub use pprs::compute_pprs;

use crate::filter::CompletenessPolicy;
use serde::{Deserialize, Serialize};

/// Whether PEDS is reported per recipient sample or per feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PedsLevel {
    Sample,
    Feature,
}

/// Parameters for [`compute_peds`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PedsParams {
    pub time_column: String,
    pub reference_column: String,
    pub subject_column: String,
    #[serde(default)]
    pub filter_missing_references: bool,
    #[serde(default)]
    pub drop_incomplete_subjects: bool,
    #[serde(default)]
    pub drop_incomplete_timepoints: Vec<f64>,
}

impl PedsParams {
    pub fn new(time_column: &str, reference_column: &str, subject_column: &str) -> Self {
        Self {
            time_column: time_column.to_string(),
            reference_column: reference_column.to_string(),
            subject_column: subject_column.to_string(),
            filter_missing_references: false,
            drop_incomplete_subjects: false,
            drop_incomplete_timepoints: Vec::new(),
        }
    }

    pub fn filter_missing_references(mut self, filter: bool) -> Self {
        self.filter_missing_references = filter;
        self
    }

    pub fn drop_incomplete_subjects(mut self, drop: bool) -> Self {
        self.drop_incomplete_subjects = drop;
        self
    }

    pub fn drop_incomplete_timepoints(mut self, timepoints: Vec<f64>) -> Self {
        self.drop_incomplete_timepoints = timepoints;
        self
    }

    pub fn completeness(&self) -> CompletenessPolicy {
        CompletenessPolicy {
            drop_incomplete_subjects: self.drop_incomplete_subjects,
            drop_incomplete_timepoints: self.drop_incomplete_timepoints.clone(),
        }
    }
}

/// Parameters for [`compute_pprs`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PprsParams {
    pub time_column: String,
    pub baseline_timepoint: f64,
    pub subject_column: String,
    #[serde(default)]
    pub filter_missing_references: bool,
    #[serde(default)]
    pub drop_incomplete_subjects: bool,
    #[serde(default)]
    pub drop_incomplete_timepoints: Vec<f64>,
}

impl PprsParams {
    pub fn new(time_column: &str, baseline_timepoint: f64, subject_column: &str) -> Self {
        Self {
            time_column: time_column.to_string(),
            baseline_timepoint,
            subject_column: subject_column.to_string(),
            filter_missing_references: false,
            drop_incomplete_subjects: false,
            drop_incomplete_timepoints: Vec::new(),
        }
    }

    pub fn filter_missing_references(mut self, filter: bool) -> Self {
        self.filter_missing_references = filter;
        self
    }

    pub fn drop_incomplete_subjects(mut self, drop: bool) -> Self {
        self.drop_incomplete_subjects = drop;
        self
    }

    /// Timepoints removed before references are resolved.
    pub fn drop_incomplete_timepoints(mut self, timepoints: Vec<f64>) -> Self {
        self.drop_incomplete_timepoints = timepoints;
        self
    }

    pub fn completeness(&self) -> CompletenessPolicy {
        CompletenessPolicy {
            drop_incomplete_subjects: self.drop_incomplete_subjects,
            drop_incomplete_timepoints: self.drop_incomplete_timepoints.clone(),
        }
    }
}
