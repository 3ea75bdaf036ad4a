//! Completeness rules for longitudinal sample metadata.
//!
//! A subject is complete when it has exactly one sample at every distinct
//! timepoint. Duplicate subject-timepoint entries are always an error; missing
//! timepoints are either an error or, on request, the subject is dropped.

use crate::data::Metadata;
use crate::error::{FmtError, Result};
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// How incomplete subjects and unwanted timepoints are handled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletenessPolicy {
    /// Drop subjects missing a sample at some timepoint instead of failing.
    #[serde(default)]
    pub drop_incomplete_subjects: bool,
    /// Timepoints whose samples are removed before any other check.
    #[serde(default)]
    pub drop_incomplete_timepoints: Vec<f64>,
}

/// Distinct values in ascending order.
pub(crate) fn distinct_sorted(values: impl IntoIterator<Item = f64>) -> Vec<f64> {
    let mut v: Vec<f64> = values.into_iter().collect();
    v.sort_by(|a, b| a.total_cmp(b));
    v.dedup();
    v
}

/// Remove every sample whose time value is one of `timepoints`.
///
/// Fails if a requested timepoint does not occur in the time column.
pub fn drop_timepoints(metadata: &Metadata, time_column: &str, timepoints: &[f64]) -> Result<Metadata> {
    if timepoints.is_empty() {
        return Ok(metadata.clone());
    }
    let time = metadata.numeric_column(time_column)?;
    let present = distinct_sorted(time.present().map(|(_, &t)| t));

    let absent: Vec<f64> = timepoints
        .iter()
        .copied()
        .filter(|t| !present.contains(t))
        .collect();
    if !absent.is_empty() {
        return Err(FmtError::TimepointNotFound(absent));
    }

    let dropped = time
        .present()
        .filter(|(_, t)| timepoints.contains(t))
        .count();
    info!(
        "Dropping {} samples at timepoints {:?} from '{}'",
        dropped, timepoints, time_column
    );

    metadata.filter_samples(|id| match time.get(id) {
        Some(t) => !timepoints.contains(t),
        None => true,
    })
}

/// Timepoints per subject, over samples with both a subject and a time value.
fn subject_timepoints(
    metadata: &Metadata,
    time_column: &str,
    subject_column: &str,
) -> Result<BTreeMap<String, Vec<f64>>> {
    let time = metadata.numeric_column(time_column)?;
    let subject = metadata.categorical_column(subject_column)?;

    let mut by_subject: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for (id, &t) in time.present() {
        if let Some(s) = subject.get(id) {
            by_subject.entry(s.clone()).or_default().push(t);
        }
    }
    Ok(by_subject)
}

/// Fail if any subject has more than one sample at the same timepoint.
pub fn check_duplicate_timepoints(
    metadata: &Metadata,
    time_column: &str,
    subject_column: &str,
) -> Result<()> {
    for (subject, timepoints) in subject_timepoints(metadata, time_column, subject_column)? {
        if distinct_sorted(timepoints.iter().copied()).len() != timepoints.len() {
            return Err(FmtError::DuplicateSubjectTimepoint {
                subject,
                timepoints,
            });
        }
    }
    Ok(())
}

/// Subjects lacking a sample at one of the distinct timepoints, sorted.
pub fn incomplete_subjects(
    metadata: &Metadata,
    time_column: &str,
    subject_column: &str,
) -> Result<Vec<String>> {
    let time = metadata.numeric_column(time_column)?;
    let n_timepoints = distinct_sorted(time.present().map(|(_, &t)| t)).len();

    Ok(subject_timepoints(metadata, time_column, subject_column)?
        .into_iter()
        .filter(|(_, timepoints)| distinct_sorted(timepoints.iter().copied()).len() < n_timepoints)
        .map(|(subject, _)| subject)
        .collect())
}

/// Drop or reject subjects that are missing timepoints.
///
/// Samples without a time value (e.g. donors) and samples without a subject are
/// kept as they are.
pub fn filter_incomplete_subjects(
    metadata: &Metadata,
    time_column: &str,
    subject_column: &str,
    drop: bool,
) -> Result<Metadata> {
    let incomplete = incomplete_subjects(metadata, time_column, subject_column)?;
    if incomplete.is_empty() {
        return Ok(metadata.clone());
    }
    if !drop {
        return Err(FmtError::IncompleteSubjects(incomplete));
    }

    let n_subjects = subject_timepoints(metadata, time_column, subject_column)?.len();
    if incomplete.len() == n_subjects {
        return Err(FmtError::EmptyData(format!(
            "All {} subjects are missing timepoints; nothing remains after dropping them",
            n_subjects
        )));
    }
    info!("Dropping incomplete subjects: {:?}", incomplete);

    let subject = metadata.categorical_column(subject_column)?;
    let incomplete: HashSet<String> = incomplete.into_iter().collect();
    metadata.filter_samples(|id| subject.get(id).map_or(true, |s| !incomplete.contains(s)))
}

/// Apply the full policy: timepoint removal, duplicate check, then (optionally)
/// the incomplete-subject rule.
pub fn apply_completeness(
    metadata: &Metadata,
    time_column: &str,
    subject_column: &str,
    policy: &CompletenessPolicy,
    check_subjects: bool,
) -> Result<Metadata> {
    let metadata = drop_timepoints(metadata, time_column, &policy.drop_incomplete_timepoints)?;
    check_duplicate_timepoints(&metadata, time_column, subject_column)?;
    if check_subjects {
        filter_incomplete_subjects(
            &metadata,
            time_column,
            subject_column,
            policy.drop_incomplete_subjects,
        )
    } else {
        Ok(metadata)
    }
}
