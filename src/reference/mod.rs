//! Reference resolution: which sample each recipient is compared against.
//!
//! Two modes are supported:
//!
//! - **donor**: the reference is read from a categorical metadata column
//!   (e.g. the donor that supplied the transplant);
//! - **baseline**: the reference is the subject's own sample at a baseline
//!   timepoint, found by grouping samples by subject.
//!
//! # Example
//!
//! ```ignore
//! use composable_fmt::reference::{resolve_references, ReferenceParams};
//!
//! let params = ReferenceParams::donor("days_post_transplant", "relevant_donor");
//! let references = resolve_references(&metadata, &params)?;
//! ```

use crate::data::Metadata;
use crate::error::{FmtError, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

/// What each recipient sample is compared against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceTo {
    /// An explicit reference column (donor).
    Donor,
    /// The subject's sample at the baseline timepoint.
    Baseline,
}

impl fmt::Display for DistanceTo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DistanceTo::Donor => write!(f, "donor"),
            DistanceTo::Baseline => write!(f, "baseline"),
        }
    }
}

impl FromStr for DistanceTo {
    type Err = FmtError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "donor" => Ok(DistanceTo::Donor),
            "baseline" => Ok(DistanceTo::Baseline),
            other => Err(FmtError::InvalidParameter(format!(
                "distance_to must be 'donor' or 'baseline', got '{}'",
                other
            ))),
        }
    }
}

/// Parameters for [`resolve_references`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceParams {
    pub distance_to: DistanceTo,
    pub time_column: String,
    #[serde(default)]
    pub reference_column: Option<String>,
    #[serde(default)]
    pub baseline_timepoint: Option<f64>,
    #[serde(default)]
    pub subject_column: Option<String>,
    #[serde(default)]
    pub filter_missing_references: bool,
}

impl ReferenceParams {
    /// Distance-to-donor parameters.
    pub fn donor(time_column: &str, reference_column: &str) -> Self {
        Self {
            distance_to: DistanceTo::Donor,
            time_column: time_column.to_string(),
            reference_column: Some(reference_column.to_string()),
            baseline_timepoint: None,
            subject_column: None,
            filter_missing_references: false,
        }
    }

    /// Distance-to-baseline parameters.
    pub fn baseline(time_column: &str, baseline_timepoint: f64, subject_column: &str) -> Self {
        Self {
            distance_to: DistanceTo::Baseline,
            time_column: time_column.to_string(),
            reference_column: None,
            baseline_timepoint: Some(baseline_timepoint),
            subject_column: Some(subject_column.to_string()),
            filter_missing_references: false,
        }
    }

    /// Set the subject column.
    pub fn subject(mut self, subject_column: &str) -> Self {
        self.subject_column = Some(subject_column.to_string());
        self
    }

    /// Drop samples with missing or unavailable references instead of failing.
    pub fn filter_missing_references(mut self, filter: bool) -> Self {
        self.filter_missing_references = filter;
        self
    }

    /// Check that the parameters fit the selected mode.
    pub fn validate(&self) -> Result<()> {
        match self.distance_to {
            DistanceTo::Donor => {
                if self.baseline_timepoint.is_some() {
                    return Err(FmtError::ConflictingParameters(
                        "distance_to='donor' does not accept baseline_timepoint; \
                         remove baseline_timepoint or use distance_to='baseline'"
                            .to_string(),
                    ));
                }
                if self.reference_column.is_none() {
                    return Err(FmtError::ConflictingParameters(
                        "distance_to='donor' requires reference_column".to_string(),
                    ));
                }
            }
            DistanceTo::Baseline => {
                if self.reference_column.is_some() {
                    return Err(FmtError::ConflictingParameters(
                        "distance_to='baseline' does not accept reference_column; \
                         remove reference_column or use distance_to='donor'"
                            .to_string(),
                    ));
                }
                if self.baseline_timepoint.is_none() {
                    return Err(FmtError::ConflictingParameters(
                        "distance_to='baseline' requires baseline_timepoint".to_string(),
                    ));
                }
                if self.subject_column.is_none() {
                    return Err(FmtError::ConflictingParameters(
                        "distance_to='baseline' requires subject_column".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Resolved recipient -> reference pairs, in metadata order.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceMap {
    distance_to: DistanceTo,
    filter_missing: bool,
    entries: Vec<(String, String)>,
    index: HashMap<String, usize>,
}

impl ReferenceMap {
    /// Build a map directly from `(recipient, reference)` pairs.
    pub fn new(distance_to: DistanceTo, entries: Vec<(String, String)>, filter_missing: bool) -> Self {
        let index = entries
            .iter()
            .enumerate()
            .map(|(i, (recipient, _))| (recipient.clone(), i))
            .collect();
        Self {
            distance_to,
            filter_missing,
            entries,
            index,
        }
    }

    /// Mode the map was resolved with.
    pub fn distance_to(&self) -> DistanceTo {
        self.distance_to
    }

    /// Whether unavailable references are dropped rather than rejected.
    pub fn filters_missing(&self) -> bool {
        self.filter_missing
    }

    /// `(recipient, reference)` pairs.
    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    /// Reference of a recipient.
    pub fn get(&self, recipient: &str) -> Option<&str> {
        self.index
            .get(recipient)
            .map(|&i| self.entries[i].1.as_str())
    }

    /// Recipient IDs in order.
    pub fn recipients(&self) -> Vec<String> {
        self.entries.iter().map(|(r, _)| r.clone()).collect()
    }

    /// Distinct references, sorted.
    pub fn references(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|(_, r)| r.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Distinct references in order of first appearance.
    pub fn references_in_order(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        self.entries
            .iter()
            .filter(|(_, r)| seen.insert(r.as_str()))
            .map(|(_, r)| r.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keep only entries whose reference belongs to a measurement universe.
    ///
    /// Unavailable references are dropped when the map was resolved with
    /// `filter_missing_references`, otherwise they are reported together.
    pub fn restrict_to_universe<F>(&self, contains: F) -> Result<ReferenceMap>
    where
        F: Fn(&str) -> bool,
    {
        let unavailable: Vec<String> = self
            .references()
            .into_iter()
            .filter(|r| !contains(r))
            .collect();

        if unavailable.is_empty() {
            return Ok(self.clone());
        }
        if !self.filter_missing {
            return Err(FmtError::UnavailableReferences(unavailable));
        }

        info!("Dropping samples whose references are unavailable: {:?}", unavailable);
        let entries: Vec<(String, String)> = self
            .entries
            .iter()
            .filter(|(_, r)| contains(r))
            .cloned()
            .collect();
        if entries.is_empty() {
            return Err(FmtError::NoReferencesFound);
        }
        Ok(ReferenceMap::new(self.distance_to, entries, self.filter_missing))
    }
}

/// Resolve the reference of every recipient sample.
///
/// Parameters are validated before any metadata column is read.
pub fn resolve_references(metadata: &Metadata, params: &ReferenceParams) -> Result<ReferenceMap> {
    params.validate()?;

    let resolved = match params.distance_to {
        DistanceTo::Donor => donor_references(metadata, params)?,
        DistanceTo::Baseline => baseline_references(metadata, params)?,
    };

    let missing: Vec<String> = resolved
        .iter()
        .filter(|(_, r)| r.is_none())
        .map(|(id, _)| id.clone())
        .collect();
    if !missing.is_empty() {
        if params.filter_missing_references {
            info!("Dropping {} samples with missing references", missing.len());
        } else {
            return Err(FmtError::MissingReferences(missing));
        }
    }

    let entries: Vec<(String, String)> = resolved
        .into_iter()
        .filter_map(|(id, r)| r.map(|r| (id, r)))
        .collect();
    if entries.is_empty() {
        return Err(FmtError::NoReferencesFound);
    }
    debug!(
        "Resolved {} references ({} mode)",
        entries.len(),
        params.distance_to
    );

    Ok(ReferenceMap::new(
        params.distance_to,
        entries,
        params.filter_missing_references,
    ))
}

/// References from the reference column, for samples with a time value.
fn donor_references(
    metadata: &Metadata,
    params: &ReferenceParams,
) -> Result<Vec<(String, Option<String>)>> {
    let reference_column = params.reference_column.as_deref().unwrap_or_default();
    let time = metadata.numeric_column(&params.time_column)?;
    let reference = metadata.categorical_column(reference_column)?;

    Ok(time
        .present()
        .map(|(id, _)| (id.to_string(), reference.get(id).cloned()))
        .collect())
}

/// References to each subject's baseline-timepoint sample.
fn baseline_references(
    metadata: &Metadata,
    params: &ReferenceParams,
) -> Result<Vec<(String, Option<String>)>> {
    let baseline = params.baseline_timepoint.unwrap_or_default();
    let subject_column = params.subject_column.as_deref().unwrap_or_default();
    let time = metadata.numeric_column(&params.time_column)?;
    let subject = metadata.categorical_column(subject_column)?;

    if !time.present().any(|(_, &t)| t == baseline) {
        return Err(FmtError::BaselineNotFound {
            timepoint: baseline,
            column: params.time_column.clone(),
        });
    }

    let mut by_subject: BTreeMap<&str, Vec<(&str, f64)>> = BTreeMap::new();
    for (id, &t) in time.present() {
        if let Some(s) = subject.get(id) {
            by_subject.entry(s.as_str()).or_default().push((id, t));
        }
    }

    let mut reference_of: HashMap<&str, Option<String>> = HashMap::new();
    for (subject_id, samples) in &by_subject {
        let baselines: Vec<&str> = samples
            .iter()
            .filter(|(_, t)| *t == baseline)
            .map(|(id, _)| *id)
            .collect();
        if baselines.len() > 1 {
            return Err(FmtError::MultipleBaselines {
                subject: subject_id.to_string(),
                samples: baselines.iter().map(|s| s.to_string()).collect(),
            });
        }
        let baseline_id = baselines.first().map(|s| s.to_string());
        for (id, t) in samples {
            if *t != baseline {
                reference_of.insert(*id, baseline_id.clone());
            }
        }
    }

    let resolved: Vec<(String, Option<String>)> = metadata
        .sample_ids()
        .iter()
        .filter_map(|id| {
            reference_of
                .get(id.as_str())
                .map(|r| (id.clone(), r.clone()))
        })
        .collect();

    if resolved.is_empty() {
        return Err(FmtError::NoBaselineSamples);
    }
    if resolved.iter().all(|(_, r)| r.is_none()) {
        return Err(FmtError::NoSubjectLinkage);
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn donor_metadata() -> Metadata {
        Metadata::from_rows(
            "id",
            vec![
                "time".to_string(),
                "donor".to_string(),
                "subject".to_string(),
            ],
            vec![
                ("s1".into(), vec!["7".into(), "d1".into(), "p1".into()]),
                ("s2".into(), vec!["7".into(), "d2".into(), "p2".into()]),
                ("s3".into(), vec!["14".into(), "".into(), "p3".into()]),
                ("d1".into(), vec!["".into(), "".into(), "".into()]),
                ("d2".into(), vec!["".into(), "".into(), "".into()]),
            ],
        )
        .unwrap()
    }

    fn baseline_metadata() -> Metadata {
        Metadata::from_rows(
            "id",
            vec!["time".to_string(), "subject".to_string()],
            vec![
                ("a1".into(), vec!["1".into(), "sub1".into()]),
                ("a2".into(), vec!["2".into(), "sub1".into()]),
                ("a3".into(), vec!["3".into(), "sub1".into()]),
                ("b2".into(), vec!["2".into(), "sub2".into()]),
                ("b1".into(), vec!["1".into(), "sub2".into()]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_conflicting_parameters() {
        let md = donor_metadata();
        let mut params = ReferenceParams::donor("time", "donor");
        params.baseline_timepoint = Some(0.0);

        let err = resolve_references(&md, &params).unwrap_err();
        assert!(matches!(err, FmtError::ConflictingParameters(_)));
        assert!(err.to_string().contains("baseline_timepoint"));

        let mut params = ReferenceParams::baseline("time", 1.0, "subject");
        params.reference_column = Some("donor".to_string());
        let err = resolve_references(&md, &params).unwrap_err();
        assert!(err.to_string().contains("reference_column"));
    }

    #[test]
    fn test_conflict_checked_before_columns() {
        let md = donor_metadata();
        let mut params = ReferenceParams::donor("no_such_column", "donor");
        params.baseline_timepoint = Some(0.0);
        assert!(matches!(
            resolve_references(&md, &params),
            Err(FmtError::ConflictingParameters(_))
        ));
    }

    #[test]
    fn test_donor_missing_reference_error() {
        let md = donor_metadata();
        let params = ReferenceParams::donor("time", "donor");

        match resolve_references(&md, &params) {
            Err(FmtError::MissingReferences(ids)) => assert_eq!(ids, vec!["s3"]),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_donor_missing_reference_filtered() {
        let md = donor_metadata();
        let params = ReferenceParams::donor("time", "donor").filter_missing_references(true);

        let refs = resolve_references(&md, &params).unwrap();
        assert_eq!(refs.len(), 2);
        assert_eq!(refs.get("s1"), Some("d1"));
        assert_eq!(refs.get("s3"), None);
        assert_eq!(refs.references(), vec!["d1", "d2"]);
    }

    #[test]
    fn test_baseline_mode() {
        let md = baseline_metadata();
        let params = ReferenceParams::baseline("time", 1.0, "subject");

        let refs = resolve_references(&md, &params).unwrap();
        assert_eq!(
            refs.entries(),
            &[
                ("a2".to_string(), "a1".to_string()),
                ("a3".to_string(), "a1".to_string()),
                ("b2".to_string(), "b1".to_string()),
            ]
        );
        // Baseline samples are references, never recipients.
        assert_eq!(refs.get("a1"), None);
    }

    #[test]
    fn test_baseline_not_found() {
        let md = baseline_metadata();
        let params = ReferenceParams::baseline("time", 0.0, "subject");
        assert!(matches!(
            resolve_references(&md, &params),
            Err(FmtError::BaselineNotFound { .. })
        ));
    }

    #[test]
    fn test_multiple_baselines() {
        let md = Metadata::from_rows(
            "id",
            vec!["time".to_string(), "subject".to_string()],
            vec![
                ("a1".into(), vec!["1".into(), "sub1".into()]),
                ("a1b".into(), vec!["1".into(), "sub1".into()]),
                ("a2".into(), vec!["2".into(), "sub1".into()]),
            ],
        )
        .unwrap();
        let params = ReferenceParams::baseline("time", 1.0, "subject");

        match resolve_references(&md, &params) {
            Err(FmtError::MultipleBaselines { subject, samples }) => {
                assert_eq!(subject, "sub1");
                assert_eq!(samples, vec!["a1", "a1b"]);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_subject_without_baseline() {
        let md = Metadata::from_rows(
            "id",
            vec!["time".to_string(), "subject".to_string()],
            vec![
                ("a1".into(), vec!["1".into(), "sub1".into()]),
                ("a2".into(), vec!["2".into(), "sub1".into()]),
                ("b2".into(), vec!["2".into(), "sub2".into()]),
            ],
        )
        .unwrap();

        let params = ReferenceParams::baseline("time", 1.0, "subject");
        assert!(matches!(
            resolve_references(&md, &params),
            Err(FmtError::MissingReferences(ids)) if ids == vec!["b2"]
        ));

        let refs = resolve_references(&md, &params.filter_missing_references(true)).unwrap();
        assert_eq!(refs.recipients(), vec!["a2"]);
    }

    #[test]
    fn test_no_baseline_samples() {
        let md = Metadata::from_rows(
            "id",
            vec!["time".to_string(), "subject".to_string()],
            vec![
                ("a1".into(), vec!["1".into(), "sub1".into()]),
                ("b1".into(), vec!["1".into(), "sub2".into()]),
            ],
        )
        .unwrap();
        let params = ReferenceParams::baseline("time", 1.0, "subject");
        assert!(matches!(
            resolve_references(&md, &params),
            Err(FmtError::NoBaselineSamples)
        ));
    }

    #[test]
    fn test_no_subject_linkage() {
        let md = Metadata::from_rows(
            "id",
            vec!["time".to_string(), "subject".to_string()],
            vec![
                ("a1".into(), vec!["1".into(), "sub1".into()]),
                ("b2".into(), vec!["2".into(), "sub2".into()]),
            ],
        )
        .unwrap();
        let params = ReferenceParams::baseline("time", 1.0, "subject");
        assert!(matches!(
            resolve_references(&md, &params),
            Err(FmtError::NoSubjectLinkage)
        ));
    }

    #[test]
    fn test_restrict_to_universe() {
        let md = donor_metadata();
        let params = ReferenceParams::donor("time", "donor").filter_missing_references(true);
        let refs = resolve_references(&md, &params).unwrap();

        let restricted = refs.restrict_to_universe(|id| id != "d2").unwrap();
        assert_eq!(restricted.recipients(), vec!["s1"]);
        assert!(matches!(
            refs.restrict_to_universe(|_| false),
            Err(FmtError::NoReferencesFound)
        ));

        let strict = ReferenceMap::new(DistanceTo::Donor, refs.entries().to_vec(), false);
        match strict.restrict_to_universe(|id| id != "d2") {
            Err(FmtError::UnavailableReferences(ids)) => assert_eq!(ids, vec!["d2"]),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_distance_to_from_str() {
        assert_eq!("donor".parse::<DistanceTo>().unwrap(), DistanceTo::Donor);
        assert_eq!("baseline".parse::<DistanceTo>().unwrap(), DistanceTo::Baseline);
        assert!("subject".parse::<DistanceTo>().is_err());
    }
}
