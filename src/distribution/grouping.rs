//! Build ordered and independent distributions from a diversity measure.

use crate::data::{
    Column, ColumnDocs, DistanceMatrix, DiversityMeasure, IndependentDistribution, IndependentRow,
    Metadata, OrderedDistribution, OrderedRow,
};
use crate::error::{FmtError, Result};
use crate::reference::{resolve_references, DistanceTo, ReferenceMap, ReferenceParams};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metadata columns joined onto each distribution row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupColumns {
    pub time_column: String,
    #[serde(default)]
    pub subject_column: Option<String>,
    #[serde(default)]
    pub group_column: Option<String>,
    #[serde(default)]
    pub control_column: Option<String>,
}

impl GroupColumns {
    pub fn new(time_column: &str) -> Self {
        Self {
            time_column: time_column.to_string(),
            subject_column: None,
            group_column: None,
            control_column: None,
        }
    }

    pub fn subject(mut self, column: &str) -> Self {
        self.subject_column = Some(column.to_string());
        self
    }

    pub fn group(mut self, column: &str) -> Self {
        self.group_column = Some(column.to_string());
        self
    }

    pub fn control(mut self, column: &str) -> Self {
        self.control_column = Some(column.to_string());
        self
    }
}

/// Reference resolution and grouping in one parameter set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupTimepointsParams {
    pub distance_to: DistanceTo,
    pub time_column: String,
    #[serde(default)]
    pub reference_column: Option<String>,
    #[serde(default)]
    pub baseline_timepoint: Option<f64>,
    #[serde(default)]
    pub subject_column: Option<String>,
    #[serde(default)]
    pub group_column: Option<String>,
    #[serde(default)]
    pub control_column: Option<String>,
    #[serde(default)]
    pub filter_missing_references: bool,
}

impl GroupTimepointsParams {
    /// Reference-resolution half of the parameters.
    pub fn reference_params(&self) -> ReferenceParams {
        ReferenceParams {
            distance_to: self.distance_to,
            time_column: self.time_column.clone(),
            reference_column: self.reference_column.clone(),
            baseline_timepoint: self.baseline_timepoint,
            subject_column: self.subject_column.clone(),
            filter_missing_references: self.filter_missing_references,
        }
    }

    /// Grouping half of the parameters.
    pub fn group_columns(&self) -> GroupColumns {
        GroupColumns {
            time_column: self.time_column.clone(),
            subject_column: self.subject_column.clone(),
            group_column: self.group_column.clone(),
            control_column: self.control_column.clone(),
        }
    }
}

/// Resolve references, then build both distributions.
pub fn group_timepoints(
    measure: &DiversityMeasure,
    metadata: &Metadata,
    params: &GroupTimepointsParams,
) -> Result<(OrderedDistribution, IndependentDistribution)> {
    let references = resolve_references(metadata, &params.reference_params())?;
    build_grouped_distributions(measure, metadata, &references, &params.group_columns())
}

/// Build the ordered (per-recipient, by time) and independent (reference and
/// control) distributions.
///
/// References missing from the measure are handled by the map's filter policy.
/// Every failed lookup is collected and reported in a single error.
pub fn build_grouped_distributions(
    measure: &DiversityMeasure,
    metadata: &Metadata,
    references: &ReferenceMap,
    columns: &GroupColumns,
) -> Result<(OrderedDistribution, IndependentDistribution)> {
    if measure.is_empty() {
        return Err(FmtError::EmptyMeasure);
    }
    let references = references.restrict_to_universe(|id| measure.contains(id))?;

    let time = metadata.numeric_column(&columns.time_column)?;
    let subject = optional_column(metadata, columns.subject_column.as_deref())?;
    let group = optional_column(metadata, columns.group_column.as_deref())?;
    let control = optional_column(metadata, columns.control_column.as_deref())?;

    let (ordered, independent) = match measure {
        DiversityMeasure::Beta(distances) => {
            let mut misses = Vec::new();
            let ordered = ordered_rows(metadata, &references, &time, &subject, &group, |id, r| {
                let value = distances.get_sorted(id, r);
                if value.is_none() {
                    misses.push(sorted_pair(id, r));
                }
                value
            });
            let independent = beta_independent_rows(distances, &references, &control, &mut misses);
            if !misses.is_empty() {
                return Err(FmtError::PairwiseLookupFailed(misses));
            }
            (ordered, independent)
        }
        DiversityMeasure::Alpha(alpha) => {
            let mut misses = Vec::new();
            let ordered = ordered_rows(metadata, &references, &time, &subject, &group, |id, _| {
                let value = alpha.get(id);
                if value.is_none() {
                    misses.push(id.to_string());
                }
                value
            });

            let mut independent: Vec<IndependentRow> = references
                .references_in_order()
                .into_iter()
                .filter_map(|r| {
                    alpha.get(&r).map(|measure| IndependentRow {
                        id: r,
                        measure,
                        group: "reference".to_string(),
                        a: None,
                        b: None,
                    })
                })
                .collect();
            if let Some(control) = &control {
                for (id, label) in control.present() {
                    match alpha.get(id) {
                        Some(measure) => independent.push(IndependentRow {
                            id: id.to_string(),
                            measure,
                            group: label.clone(),
                            a: None,
                            b: None,
                        }),
                        None => misses.push(id.to_string()),
                    }
                }
            }
            if !misses.is_empty() {
                return Err(FmtError::SamplesNotInMeasure(misses));
            }
            (ordered, independent)
        }
    };

    debug!(
        "Built {} ordered and {} independent rows for '{}'",
        ordered.len(),
        independent.len(),
        measure.name()
    );

    Ok((
        OrderedDistribution {
            rows: ordered,
            docs: ordered_docs(metadata, measure, columns),
        },
        IndependentDistribution {
            rows: independent,
            docs: independent_docs(metadata, measure, columns),
        },
    ))
}

fn optional_column(metadata: &Metadata, name: Option<&str>) -> Result<Option<Column<String>>> {
    name.map(|n| metadata.categorical_column(n)).transpose()
}

fn sorted_pair(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

/// One row per recipient with a time value, in metadata order.
///
/// Rows whose lookup returns `None` are left out; the caller records the miss.
fn ordered_rows<F>(
    metadata: &Metadata,
    references: &ReferenceMap,
    time: &Column<f64>,
    subject: &Option<Column<String>>,
    group: &Option<Column<String>>,
    mut lookup: F,
) -> Vec<OrderedRow>
where
    F: FnMut(&str, &str) -> Option<f64>,
{
    let mut rows = Vec::with_capacity(references.len());
    for id in metadata.sample_ids() {
        let Some(reference) = references.get(id) else {
            continue;
        };
        let Some(&t) = time.get(id) else {
            continue;
        };
        let Some(measure) = lookup(id, reference) else {
            continue;
        };
        rows.push(OrderedRow {
            id: id.clone(),
            measure,
            group: t,
            subject: subject.as_ref().and_then(|c| c.get(id).cloned()),
            class: group.as_ref().map(|c| c.name().to_string()),
            level: group.as_ref().and_then(|c| c.get(id).cloned()),
        });
    }
    rows
}

/// All pairs `i < j` of already sorted IDs, looked up in the distance matrix.
fn pairwise_rows(
    distances: &DistanceMatrix,
    ids: &[String],
    label: &str,
    misses: &mut Vec<(String, String)>,
) -> Vec<IndependentRow> {
    let mut rows = Vec::new();
    for (i, a) in ids.iter().enumerate() {
        for b in &ids[i + 1..] {
            match distances.get_sorted(a, b) {
                Some(measure) => rows.push(IndependentRow {
                    id: format!("{}..{}", a, b),
                    measure,
                    group: label.to_string(),
                    a: Some(a.clone()),
                    b: Some(b.clone()),
                }),
                None => misses.push(sorted_pair(a, b)),
            }
        }
    }
    rows
}

fn beta_independent_rows(
    distances: &DistanceMatrix,
    references: &ReferenceMap,
    control: &Option<Column<String>>,
    misses: &mut Vec<(String, String)>,
) -> Vec<IndependentRow> {
    let mut rows = pairwise_rows(distances, &references.references(), "reference", misses);

    if let Some(control) = control {
        let mut members: BTreeMap<&str, Vec<String>> = BTreeMap::new();
        for (id, label) in control.present() {
            members.entry(label.as_str()).or_default().push(id.to_string());
        }
        for (label, mut ids) in members {
            if ids.len() < 2 {
                info!("Control group '{}' has a single sample; no pairs formed", label);
                continue;
            }
            ids.sort();
            rows.extend(pairwise_rows(distances, &ids, label, misses));
        }
    }
    rows
}

fn ordered_docs(metadata: &Metadata, measure: &DiversityMeasure, columns: &GroupColumns) -> ColumnDocs {
    let mut docs = ColumnDocs::new()
        .with("id", metadata.id_header(), "Sample IDs")
        .with("measure", measure.name(), measure_description(measure))
        .with("group", &columns.time_column, "Time");
    if let Some(subject) = &columns.subject_column {
        docs.insert("subject", subject, "ID to link samples across time");
    }
    if let Some(group) = &columns.group_column {
        docs.insert("class", group, "Group column name");
        docs.insert("level", group, "Group of the sample");
    }
    docs
}

fn independent_docs(
    metadata: &Metadata,
    measure: &DiversityMeasure,
    columns: &GroupColumns,
) -> ColumnDocs {
    let group_title = columns.control_column.as_deref().unwrap_or("reference");
    let docs = ColumnDocs::new()
        .with("id", metadata.id_header(), "Sample IDs")
        .with("measure", measure.name(), measure_description(measure))
        .with("group", group_title, "Reference or control group");
    if measure.is_beta() {
        docs.with("A", "Sample A", "First sample of the pair")
            .with("B", "Sample B", "Second sample of the pair")
    } else {
        docs
    }
}

fn measure_description(measure: &DiversityMeasure) -> &'static str {
    if measure.is_beta() {
        "Distance to the reference sample"
    } else {
        "Alpha diversity of the sample"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{AlphaDiversity, Table};
    use approx::assert_relative_eq;

    /// Two donors, two recipients each at two timepoints, two healthy controls.
    fn create_metadata() -> Metadata {
        let cols = ["time", "donor", "subject", "arm", "healthy"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let row = |id: &str, vals: [&str; 5]| {
            (id.to_string(), vals.iter().map(|s| s.to_string()).collect::<Vec<_>>())
        };
        Metadata::from_rows(
            "sample",
            cols,
            vec![
                row("r1a", ["1", "d1", "p1", "fmt", ""]),
                row("r1b", ["2", "d1", "p1", "fmt", ""]),
                row("r2a", ["1", "d2", "p2", "placebo", ""]),
                row("r2b", ["2", "d2", "p2", "placebo", ""]),
                row("d1", ["", "", "", "", ""]),
                row("d2", ["", "", "", "", ""]),
                row("h2", ["", "", "", "", "healthy"]),
                row("h1", ["", "", "", "", "healthy"]),
                row("x1", ["", "", "", "", "other"]),
            ],
        )
        .unwrap()
    }

    fn create_distances() -> DistanceMatrix {
        let pairs = [
            ("d1", "r1a", 0.5),
            ("d1", "r1b", 0.25),
            ("d2", "r2a", 0.75),
            ("d2", "r2b", 0.125),
            ("d1", "d2", 0.9),
            ("h1", "h2", 0.3),
        ];
        DistanceMatrix::from_pairs(
            "braycurtis",
            pairs
                .iter()
                .map(|(a, b, d)| (a.to_string(), b.to_string(), *d))
                .collect(),
        )
    }

    fn donor_params() -> GroupTimepointsParams {
        GroupTimepointsParams {
            distance_to: DistanceTo::Donor,
            time_column: "time".into(),
            reference_column: Some("donor".into()),
            baseline_timepoint: None,
            subject_column: Some("subject".into()),
            group_column: Some("arm".into()),
            control_column: Some("healthy".into()),
            filter_missing_references: false,
        }
    }

    #[test]
    fn test_beta_ordered() {
        let md = create_metadata();
        let measure = DiversityMeasure::from(create_distances());
        let (ordered, _) = group_timepoints(&measure, &md, &donor_params()).unwrap();

        assert_eq!(ordered.len(), 4);
        let ids: Vec<&str> = ordered.rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["r1a", "r1b", "r2a", "r2b"]);

        let row = ordered.get("r2b").unwrap();
        assert_relative_eq!(row.measure, 0.125);
        assert_relative_eq!(row.group, 2.0);
        assert_eq!(row.subject.as_deref(), Some("p2"));
        assert_eq!(row.class.as_deref(), Some("arm"));
        assert_eq!(row.level.as_deref(), Some("placebo"));

        assert_eq!(ordered.docs.get("id").unwrap().title, "sample");
        assert_eq!(ordered.docs.get("measure").unwrap().title, "braycurtis");
        assert_eq!(ordered.docs.get("group").unwrap().title, "time");
    }

    #[test]
    fn test_beta_independent() {
        let md = create_metadata();
        let measure = DiversityMeasure::from(create_distances());
        let (_, independent) = group_timepoints(&measure, &md, &donor_params()).unwrap();

        // One reference pair plus one healthy pair; "other" has a single member.
        assert_eq!(independent.len(), 2);
        let reference = &independent.rows[0];
        assert_eq!(reference.id, "d1..d2");
        assert_eq!(reference.group, "reference");
        assert_eq!(reference.a.as_deref(), Some("d1"));
        assert_relative_eq!(reference.measure, 0.9);

        let control = &independent.rows[1];
        assert_eq!(control.id, "h1..h2");
        assert_eq!(control.group, "healthy");

        let names: Vec<&str> = independent.column_docs().names().collect();
        assert_eq!(names, vec!["id", "measure", "group", "A", "B"]);
    }

    #[test]
    fn test_single_reference_no_pairs() {
        let md = create_metadata();
        let measure = DiversityMeasure::from(create_distances());
        let refs = ReferenceMap::new(
            DistanceTo::Donor,
            vec![("r1a".into(), "d1".into()), ("r1b".into(), "d1".into())],
            false,
        );
        let (ordered, independent) =
            build_grouped_distributions(&measure, &md, &refs, &GroupColumns::new("time")).unwrap();
        assert_eq!(ordered.len(), 2);
        assert!(independent.is_empty());
        assert!(ordered.rows.iter().all(|r| r.subject.is_none() && r.class.is_none()));
    }

    #[test]
    fn test_pairwise_lookup_failures_aggregate() {
        let md = create_metadata();
        let distances = DistanceMatrix::from_pairs(
            "jaccard",
            vec![
                ("d1".into(), "r1a".into(), 0.5),
                ("d2".into(), "r2a".into(), 0.5),
                ("r1b".into(), "r2b".into(), 0.5),
            ],
        );
        let measure = DiversityMeasure::from(distances);
        let mut params = donor_params();
        params.control_column = None;

        match group_timepoints(&measure, &md, &params) {
            Err(FmtError::PairwiseLookupFailed(pairs)) => {
                assert_eq!(
                    pairs,
                    vec![
                        ("d1".to_string(), "r1b".to_string()),
                        ("d2".to_string(), "r2b".to_string()),
                        ("d1".to_string(), "d2".to_string()),
                    ]
                );
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_unavailable_reference() {
        let md = create_metadata();
        let distances = DistanceMatrix::from_pairs(
            "jaccard",
            vec![
                ("d1".into(), "r1a".into(), 0.5),
                ("d1".into(), "r1b".into(), 0.4),
            ],
        );
        let measure = DiversityMeasure::from(distances);
        let mut params = donor_params();
        params.control_column = None;

        assert!(matches!(
            group_timepoints(&measure, &md, &params),
            Err(FmtError::UnavailableReferences(ids)) if ids == vec!["d2"]
        ));

        params.filter_missing_references = true;
        let (ordered, _) = group_timepoints(&measure, &md, &params).unwrap();
        assert_eq!(ordered.len(), 2);
    }

    #[test]
    fn test_alpha_distributions() {
        let md = create_metadata();
        let alpha = AlphaDiversity::new(
            "shannon_entropy",
            ["r1a", "r1b", "r2a", "r2b", "d1", "d2", "h1", "h2", "x1"]
                .iter()
                .enumerate()
                .map(|(i, id)| (id.to_string(), i as f64))
                .collect(),
        )
        .unwrap();
        let measure = DiversityMeasure::from(alpha);
        let (ordered, independent) = group_timepoints(&measure, &md, &donor_params()).unwrap();

        assert_relative_eq!(ordered.get("r2a").unwrap().measure, 2.0);

        let rows: Vec<(&str, &str)> = independent
            .rows
            .iter()
            .map(|r| (r.id.as_str(), r.group.as_str()))
            .collect();
        assert_eq!(
            rows,
            vec![
                ("d1", "reference"),
                ("d2", "reference"),
                ("h2", "healthy"),
                ("h1", "healthy"),
                ("x1", "other"),
            ]
        );
        assert!(independent.column_docs().get("A").is_none());
    }

    #[test]
    fn test_alpha_missing_samples() {
        let md = create_metadata();
        let alpha = AlphaDiversity::new(
            "observed_features",
            vec![("r1a".into(), 1.0), ("d1".into(), 2.0), ("d2".into(), 3.0)],
        )
        .unwrap();
        let measure = DiversityMeasure::from(alpha);
        let mut params = donor_params();
        params.control_column = None;

        match group_timepoints(&measure, &md, &params) {
            Err(FmtError::SamplesNotInMeasure(ids)) => assert_eq!(ids, vec!["r1b", "r2a", "r2b"]),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_empty_measure() {
        let md = create_metadata();
        let measure = DiversityMeasure::from(DistanceMatrix::from_pairs("jaccard", vec![]));
        assert!(matches!(
            group_timepoints(&measure, &md, &donor_params()),
            Err(FmtError::EmptyMeasure)
        ));
    }

    #[test]
    fn test_baseline_distances() {
        let md = create_metadata();
        let distances = DistanceMatrix::from_pairs(
            "braycurtis",
            vec![
                ("r1b".into(), "r1a".into(), 0.6),
                ("r2a".into(), "r2b".into(), 0.2),
                ("r1a".into(), "r2a".into(), 0.4),
            ],
        );
        let measure = DiversityMeasure::from(distances);
        let params = GroupTimepointsParams {
            distance_to: DistanceTo::Baseline,
            time_column: "time".into(),
            reference_column: None,
            baseline_timepoint: Some(1.0),
            subject_column: Some("subject".into()),
            group_column: None,
            control_column: None,
            filter_missing_references: false,
        };

        let (ordered, independent) = group_timepoints(&measure, &md, &params).unwrap();
        assert_eq!(ordered.len(), 2);
        assert_relative_eq!(ordered.get("r1b").unwrap().measure, 0.6);
        assert_relative_eq!(ordered.get("r2b").unwrap().measure, 0.2);
        assert_eq!(independent.rows[0].id, "r1a..r2a");
    }

    #[test]
    fn test_idempotent() {
        let md = create_metadata();
        let measure = DiversityMeasure::from(create_distances());
        let first = group_timepoints(&measure, &md, &donor_params()).unwrap();
        let second = group_timepoints(&measure, &md, &donor_params()).unwrap();
        assert_eq!(first, second);
    }
}
