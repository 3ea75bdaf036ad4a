//! Proportional Engraftment of Donor Strains.

use super::matrix::{require_references, transfer_masks};
use super::{PedsLevel, PedsParams};
use crate::data::{
    Column, ColumnDocs, EngraftmentKind, EngraftmentRecord, EngraftmentTable, FeatureTable,
    Metadata,
};
use crate::error::Result;
use crate::filter::apply_completeness;
use crate::filter::completeness::distinct_sorted;
use crate::reference::{resolve_references, ReferenceMap, ReferenceParams};
use log::{info, warn};

/// Compute PEDS per recipient sample or per feature.
///
/// Metadata is filtered by the completeness policy before references are
/// resolved. The incomplete-subject rule only applies at the sample level.
pub fn compute_peds(
    table: &FeatureTable,
    metadata: &Metadata,
    params: &PedsParams,
    level: PedsLevel,
) -> Result<EngraftmentTable> {
    match level {
        PedsLevel::Sample => sample_peds(table, metadata, params).map(|(peds, _)| peds),
        PedsLevel::Feature => feature_peds(table, metadata, params),
    }
}

/// Sample-level PEDS together with the references it was computed against.
pub(crate) fn sample_peds(
    table: &FeatureTable,
    metadata: &Metadata,
    params: &PedsParams,
) -> Result<(EngraftmentTable, ReferenceMap)> {
    let (metadata, references) = prepare(metadata, params, true)?;
    let time = metadata.numeric_column(&params.time_column)?;
    let subject = metadata.categorical_column(&params.subject_column)?;

    let rows = sample_records(table, &references, &time, &subject)?;
    info!("Computed sample PEDS for {} recipients", rows.len());

    let peds = EngraftmentTable {
        kind: EngraftmentKind::SamplePeds,
        rows,
        docs: sample_docs(
            metadata.id_header(),
            ("PEDS", "Proportional Engraftment of Donor Strains"),
            (params.reference_column.as_str(), "Donor"),
            &params.subject_column,
            &params.time_column,
        ),
    };
    Ok((peds, references))
}

fn feature_peds(
    table: &FeatureTable,
    metadata: &Metadata,
    params: &PedsParams,
) -> Result<EngraftmentTable> {
    if params.drop_incomplete_subjects {
        warn!("drop_incomplete_subjects does not apply to feature-level PEDS and is ignored");
    }
    let (metadata, references) = prepare(metadata, params, false)?;
    let time = metadata.numeric_column(&params.time_column)?;

    let rows = feature_records(table, &references, &time)?;
    info!("Computed feature PEDS: {} feature-timepoint rows", rows.len());

    Ok(EngraftmentTable {
        kind: EngraftmentKind::FeaturePeds,
        rows,
        docs: feature_docs(&params.time_column),
    })
}

/// Apply the completeness policy, then resolve donor references.
fn prepare(
    metadata: &Metadata,
    params: &PedsParams,
    check_subjects: bool,
) -> Result<(Metadata, ReferenceMap)> {
    let metadata = apply_completeness(
        metadata,
        &params.time_column,
        &params.subject_column,
        &params.completeness(),
        check_subjects,
    )?;

    let reference_params = ReferenceParams::donor(&params.time_column, &params.reference_column)
        .subject(&params.subject_column)
        .filter_missing_references(params.filter_missing_references);
    let references = resolve_references(&metadata, &reference_params)?;
    Ok((metadata, references))
}

/// One record per `(recipient, reference)` pair, in reference-map order.
pub(crate) fn sample_records(
    table: &FeatureTable,
    references: &ReferenceMap,
    time: &Column<f64>,
    subject: &Column<String>,
) -> Result<Vec<EngraftmentRecord>> {
    let masks = transfer_masks(table, references.entries())?;

    let rows: Vec<EngraftmentRecord> = references
        .entries()
        .iter()
        .zip(masks.row_counts())
        .map(|((id, reference), (transferred, total))| EngraftmentRecord {
            id: id.clone(),
            measure: EngraftmentRecord::ratio(transferred, total),
            transferred_feature_count: transferred,
            total_feature_count: total,
            reference_id: Some(reference.clone()),
            subject: subject.get(id).cloned(),
            group: time.get(id).copied().unwrap_or(f64::NAN),
        })
        .collect();

    for row in rows.iter().filter(|r| r.total_feature_count == 0) {
        warn!(
            "Reference '{}' of sample '{}' has no features; its measure is undefined",
            row.reference_id.as_deref().unwrap_or_default(),
            row.id
        );
    }
    Ok(rows)
}

/// Per feature and time slice: the share of recipients whose reference had the
/// feature that also carry it. Features absent from every reference in the
/// slice are left out.
fn feature_records(
    table: &FeatureTable,
    references: &ReferenceMap,
    time: &Column<f64>,
) -> Result<Vec<EngraftmentRecord>> {
    require_references(table, &references.references())?;

    let timepoints = distinct_sorted(
        references
            .entries()
            .iter()
            .filter_map(|(id, _)| time.get(id).copied()),
    );

    let mut rows = Vec::new();
    for t in timepoints {
        let slice: Vec<(String, String)> = references
            .entries()
            .iter()
            .filter(|(id, _)| time.get(id) == Some(&t))
            .cloned()
            .collect();
        let masks = transfer_masks(table, &slice)?;

        for (feature, (transferred, total)) in table.feature_ids().iter().zip(masks.col_counts()) {
            if total == 0 {
                continue;
            }
            rows.push(EngraftmentRecord {
                id: feature.clone(),
                measure: EngraftmentRecord::ratio(transferred, total),
                transferred_feature_count: transferred,
                total_feature_count: total,
                reference_id: None,
                subject: Some(feature.clone()),
                group: t,
            });
        }
    }
    Ok(rows)
}

/// Column docs for sample-level tables. `measure` and `reference` are
/// `(title, description)` pairs.
pub(crate) fn sample_docs(
    id_header: &str,
    measure: (&str, &str),
    reference: (&str, &str),
    subject_column: &str,
    time_column: &str,
) -> ColumnDocs {
    ColumnDocs::new()
        .with("id", id_header, "Sample IDs")
        .with("measure", measure.0, measure.1)
        .with(
            "transferred_feature_count",
            "Transferred Reference Features",
            "Reference features also present in the sample",
        )
        .with(
            "total_feature_count",
            "Total Reference Features",
            "Features present in the reference",
        )
        .with("reference_id", reference.0, reference.1)
        .with("subject", subject_column, "ID to link samples across time")
        .with("group", time_column, "Time")
}

fn feature_docs(time_column: &str) -> ColumnDocs {
    ColumnDocs::new()
        .with("id", "id", "Feature IDs")
        .with(
            "measure",
            "PEDS",
            "Proportion of recipients engrafted with the donor feature",
        )
        .with(
            "transferred_feature_count",
            "Engrafted Recipients",
            "Recipients carrying the feature whose donor also had it",
        )
        .with(
            "total_feature_count",
            "Recipients With Donor Feature",
            "Recipients whose donor had the feature",
        )
        .with("subject", "Feature", "Feature ID")
        .with("group", time_column, "Time")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ColumnKind, Table};
    use crate::error::FmtError;
    use approx::assert_relative_eq;
    use nalgebra::DMatrix;

    fn metadata(rows: &[(&str, &str, &str, &str)]) -> Metadata {
        Metadata::from_rows(
            "sample",
            vec!["time".into(), "donor".into(), "subject".into()],
            rows.iter()
                .map(|(id, t, d, s)| (id.to_string(), vec![t.to_string(), d.to_string(), s.to_string()]))
                .collect(),
        )
        .unwrap()
    }

    fn create_metadata() -> Metadata {
        metadata(&[
            ("s1", "1", "d1", "p1"),
            ("s2", "2", "d1", "p1"),
            ("s3", "1", "d2", "p2"),
            ("s4", "2", "d2", "p2"),
            ("d1", "", "", ""),
            ("d2", "", "", ""),
        ])
    }

    fn create_table() -> FeatureTable {
        let data = DMatrix::from_row_slice(6, 5, &[
            1.0, 1.0, 1.0, 0.0, 0.0, // d1
            0.0, 2.0, 1.0, 3.0, 0.0, // d2
            4.0, 1.0, 1.0, 0.0, 9.0, // s1
            0.0, 0.0, 0.0, 0.0, 0.0, // s2
            0.0, 1.0, 0.0, 5.0, 0.0, // s3
            1.0, 0.0, 0.0, 0.0, 0.0, // s4
        ]);
        FeatureTable::from_dense(
            &data,
            ["d1", "d2", "s1", "s2", "s3", "s4"].iter().map(|s| s.to_string()).collect(),
            ["f1", "f2", "f3", "f4", "f5"].iter().map(|s| s.to_string()).collect(),
        )
        .unwrap()
    }

    fn params() -> PedsParams {
        PedsParams::new("time", "donor", "subject")
    }

    #[test]
    fn test_full_engraftment() {
        let md = metadata(&[("sample1", "1", "donor1", "p1"), ("donor1", "", "", "")]);
        let data = DMatrix::from_row_slice(2, 3, &[1.0, 1.0, 1.0, 1.0, 1.0, 1.0]);
        let table = FeatureTable::from_dense(
            &data,
            vec!["donor1".into(), "sample1".into()],
            vec!["f1".into(), "f2".into(), "f3".into()],
        )
        .unwrap();

        let peds = compute_peds(&table, &md, &params(), PedsLevel::Sample).unwrap();
        let row = peds.get("sample1").unwrap();
        assert_eq!(row.transferred_feature_count, 3);
        assert_eq!(row.total_feature_count, 3);
        assert_relative_eq!(row.measure, 1.0);
    }

    #[test]
    fn test_no_engraftment() {
        let md = metadata(&[("sample1", "1", "donor1", "p1"), ("donor1", "", "", "")]);
        let data = DMatrix::from_row_slice(2, 3, &[1.0, 1.0, 1.0, 0.0, 0.0, 0.0]);
        let table = FeatureTable::from_dense(
            &data,
            vec!["donor1".into(), "sample1".into()],
            vec!["f1".into(), "f2".into(), "f3".into()],
        )
        .unwrap();

        let peds = compute_peds(&table, &md, &params(), PedsLevel::Sample).unwrap();
        let row = peds.get("sample1").unwrap();
        assert_eq!(row.transferred_feature_count, 0);
        assert_eq!(row.total_feature_count, 3);
        assert_relative_eq!(row.measure, 0.0);
    }

    #[test]
    fn test_sample_peds() {
        let peds = compute_peds(&create_table(), &create_metadata(), &params(), PedsLevel::Sample)
            .unwrap();

        assert_eq!(peds.kind, EngraftmentKind::SamplePeds);
        assert_eq!(peds.len(), 4);

        let s1 = peds.get("s1").unwrap();
        assert_eq!((s1.transferred_feature_count, s1.total_feature_count), (3, 3));
        assert_eq!(s1.reference_id.as_deref(), Some("d1"));
        assert_eq!(s1.subject.as_deref(), Some("p1"));
        assert_relative_eq!(s1.group, 1.0);

        let s3 = peds.get("s3").unwrap();
        assert_relative_eq!(s3.measure, 2.0 / 3.0);
        assert_relative_eq!(peds.get("s4").unwrap().measure, 0.0);

        for row in &peds.rows {
            assert!(row.transferred_feature_count <= row.total_feature_count);
            assert!((0.0..=1.0).contains(&row.measure));
        }

        let names: Vec<&str> = peds.column_docs().names().collect();
        assert_eq!(
            names,
            vec![
                "id",
                "measure",
                "transferred_feature_count",
                "total_feature_count",
                "reference_id",
                "subject",
                "group"
            ]
        );
        assert_eq!(peds.docs.get("reference_id").unwrap().title, "donor");
    }

    #[test]
    fn test_feature_peds() {
        let peds = compute_peds(&create_table(), &create_metadata(), &params(), PedsLevel::Feature)
            .unwrap();

        assert_eq!(peds.kind, EngraftmentKind::FeaturePeds);
        // f5 is absent from both donors and is dropped at each timepoint
        assert_eq!(peds.len(), 8);
        assert!(peds.rows.iter().all(|r| r.id != "f5"));

        let t1: Vec<&EngraftmentRecord> = peds.rows.iter().filter(|r| r.group == 1.0).collect();
        let measures: Vec<f64> = t1.iter().map(|r| r.measure).collect();
        assert_eq!(measures, vec![1.0, 1.0, 0.5, 1.0]);
        assert_eq!(t1[2].subject.as_deref(), Some("f3"));
        assert!(t1.iter().all(|r| r.reference_id.is_none()));

        let t2: Vec<f64> = peds
            .rows
            .iter()
            .filter(|r| r.group == 2.0)
            .map(|r| r.measure)
            .collect();
        assert_eq!(t2, vec![0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_zero_reference_features() {
        let md = metadata(&[("sample1", "1", "donor1", "p1"), ("donor1", "", "", "")]);
        let data = DMatrix::from_row_slice(2, 2, &[0.0, 0.0, 1.0, 1.0]);
        let table = FeatureTable::from_dense(
            &data,
            vec!["donor1".into(), "sample1".into()],
            vec!["f1".into(), "f2".into()],
        )
        .unwrap();

        let peds = compute_peds(&table, &md, &params(), PedsLevel::Sample).unwrap();
        assert!(peds.get("sample1").unwrap().measure.is_nan());
    }

    #[test]
    fn test_incomplete_subjects() {
        let mut rows = vec![
            ("s1", "1", "d1", "p1"),
            ("s2", "2", "d1", "p1"),
            ("s3", "1", "d2", "p2"),
            ("s4", "2", "d2", "p2"),
            ("d1", "", "", ""),
            ("d2", "", "", ""),
        ];
        rows.push(("s5", "1", "d1", "p3"));
        let md = metadata(&rows);
        let data = DMatrix::from_element(7, 2, 1.0);
        let table = FeatureTable::from_dense(
            &data,
            ["d1", "d2", "s1", "s2", "s3", "s4", "s5"].iter().map(|s| s.to_string()).collect(),
            vec!["f1".into(), "f2".into()],
        )
        .unwrap();

        match compute_peds(&table, &md, &params(), PedsLevel::Sample) {
            Err(FmtError::IncompleteSubjects(subjects)) => assert_eq!(subjects, vec!["p3"]),
            other => panic!("unexpected result: {:?}", other),
        }

        let dropping = params().drop_incomplete_subjects(true);
        let peds = compute_peds(&table, &md, &dropping, PedsLevel::Sample).unwrap();
        assert_eq!(peds.len(), 4);
        assert!(peds.get("s5").is_none());

        // Feature level ignores the flag and keeps p3.
        let peds = compute_peds(&table, &md, &dropping, PedsLevel::Feature).unwrap();
        let f1_t1 = peds.rows.iter().find(|r| r.id == "f1" && r.group == 1.0).unwrap();
        assert_eq!(f1_t1.total_feature_count, 3);
    }

    #[test]
    fn test_duplicate_timepoint() {
        let md = metadata(&[
            ("s1", "1", "d1", "sub1"),
            ("s2", "1", "d1", "sub1"),
            ("d1", "", "", ""),
        ]);
        let err = compute_peds(&create_table(), &md, &params(), PedsLevel::Sample).unwrap_err();
        let msg = err.to_string();
        match err {
            FmtError::DuplicateSubjectTimepoint {
                subject,
                timepoints,
            } => {
                assert_eq!(subject, "sub1");
                assert_eq!(timepoints, vec![1.0, 1.0]);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(msg.contains("sub1"));
        assert!(msg.contains("[1.0, 1.0]"));
    }

    #[test]
    fn test_numeric_looking_ids_declared_categorical() {
        let mut declared = std::collections::HashMap::new();
        declared.insert("donor".to_string(), ColumnKind::Categorical);
        declared.insert("subject".to_string(), ColumnKind::Categorical);
        let row = |id: &str, t: &str, d: &str, s: &str| {
            (id.to_string(), vec![t.to_string(), d.to_string(), s.to_string()])
        };
        let md = Metadata::from_typed_rows(
            "sample-id",
            vec!["time".into(), "donor".into(), "subject".into()],
            vec![row("s1", "1", "10", "1"), row("s2", "2", "10", "1"), row("10", "", "", "")],
            &declared,
        )
        .unwrap();
        let data = DMatrix::from_row_slice(3, 2, &[
            1.0, 1.0, // 10
            1.0, 0.0, // s1
            1.0, 1.0, // s2
        ]);
        let table = FeatureTable::from_dense(
            &data,
            vec!["10".into(), "s1".into(), "s2".into()],
            vec!["f1".into(), "f2".into()],
        )
        .unwrap();

        let peds = compute_peds(&table, &md, &params(), PedsLevel::Sample).unwrap();
        assert_eq!(peds.get("s1").unwrap().reference_id.as_deref(), Some("10"));
        assert_eq!(peds.get("s2").unwrap().subject.as_deref(), Some("1"));
        assert_relative_eq!(peds.get("s1").unwrap().measure, 0.5);
        assert_relative_eq!(peds.get("s2").unwrap().measure, 1.0);
    }

    #[test]
    fn test_drop_timepoints() {
        let params = params().drop_incomplete_timepoints(vec![2.0]);
        let peds = compute_peds(&create_table(), &create_metadata(), &params, PedsLevel::Sample)
            .unwrap();
        assert_eq!(peds.len(), 2);
        assert!(peds.rows.iter().all(|r| r.group == 1.0));

        let params = params.drop_incomplete_timepoints(vec![7.0]);
        assert!(matches!(
            compute_peds(&create_table(), &create_metadata(), &params, PedsLevel::Sample),
            Err(FmtError::TimepointNotFound(_))
        ));
    }

    #[test]
    fn test_reference_not_in_table() {
        let md = metadata(&[("s1", "1", "d9", "p1"), ("s3", "1", "d2", "p2")]);
        match compute_peds(&create_table(), &md, &params(), PedsLevel::Feature) {
            Err(FmtError::ReferenceNotInTable(ids)) => assert_eq!(ids, vec!["d9"]),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
