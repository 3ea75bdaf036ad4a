//! Proportional Persistence of Recipient Strains.

use super::peds::{sample_docs, sample_records};
use super::PprsParams;
use crate::data::{EngraftmentKind, EngraftmentTable, FeatureTable, Metadata};
use crate::error::Result;
use crate::filter::apply_completeness;
use crate::reference::{resolve_references, ReferenceParams};
use log::info;

/// Compute PPRS: the share of each subject's baseline features still present
/// in its later samples.
pub fn compute_pprs(
    table: &FeatureTable,
    metadata: &Metadata,
    params: &PprsParams,
) -> Result<EngraftmentTable> {
    let metadata = apply_completeness(
        metadata,
        &params.time_column,
        &params.subject_column,
        &params.completeness(),
        true,
    )?;

    let reference_params = ReferenceParams::baseline(
        &params.time_column,
        params.baseline_timepoint,
        &params.subject_column,
    )
    .filter_missing_references(params.filter_missing_references);
    let references = resolve_references(&metadata, &reference_params)?;

    let time = metadata.numeric_column(&params.time_column)?;
    let subject = metadata.categorical_column(&params.subject_column)?;
    let rows = sample_records(table, &references, &time, &subject)?;
    info!(
        "Computed PPRS for {} samples against baseline {}",
        rows.len(),
        params.baseline_timepoint
    );

    Ok(EngraftmentTable {
        kind: EngraftmentKind::SamplePprs,
        rows,
        docs: sample_docs(
            metadata.id_header(),
            ("PPRS", "Proportional Persistence of Recipient Strains"),
            ("baseline", "Baseline sample of the subject"),
            &params.subject_column,
            &params.time_column,
        ),
    })
}
