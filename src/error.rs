//! Error types for the composable-fmt library.

use crate::data::ColumnKind;
use thiserror::Error;

/// Main error type for the library.
#[derive(Error, Debug)]
pub enum FmtError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid value '{value}' at row {row}, column {col}")]
    InvalidValue {
        value: String,
        row: usize,
        col: usize,
    },

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Empty data: {0}")]
    EmptyData(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Conflicting parameters: {0}")]
    ConflictingParameters(String),

    #[error("Duplicate sample ID '{0}' in metadata")]
    DuplicateSampleId(String),

    #[error("{}", column_not_found(.column, .is_id_column))]
    ColumnNotFound { column: String, is_id_column: bool },

    #[error("Column '{column}' must be {expected}, but it is {found}")]
    WrongColumnType {
        column: String,
        expected: ColumnKind,
        found: ColumnKind,
    },

    #[error("Baseline timepoint {timepoint} was not found in the '{column}' column")]
    BaselineNotFound { timepoint: f64, column: String },

    #[error("Subject '{subject}' has more than one baseline sample: {samples:?}")]
    MultipleBaselines {
        subject: String,
        samples: Vec<String>,
    },

    #[error("No baseline samples were connected via subject to any other sample")]
    NoBaselineSamples,

    #[error(
        "No subject linked a baseline sample to any other sample; \
         check that the subject column identifies samples across time"
    )]
    NoSubjectLinkage,

    #[error(
        "Missing references for the associated sample data. Make sure every sample \
         with a timepoint value has a reference, or enable filter_missing_references. \
         IDs with missing references: {0:?}"
    )]
    MissingReferences(Vec<String>),

    #[error(
        "References are not present in the diversity measure, or enable \
         filter_missing_references to drop them: {0:?}"
    )]
    UnavailableReferences(Vec<String>),

    #[error("No references remained after filtering")]
    NoReferencesFound,

    #[error("Diversity measure is empty")]
    EmptyMeasure,

    #[error("Sample pairs not found in the pairwise diversity measure: {}", format_pairs(.0))]
    PairwiseLookupFailed(Vec<(String, String)>),

    #[error("Samples not found in the diversity measure: {0:?}")]
    SamplesNotInMeasure(Vec<String>),

    #[error("References not found in the feature table: {0:?}")]
    ReferenceNotInTable(Vec<String>),

    #[error("Samples not found in the feature table: {0:?}")]
    SamplesNotInTable(Vec<String>),

    #[error(
        "Subject '{subject}' has more than one sample at the same timepoint. \
         Timepoints for this subject: {timepoints:?}"
    )]
    DuplicateSubjectTimepoint {
        subject: String,
        timepoints: Vec<f64>,
    },

    #[error(
        "Missing timepoints for associated subjects. Make sure all subjects have \
         all timepoints or use drop_incomplete_subjects. Incomplete subjects: {0:?}"
    )]
    IncompleteSubjects(Vec<String>),

    #[error("Timepoints requested for removal were not found in the time column: {0:?}")]
    TimepointNotFound(Vec<f64>),

    #[error(
        "Only one distinct donor is present; mismatched donor-recipient pairs \
         cannot be formed"
    )]
    SingleDonorError,

    #[error("Subjects occur more than once within group '{group}': {subjects:?}")]
    DuplicateSubjectInGroup {
        group: String,
        subjects: Vec<String>,
    },

    #[error("Pipeline error: {0}")]
    Pipeline(String),
}

fn column_not_found(column: &str, is_id_column: &bool) -> String {
    if *is_id_column {
        format!(
            "Column '{}' is the metadata ID column; the requested column cannot be the ID column",
            column
        )
    } else {
        format!("Missing column '{}' in metadata", column)
    }
}

fn format_pairs(pairs: &[(String, String)]) -> String {
    pairs
        .iter()
        .map(|(a, b)| format!("({}, {})", a, b))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, FmtError>;
