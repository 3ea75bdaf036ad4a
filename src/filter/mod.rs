//! Sample filtering rules for longitudinal designs.

pub mod completeness;

pub use completeness::{
    apply_completeness, check_duplicate_timepoints, drop_timepoints, filter_incomplete_subjects,
    incomplete_subjects, CompletenessPolicy,
};
