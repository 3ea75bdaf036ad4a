//! Grouped diversity distributions.
//!
//! Joins an alpha or beta diversity measure with resolved references and
//! metadata groupings into two long-form tables:
//!
//! - an **ordered** distribution: one row per recipient sample, grouped by time;
//! - an **independent** distribution: reference-to-reference comparisons and,
//!   optionally, within-control-group comparisons.

mod grouping;
mod validate;

pub use grouping::{build_grouped_distributions, group_timepoints, GroupColumns, GroupTimepointsParams};
