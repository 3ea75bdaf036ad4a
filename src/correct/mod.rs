//! Multiple testing correction and p-value combination.

pub mod bh;
pub mod stouffer;

pub use bh::{bh_qvalues, correct_bh, BhCorrected};
pub use stouffer::{combine_stouffer, StoufferResult};
