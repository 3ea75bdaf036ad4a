//! Composable FMT (fecal microbiota transplant) Analysis Library
//!
//! This library provides modular primitives for tracking diversity and strain
//! engraftment across the timepoints of FMT studies.
//!
//! # Overview
//!
//! The library is organized into composable modules:
//!
//! - **data**: Core data structures (Metadata, FeatureTable, diversity measures, output tables)
//! - **reference**: Donor or baseline reference resolution per recipient sample
//! - **filter**: Subject and timepoint completeness rules
//! - **distribution**: Ordered and independent distributions of a diversity measure
//! - **engraftment**: PEDS and PPRS
//! - **test**: Permutation test against mismatched donors
//! - **correct**: Benjamini-Hochberg correction and Stouffer combination
//! - **pipeline**: Pipeline composition and execution
//!
//! # Example
//!
//! ```no_run
//! use composable_fmt::prelude::*;
//!
//! // Load data
//! let table = FeatureTable::from_tsv("strains.tsv").unwrap();
//! let metadata = Metadata::from_tsv("metadata.tsv").unwrap();
//!
//! // Run analysis pipeline
//! let peds = PedsParams::new("day", "donor", "subject");
//! let outputs = Pipeline::new()
//!     .sample_peds(peds.clone())
//!     .peds_simulation(peds, PermutationConfig::default())
//!     .run(&PipelineInputs::new(&metadata).table(&table))
//!     .unwrap();
//! outputs.write_tsv("results").unwrap();
//! ```

pub mod correct;
pub mod data;
pub mod distribution;
pub mod engraftment;
pub mod error;
pub mod filter;
pub mod pipeline;
pub mod reference;
pub mod test;

pub use error::{FmtError, Result};

/// Convenient re-exports for common usage.
pub mod prelude {
    pub use crate::correct::{combine_stouffer, correct_bh, BhCorrected, StoufferResult};
    pub use crate::data::{
        AlphaDiversity, Column, ColumnKind, DistanceMatrix, DiversityMeasure, EngraftmentKind,
        EngraftmentTable, FeatureTable, GlobalStats, IndependentDistribution, Metadata,
        OrderedDistribution, PermutationStats, Table,
    };
    pub use crate::distribution::{
        build_grouped_distributions, group_timepoints, GroupColumns, GroupTimepointsParams,
    };
    pub use crate::engraftment::{compute_peds, compute_pprs, PedsLevel, PedsParams, PprsParams};
    pub use crate::error::{FmtError, Result};
    pub use crate::filter::{apply_completeness, CompletenessPolicy};
    pub use crate::pipeline::{
        run_engraftment, Pipeline, PipelineConfig, PipelineInputs, PipelineOutputs, PipelineStep,
    };
    pub use crate::reference::{resolve_references, DistanceTo, ReferenceMap, ReferenceParams};
    pub use crate::test::{
        mismatched_pairs, peds_simulation, run_permutation_test, PermutationConfig,
        PermutationResults,
    };
}
