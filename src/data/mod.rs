//! Data structures for engraftment and diversity-distribution analysis.

mod diversity;
mod feature_table;
mod metadata;
mod table;

pub use diversity::{AlphaDiversity, DistanceMatrix, DiversityMeasure};
pub use feature_table::{FeatureTable, PresenceMatrix};
pub use metadata::{Column, ColumnKind, Metadata, Value};
pub use table::{
    ColumnDoc, ColumnDocs, ComparisonRow, EngraftmentKind, EngraftmentRecord, EngraftmentTable,
    GlobalStats, IndependentDistribution, IndependentRow, OrderedDistribution, OrderedRow,
    PermutationStats, Table,
};
