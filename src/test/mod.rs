//! Significance testing of engraftment against chance donor pairing.


pub use permutation::{
    mismatched_pairs, mismatched_peds, peds_simulation, run_permutation_test, PermutationConfig,
    PermutationResults,
};
