//! Pipeline composition and execution for FMT analyses.

mod runner;

pub use runner::{
    run_engraftment, Pipeline, PipelineConfig, PipelineInputs, PipelineOutputs, PipelineStep,
};
