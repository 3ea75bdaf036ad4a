//! Pipeline runner for composing and executing analysis steps.

use crate::data::{
    DiversityMeasure, EngraftmentTable, FeatureTable, IndependentDistribution, Metadata,
    OrderedDistribution, Table,
};
use crate::distribution::{group_timepoints, GroupTimepointsParams};
use crate::engraftment::{compute_peds, compute_pprs, PedsLevel, PedsParams, PprsParams};
use crate::error::{FmtError, Result};
use crate::test::permutation::{peds_simulation, PermutationConfig, PermutationResults};
use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// A step in the analysis pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PipelineStep {
    /// Build ordered and independent distributions from a diversity measure.
    GroupTimepoints(GroupTimepointsParams),
    /// PEDS per recipient sample.
    SamplePeds(PedsParams),
    /// PEDS per feature and timepoint.
    FeaturePeds(PedsParams),
    /// PPRS against each subject's baseline.
    SamplePprs(PprsParams),
    /// Sample PEDS tested against mismatched donor pairs.
    PedsSimulation {
        params: PedsParams,
        #[serde(default)]
        config: PermutationConfig,
    },
}

impl PipelineStep {
    fn name(&self) -> &'static str {
        match self {
            PipelineStep::GroupTimepoints(_) => "group_timepoints",
            PipelineStep::SamplePeds(_) => "sample_peds",
            PipelineStep::FeaturePeds(_) => "feature_peds",
            PipelineStep::SamplePprs(_) => "sample_pprs",
            PipelineStep::PedsSimulation { .. } => "peds_simulation",
        }
    }
}

/// Pipeline configuration for serialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Name of the pipeline.
    pub name: String,
    /// Description.
    pub description: Option<String>,
    /// Steps to execute.
    pub steps: Vec<PipelineStep>,
}

impl PipelineConfig {
    /// Load from YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(FmtError::from)
    }

    /// Save to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(FmtError::from)
    }

    /// Load from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_yaml(&fs::read_to_string(path)?)
    }
}

/// Data the steps read from. Each step checks for the input it needs.
#[derive(Debug, Clone, Copy)]
pub struct PipelineInputs<'a> {
    pub metadata: &'a Metadata,
    pub measure: Option<&'a DiversityMeasure>,
    pub table: Option<&'a FeatureTable>,
}

impl<'a> PipelineInputs<'a> {
    pub fn new(metadata: &'a Metadata) -> Self {
        Self {
            metadata,
            measure: None,
            table: None,
        }
    }

    pub fn measure(mut self, measure: &'a DiversityMeasure) -> Self {
        self.measure = Some(measure);
        self
    }

    pub fn table(mut self, table: &'a FeatureTable) -> Self {
        self.table = Some(table);
        self
    }

    fn require_measure(&self, step: &str) -> Result<&'a DiversityMeasure> {
        self.measure.ok_or_else(|| {
            FmtError::Pipeline(format!("{} needs a diversity measure", step))
        })
    }

    fn require_table(&self, step: &str) -> Result<&'a FeatureTable> {
        self.table
            .ok_or_else(|| FmtError::Pipeline(format!("{} needs a feature table", step)))
    }
}

/// Tables produced by a pipeline run.
#[derive(Debug, Clone, Default)]
pub struct PipelineOutputs {
    pub ordered: Option<OrderedDistribution>,
    pub independent: Option<IndependentDistribution>,
    /// Engraftment tables with the 1-based number of the step that made them.
    pub engraftment: Vec<(usize, EngraftmentTable)>,
    pub permutation: Option<PermutationResults>,
}

impl PipelineOutputs {
    /// Write every table as `<name>.tsv` with a `<name>.schema.json` next to it.
    ///
    /// Engraftment tables are named `step<n>_<kind>` so that repeated steps of
    /// one kind do not overwrite each other.
    ///
    /// Returns the TSV paths in write order.
    pub fn write_tsv<P: AsRef<Path>>(&self, dir: P) -> Result<Vec<PathBuf>> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let mut written = Vec::new();
        if let Some(t) = &self.ordered {
            written.push(write_table(dir, "ordered", t)?);
        }
        if let Some(t) = &self.independent {
            written.push(write_table(dir, "independent", t)?);
        }
        for (step, t) in &self.engraftment {
            let name = format!("step{}_{}", step, t.kind.name());
            written.push(write_table(dir, &name, t)?);
        }
        if let Some(p) = &self.permutation {
            written.push(write_table(dir, "per_subject_stats", &p.per_subject)?);
            written.push(write_table(dir, "global_stats", &p.global)?);
        }
        info!("Wrote {} tables to {}", written.len(), dir.display());
        Ok(written)
    }
}

fn write_table<T: Table>(dir: &Path, name: &str, table: &T) -> Result<PathBuf> {
    let path = dir.join(format!("{}.tsv", name));
    table.to_tsv(&path)?;
    let schema = serde_json::to_string_pretty(&table.schema())?;
    fs::write(dir.join(format!("{}.schema.json", name)), schema)?;
    Ok(path)
}

/// Builder for constructing and running analysis pipelines.
#[derive(Debug, Clone)]
pub struct Pipeline {
    steps: Vec<PipelineStep>,
    name: String,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    /// Create a new empty pipeline.
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            name: "unnamed".to_string(),
        }
    }

    /// Create from a config.
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            steps: config.steps.clone(),
            name: config.name.clone(),
        }
    }

    /// Set the pipeline name.
    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Build grouped distributions from the diversity measure.
    pub fn group_timepoints(mut self, params: GroupTimepointsParams) -> Self {
        self.steps.push(PipelineStep::GroupTimepoints(params));
        self
    }

    /// Compute sample-level PEDS.
    pub fn sample_peds(mut self, params: PedsParams) -> Self {
        self.steps.push(PipelineStep::SamplePeds(params));
        self
    }

    /// Compute feature-level PEDS.
    pub fn feature_peds(mut self, params: PedsParams) -> Self {
        self.steps.push(PipelineStep::FeaturePeds(params));
        self
    }

    /// Compute sample-level PPRS.
    pub fn sample_pprs(mut self, params: PprsParams) -> Self {
        self.steps.push(PipelineStep::SamplePprs(params));
        self
    }

    /// Test sample PEDS against mismatched donors.
    pub fn peds_simulation(mut self, params: PedsParams, config: PermutationConfig) -> Self {
        self.steps
            .push(PipelineStep::PedsSimulation { params, config });
        self
    }

    /// Get the steps.
    pub fn steps(&self) -> &[PipelineStep] {
        &self.steps
    }

    /// Convert to config for serialization.
    pub fn to_config(&self, description: Option<&str>) -> PipelineConfig {
        PipelineConfig {
            name: self.name.clone(),
            description: description.map(String::from),
            steps: self.steps.clone(),
        }
    }

    /// Run every step in order.
    pub fn run(&self, inputs: &PipelineInputs<'_>) -> Result<PipelineOutputs> {
        if self.steps.is_empty() {
            return Err(FmtError::Pipeline(format!(
                "Pipeline '{}' has no steps",
                self.name
            )));
        }
        info!("Running pipeline '{}' ({} steps)", self.name, self.steps.len());

        let mut outputs = PipelineOutputs::default();
        for (i, step) in self.steps.iter().enumerate() {
            apply(i + 1, step, inputs, &mut outputs).map_err(|e| {
                FmtError::Pipeline(format!("Step {} ({}) failed: {}", i + 1, step.name(), e))
            })?;
        }
        Ok(outputs)
    }
}

fn apply(
    number: usize,
    step: &PipelineStep,
    inputs: &PipelineInputs<'_>,
    outputs: &mut PipelineOutputs,
) -> Result<()> {
    match step {
        PipelineStep::GroupTimepoints(params) => {
            let measure = inputs.require_measure(step.name())?;
            let (ordered, independent) = group_timepoints(measure, inputs.metadata, params)?;
            outputs.ordered = Some(ordered);
            outputs.independent = Some(independent);
        }
        PipelineStep::SamplePeds(params) => {
            let table = inputs.require_table(step.name())?;
            let peds = compute_peds(table, inputs.metadata, params, PedsLevel::Sample)?;
            outputs.engraftment.push((number, peds));
        }
        PipelineStep::FeaturePeds(params) => {
            let table = inputs.require_table(step.name())?;
            let peds = compute_peds(table, inputs.metadata, params, PedsLevel::Feature)?;
            outputs.engraftment.push((number, peds));
        }
        PipelineStep::SamplePprs(params) => {
            let table = inputs.require_table(step.name())?;
            let pprs = compute_pprs(table, inputs.metadata, params)?;
            outputs.engraftment.push((number, pprs));
        }
        PipelineStep::PedsSimulation { params, config } => {
            let table = inputs.require_table(step.name())?;
            outputs.permutation = Some(peds_simulation(table, inputs.metadata, params, config)?);
        }
    }
    Ok(())
}

/// Convenience function: sample PEDS plus its permutation test.
pub fn run_engraftment(
    table: &FeatureTable,
    metadata: &Metadata,
    params: &PedsParams,
    config: &PermutationConfig,
) -> Result<PipelineOutputs> {
    Pipeline::new()
        .name("engraftment")
        .sample_peds(params.clone())
        .peds_simulation(params.clone(), config.clone())
        .run(&PipelineInputs::new(metadata).table(table))
}
