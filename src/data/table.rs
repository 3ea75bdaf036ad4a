//! Output tables produced by the analysis steps.
//!
//! Every table carries [`ColumnDocs`], an ordered side map from column name to a
//! human-readable title and description used by downstream renderers.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::Path;

/// Title and description of one output column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDoc {
    pub title: String,
    pub description: String,
}

/// Ordered column name -> [`ColumnDoc`] map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDocs(Vec<(String, ColumnDoc)>);

impl ColumnDocs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the doc for a column. New columns are appended.
    pub fn insert(&mut self, name: &str, title: &str, description: &str) {
        let doc = ColumnDoc {
            title: title.to_string(),
            description: description.to_string(),
        };
        match self.0.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => *existing = doc,
            None => self.0.push((name.to_string(), doc)),
        }
    }

    /// Builder form of [`ColumnDocs::insert`].
    pub fn with(mut self, name: &str, title: &str, description: &str) -> Self {
        self.insert(name, title, description);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ColumnDoc> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, d)| d)
    }

    /// Column names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.0.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ColumnDoc)> + '_ {
        self.0.iter().map(|(n, d)| (n.as_str(), d))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Render a float cell; NaN is written as an empty (missing) cell.
fn float_cell(v: f64) -> String {
    if v.is_nan() {
        String::new()
    } else {
        v.to_string()
    }
}

fn opt_cell(v: &Option<String>) -> String {
    v.clone().unwrap_or_default()
}

/// A long-form table whose columns are described by [`ColumnDocs`].
pub trait Table {
    /// Column docs, in output column order.
    fn column_docs(&self) -> &ColumnDocs;

    /// Number of rows.
    fn n_rows(&self) -> usize;

    /// Cell value as text for a row and a column listed in the docs.
    fn cell(&self, row: usize, column: &str) -> String;

    /// Write the table as TSV, one header row of column names.
    fn to_tsv<P: AsRef<Path>>(&self, path: P) -> Result<()>
    where
        Self: Sized,
    {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_path(path)?;
        let names: Vec<&str> = self.column_docs().names().collect();
        writer.write_record(&names)?;
        for row in 0..self.n_rows() {
            writer.write_record(names.iter().map(|name| self.cell(row, name)))?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Table schema: one field per column with its title and description.
    fn schema(&self) -> serde_json::Value {
        let fields: Vec<serde_json::Value> = self
            .column_docs()
            .iter()
            .map(|(name, doc)| {
                json!({
                    "name": name,
                    "title": doc.title,
                    "description": doc.description,
                })
            })
            .collect();
        json!({ "fields": fields })
    }
}

/// One recipient sample in an ordered (time series) distribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderedRow {
    pub id: String,
    pub measure: f64,
    /// Time value of the sample.
    pub group: f64,
    pub subject: Option<String>,
    pub class: Option<String>,
    pub level: Option<String>,
}

/// Per-recipient measures ordered by time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderedDistribution {
    pub rows: Vec<OrderedRow>,
    pub docs: ColumnDocs,
}

impl OrderedDistribution {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Find a row by sample ID.
    pub fn get(&self, id: &str) -> Option<&OrderedRow> {
        self.rows.iter().find(|r| r.id == id)
    }
}

impl Table for OrderedDistribution {
    fn column_docs(&self) -> &ColumnDocs {
        &self.docs
    }

    fn n_rows(&self) -> usize {
        self.rows.len()
    }

    fn cell(&self, row: usize, column: &str) -> String {
        let r = &self.rows[row];
        match column {
            "id" => r.id.clone(),
            "measure" => float_cell(r.measure),
            "group" => float_cell(r.group),
            "subject" => opt_cell(&r.subject),
            "class" => opt_cell(&r.class),
            "level" => opt_cell(&r.level),
            _ => String::new(),
        }
    }
}

/// One row of an independent distribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndependentRow {
    /// Sample ID, or `A..B` for a pairwise comparison.
    pub id: String,
    pub measure: f64,
    /// `reference` or a control-group label.
    pub group: String,
    #[serde(rename = "A")]
    pub a: Option<String>,
    #[serde(rename = "B")]
    pub b: Option<String>,
}

/// Reference and control measures, independent of time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndependentDistribution {
    pub rows: Vec<IndependentRow>,
    pub docs: ColumnDocs,
}

impl IndependentDistribution {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows belonging to one group label.
    pub fn group(&self, group: &str) -> impl Iterator<Item = &IndependentRow> + '_ {
        let group = group.to_string();
        self.rows.iter().filter(move |r| r.group == group)
    }
}

impl Table for IndependentDistribution {
    fn column_docs(&self) -> &ColumnDocs {
        &self.docs
    }

    fn n_rows(&self) -> usize {
        self.rows.len()
    }

    fn cell(&self, row: usize, column: &str) -> String {
        let r = &self.rows[row];
        match column {
            "id" => r.id.clone(),
            "measure" => float_cell(r.measure),
            "group" => r.group.clone(),
            "A" => opt_cell(&r.a),
            "B" => opt_cell(&r.b),
            _ => String::new(),
        }
    }
}

/// Which engraftment statistic a table holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngraftmentKind {
    /// Proportional engraftment of donor strains, one row per recipient sample.
    SamplePeds,
    /// Proportional engraftment of donor strains, one row per feature and timepoint.
    FeaturePeds,
    /// Proportional persistence of recipient strains against the subject's baseline.
    SamplePprs,
}

impl EngraftmentKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SamplePeds => "sample_peds",
            Self::FeaturePeds => "feature_peds",
            Self::SamplePprs => "sample_pprs",
        }
    }
}

/// One PEDS/PPRS measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngraftmentRecord {
    /// Recipient sample ID, or feature ID for feature-level PEDS.
    pub id: String,
    /// `transferred / total`, NaN when total is 0.
    pub measure: f64,
    pub transferred_feature_count: usize,
    pub total_feature_count: usize,
    pub reference_id: Option<String>,
    pub subject: Option<String>,
    /// Time value.
    pub group: f64,
}

impl EngraftmentRecord {
    pub(crate) fn ratio(transferred: usize, total: usize) -> f64 {
        if total == 0 {
            f64::NAN
        } else {
            transferred as f64 / total as f64
        }
    }
}

/// PEDS or PPRS results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngraftmentTable {
    pub kind: EngraftmentKind,
    pub rows: Vec<EngraftmentRecord>,
    pub docs: ColumnDocs,
}

impl EngraftmentTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Find a row by ID. Feature-level tables may hold one row per timepoint.
    pub fn get(&self, id: &str) -> Option<&EngraftmentRecord> {
        self.rows.iter().find(|r| r.id == id)
    }
}

impl Table for EngraftmentTable {
    fn column_docs(&self) -> &ColumnDocs {
        &self.docs
    }

    fn n_rows(&self) -> usize {
        self.rows.len()
    }

    fn cell(&self, row: usize, column: &str) -> String {
        let r = &self.rows[row];
        match column {
            "id" => r.id.clone(),
            "measure" => float_cell(r.measure),
            "transferred_feature_count" => r.transferred_feature_count.to_string(),
            "total_feature_count" => r.total_feature_count.to_string(),
            "reference_id" => opt_cell(&r.reference_id),
            "subject" => opt_cell(&r.subject),
            "group" => float_cell(r.group),
            _ => String::new(),
        }
    }
}

/// One A-versus-B comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonRow {
    #[serde(rename = "A:group")]
    pub a_group: String,
    #[serde(rename = "A:n")]
    pub a_n: usize,
    #[serde(rename = "A:measure")]
    pub a_measure: f64,
    #[serde(rename = "B:group")]
    pub b_group: String,
    #[serde(rename = "B:n")]
    pub b_n: usize,
    #[serde(rename = "B:measure")]
    pub b_measure: f64,
    pub n: usize,
    #[serde(rename = "test-statistic")]
    pub test_statistic: f64,
    #[serde(rename = "p-value")]
    pub p_value: f64,
    #[serde(rename = "q-value")]
    pub q_value: Option<f64>,
}

fn comparison_cell(r: &ComparisonRow, column: &str) -> String {
    match column {
        "A:group" => r.a_group.clone(),
        "A:n" => r.a_n.to_string(),
        "A:measure" => float_cell(r.a_measure),
        "B:group" => r.b_group.clone(),
        "B:n" => r.b_n.to_string(),
        "B:measure" => float_cell(r.b_measure),
        "n" => r.n.to_string(),
        "test-statistic" => float_cell(r.test_statistic),
        "p-value" => float_cell(r.p_value),
        "q-value" => r.q_value.map(float_cell).unwrap_or_default(),
        _ => String::new(),
    }
}

/// Per-recipient permutation test results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermutationStats {
    pub rows: Vec<ComparisonRow>,
    pub docs: ColumnDocs,
}

impl PermutationStats {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows sorted by ascending p-value.
    pub fn sorted_by_pvalue(&self) -> Vec<&ComparisonRow> {
        let mut sorted: Vec<_> = self.rows.iter().collect();
        sorted.sort_by(|a, b| a.p_value.total_cmp(&b.p_value));
        sorted
    }

    /// Rows with q-value below `alpha`.
    pub fn significant(&self, alpha: f64) -> Vec<&ComparisonRow> {
        self.rows
            .iter()
            .filter(|r| r.q_value.is_some_and(|q| q < alpha))
            .collect()
    }
}

impl Table for PermutationStats {
    fn column_docs(&self) -> &ColumnDocs {
        &self.docs
    }

    fn n_rows(&self) -> usize {
        self.rows.len()
    }

    fn cell(&self, row: usize, column: &str) -> String {
        comparison_cell(&self.rows[row], column)
    }
}

/// Combined result across all recipients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalStats {
    pub row: ComparisonRow,
    pub docs: ColumnDocs,
}

impl Table for GlobalStats {
    fn column_docs(&self) -> &ColumnDocs {
        &self.docs
    }

    fn n_rows(&self) -> usize {
        1
    }

    fn cell(&self, _row: usize, column: &str) -> String {
        comparison_cell(&self.row, column)
    }
}
