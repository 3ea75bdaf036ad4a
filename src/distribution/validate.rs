//! Structural checks on built distributions.

use crate::data::OrderedDistribution;
use crate::error::{FmtError, Result};
use std::collections::{BTreeMap, BTreeSet};

impl OrderedDistribution {
    /// Check that the distribution is matched: each subject appears at most once
    /// per time group.
    ///
    /// Requires a subject on every row.
    pub fn validate_matched(&self) -> Result<()> {
        let mut seen: BTreeMap<u64, BTreeSet<&str>> = BTreeMap::new();
        let mut duplicates: BTreeMap<u64, BTreeSet<&str>> = BTreeMap::new();

        for row in &self.rows {
            let subject = row.subject.as_deref().ok_or_else(|| {
                FmtError::InvalidParameter(format!(
                    "Sample '{}' has no subject; a matched distribution needs a subject column",
                    row.id
                ))
            })?;
            let key = row.group.to_bits();
            if !seen.entry(key).or_default().insert(subject) {
                duplicates.entry(key).or_default().insert(subject);
            }
        }

        match duplicates.into_iter().next() {
            None => Ok(()),
            Some((group, subjects)) => Err(FmtError::DuplicateSubjectInGroup {
                group: f64::from_bits(group).to_string(),
                subjects: subjects.into_iter().map(String::from).collect(),
            }),
        }
    }
}
