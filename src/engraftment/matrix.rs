//! Presence-matrix alignment shared by PEDS, PPRS and the permutation test.

use crate::data::{FeatureTable, PresenceMatrix};
use crate::error::{FmtError, Result};
use nalgebra::DMatrix;
use std::collections::{BTreeSet, HashMap};

/// Reference presence broadcast onto recipients, and the transferred mask.
#[derive(Debug, Clone)]
pub(crate) struct TransferMasks {
    /// Row `i` is the presence row of pair `i`'s reference.
    pub broadcast: PresenceMatrix,
    /// `broadcast AND recipient`.
    pub transferred: PresenceMatrix,
}

impl TransferMasks {
    /// `(transferred, total)` per pair.
    pub fn row_counts(&self) -> Vec<(usize, usize)> {
        self.transferred
            .row_counts()
            .into_iter()
            .zip(self.broadcast.row_counts())
            .collect()
    }

    /// `(transferred, total)` per feature.
    pub fn col_counts(&self) -> Vec<(usize, usize)> {
        self.transferred
            .col_counts()
            .into_iter()
            .zip(self.broadcast.col_counts())
            .collect()
    }
}

/// Repeat reference rows so that row `i` belongs to `owners[i]`.
pub(crate) fn broadcast_rows(
    references: &PresenceMatrix,
    owners: &[&str],
) -> Result<PresenceMatrix> {
    let index: HashMap<&str, usize> = references
        .row_ids()
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i))
        .collect();

    let mut rows = Vec::with_capacity(owners.len());
    for owner in owners {
        let i = index
            .get(owner)
            .copied()
            .ok_or_else(|| FmtError::ReferenceNotInTable(vec![owner.to_string()]))?;
        rows.push(i);
    }

    let data = references.data();
    let broadcast = DMatrix::from_fn(rows.len(), data.ncols(), |r, c| data[(rows[r], c)]);
    PresenceMatrix::new(
        owners.iter().map(|s| s.to_string()).collect(),
        references.feature_ids().to_vec(),
        broadcast,
    )
}

/// Fail with every reference that is not a sample of the table.
pub(crate) fn require_references(table: &FeatureTable, references: &[String]) -> Result<()> {
    let missing: Vec<String> = references
        .iter()
        .filter(|r| !table.has_sample(r))
        .cloned()
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(FmtError::ReferenceNotInTable(missing))
    }
}

/// Build the transfer masks for `(recipient, reference)` pairs.
///
/// Every reference, then every recipient, must be a sample of the table.
pub(crate) fn transfer_masks(
    table: &FeatureTable,
    pairs: &[(String, String)],
) -> Result<TransferMasks> {
    let references: Vec<String> = pairs
        .iter()
        .map(|(_, r)| r.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    require_references(table, &references)?;

    let recipient_ids: Vec<String> = pairs.iter().map(|(s, _)| s.clone()).collect();
    let recipients = table.presence(&recipient_ids)?;
    let reference_presence = table.presence(&references)?;

    let owners: Vec<&str> = pairs.iter().map(|(_, r)| r.as_str()).collect();
    let broadcast = broadcast_rows(&reference_presence, &owners)?;
    let transferred = broadcast.and(&recipients)?;

    Ok(TransferMasks {
        broadcast,
        transferred,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_table() -> FeatureTable {
        let data = DMatrix::from_row_slice(4, 3, &[
            1.0, 1.0, 1.0,
            1.0, 0.0, 0.0,
            0.0, 0.0, 0.0,
            0.0, 5.0, 2.0,
        ]);
        FeatureTable::from_dense(
            &data,
            vec!["donor1".into(), "s1".into(), "s2".into(), "donor2".into()],
            vec!["f1".into(), "f2".into(), "f3".into()],
        )
        .unwrap()
    }

    #[test]
    fn test_broadcast_follows_pairs() {
        let table = create_table();
        let pairs = vec![
            ("s1".to_string(), "donor2".to_string()),
            ("s2".to_string(), "donor1".to_string()),
            ("s1".to_string(), "donor1".to_string()),
        ];
        let masks = transfer_masks(&table, &pairs).unwrap();

        assert_eq!(masks.broadcast.row_ids(), &["donor2", "donor1", "donor1"]);
        assert_eq!(masks.row_counts(), vec![(0, 2), (0, 3), (1, 3)]);
        assert_eq!(masks.col_counts(), vec![(1, 2), (0, 3), (0, 3)]);
    }

    #[test]
    fn test_reference_not_in_table() {
        let table = create_table();
        let pairs = vec![
            ("s1".to_string(), "donor3".to_string()),
            ("s2".to_string(), "donor1".to_string()),
        ];
        match transfer_masks(&table, &pairs) {
            Err(FmtError::ReferenceNotInTable(ids)) => assert_eq!(ids, vec!["donor3"]),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_recipient_not_in_table() {
        let table = create_table();
        let pairs = vec![("s9".to_string(), "donor1".to_string())];
        assert!(matches!(
            transfer_masks(&table, &pairs),
            Err(FmtError::SamplesNotInTable(ids)) if ids == vec!["s9"]
        ));
    }
}
