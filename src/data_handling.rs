//! PSM collections grouped by label class.
use std::sync::Arc;

use crate::error::RescoreError;
use crate::preprocessing::Normalizer;
use crate::psm::{Label, Psm};

/// PSMs of one label read from one source.
#[derive(Debug, Clone)]
pub struct DataSet {
    pub source: String,
    label: Label,
    psms: Vec<Arc<Psm>>,
}

impl DataSet {
    pub fn new(source: impl Into<String>, label: Label) -> Self {
        DataSet {
            source: source.into(),
            label,
            psms: Vec::new(),
        }
    }

    pub fn label(&self) -> Label {
        self.label
    }

    pub fn push(&mut self, psm: Psm) {
        self.psms.push(Arc::new(psm));
    }

    pub fn len(&self) -> usize {
        self.psms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.psms.is_empty()
    }

    pub fn psms(&self) -> &[Arc<Psm>] {
        &self.psms
    }
}

/// All PSMs of one class (targets, or nulls), possibly from several sources.
#[derive(Debug, Clone)]
pub struct SetHandler {
    label: Label,
    subsets: Vec<DataSet>,
    num_features: usize,
}

impl SetHandler {
    pub fn new(label: Label, num_features: usize) -> Self {
        SetHandler {
            label,
            subsets: Vec::new(),
            num_features,
        }
    }

    /// Class label of the handler. Null handlers may also hold
    /// test-only decoy subsets.
    pub fn label(&self) -> Label {
        self.label
    }

    pub fn num_features(&self) -> usize {
        self.num_features
    }

    /// Add a subset after checking labels and feature counts of all its PSMs.
    pub fn add_subset(&mut self, subset: DataSet) -> Result<(), RescoreError> {
        if subset.label().is_target() != self.label.is_target() {
            let id = subset
                .psms()
                .first()
                .map(|p| p.id.clone())
                .unwrap_or_else(|| subset.source.clone());
            return Err(RescoreError::LabelMismatch(id));
        }
        if let Some(bad) = subset
            .psms()
            .iter()
            .find(|p| p.num_features() != self.num_features)
        {
            return Err(RescoreError::FeatureCountMismatch {
                psm_id: bad.id.clone(),
                expected: self.num_features,
                found: bad.num_features(),
            });
        }
        log::debug!(
            "Adding {} PSMs with label {} from {}",
            subset.len(),
            subset.label(),
            subset.source
        );
        self.subsets.push(subset);
        Ok(())
    }

    pub fn subsets(&self) -> &[DataSet] {
        &self.subsets
    }

    pub fn len(&self) -> usize {
        self.subsets.iter().map(DataSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate over `(label, psm)` pairs in subset order.
    pub fn iter(&self) -> impl Iterator<Item = (Label, &Arc<Psm>)> + '_ {
        self.subsets
            .iter()
            .flat_map(|s| s.psms.iter().map(move |p| (s.label, p)))
    }

    /// Rewrite every feature vector with `normalizer`.
    ///
    /// Must run before any ranking list shares the records; a record that is
    /// already shared gets copied instead of mutated.
    pub fn normalize(&mut self, normalizer: &Normalizer) {
        for subset in &mut self.subsets {
            for psm in &mut subset.psms {
                normalizer.normalize(&mut Arc::make_mut(psm).features);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn psm(id: &str, features: Vec<f64>) -> Psm {
        Psm::new(id, "K.PEPTIDE.A", ["P1"], features)
    }

    #[test]
    fn test_add_subset_checks_feature_count() {
        let mut handler = SetHandler::new(Label::Target, 2);
        let mut ok = DataSet::new("a.pin", Label::Target);
        ok.push(psm("t1", vec![1.0, 2.0]));
        assert!(handler.add_subset(ok).is_ok());

        let mut bad = DataSet::new("b.pin", Label::Target);
        bad.push(psm("t2", vec![1.0]));
        match handler.add_subset(bad) {
            Err(RescoreError::FeatureCountMismatch { psm_id, expected, found }) => {
                assert_eq!(psm_id, "t2");
                assert_eq!(expected, 2);
                assert_eq!(found, 1);
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(handler.len(), 1);
    }

    #[test]
    fn test_null_handler_accepts_test_only_decoys() {
        let mut handler = SetHandler::new(Label::Decoy, 1);
        let mut test_only = DataSet::new("shuffled2", Label::TestOnlyDecoy);
        test_only.push(psm("d1", vec![0.5]));
        assert!(handler.add_subset(test_only).is_ok());

        let mut target = DataSet::new("targets", Label::Target);
        target.push(psm("t1", vec![0.5]));
        assert!(handler.add_subset(target).is_err());

        let labels: Vec<Label> = handler.iter().map(|(l, _)| l).collect();
        assert_eq!(labels, vec![Label::TestOnlyDecoy]);
    }
}
