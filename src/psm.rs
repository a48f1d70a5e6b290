//! PSM records and labels.
use std::collections::BTreeSet;
use std::fmt;

/// Role a PSM plays in target/decoy competition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Label {
    Target,
    Decoy,
    /// Decoy that only ever acts as a null when estimating error rates and
    /// is never handed to the solver as a negative example.
    TestOnlyDecoy,
}

impl Label {
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            1 => Some(Label::Target),
            -1 => Some(Label::Decoy),
            -2 => Some(Label::TestOnlyDecoy),
            _ => None,
        }
    }

    pub fn as_i32(self) -> i32 {
        match self {
            Label::Target => 1,
            Label::Decoy => -1,
            Label::TestOnlyDecoy => -2,
        }
    }

    pub fn is_target(self) -> bool {
        self == Label::Target
    }

    /// True for every null label, including test-only decoys.
    pub fn is_decoy(self) -> bool {
        !self.is_target()
    }

    /// Only regular decoys become negative training examples.
    pub fn is_training_negative(self) -> bool {
        self == Label::Decoy
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_i32())
    }
}

/// One peptide-spectrum match.
///
/// Records are shared behind `Arc` by every ranking list that references
/// them, so the feature vector is only rewritten (normalisation) before the
/// first list is built.
#[derive(Debug, Clone, PartialEq)]
pub struct Psm {
    pub id: String,
    /// Peptide with flanking residues, `X.SEQUENCE.X`.
    pub peptide: String,
    pub proteins: BTreeSet<String>,
    pub features: Vec<f64>,
    pub retention_time: Option<f64>,
    pub predicted_time: Option<f64>,
}

impl Psm {
    pub fn new<I, S>(id: impl Into<String>, peptide: impl Into<String>, proteins: I, features: Vec<f64>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Psm {
            id: id.into(),
            peptide: peptide.into(),
            proteins: proteins.into_iter().map(Into::into).collect(),
            features,
            retention_time: None,
            predicted_time: None,
        }
    }

    pub fn num_features(&self) -> usize {
        self.features.len()
    }

    /// Split the peptide into (n-terminal flank, sequence, c-terminal flank).
    ///
    /// Peptides without flanks come back as `("", peptide, "")`.
    pub fn peptide_parts(&self) -> (&str, &str, &str) {
        split_peptide(&self.peptide)
    }
}

pub fn split_peptide(peptide: &str) -> (&str, &str, &str) {
    match (peptide.find('.'), peptide.rfind('.')) {
        (Some(first), Some(last)) if last > first => (
            &peptide[..first],
            &peptide[first + 1..last],
            &peptide[last + 1..],
        ),
        _ => ("", peptide, ""),
    }
}

/// Ordered feature names of a run. Its length is the feature count every
/// PSM must match.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureNames {
    names: Vec<String>,
}

impl FeatureNames {
    pub fn new(names: Vec<String>) -> Self {
        FeatureNames { names }
    }

    pub fn push(&mut self, name: impl Into<String>) {
        self.names.push(name.into());
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n.eq_ignore_ascii_case(name))
    }
}
