//! Protease cleavage rules and the enzymatic features derived from them.
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::psm::split_peptide;

/// Names of the features appended by [`Enzyme::features`].
pub const ENZYME_FEATURE_NAMES: [&str; 3] = ["enzN", "enzC", "enzInt"];

/// Proteases with a known cleavage rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Enzyme {
    #[serde(rename = "no_enzyme")]
    NoEnzyme,
    #[default]
    #[serde(rename = "trypsin")]
    Trypsin,
    #[serde(rename = "chymotrypsin")]
    Chymotrypsin,
    #[serde(rename = "thermolysin")]
    Thermolysin,
    #[serde(rename = "proteinasek")]
    ProteinaseK,
    #[serde(rename = "pepsin")]
    Pepsin,
    #[serde(rename = "elastase")]
    Elastase,
    #[serde(rename = "lys-n")]
    LysN,
    #[serde(rename = "lys-c")]
    LysC,
    #[serde(rename = "arg-c")]
    ArgC,
    #[serde(rename = "asp-n")]
    AspN,
    #[serde(rename = "glu-c")]
    GluC,
}

impl Enzyme {
    pub const ALL: [Enzyme; 12] = [
        Enzyme::NoEnzyme,
        Enzyme::Trypsin,
        Enzyme::Chymotrypsin,
        Enzyme::Thermolysin,
        Enzyme::ProteinaseK,
        Enzyme::Pepsin,
        Enzyme::Elastase,
        Enzyme::LysN,
        Enzyme::LysC,
        Enzyme::ArgC,
        Enzyme::AspN,
        Enzyme::GluC,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Enzyme::NoEnzyme => "no_enzyme",
            Enzyme::Trypsin => "trypsin",
            Enzyme::Chymotrypsin => "chymotrypsin",
            Enzyme::Thermolysin => "thermolysin",
            Enzyme::ProteinaseK => "proteinasek",
            Enzyme::Pepsin => "pepsin",
            Enzyme::Elastase => "elastase",
            Enzyme::LysN => "lys-n",
            Enzyme::LysC => "lys-c",
            Enzyme::ArgC => "arg-c",
            Enzyme::AspN => "asp-n",
            Enzyme::GluC => "glu-c",
        }
    }

    /// Whether the bond between residues `n` and `c` is a cleavage site.
    /// A protein terminus (`-`) on either side always counts as one.
    pub fn is_enzymatic(self, n: char, c: char) -> bool {
        if self == Enzyme::NoEnzyme || n == '-' || c == '-' {
            return true;
        }
        match self {
            Enzyme::NoEnzyme => true,
            Enzyme::Trypsin => matches!(n, 'K' | 'R') && c != 'P',
            Enzyme::Chymotrypsin => matches!(n, 'F' | 'H' | 'W' | 'Y' | 'L' | 'M') && c != 'P',
            Enzyme::Thermolysin => {
                (matches!(c, 'A' | 'F' | 'I' | 'L' | 'M' | 'V') || (n == 'R' && c == 'G'))
                    && n != 'D'
                    && n != 'E'
            }
            Enzyme::ProteinaseK => matches!(n, 'A' | 'E' | 'F' | 'I' | 'L' | 'T' | 'V' | 'W' | 'Y'),
            Enzyme::Pepsin => {
                (matches!(c, 'F' | 'L' | 'W' | 'Y') || matches!(n, 'F' | 'L' | 'W' | 'Y')) && n != 'R'
            }
            Enzyme::Elastase => matches!(n, 'L' | 'V' | 'A' | 'G') && c != 'P',
            Enzyme::LysN => c == 'K',
            Enzyme::LysC => n == 'K' && c != 'P',
            Enzyme::ArgC => n == 'R' && c != 'P',
            Enzyme::AspN => c == 'D',
            Enzyme::GluC => n == 'E' && c != 'P',
        }
    }

    /// Number of internal cleavage sites in a bare sequence.
    pub fn count_enzymatic(self, sequence: &str) -> usize {
        let residues: Vec<char> = sequence.chars().collect();
        residues
            .windows(2)
            .filter(|pair| self.is_enzymatic(pair[0], pair[1]))
            .count()
    }

    /// Whether both ends of a flanked peptide (`K.SEQ.A`) are cleavage sites.
    pub fn is_enzymatic_peptide(self, peptide: &str) -> bool {
        let (n_flank, sequence, c_flank) = split_peptide(peptide);
        self.n_terminal(n_flank, sequence) && self.c_terminal(sequence, c_flank)
    }

    /// Enzymatic features of a flanked peptide, ordered as
    /// [`ENZYME_FEATURE_NAMES`].
    pub fn features(self, peptide: &str) -> [f64; 3] {
        let (n_flank, sequence, c_flank) = split_peptide(peptide);
        [
            bool_feature(self.n_terminal(n_flank, sequence)),
            bool_feature(self.c_terminal(sequence, c_flank)),
            self.count_enzymatic(sequence) as f64,
        ]
    }

    fn n_terminal(self, n_flank: &str, sequence: &str) -> bool {
        let n = n_flank.chars().last().unwrap_or('-');
        let c = sequence.chars().next().unwrap_or('-');
        self.is_enzymatic(n, c)
    }

    fn c_terminal(self, sequence: &str, c_flank: &str) -> bool {
        let n = sequence.chars().last().unwrap_or('-');
        let c = c_flank.chars().next().unwrap_or('-');
        self.is_enzymatic(n, c)
    }
}

fn bool_feature(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

impl fmt::Display for Enzyme {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Enzyme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.to_lowercase();
        Enzyme::ALL
            .iter()
            .copied()
            .find(|e| e.name() == lowered)
            .ok_or_else(|| {
                format!(
                    "Unknown enzyme: {}. Expected one of: {}",
                    s,
                    Enzyme::ALL.iter().map(|e| e.name()).collect::<Vec<_>>().join(", ")
                )
            })
    }
}
