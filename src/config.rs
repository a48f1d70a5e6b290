use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::enzyme::Enzyme;
use crate::error::RescoreError;

/// Feature normalisation applied before training.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum NormalizationKind {
    /// Subtract the mean, divide by the standard deviation.
    #[default]
    Std,
    /// Map every feature onto [0, 1].
    Unit,
}

impl FromStr for NormalizationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "std" => Ok(NormalizationKind::Std),
            "unit" => Ok(NormalizationKind::Unit),
            _ => Err(format!("Unknown normalization: {}. Expected 'std' or 'unit'", s)),
        }
    }
}

/// Hyper-parameters of the L2-SVM solver.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SolverOptions {
    pub lambda: f64,
    pub lambda_u: f64,
    pub epsilon: f64,
    pub cg_iter_max: usize,
    pub mfn_iter_max: usize,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            lambda: 1.0,
            lambda_u: 1.0,
            epsilon: 1e-7,
            cg_iter_max: 10000,
            mfn_iter_max: 50,
        }
    }
}

/// Parameters for a rescoring run.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct RescoreConfig {
    /// FDR at which targets are counted and reported.
    pub test_fdr: f64,
    /// FDR used to pick positive training examples; `<= 0` falls back to `test_fdr`.
    pub selection_fdr: f64,
    /// Pinned cost of positive examples. When both costs are pinned no
    /// cross-validation takes place.
    pub cpos: Option<f64>,
    pub cneg: Option<f64>,
    pub max_iterations: usize,
    pub xval_folds: usize,
    /// Seed of the fold assignment; 0 is replaced with 1.
    pub seed: u64,
    /// Keep only the best scoring PSM per peptide in the final list.
    pub unique_peptides: bool,
    pub normalization: NormalizationKind,
    pub enzyme: Enzyme,
    /// Append enzymatic features to every PSM on ingestion.
    pub enzyme_features: bool,
    /// Keep learned weights even when they perform worse than the initial direction.
    pub override_direction: bool,
    /// Signed 1-based feature number used as the initial direction.
    pub default_direction: Option<i32>,
    /// Log the test-set performance after every iteration.
    pub report_each_iteration: bool,
    pub solver: SolverOptions,
}

impl Default for RescoreConfig {
    fn default() -> Self {
        Self {
            test_fdr: 0.01,
            selection_fdr: 0.01,
            cpos: None,
            cneg: None,
            max_iterations: 10,
            xval_folds: 3,
            seed: 1,
            unique_peptides: false,
            normalization: NormalizationKind::Std,
            enzyme: Enzyme::Trypsin,
            enzyme_features: false,
            override_direction: false,
            default_direction: None,
            report_each_iteration: false,
            solver: SolverOptions::default(),
        }
    }
}

impl RescoreConfig {
    /// FDR actually used for training-set selection.
    pub fn effective_selection_fdr(&self) -> f64 {
        if self.selection_fdr <= 0.0 {
            self.test_fdr
        } else {
            self.selection_fdr
        }
    }

    /// Seed actually fed to the fold generator.
    pub fn effective_seed(&self) -> u64 {
        if self.seed == 0 {
            1
        } else {
            self.seed
        }
    }

    /// Both costs pinned: train on the full set without cross-validation.
    pub fn fixed_costs(&self) -> Option<(f64, f64)> {
        match (self.cpos, self.cneg) {
            (Some(cpos), Some(cneg)) if cpos > 0.0 && cneg > 0.0 => Some((cpos, cneg)),
            _ => None,
        }
    }

    pub fn validate(&self) -> Result<(), RescoreError> {
        let fdr_ok = |v: f64| v > 0.0 && v <= 1.0;
        if !fdr_ok(self.test_fdr) {
            return Err(RescoreError::InvalidConfig(format!(
                "test FDR must lie in (0, 1], got {}",
                self.test_fdr
            )));
        }
        if self.selection_fdr > 1.0 {
            return Err(RescoreError::InvalidConfig(format!(
                "training FDR must not exceed 1, got {}",
                self.selection_fdr
            )));
        }
        for (name, value) in [("Cpos", self.cpos), ("Cneg", self.cneg)] {
            if let Some(c) = value {
                if !(c > 0.0 && c.is_finite()) {
                    return Err(RescoreError::InvalidConfig(format!(
                        "{} must be a positive number, got {}",
                        name, c
                    )));
                }
            }
        }
        if self.cneg.is_some() && self.cpos.is_none() {
            return Err(RescoreError::InvalidConfig(
                "Cneg can only be pinned together with Cpos".to_string(),
            ));
        }
        if self.xval_folds < 2 {
            return Err(RescoreError::InvalidConfig(format!(
                "at least 2 cross-validation folds are required, got {}",
                self.xval_folds
            )));
        }
        if self.max_iterations == 0 {
            return Err(RescoreError::InvalidConfig(
                "maximum number of iterations must be at least 1".to_string(),
            ));
        }
        if self.default_direction == Some(0) {
            return Err(RescoreError::InvalidConfig(
                "default direction is a signed 1-based feature number, 0 is not allowed".to_string(),
            ));
        }
        if !(self.solver.lambda > 0.0) || !(self.solver.epsilon > 0.0) {
            return Err(RescoreError::InvalidConfig(
                "solver lambda and epsilon must be positive".to_string(),
            ));
        }
        if self.solver.cg_iter_max == 0 || self.solver.mfn_iter_max == 0 {
            return Err(RescoreError::InvalidConfig(
                "solver iteration caps must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load a configuration from a JSON file. Missing keys keep their defaults.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<RescoreConfig> {
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config: {}", path.as_ref().display()))?;
    let config: RescoreConfig = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse config: {}", path.as_ref().display()))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = RescoreConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.fixed_costs(), None);
        assert_eq!(config.effective_seed(), 1);
    }

    #[test]
    fn test_selection_fdr_falls_back_to_test_fdr() {
        let config = RescoreConfig {
            selection_fdr: 0.0,
            test_fdr: 0.05,
            ..Default::default()
        };
        assert_eq!(config.effective_selection_fdr(), 0.05);
    }

    #[test]
    fn test_invalid_ranges_rejected() {
        let bad_fdr = RescoreConfig {
            test_fdr: 1.5,
            ..Default::default()
        };
        assert!(bad_fdr.validate().is_err());

        let bad_cost = RescoreConfig {
            cpos: Some(-1.0),
            ..Default::default()
        };
        assert!(bad_cost.validate().is_err());

        let lone_cneg = RescoreConfig {
            cneg: Some(1.0),
            ..Default::default()
        };
        assert!(lone_cneg.validate().is_err());

        let one_fold = RescoreConfig {
            xval_folds: 1,
            ..Default::default()
        };
        assert!(one_fold.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: RescoreConfig =
            serde_json::from_str(r#"{"test_fdr": 0.05, "normalization": "unit", "enzyme": "lys-c"}"#)
                .unwrap();
        assert_eq!(config.test_fdr, 0.05);
        assert_eq!(config.normalization, NormalizationKind::Unit);
        assert_eq!(config.enzyme, Enzyme::LysC);
        assert_eq!(config.max_iterations, 10);
        assert_eq!(config.solver.mfn_iter_max, 50);
    }
}
