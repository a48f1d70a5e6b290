use crate::error::SolverError;

/// Examples handed to a [`LinearSolver`].
///
/// Rows borrow the feature vectors of the PSMs they came from; the bias
/// column is implicit and always 1.
#[derive(Debug, Clone, Default)]
pub struct TrainingSet<'a> {
    pub rows: Vec<&'a [f64]>,
    /// `+1.0` for positives, `-1.0` for negatives.
    pub labels: Vec<f64>,
    pub positives: usize,
    pub negatives: usize,
}

impl<'a> TrainingSet<'a> {
    pub fn push(&mut self, row: &'a [f64], positive: bool) {
        self.rows.push(row);
        if positive {
            self.labels.push(1.0);
            self.positives += 1;
        } else {
            self.labels.push(-1.0);
            self.negatives += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn num_features(&self) -> usize {
        self.rows.first().map_or(0, |r| r.len())
    }

    /// Per-example costs: `cpos` for positives, `cneg` for negatives.
    pub fn costs(&self, cpos: f64, cneg: f64) -> Vec<f64> {
        self.labels
            .iter()
            .map(|&y| if y > 0.0 { cpos } else { cneg })
            .collect()
    }

    /// `w · x_i + bias` for example `i`.
    pub fn output(&self, i: usize, w: &[f64]) -> f64 {
        let row = self.rows[i];
        row.iter().zip(w).map(|(x, wj)| x * wj).sum::<f64>() + w[row.len()]
    }
}

/// Result of one solver call.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverOutput {
    /// Weights followed by the bias term.
    pub weights: Vec<f64>,
    /// Margin output of every training example.
    pub outputs: Vec<f64>,
    pub iterations: usize,
}

/// A linear classifier trained on a labelled, cost-weighted example set.
///
/// Implementations must be deterministic: the grid search evaluates several
/// cost settings concurrently and relies on getting the same answer as a
/// sequential run.
pub trait LinearSolver: Sync {
    fn train(&self, set: &TrainingSet<'_>, costs: &[f64]) -> Result<SolverOutput, SolverError>;

    /// Optional human readable name for the solver
    fn name(&self) -> &str {
        "linear"
    }
}
