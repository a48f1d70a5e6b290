use std::error::Error;
use std::fmt;

/// Errors raised while validating input or driving the training loop.
#[derive(Debug)]
pub enum RescoreError {
    /// Invalid or conflicting configuration values.
    InvalidConfig(String),
    /// A PSM carries a different number of features than the run expects.
    FeatureCountMismatch {
        psm_id: String,
        expected: usize,
        found: usize,
    },
    /// A PSM was added to a collection of the other label class.
    LabelMismatch(String),
    /// A class (targets or decoys) has no PSMs at all.
    EmptyClass(&'static str),
    /// Initial weights do not match the feature count.
    WeightLengthMismatch { expected: usize, found: usize },
    /// Every grid point of a fold failed inside the solver.
    AllGridPointsFailed { fold: usize },
}

impl fmt::Display for RescoreError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RescoreError::InvalidConfig(msg) => write!(f, "Invalid configuration: {}", msg),
            RescoreError::FeatureCountMismatch {
                psm_id,
                expected,
                found,
            } => write!(
                f,
                "PSM '{}' has {} features, expected {}",
                psm_id, found, expected
            ),
            RescoreError::LabelMismatch(id) => {
                write!(f, "PSM '{}' does not belong to this label class", id)
            }
            RescoreError::EmptyClass(class) => write!(f, "No {} PSMs were provided", class),
            RescoreError::WeightLengthMismatch { expected, found } => write!(
                f,
                "Weight vector has {} values, expected {} (features + bias)",
                found, expected
            ),
            RescoreError::AllGridPointsFailed { fold } => write!(
                f,
                "Solver failed for every (Cpos, Cneg) combination in fold {}",
                fold + 1
            ),
        }
    }
}

impl Error for RescoreError {}

/// Failures reported by a linear solver.
#[derive(Debug, Clone, PartialEq)]
pub enum SolverError {
    /// The training set holds no examples.
    EmptyProblem,
    /// The outer Newton loop ran out of iterations.
    NotConverged { iterations: usize },
    /// A weight came out NaN or infinite.
    NonFinite,
}

impl fmt::Display for SolverError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SolverError::EmptyProblem => write!(f, "Training set is empty"),
            SolverError::NotConverged { iterations } => {
                write!(f, "Solver did not converge within {} iterations", iterations)
            }
            SolverError::NonFinite => write!(f, "Solver produced non-finite weights"),
        }
    }
}

impl Error for SolverError {}
