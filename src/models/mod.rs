pub mod classifier_trait;
pub mod svm;

pub use classifier_trait::{LinearSolver, SolverOutput, TrainingSet};
pub use svm::L2SvmMfn;
