//! Linear L2-loss SVM trained with the modified finite Newton method.
//!
//! Each Newton step solves a regularised least-squares problem over the
//! examples currently inside the margin (CGLS), then moves towards that
//! solution with an exact line search. The first pass uses a loose
//! tolerance and a short CG budget; once it is optimal at that tolerance
//! the configured one takes over.
pub mod cgls;
pub mod line_search;

use crate::config::SolverOptions;
use crate::error::SolverError;
use crate::models::classifier_trait::{LinearSolver, SolverOutput, TrainingSet};

use cgls::Cgls;
use line_search::line_search;

const BIG_EPSILON: f64 = 0.01;
const RELATIVE_STOP_EPS: f64 = 1e-9;
const SMALL_CG_ITER_MAX: usize = 10;

#[derive(Debug, Clone, Default)]
pub struct L2SvmMfn {
    pub options: SolverOptions,
}

impl L2SvmMfn {
    pub fn new(options: SolverOptions) -> Self {
        L2SvmMfn { options }
    }
}

impl LinearSolver for L2SvmMfn {
    fn train(&self, set: &TrainingSet<'_>, costs: &[f64]) -> Result<SolverOutput, SolverError> {
        if set.is_empty() {
            return Err(SolverError::EmptyProblem);
        }
        let m = set.len();
        let d = set.num_features() + 1;
        let lambda = self.options.lambda;
        let labels = &set.labels;

        let mut w = vec![0.0; d];
        let mut o = vec![0.0; m];
        let (mut active, mut inactive) = partition_margin(labels, &o);
        let mut f = objective(lambda, &w, labels, &o, costs);

        let mut epsilon = BIG_EPSILON;
        let mut coarse = true;
        let mut cg_iter_max = SMALL_CG_ITER_MAX.min(self.options.cg_iter_max);

        for iteration in 1..=self.options.mfn_iter_max {
            let mut w_bar = w.clone();
            let mut o_bar = o.clone();
            let cg_optimal = Cgls {
                set,
                costs,
                lambda,
                epsilon,
                max_iterations: cg_iter_max,
            }
            .solve(&active, &mut w_bar, &mut o_bar);
            for &i in &inactive {
                o_bar[i] = set.output(i, &w_bar);
            }
            cg_iter_max = self.options.cg_iter_max;

            let margin_optimal = active.iter().all(|&i| labels[i] * o_bar[i] <= 1.0 + epsilon)
                && inactive.iter().all(|&i| labels[i] * o_bar[i] >= 1.0 - epsilon);

            if cg_optimal && margin_optimal {
                if coarse {
                    coarse = false;
                    epsilon = self.options.epsilon;
                    log::trace!("L2-SVM-MFN: coarse optimum at iteration {}", iteration);
                    continue;
                }
                return finish(w_bar, o_bar, iteration);
            }

            let delta = line_search(&w, &w_bar, lambda, &o, &o_bar, labels, costs);
            for (wj, wbj) in w.iter_mut().zip(&w_bar) {
                *wj += delta * (wbj - *wj);
            }
            for (oi, obi) in o.iter_mut().zip(&o_bar) {
                *oi += delta * (obi - *oi);
            }
            (active, inactive) = partition_margin(labels, &o);

            let f_old = f;
            f = objective(lambda, &w, labels, &o, costs);
            if (f - f_old).abs() < RELATIVE_STOP_EPS * f_old.abs() {
                return finish(w, o, iteration);
            }
        }

        Err(SolverError::NotConverged {
            iterations: self.options.mfn_iter_max,
        })
    }

    fn name(&self) -> &str {
        "l2-svm-mfn"
    }
}

fn finish(weights: Vec<f64>, outputs: Vec<f64>, iterations: usize) -> Result<SolverOutput, SolverError> {
    if weights.iter().any(|w| !w.is_finite()) {
        return Err(SolverError::NonFinite);
    }
    Ok(SolverOutput {
        weights,
        outputs,
        iterations,
    })
}

/// Split example indices into those inside the margin (`y o < 1`) and the rest.
fn partition_margin(labels: &[f64], o: &[f64]) -> (Vec<usize>, Vec<usize>) {
    (0..o.len()).partition(|&i| 1.0 - labels[i] * o[i] > 0.0)
}

fn objective(lambda: f64, w: &[f64], labels: &[f64], o: &[f64], costs: &[f64]) -> f64 {
    let reg = 0.5 * lambda * w.iter().map(|v| v * v).sum::<f64>();
    let loss: f64 = o
        .iter()
        .zip(labels)
        .zip(costs)
        .map(|((&oi, &y), &c)| {
            let diff = 1.0 - y * oi;
            if diff > 0.0 {
                0.5 * c * diff * diff
            } else {
                0.0
            }
        })
        .sum();
    reg + loss
}
