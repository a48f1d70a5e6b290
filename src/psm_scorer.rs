use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;

use crate::config::RescoreConfig;
use crate::data_handling::SetHandler;
use crate::error::RescoreError;
use crate::models::{L2SvmMfn, LinearSolver};
use crate::preprocessing::Normalizer;
use crate::scores::{ParkMiller, Scores};
use crate::sanity_check::SanityCheck;

/// Outcome of one training run.
#[derive(Debug, Clone)]
pub struct RescoreResult {
    /// Final ranking with calibrated q-values and PEPs.
    pub scores: Scores,
    /// Normalized weights per fold (one entry on the fixed-cost path).
    pub fold_weights: Vec<Vec<f64>>,
    /// (Cpos, Cneg) chosen for every fold in the last iteration; `None` when
    /// the fold never had positives to train on.
    pub hyperparameters: Vec<Option<(f64, f64)>>,
    pub normalizer: Normalizer,
    pub pi0: f64,
    /// Targets at the test FDR in the final ranking.
    pub found: usize,
    /// Targets at the test FDR with the initial direction, summed over folds.
    pub initial_positives: usize,
    /// Targets at the test FDR on the held-out partitions after training.
    pub test_positives: usize,
    /// `false` when the learned weights were discarded by the direction check.
    pub direction_valid: bool,
}

impl RescoreResult {
    /// Fold weights mapped back onto the unnormalized feature scale.
    pub fn raw_weights(&self) -> Vec<Vec<f64>> {
        self.fold_weights
            .iter()
            .map(|w| self.normalizer.unnormalize_weights(w))
            .collect()
    }
}

/// Best grid point of one fold.
#[derive(Debug, Clone)]
struct GridPoint {
    cpos: f64,
    cneg: f64,
    positives: usize,
    weights: Vec<f64>,
}

/// Semi-supervised rescoring driver.
///
/// Iteratively selects confident targets as positives, trains a linear
/// solver against all decoys and re-ranks, separately for each
/// cross-validation fold.
pub struct PsmScorer<S: LinearSolver = L2SvmMfn> {
    config: RescoreConfig,
    solver: S,
}

impl PsmScorer<L2SvmMfn> {
    pub fn new(config: RescoreConfig) -> Self {
        let solver = L2SvmMfn::new(config.solver.clone());
        PsmScorer { config, solver }
    }
}

impl<S: LinearSolver> PsmScorer<S> {
    pub fn with_solver(config: RescoreConfig, solver: S) -> Self {
        PsmScorer { config, solver }
    }

    pub fn config(&self) -> &RescoreConfig {
        &self.config
    }

    /// Rescore all PSMs of `targets` and `decoys`.
    ///
    /// # Arguments
    ///
    /// * `targets` - Target PSMs
    /// * `decoys` - Decoy PSMs, test-only decoys included
    /// * `init_weights` - Optional starting weights on the raw feature scale,
    ///   features followed by the bias
    ///
    /// # Returns
    ///
    /// The calibrated final ranking together with the learned weights
    pub fn run(
        &self,
        mut targets: SetHandler,
        mut decoys: SetHandler,
        init_weights: Option<Vec<f64>>,
    ) -> Result<RescoreResult, RescoreError> {
        let start = chrono::Local::now();
        self.config.validate()?;
        let num_features = self.check_input(&targets, &decoys, init_weights.as_deref())?;

        let normalizer = Normalizer::fit(
            self.config.normalization,
            num_features,
            targets.iter().chain(decoys.iter()).map(|(_, psm)| psm.as_ref()),
        );
        targets.normalize(&normalizer);
        decoys.normalize(&normalizer);

        let fullset = Scores::from_sets(&[&targets, &decoys]);
        log::info!(
            "Train/test set contains {} positives and {} negatives, size ratio={:.4} and pi0={}",
            fullset.num_targets(),
            fullset.num_decoys(),
            fullset.target_decoy_ratio(),
            fullset.pi0()
        );

        let mut sanity = SanityCheck::new(self.config.test_fdr, self.config.override_direction)
            .with_default_direction(self.config.default_direction);
        if let Some(raw) = &init_weights {
            sanity = sanity.with_init_weights(normalizer.normalize_weights(raw));
        }

        let mut rng = StdRng::seed_from_u64(self.config.effective_seed());
        let mut result = match self.config.fixed_costs() {
            Some(costs) => self.train_fixed(fullset, costs, sanity, &mut rng)?,
            None => self.train_xval(fullset, sanity, &mut rng)?,
        };
        result.normalizer = normalizer;

        let elapsed = chrono::Local::now() - start;
        log::info!(
            "Found {} target PSMs scoring over {}% FDR level (pi0 = {:.4}); processing took {:.2} s",
            result.found,
            self.config.test_fdr * 100.0,
            result.pi0,
            elapsed.num_milliseconds() as f64 / 1000.0
        );
        Ok(result)
    }

    fn check_input(
        &self,
        targets: &SetHandler,
        decoys: &SetHandler,
        init_weights: Option<&[f64]>,
    ) -> Result<usize, RescoreError> {
        if targets.is_empty() {
            return Err(RescoreError::EmptyClass("target"));
        }
        if decoys.is_empty() {
            return Err(RescoreError::EmptyClass("decoy"));
        }
        let num_features = targets.num_features();
        if decoys.num_features() != num_features {
            let psm_id = decoys
                .iter()
                .next()
                .map(|(_, psm)| psm.id.clone())
                .unwrap_or_default();
            return Err(RescoreError::FeatureCountMismatch {
                psm_id,
                expected: num_features,
                found: decoys.num_features(),
            });
        }
        if let Some(w) = init_weights {
            if w.len() != num_features + 1 {
                return Err(RescoreError::WeightLengthMismatch {
                    expected: num_features + 1,
                    found: w.len(),
                });
            }
        }
        if let Some(direction) = self.config.default_direction {
            if direction.unsigned_abs() as usize > num_features {
                return Err(RescoreError::InvalidConfig(format!(
                    "default direction {} refers to a feature beyond the {} available",
                    direction, num_features
                )));
            }
        }
        Ok(num_features)
    }

    /// (Cpos, Cneg) combinations in traversal order.
    fn cost_grid(&self, factor: f64) -> Vec<(f64, f64)> {
        let cposs = match self.config.cpos {
            Some(cpos) => vec![cpos],
            None => vec![10.0, 1.0, 0.1],
        };
        let cfracs = match (self.config.cpos, self.config.cneg) {
            (Some(cpos), Some(cneg)) => vec![cneg / cpos],
            _ => vec![factor, 3.0 * factor, 10.0 * factor],
        };
        cposs
            .iter()
            .flat_map(|&cpos| cfracs.iter().map(move |&frac| (cpos, cpos * frac)))
            .collect()
    }

    fn train_xval(
        &self,
        fullset: Scores,
        mut sanity: SanityCheck,
        rng: &mut StdRng,
    ) -> Result<RescoreResult, RescoreError> {
        let folds = self.config.xval_folds;
        let num_features = fullset.holders().first().map_or(0, |s| s.psm.num_features());
        let mut fold_rng = ParkMiller::new(self.config.effective_seed());
        let (mut train, mut test) = fullset.create_xval_sets(folds, &mut fold_rng);
        for (i, (tr, te)) in train.iter().zip(&test).enumerate() {
            log::trace!(
                "Fold {}: {} training PSMs ({} targets), {} test PSMs ({} targets)",
                i + 1,
                tr.len(),
                tr.num_targets(),
                te.len(),
                te.num_targets()
            );
        }

        let mut weights = vec![vec![0.0; num_features + 1]; folds];
        sanity.init_direction(&mut test, &mut train, &mut weights);
        log::info!(
            "Estimating {} target PSMs over {}% FDR with the initial direction",
            sanity.initial_positives(),
            self.config.test_fdr * 100.0
        );

        let grid = self.cost_grid(fullset.target_decoy_ratio());
        let mut hyperparameters = vec![None; folds];
        for iteration in 1..=self.config.max_iterations {
            let found = self.xv_step(&mut train, &mut weights, &mut hyperparameters, &grid)?;
            log::info!(
                "Iteration {}:\tEstimated {} target PSMs over {}% FDR",
                iteration,
                found,
                self.config.test_fdr * 100.0
            );
            if self.config.report_each_iteration {
                let on_test = count_on(&mut test, &weights, self.config.test_fdr);
                log::info!("Iteration {}:\t{} target PSMs over {}% FDR on the test sets", iteration, on_test, self.config.test_fdr * 100.0);
            }
        }

        let direction_valid = sanity.validate_direction(&mut test, &mut train, &mut weights);
        let test_positives = count_on(&mut test, &weights, self.config.test_fdr);
        log::info!(
            "After all training done, {} target PSMs with q < {} were found when measuring on the test set",
            test_positives,
            self.config.test_fdr
        );

        let scores = if direction_valid {
            Scores::merge(test, self.config.unique_peptides, self.config.test_fdr, rng)
        } else {
            self.score_full(fullset, &weights[0], rng)
        };
        Ok(self.finish(scores, weights, hyperparameters, &sanity, test_positives, direction_valid))
    }

    /// Training without cross-validation: selection, training and reporting
    /// all use the full set.
    fn train_fixed(
        &self,
        fullset: Scores,
        (cpos, cneg): (f64, f64),
        mut sanity: SanityCheck,
        rng: &mut StdRng,
    ) -> Result<RescoreResult, RescoreError> {
        log::info!("Training with fixed costs Cpos={} Cneg={}", cpos, cneg);
        let num_features = fullset.holders().first().map_or(0, |s| s.psm.num_features());
        let mut train = vec![fullset.clone()];
        let mut test = vec![fullset.clone()];
        let mut weights = vec![vec![0.0; num_features + 1]];
        sanity.init_direction(&mut test, &mut train, &mut weights);

        let grid = [(cpos, cneg)];
        let mut hyperparameters = vec![None];
        for iteration in 1..=self.config.max_iterations {
            if let Some(best) = self.train_fold(&mut train[0], &weights[0], &grid, 0)? {
                log::info!(
                    "Iteration {}:\tEstimated {} target PSMs over {}% FDR",
                    iteration,
                    best.positives,
                    self.config.test_fdr * 100.0
                );
                hyperparameters[0] = Some((best.cpos, best.cneg));
                weights[0] = best.weights;
            }
        }

        let direction_valid = sanity.validate_direction(&mut test, &mut train, &mut weights);
        let test_positives = count_on(&mut test, &weights, self.config.test_fdr);
        let scores = self.score_full(fullset, &weights[0], rng);
        Ok(self.finish(scores, weights, hyperparameters, &sanity, test_positives, direction_valid))
    }

    /// One training pass over every fold. Returns the average number of
    /// targets found at the test FDR by the chosen weights, each PSM being
    /// part of `k - 1` training partitions.
    fn xv_step(
        &self,
        train: &mut [Scores],
        weights: &mut [Vec<f64>],
        hyperparameters: &mut [Option<(f64, f64)>],
        grid: &[(f64, f64)],
    ) -> Result<usize, RescoreError> {
        let mut total = 0;
        for (fold, set) in train.iter_mut().enumerate() {
            if let Some(best) = self.train_fold(set, &weights[fold], grid, fold)? {
                log::debug!(
                    "Fold {}: chose Cpos={} Cneg={} finding {} target PSMs",
                    fold + 1,
                    best.cpos,
                    best.cneg,
                    best.positives
                );
                total += best.positives;
                hyperparameters[fold] = Some((best.cpos, best.cneg));
                weights[fold] = best.weights;
            }
        }
        Ok(total / (train.len().max(2) - 1))
    }

    /// Train one partition at every grid point and keep the best.
    ///
    /// Grid points are trained in parallel; the reduction walks them in grid
    /// order and a later point replaces the current best on equal counts.
    /// `Ok(None)` when no target passes the selection FDR.
    fn train_fold(
        &self,
        set: &mut Scores,
        weights: &[f64],
        grid: &[(f64, f64)],
        fold: usize,
    ) -> Result<Option<GridPoint>, RescoreError> {
        let selection_fdr = self.config.effective_selection_fdr();
        let test_fdr = self.config.test_fdr;
        set.calc_scores(weights, selection_fdr);
        let set = &*set;
        let training = set.training_set(selection_fdr);
        if training.positives == 0 {
            log::warn!(
                "Fold {}: no target PSMs below {}% FDR to train on; keeping the previous weights",
                fold + 1,
                selection_fdr * 100.0
            );
            return Ok(None);
        }
        log::trace!(
            "Fold {}: training with {} positives and {} negatives",
            fold + 1,
            training.positives,
            training.negatives
        );

        let trials: Vec<Option<GridPoint>> = grid
            .par_iter()
            .map(|&(cpos, cneg)| {
                let costs = training.costs(cpos, cneg);
                match self.solver.train(&training, &costs) {
                    Ok(output) => {
                        let positives = set.evaluate(&output.weights, test_fdr);
                        log::trace!(
                            "Fold {}: Cpos={} Cneg={} found {} target PSMs after {} {} iterations",
                            fold + 1,
                            cpos,
                            cneg,
                            positives,
                            output.iterations,
                            self.solver.name()
                        );
                        Some(GridPoint {
                            cpos,
                            cneg,
                            positives,
                            weights: output.weights,
                        })
                    }
                    Err(e) => {
                        log::warn!("Fold {}: Cpos={} Cneg={} skipped: {}", fold + 1, cpos, cneg, e);
                        None
                    }
                }
            })
            .collect();

        let mut best: Option<GridPoint> = None;
        for trial in trials.into_iter().flatten() {
            if best.as_ref().map_or(true, |b| trial.positives >= b.positives) {
                best = Some(trial);
            }
        }
        best.map(Some).ok_or(RescoreError::AllGridPointsFailed { fold })
    }

    /// Rank the full set with one weight vector.
    fn score_full(&self, mut fullset: Scores, weights: &[f64], rng: &mut StdRng) -> Scores {
        fullset.calc_scores(weights, self.config.test_fdr);
        if self.config.unique_peptides {
            fullset.weed_out_redundant();
        }
        fullset.estimate_pi0(rng);
        fullset
    }

    fn finish(
        &self,
        mut scores: Scores,
        fold_weights: Vec<Vec<f64>>,
        hyperparameters: Vec<Option<(f64, f64)>>,
        sanity: &SanityCheck,
        test_positives: usize,
        direction_valid: bool,
    ) -> RescoreResult {
        let found = scores.calc_q(self.config.test_fdr);
        scores.calc_pep();
        RescoreResult {
            pi0: scores.pi0(),
            scores,
            fold_weights,
            hyperparameters,
            normalizer: Normalizer::identity(0),
            found,
            initial_positives: sanity.initial_positives(),
            test_positives,
            direction_valid,
        }
    }
}

fn count_on(sets: &mut [Scores], weights: &[Vec<f64>], fdr: f64) -> usize {
    sets.iter_mut()
        .zip(weights)
        .map(|(set, w)| set.calc_scores(w, fdr))
        .sum()
}
