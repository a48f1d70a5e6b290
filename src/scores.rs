//! Ranked target/decoy lists and their calibration.
//!
//! A [`Scores`] list is built once for the full data set, once per
//! cross-validation partition, and once for the merged result. Every
//! re-score fully re-sorts the list; q-values, π₀ and PEPs are always
//! derived from the current order.
use std::collections::HashSet;
use std::sync::Arc;

use rand::Rng;

use crate::data_handling::SetHandler;
use crate::models::TrainingSet;
use crate::psm::{Label, Psm};
use crate::stats;

/// Park-Miller minimal standard generator driving fold assignment.
#[derive(Debug, Clone)]
pub struct ParkMiller {
    state: u64,
}

impl ParkMiller {
    const MULTIPLIER: u64 = 279_470_273;
    const MODULUS: u64 = 4_294_967_291;

    /// A zero seed would lock the generator at zero and is replaced with 1.
    pub fn new(seed: u64) -> Self {
        let state = seed % Self::MODULUS;
        ParkMiller {
            state: if state == 0 { 1 } else { state },
        }
    }

    pub fn next_value(&mut self) -> u64 {
        self.state = self.state * Self::MULTIPLIER % Self::MODULUS;
        self.state
    }
}

/// One entry of a ranking list.
#[derive(Debug, Clone)]
pub struct ScoreHolder {
    pub score: f64,
    pub label: Label,
    pub q: f64,
    pub pep: f64,
    pub psm: Arc<Psm>,
}

impl ScoreHolder {
    pub fn new(label: Label, psm: Arc<Psm>) -> Self {
        ScoreHolder {
            score: 0.0,
            label,
            q: 1.0,
            pep: 1.0,
            psm,
        }
    }

    pub fn is_target(&self) -> bool {
        self.label.is_target()
    }

    pub fn is_decoy(&self) -> bool {
        self.label.is_decoy()
    }

    fn to_pair(&self) -> (f64, bool) {
        (self.score, self.is_target())
    }
}

/// Single-feature direction found by [`Scores::init_direction`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InitDirection {
    pub feature: usize,
    /// `1.0` when high values are good, `-1.0` when low values are.
    pub sign: f64,
    pub positives: usize,
}

impl InitDirection {
    /// Weight vector (bias included) selecting only this feature.
    pub fn weights(&self, num_features: usize) -> Vec<f64> {
        let mut w = vec![0.0; num_features + 1];
        w[self.feature] = self.sign;
        w
    }
}

/// Linear score with the bias in the last weight slot.
pub fn linear_score(weights: &[f64], features: &[f64]) -> f64 {
    let bias = weights[features.len()];
    features
        .iter()
        .zip(weights)
        .fold(bias, |acc, (x, w)| acc + x * w)
}

#[derive(Debug, Clone)]
pub struct Scores {
    scores: Vec<ScoreHolder>,
    pi0: f64,
    target_decoy_ratio: f64,
    pos: usize,
    neg: usize,
    weights: Vec<f64>,
}

impl Default for Scores {
    fn default() -> Self {
        Scores {
            scores: Vec::new(),
            pi0: 1.0,
            target_decoy_ratio: 1.0,
            pos: 0,
            neg: 0,
            weights: Vec::new(),
        }
    }
}

impl Scores {
    /// Collect every PSM of the given handlers, in handler order.
    pub fn from_sets(sets: &[&SetHandler]) -> Self {
        let holders = sets
            .iter()
            .flat_map(|set| set.iter())
            .map(|(label, psm)| ScoreHolder::new(label, Arc::clone(psm)))
            .collect();
        Scores::from_holders(holders)
    }

    pub fn from_holders(scores: Vec<ScoreHolder>) -> Self {
        let mut out = Scores {
            scores,
            ..Default::default()
        };
        out.recount();
        out
    }

    /// Refresh class counts; the ratio is floored at one decoy.
    fn recount(&mut self) {
        self.pos = self.scores.iter().filter(|s| s.is_target()).count();
        self.neg = self.scores.len() - self.pos;
        self.target_decoy_ratio = self.pos as f64 / self.neg.max(1) as f64;
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ScoreHolder> {
        self.scores.iter()
    }

    pub fn holders(&self) -> &[ScoreHolder] {
        &self.scores
    }

    pub fn pi0(&self) -> f64 {
        self.pi0
    }

    pub fn target_decoy_ratio(&self) -> f64 {
        self.target_decoy_ratio
    }

    pub fn num_targets(&self) -> usize {
        self.pos
    }

    pub fn num_decoys(&self) -> usize {
        self.neg
    }

    /// Weights of the last re-score.
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn calc_score(&self, features: &[f64]) -> f64 {
        linear_score(&self.weights, features)
    }

    fn sort(&mut self) {
        self.scores.sort_by(|a, b| b.score.total_cmp(&a.score));
    }

    /// Score every entry with `weights` and sort descending.
    pub fn rescore_and_sort(&mut self, weights: &[f64]) {
        self.weights = weights.to_vec();
        for holder in &mut self.scores {
            holder.score = linear_score(weights, &holder.psm.features);
            assert!(
                holder.score.is_finite(),
                "non-finite score for PSM '{}'",
                holder.psm.id
            );
        }
        self.sort();
    }

    /// Re-score, sort and compute q-values. Returns the number of targets at
    /// or below `fdr`.
    pub fn calc_scores(&mut self, weights: &[f64], fdr: f64) -> usize {
        self.rescore_and_sort(weights);
        self.calc_q(fdr)
    }

    /// Target-decoy q-values over the current order, made monotone by a
    /// backward minimum pass. Returns the number of targets at or below `fdr`.
    pub fn calc_q(&mut self, fdr: f64) -> usize {
        let pi0 = self.pi0;
        let ratio = self.target_decoy_ratio;
        let (mut positives, mut nulls) = (0usize, 0usize);
        let mut efp = 0.0;
        let mut passing = 0;

        for holder in &mut self.scores {
            if holder.is_target() {
                positives += 1;
            } else {
                nulls += 1;
                efp = pi0 * nulls as f64 * ratio;
            }
            let q = if positives > 0 {
                (efp / positives as f64).min(pi0)
            } else {
                pi0
            };
            holder.q = q;
            if fdr >= q {
                passing = positives;
            }
        }

        for ix in (1..self.scores.len()).rev() {
            if self.scores[ix - 1].q > self.scores[ix].q {
                self.scores[ix - 1].q = self.scores[ix].q;
            }
        }
        passing
    }

    /// What [`Scores::calc_scores`] would return for `weights`, leaving this
    /// list untouched.
    pub fn evaluate(&self, weights: &[f64], fdr: f64) -> usize {
        let mut trial = self.clone();
        trial.calc_scores(weights, fdr)
    }

    /// Targets whose current q-value is at or below `fdr`.
    pub fn targets_at_fdr(&self, fdr: f64) -> usize {
        self.scores
            .iter()
            .filter(|s| s.is_target() && s.q <= fdr)
            .count()
    }

    /// Split into `folds` train/test pairs. Every entry lands in exactly one
    /// test list and in the train list of every other fold; test list sizes
    /// differ by at most one.
    pub fn create_xval_sets(&self, folds: usize, rng: &mut ParkMiller) -> (Vec<Scores>, Vec<Scores>) {
        let n = self.scores.len();
        let mut remain = vec![0usize; folds];
        let mut left = n;
        for fold in (0..folds).rev() {
            remain[fold] = left / (fold + 1);
            left -= remain[fold];
        }

        let mut train = vec![Vec::new(); folds];
        let mut test = vec![Vec::new(); folds];
        for (j, holder) in self.scores.iter().enumerate() {
            let mut ix = (rng.next_value() % (n - j) as u64) as usize;
            let mut fold = 0;
            while ix >= remain[fold] {
                ix -= remain[fold];
                fold += 1;
            }
            for (i, (tr, te)) in train.iter_mut().zip(test.iter_mut()).enumerate() {
                if i == fold {
                    te.push(holder.clone());
                } else {
                    tr.push(holder.clone());
                }
            }
            remain[fold] -= 1;
        }

        (
            train.into_iter().map(Scores::from_holders).collect(),
            test.into_iter().map(Scores::from_holders).collect(),
        )
    }

    /// Solver input: every decoy as a negative, then the targets down to the
    /// first one whose q-value exceeds `fdr` as positives. Test-only decoys
    /// are left out.
    pub fn training_set(&self, fdr: f64) -> TrainingSet<'_> {
        let mut set = TrainingSet::default();
        for holder in self.scores.iter().filter(|s| s.label.is_training_negative()) {
            set.push(&holder.psm.features, false);
        }
        for holder in self.scores.iter().filter(|s| s.is_target()) {
            if holder.q > fdr {
                break;
            }
            set.push(&holder.psm.features, true);
        }
        set
    }

    /// Keep only the first, i.e. best scoring, entry per peptide.
    pub fn weed_out_redundant(&mut self) {
        let mut seen = HashSet::new();
        self.scores.retain(|s| seen.insert(s.psm.peptide.clone()));
        self.recount();
    }

    /// Find the single feature, used as the whole discriminant in either
    /// direction, that lets the most targets pass `fdr`.
    ///
    /// Low values are tried before high ones; later candidates must be
    /// strictly better to replace an earlier one.
    /// Candidates whose passing prefix is one block of tied scores are
    /// skipped. `None` when no feature qualifies.
    pub fn init_direction(&mut self, fdr: f64) -> Option<InitDirection> {
        let num_features = self.scores.first().map_or(0, |s| s.psm.num_features());
        let mut best: Option<InitDirection> = None;

        for feature in 0..num_features {
            for sign in [-1.0, 1.0] {
                for holder in &mut self.scores {
                    holder.score = sign * holder.psm.features[feature];
                }
                self.sort();
                let positives = self.calc_q(fdr);
                let passing = self.scores.partition_point(|s| s.q <= fdr);
                let spread = passing == 0 || self.scores[0].score != self.scores[passing - 1].score;
                if !spread {
                    continue;
                }
                if best.map_or(true, |b| positives > b.positives) {
                    best = Some(InitDirection {
                        feature,
                        sign,
                        positives,
                    });
                }
            }
        }

        if let Some(b) = best {
            log::debug!(
                "Selected feature number {} as initial search direction, could separate {} positives in that direction",
                b.feature + 1,
                b.positives
            );
        }
        best
    }

    /// Estimate π₀ from the current order and store it.
    pub fn estimate_pi0<R: Rng>(&mut self, rng: &mut R) -> f64 {
        if self.pos == 0 || self.neg == 0 {
            log::warn!(
                "Cannot estimate pi0 with {} targets and {} decoys; using pi0 = 1",
                self.pos,
                self.neg
            );
            self.pi0 = 1.0;
            return self.pi0;
        }
        let combined: Vec<(f64, bool)> = self.scores.iter().map(ScoreHolder::to_pair).collect();
        let p = stats::p_values(&combined);
        self.pi0 = stats::estimate_pi0(&p, rng);
        self.pi0
    }

    /// Posterior error probability of every entry under the current π₀.
    pub fn calc_pep(&mut self) {
        let combined: Vec<(f64, bool)> = self.scores.iter().map(ScoreHolder::to_pair).collect();
        let peps = stats::estimate_pep(&combined, self.pi0);
        for (holder, pep) in self.scores.iter_mut().zip(peps) {
            holder.pep = pep;
        }
    }

    /// Replace scores with `-ln(PEP)` so lists from different folds become
    /// comparable. Entries with PEP 1 continue below the last PEP < 1 entry
    /// by q-value.
    pub fn normalize_scores(&mut self) {
        let mut break_q = 0.0;
        for holder in &mut self.scores {
            if holder.pep < 1.0 {
                holder.score = -holder.pep.ln();
                break_q = holder.q;
            } else {
                holder.score = -(1.0 + holder.q - break_q).ln();
            }
        }
    }

    /// Calibrate each fold on its own, put them on a common `-ln(PEP)` scale
    /// and concatenate. The returned list is sorted, counted and carries a
    /// fresh π₀; its q-values and PEPs still need recomputing.
    pub fn merge<R: Rng>(folds: Vec<Scores>, unique_peptides: bool, fdr: f64, rng: &mut R) -> Scores {
        let mut merged = Vec::with_capacity(folds.iter().map(Scores::len).sum());
        for mut fold in folds {
            fold.sort();
            fold.estimate_pi0(rng);
            fold.calc_q(fdr);
            fold.calc_pep();
            fold.normalize_scores();
            merged.extend(fold.scores);
        }
        let mut out = Scores::from_holders(merged);
        out.sort();
        if unique_peptides {
            out.weed_out_redundant();
        }
        out.estimate_pi0(rng);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn holder(id: usize, label: Label, score: f64) -> ScoreHolder {
        let psm = Psm::new(format!("psm{}", id), format!("K.PEP{}K.A", id), ["P1"], vec![score]);
        ScoreHolder::new(label, Arc::new(psm))
    }

    fn scores_from(items: &[(Label, f64)]) -> Scores {
        Scores::from_holders(
            items
                .iter()
                .enumerate()
                .map(|(i, &(l, s))| holder(i, l, s))
                .collect(),
        )
    }

    fn random_scores(n_targets: usize, n_decoys: usize, target_shift: f64, seed: u64) -> Scores {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut items = Vec::new();
        for _ in 0..n_targets {
            items.push((Label::Target, rng.gen::<f64>() + target_shift));
        }
        for _ in 0..n_decoys {
            items.push((Label::Decoy, rng.gen::<f64>()));
        }
        scores_from(&items)
    }

    const IDENTITY: [f64; 2] = [1.0, 0.0];

    #[test]
    fn test_calc_q_hand_example() {
        let mut scores = scores_from(&[
            (Label::Target, 5.0),
            (Label::Target, 4.0),
            (Label::Decoy, 3.0),
            (Label::Target, 2.0),
            (Label::Decoy, 1.0),
        ]);
        assert_eq!(scores.calc_scores(&IDENTITY, 0.01), 2);
        let q: Vec<f64> = scores.iter().map(|s| s.q).collect();
        assert_eq!(q, vec![0.0, 0.0, 0.5, 0.5, 1.0]);
        assert_eq!(scores.calc_q(0.6), 3);
    }

    #[test]
    fn test_q_values_monotone() {
        let mut scores = random_scores(150, 150, 0.4, 3);
        scores.calc_scores(&IDENTITY, 0.05);
        for pair in scores.holders().windows(2) {
            assert!(pair[0].score >= pair[1].score);
            assert!(pair[0].q <= pair[1].q);
        }
        assert!(scores.iter().all(|s| s.q <= scores.pi0()));
    }

    #[test]
    fn test_rescore_is_idempotent() {
        let mut scores = random_scores(80, 80, 0.3, 4);
        let first = scores.calc_scores(&IDENTITY, 0.05);
        let order: Vec<String> = scores.iter().map(|s| s.psm.id.clone()).collect();
        let q: Vec<f64> = scores.iter().map(|s| s.q).collect();

        let second = scores.calc_scores(&IDENTITY, 0.05);
        assert_eq!(first, second);
        assert_eq!(order, scores.iter().map(|s| s.psm.id.clone()).collect::<Vec<_>>());
        assert_eq!(q, scores.iter().map(|s| s.q).collect::<Vec<_>>());
    }

    #[test]
    fn test_zero_decoys_ratio_floor() {
        let mut scores = scores_from(&[(Label::Target, 2.0), (Label::Target, 1.0)]);
        assert_eq!(scores.target_decoy_ratio(), 2.0);
        assert_eq!(scores.calc_scores(&IDENTITY, 0.01), 2);
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(scores.estimate_pi0(&mut rng), 1.0);
    }

    #[test]
    fn test_weed_out_keeps_best_peptide() {
        let mut a = holder(1, Label::Target, 3.0);
        let mut b = holder(2, Label::Target, 1.0);
        let c = holder(3, Label::Decoy, 2.0);
        Arc::make_mut(&mut a.psm).peptide = "K.SAME.A".to_string();
        Arc::make_mut(&mut b.psm).peptide = "K.SAME.A".to_string();
        let mut scores = Scores::from_holders(vec![b, c, a]);
        scores.calc_scores(&IDENTITY, 0.01);
        scores.weed_out_redundant();

        assert_eq!(scores.len(), 2);
        assert_eq!(scores.holders()[0].psm.id, "psm1");
        assert_eq!(scores.holders()[0].score, 3.0);
        assert_eq!(scores.num_targets(), 1);
    }

    #[test]
    fn test_xval_fold_sizes() {
        let scores = random_scores(6, 4, 0.0, 5);
        let mut rng = ParkMiller::new(1);
        let (train, test) = scores.create_xval_sets(3, &mut rng);

        let mut sizes: Vec<usize> = test.iter().map(Scores::len).collect();
        sizes.sort_unstable();
        assert_eq!(sizes, vec![3, 3, 4]);

        let mut seen = HashSet::new();
        for fold in &test {
            for s in fold.iter() {
                assert!(seen.insert(s.psm.id.clone()), "PSM in two test folds");
            }
        }
        assert_eq!(seen.len(), 10);
        for (tr, te) in train.iter().zip(&test) {
            assert_eq!(tr.len() + te.len(), 10);
            let test_ids: HashSet<&str> = te.iter().map(|s| s.psm.id.as_str()).collect();
            assert!(tr.iter().all(|s| !test_ids.contains(s.psm.id.as_str())));
        }
    }

    #[test]
    fn test_xval_is_deterministic_for_a_seed() {
        let scores = random_scores(50, 50, 0.0, 6);
        let ids = |seed: u64| -> Vec<Vec<String>> {
            let (_, test) = scores.create_xval_sets(3, &mut ParkMiller::new(seed));
            test.iter()
                .map(|f| f.iter().map(|s| s.psm.id.clone()).collect())
                .collect()
        };
        assert_eq!(ids(7), ids(7));
        assert_ne!(ids(7), ids(8));
        assert_eq!(ids(0), ids(1));
    }

    #[test]
    fn test_park_miller_sequence() {
        let mut rng = ParkMiller::new(1);
        assert_eq!(rng.next_value(), 279_470_273);
        assert!(rng.next_value() < 4_294_967_291);
    }

    #[test]
    fn test_training_set_selection() {
        let mut scores = scores_from(&[
            (Label::Target, 9.0),
            (Label::Target, 8.0),
            (Label::Decoy, 7.0),
            (Label::Target, 6.0),
            (Label::TestOnlyDecoy, 5.0),
            (Label::Decoy, 4.0),
        ]);
        scores.calc_scores(&IDENTITY, 0.01);
        let set = scores.training_set(0.01);
        assert_eq!(set.negatives, 2);
        assert_eq!(set.positives, 2);
        assert_eq!(set.labels, vec![-1.0, -1.0, 1.0, 1.0]);
        assert_eq!(set.rows[2], &[9.0][..]);
    }

    #[test]
    fn test_init_direction_finds_informative_feature() {
        let mut rng = StdRng::seed_from_u64(8);
        let mut holders = Vec::new();
        for i in 0..60 {
            let target = i % 2 == 0;
            // feature 0 is noise, feature 1 is low for targets
            let informative = if target { -2.0 } else { 0.0 } + rng.gen::<f64>();
            let psm = Psm::new(format!("p{}", i), "K.PEPTIDE.A", ["P"], vec![rng.gen::<f64>(), informative]);
            let label = if target { Label::Target } else { Label::Decoy };
            holders.push(ScoreHolder::new(label, Arc::new(psm)));
        }
        let mut scores = Scores::from_holders(holders);
        let dir = scores.init_direction(0.01).unwrap();
        assert_eq!(dir.feature, 1);
        assert_eq!(dir.sign, -1.0);
        assert_eq!(dir.positives, 30);
        assert_eq!(dir.weights(2), vec![0.0, -1.0, 0.0]);
    }

    #[test]
    fn test_init_direction_prefers_low_values_on_ties() {
        // both ends of the feature hold two targets
        let mut scores = scores_from(&[
            (Label::Target, 10.0),
            (Label::Target, 9.0),
            (Label::Decoy, 5.0),
            (Label::Decoy, 5.0),
            (Label::Target, 1.0),
            (Label::Target, 0.0),
        ]);
        let dir = scores.init_direction(0.01).unwrap();
        assert_eq!(dir.positives, 2);
        assert_eq!(dir.sign, -1.0);
    }

    #[test]
    fn test_init_direction_skips_constant_feature() {
        let holders = (0..10)
            .map(|i| {
                let label = if i < 5 { Label::Target } else { Label::Decoy };
                let psm = Psm::new(format!("p{}", i), "K.A.A", ["P"], vec![1.0, (10 - i) as f64]);
                ScoreHolder::new(label, Arc::new(psm))
            })
            .collect();
        let mut scores = Scores::from_holders(holders);
        let dir = scores.init_direction(0.01).unwrap();
        assert_eq!(dir.feature, 1);
        assert_eq!(dir.sign, 1.0);
        assert_eq!(dir.positives, 5);
    }

    #[test]
    fn test_uninformative_scores() {
        let mut scores = random_scores(100, 100, 0.0, 42);
        scores.rescore_and_sort(&IDENTITY);
        let mut rng = StdRng::seed_from_u64(42);
        let pi0 = scores.estimate_pi0(&mut rng);
        assert!(pi0 > 0.7, "pi0 = {}", pi0);
        let found = scores.calc_q(0.01);
        assert!(found <= 10, "found {} targets", found);
    }

    #[test]
    fn test_separable_scores() {
        let mut scores = random_scores(100, 100, 5.0, 43);
        scores.rescore_and_sort(&IDENTITY);
        let mut rng = StdRng::seed_from_u64(43);
        let pi0 = scores.estimate_pi0(&mut rng);
        assert!(pi0 < 0.5, "pi0 = {}", pi0);
        assert_eq!(scores.calc_q(0.01), 100);
        assert_eq!(scores.holders()[0].q, 0.0);
        scores.calc_pep();
        let peps: Vec<f64> = scores.iter().map(|s| s.pep).collect();
        assert!(peps[0] < 0.05, "top pep = {}", peps[0]);
        assert!(peps[199] > 0.9, "bottom pep = {}", peps[199]);
    }

    #[test]
    fn test_merge_round_trip() {
        let full = random_scores(120, 120, 0.5, 44);
        let (_, mut test) = full.create_xval_sets(3, &mut ParkMiller::new(3));
        for fold in &mut test {
            fold.calc_scores(&IDENTITY, 0.01);
        }
        let mut rng = StdRng::seed_from_u64(44);
        let mut merged = Scores::merge(test, false, 0.01, &mut rng);
        assert_eq!(merged.len(), 240);
        assert_eq!(merged.num_targets(), 120);
        assert_eq!(merged.num_decoys(), 120);
        for pair in merged.holders().windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }

        merged.calc_q(0.01);
        let mut previous = 0;
        for fdr in [0.001, 0.01, 0.05, 0.1, 0.25, 0.5] {
            let found = merged.targets_at_fdr(fdr);
            assert!(found >= previous);
            previous = found;
        }
    }

    #[test]
    fn test_normalize_scores_follow_pep() {
        let mut scores = random_scores(60, 60, 1.0, 45);
        scores.rescore_and_sort(&IDENTITY);
        let mut rng = StdRng::seed_from_u64(45);
        scores.estimate_pi0(&mut rng);
        scores.calc_q(0.01);
        scores.calc_pep();
        scores.normalize_scores();
        for pair in scores.holders().windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
        assert!(scores.iter().all(|s| s.score.is_finite()));
    }
}
