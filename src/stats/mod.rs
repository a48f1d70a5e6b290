//! Non-parametric error-rate estimation over a ranked target/decoy list.
//!
//! All functions take `(score, is_target)` pairs sorted by descending score,
//! the order [`crate::scores::Scores`] keeps its entries in.
pub mod logistic;
pub mod spline;

use rand::Rng;

use logistic::{LogisticRegression, EPS};

/// Below this many p-values π₀ is not estimated and defaults to 1.
pub const MIN_PI0_SAMPLES: usize = 10;
const NUM_LAMBDA: usize = 100;
const MAX_LAMBDA: f64 = 0.5;
const NUM_BOOT: usize = 100;
const MAX_BOOT_SIZE: usize = 1000;
const MAX_PEP_BINS: usize = 500;

/// Empirical p-value of every target: the fraction of decoys scoring at
/// least as high. Targets tied with decoys share the tied decoys evenly.
///
/// The result is sorted ascending. Empty when there are no decoys.
pub fn p_values(combined: &[(f64, bool)]) -> Vec<f64> {
    let mut p = Vec::new();
    let (mut n_decoys, mut pos_same, mut neg_same) = (0usize, 0usize, 0usize);
    let mut prev_score: Option<f64> = None;

    for &(score, is_target) in combined {
        if prev_score != Some(score) {
            push_tied(&mut p, n_decoys, pos_same, neg_same);
            n_decoys += neg_same;
            neg_same = 0;
            pos_same = 0;
            prev_score = Some(score);
        }
        if is_target {
            pos_same += 1;
        } else {
            neg_same += 1;
        }
    }
    push_tied(&mut p, n_decoys, pos_same, neg_same);
    n_decoys += neg_same;

    if n_decoys == 0 {
        return Vec::new();
    }
    let n = n_decoys as f64;
    p.iter_mut().for_each(|v| *v /= n);
    p
}

fn push_tied(p: &mut Vec<f64>, n_decoys: usize, pos_same: usize, neg_same: usize) {
    for ix in 0..pos_same {
        p.push(n_decoys as f64 + (neg_same as f64 * (ix + 1) as f64) / (pos_same + 1) as f64);
    }
}

/// Storey's bootstrap estimate of the null proportion among targets.
///
/// `p` must be sorted ascending. Tail fractions are computed for
/// λ = 0.005 .. 0.505 and the λ whose estimate is most stable under
/// bootstrap resampling is kept.
pub fn estimate_pi0<R: Rng>(p: &[f64], rng: &mut R) -> f64 {
    if p.len() < MIN_PI0_SAMPLES {
        log::warn!(
            "Only {} p-values available, too few to estimate pi0; using pi0 = 1",
            p.len()
        );
        return 1.0;
    }

    let mut lambdas = Vec::new();
    let mut pi0s = Vec::new();
    for ix in 0..=NUM_LAMBDA {
        let lambda = ((ix + 1) as f64 / NUM_LAMBDA as f64) * MAX_LAMBDA;
        let pi0 = tail_fraction(p, lambda);
        if pi0 > 0.0 {
            lambdas.push(lambda);
            pi0s.push(pi0);
        }
    }

    if pi0s.is_empty() {
        // every target outscores every decoy
        let floor = 1.0 / p.len() as f64;
        log::warn!(
            "Targets and decoys are perfectly separated; pi0 cannot be estimated, using pi0 = {}",
            floor
        );
        return floor;
    }

    let min_pi0 = pi0s.iter().copied().fold(f64::INFINITY, f64::min);
    let mut mse = vec![0.0; pi0s.len()];
    let mut boot = Vec::with_capacity(p.len().min(MAX_BOOT_SIZE));
    for _ in 0..NUM_BOOT {
        bootstrap(p, &mut boot, rng);
        for (err, &lambda) in mse.iter_mut().zip(&lambdas) {
            let d = tail_fraction(&boot, lambda) - min_pi0;
            *err += d * d;
        }
    }

    let mut min_ix = 0;
    for (ix, &err) in mse.iter().enumerate() {
        if err < mse[min_ix] {
            min_ix = ix;
        }
    }
    log::trace!("pi0 selected at lambda={}", lambdas[min_ix]);
    pi0s[min_ix].clamp(0.0, 1.0)
}

/// Fraction of p-values at or above `lambda`, scaled by `1 / (1 - lambda)`.
fn tail_fraction(p: &[f64], lambda: f64) -> f64 {
    let start = p.partition_point(|&v| v < lambda);
    (p.len() - start) as f64 / p.len() as f64 / (1.0 - lambda)
}

fn bootstrap<R: Rng>(input: &[f64], out: &mut Vec<f64>, rng: &mut R) {
    out.clear();
    let draws = input.len().min(MAX_BOOT_SIZE);
    for _ in 0..draws {
        out.push(input[rng.gen_range(0..input.len())]);
    }
    out.sort_by(f64::total_cmp);
}

/// Posterior error probability of every entry of `combined`.
///
/// A logistic regression of the decoy fraction against score, with a
/// cross-validated smoothing spline as predictor, is fitted on binned data;
/// its odds, scaled by π₀ and the target/decoy size ratio, give the PEP. Output follows the input order and is non-decreasing with rank.
pub fn estimate_pep(combined: &[(f64, bool)], pi0: f64) -> Vec<f64> {
    if combined.is_empty() {
        return Vec::new();
    }
    let n_targets = combined.iter().filter(|(_, t)| *t).count();
    let n_decoys = combined.len() - n_targets;

    let (medians, decoys, sizes) = bin_data(combined);
    let lr = LogisticRegression::fit(&medians, &decoys, &sizes);

    let factor = pi0 * n_targets as f64 / n_decoys.max(1) as f64;
    let top = (factor * lr.max_fitted().exp()).min(1.0);

    let mut peps = Vec::with_capacity(combined.len());
    let mut capped = false;
    for &(score, _) in combined {
        if capped {
            peps.push(top);
            continue;
        }
        let pep = factor * lr.predict(score).exp();
        if pep >= top {
            peps.push(top);
            capped = true;
        } else {
            peps.push(pep);
        }
    }

    // running minimum from the bottom of the list upwards
    let mut running = f64::INFINITY;
    for pep in peps.iter_mut().rev() {
        running = running.min(*pep);
        *pep = running.clamp(EPS, 1.0);
        assert!(pep.is_finite(), "non-finite PEP");
    }
    peps
}

/// Bin the list in ascending score order: median score, decoy count and
/// size per bin. Tied scores never straddle a bin boundary.
fn bin_data(combined: &[(f64, bool)]) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let ascending: Vec<(f64, bool)> = combined.iter().rev().copied().collect();
    let n = ascending.len();
    let bin_size = (n as f64 / MAX_PEP_BINS as f64).ceil().max(1.0) as usize;

    let mut medians = Vec::new();
    let mut decoys = Vec::new();
    let mut sizes = Vec::new();
    let mut start = 0;
    while start < n {
        let mut end = (start + bin_size).min(n);
        while end < n && ascending[end].0 == ascending[end - 1].0 {
            end += 1;
        }
        let bin = &ascending[start..end];
        let mid = bin.len() / 2;
        let median = if bin.len() % 2 == 0 {
            (bin[mid - 1].0 + bin[mid].0) / 2.0
        } else {
            bin[mid].0
        };
        medians.push(median);
        decoys.push(bin.iter().filter(|(_, t)| !*t).count() as f64);
        sizes.push(bin.len() as f64);
        start = end;
    }
    (medians, decoys, sizes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn ranked(mut items: Vec<(f64, bool)>) -> Vec<(f64, bool)> {
        items.sort_by(|a, b| b.0.total_cmp(&a.0));
        items
    }

    #[test]
    fn test_p_values_simple() {
        let combined = vec![(5.0, true), (4.0, false), (3.0, true), (2.0, false), (1.0, true)];
        assert_eq!(p_values(&combined), vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn test_p_values_ties_and_no_decoys() {
        // one target tied with one decoy gets half of it
        let combined = vec![(2.0, true), (2.0, false), (1.0, false)];
        assert_eq!(p_values(&combined), vec![0.25]);
        assert!(p_values(&[(1.0, true), (0.5, true)]).is_empty());
    }

    #[test]
    fn test_pi0_small_sample_is_one() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(estimate_pi0(&[0.1, 0.5, 0.9], &mut rng), 1.0);
        assert_eq!(estimate_pi0(&[], &mut rng), 1.0);
    }

    #[test]
    fn test_pi0_uniform_p_values_near_one() {
        let mut rng = StdRng::seed_from_u64(7);
        let p: Vec<f64> = (0..200).map(|i| (i as f64 + 0.5) / 200.0).collect();
        let pi0 = estimate_pi0(&p, &mut rng);
        assert!(pi0 > 0.9, "pi0 = {}", pi0);
        assert!(pi0 <= 1.0);
    }

    #[test]
    fn test_pi0_mixture() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut p = vec![0.0; 70];
        p.extend((0..30).map(|i| (i as f64 + 0.5) / 30.0));
        let pi0 = estimate_pi0(&p, &mut rng);
        assert!(pi0 > 0.2 && pi0 < 0.45, "pi0 = {}", pi0);
    }

    #[test]
    fn test_pi0_perfect_separation_is_small() {
        let mut rng = StdRng::seed_from_u64(7);
        let p = vec![0.0; 100];
        assert_eq!(estimate_pi0(&p, &mut rng), 0.01);
    }

    #[test]
    fn test_pep_separable() {
        let mut items: Vec<(f64, bool)> = (0..100).map(|i| (10.0 + i as f64 * 0.1, true)).collect();
        items.extend((0..100).map(|i| (i as f64 * 0.05, false)));
        let combined = ranked(items);
        let peps = estimate_pep(&combined, 1.0);
        assert_eq!(peps.len(), 200);
        assert!(peps[0] < 0.01, "top pep = {}", peps[0]);
        assert!(peps[199] > 0.9, "bottom pep = {}", peps[199]);
        for pair in peps.windows(2) {
            assert!(pair[0] <= pair[1]);
        }
        assert!(peps.iter().all(|&p| p > 0.0 && p <= 1.0));
    }

    #[test]
    fn test_pep_monotone_on_noisy_data() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut items: Vec<(f64, bool)> = (0..300).map(|_| (rng.gen::<f64>() * 2.0 + 0.5, true)).collect();
        items.extend((0..300).map(|_| (rng.gen::<f64>() * 2.0, false)));
        let combined = ranked(items);
        let peps = estimate_pep(&combined, 0.8);
        for pair in peps.windows(2) {
            assert!(pair[0] <= pair[1]);
        }
        assert!(peps[0] < peps[599]);
    }

    #[test]
    fn test_bins_keep_ties_together() {
        let combined: Vec<(f64, bool)> = (0..1200).map(|i| ((i / 4) as f64, i % 2 == 0)).rev().collect();
        let (medians, decoys, sizes) = bin_data(&combined);
        assert_eq!(sizes.iter().sum::<f64>(), 1200.0);
        assert_eq!(decoys.iter().sum::<f64>(), 600.0);
        for pair in medians.windows(2) {
            assert!(pair[0] < pair[1]);
        }
        assert!(sizes.iter().all(|&s| s as usize % 4 == 0));
    }
}
