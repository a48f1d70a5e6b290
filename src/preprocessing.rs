//! Feature normalisation and the matching weight transforms.
//!
//! The solver only ever sees normalised features. Weights are converted
//! back to the raw feature scale for the weights file, and initial weights
//! read from disk are converted forward.
use statrs::statistics::Statistics;

use crate::config::NormalizationKind;
use crate::psm::Psm;

/// Per-feature affine transform `x' = (x - sub) / div`.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalizer {
    pub kind: NormalizationKind,
    pub sub: Vec<f64>,
    pub div: Vec<f64>,
}

impl Normalizer {
    /// Transform that leaves features untouched.
    pub fn identity(num_features: usize) -> Self {
        Normalizer {
            kind: NormalizationKind::Std,
            sub: vec![0.0; num_features],
            div: vec![1.0; num_features],
        }
    }

    /// Fit on every PSM of the run, targets and decoys alike.
    pub fn fit<'a, I>(kind: NormalizationKind, num_features: usize, psms: I) -> Self
    where
        I: IntoIterator<Item = &'a Psm>,
    {
        let mut columns: Vec<Vec<f64>> = vec![Vec::new(); num_features];
        for psm in psms {
            for (column, &value) in columns.iter_mut().zip(psm.features.iter()) {
                column.push(value);
            }
        }

        let mut sub = Vec::with_capacity(num_features);
        let mut div = Vec::with_capacity(num_features);
        for column in &columns {
            if column.is_empty() {
                sub.push(0.0);
                div.push(1.0);
                continue;
            }
            let (s, d) = match kind {
                NormalizationKind::Std => (column.iter().mean(), column.iter().population_std_dev()),
                NormalizationKind::Unit => {
                    let lo = column.iter().copied().fold(f64::INFINITY, f64::min);
                    let hi = column.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                    (lo, hi - lo)
                }
            };
            sub.push(s);
            div.push(if d > 0.0 && d.is_finite() { d } else { 1.0 });
        }
        log::trace!("Normalizer ({:?}) sub={:?} div={:?}", kind, sub, div);

        Normalizer { kind, sub, div }
    }

    pub fn num_features(&self) -> usize {
        self.sub.len()
    }

    pub fn normalize(&self, features: &mut [f64]) {
        for ((x, &s), &d) in features.iter_mut().zip(&self.sub).zip(&self.div) {
            *x = (*x - s) / d;
        }
    }

    /// Convert weights (trailing bias included) from the raw feature scale
    /// to the normalised one.
    pub fn normalize_weights(&self, raw: &[f64]) -> Vec<f64> {
        let n = self.num_features();
        let mut out = vec![0.0; n + 1];
        let mut offset = 0.0;
        for i in 0..n {
            out[i] = raw[i] * self.div[i];
            offset += self.sub[i] * raw[i];
        }
        out[n] = raw[n] + offset;
        out
    }

    /// Convert normalised weights (trailing bias included) back to the raw
    /// feature scale.
    pub fn unnormalize_weights(&self, normalized: &[f64]) -> Vec<f64> {
        let n = self.num_features();
        let mut out = vec![0.0; n + 1];
        let mut offset = 0.0;
        for i in 0..n {
            out[i] = normalized[i] / self.div[i];
            offset += self.sub[i] * normalized[i] / self.div[i];
        }
        out[n] = normalized[n] - offset;
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn score(w: &[f64], x: &[f64]) -> f64 {
        w[x.len()] + x.iter().zip(w).map(|(a, b)| a * b).sum::<f64>()
    }

    fn psms() -> Vec<Psm> {
        vec![
            Psm::new("a", "K.A.A", ["P"], vec![1.0, 10.0, 3.0]),
            Psm::new("b", "K.B.A", ["P"], vec![2.0, 30.0, 3.0]),
            Psm::new("c", "K.C.A", ["P"], vec![6.0, 20.0, 3.0]),
        ]
    }

    #[test]
    fn test_std_normalization() {
        let data = psms();
        let norm = Normalizer::fit(NormalizationKind::Std, 3, data.iter());
        assert_relative_eq!(norm.sub[0], 3.0, epsilon = 1e-12);
        assert_relative_eq!(norm.sub[1], 20.0, epsilon = 1e-12);
        // constant column keeps a unit divisor
        assert_eq!(norm.div[2], 1.0);

        let mut x = data[1].features.clone();
        norm.normalize(&mut x);
        assert_relative_eq!(x[1], 10.0 / norm.div[1], epsilon = 1e-12);
        assert_relative_eq!(x[2], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_unit_normalization_range() {
        let data = psms();
        let norm = Normalizer::fit(NormalizationKind::Unit, 3, data.iter());
        for psm in &data {
            let mut x = psm.features.clone();
            norm.normalize(&mut x);
            assert!(x[0] >= 0.0 && x[0] <= 1.0);
            assert!(x[1] >= 0.0 && x[1] <= 1.0);
        }
    }

    #[test]
    fn test_weight_transforms_preserve_scores() {
        let data = psms();
        let norm = Normalizer::fit(NormalizationKind::Std, 3, data.iter());
        let w_norm = vec![0.5, -1.5, 2.0, 0.25];
        let w_raw = norm.unnormalize_weights(&w_norm);
        for psm in &data {
            let mut x = psm.features.clone();
            norm.normalize(&mut x);
            assert_relative_eq!(score(&w_norm, &x), score(&w_raw, &psm.features), epsilon = 1e-9);
        }
        let back = norm.normalize_weights(&w_raw);
        for (a, b) in back.iter().zip(&w_norm) {
            assert_relative_eq!(a, b, epsilon = 1e-9);
        }
    }
}
