//! Binomial logistic regression with a smoothing-spline predictor, fitted by
//! iteratively reweighted least squares.
//!
//! Every observation point carries its own log-odds `g`; each IRLS step
//! replaces the weighted least-squares solve with a penalised spline fit of
//! the working response, its smoothing weight chosen by cross-validation.
use super::spline::{NaturalSpline, SplineDesign};

/// Bound on the predictor; keeps `exp` finite.
pub const G_RANGE: f64 = 35.0;
/// Floor and ceiling margin for fitted probabilities and IRLS weights.
pub const EPS: f64 = 1e-15;

const MAX_ITERATIONS: usize = 50;
const CONVERGENCE: f64 = 1e-4;

/// Fitted model `logit P(y | x) = s((x - offset) / span)` for a natural
/// cubic spline `s`.
#[derive(Debug, Clone, PartialEq)]
pub struct LogisticRegression {
    offset: f64,
    span: f64,
    spline: NaturalSpline,
}

impl LogisticRegression {
    /// Fit `y[i]` successes out of `m[i]` trials observed at `x[i]`.
    /// `x` must be strictly increasing.
    pub fn fit(x: &[f64], y: &[f64], m: &[f64]) -> Self {
        assert_eq!(x.len(), y.len());
        assert_eq!(x.len(), m.len());
        if x.is_empty() {
            return LogisticRegression {
                offset: 0.0,
                span: 1.0,
                spline: NaturalSpline::new(vec![0.0], vec![0.0], vec![0.0]),
            };
        }

        let (offset, span, t) = rescale(x);
        let design = SplineDesign::new(&t);

        let mut g: Vec<f64> = y
            .iter()
            .zip(m)
            .map(|(&yi, &mi)| logit((yi + 0.05) / (mi + 0.1)))
            .collect();
        let mut gamma = vec![0.0; g.len()];

        for iteration in 0..MAX_ITERATIONS {
            let (w, z) = calc_wz(&g, y, m);
            let alpha = design.choose_alpha(&z, &w);
            let fit = design.smooth(&z, &w, alpha);

            let mut step = 0.0;
            for (gi, next) in g.iter_mut().zip(fit.g) {
                let next = next.clamp(-G_RANGE, G_RANGE);
                step += (next - *gi).powi(2);
                *gi = next;
            }
            gamma = fit.gamma.into_iter().map(|v| v.clamp(-G_RANGE, G_RANGE)).collect();

            let step = step.sqrt() / g.len() as f64;
            if step < CONVERGENCE {
                log::trace!("Spline IRLS converged after {} iterations", iteration + 1);
                break;
            }
        }

        LogisticRegression {
            offset,
            span,
            spline: NaturalSpline::new(t, g, gamma),
        }
    }

    /// Log-odds at `x`, bounded to `±G_RANGE`.
    pub fn predict(&self, x: f64) -> f64 {
        let g = self
            .spline
            .eval((x - self.offset) / self.span)
            .clamp(-G_RANGE, G_RANGE);
        assert!(g.is_finite(), "logistic predictor is not finite at x={}", x);
        g
    }

    /// Largest fitted log-odds over the training points.
    pub fn max_fitted(&self) -> f64 {
        self.spline.values().iter().copied().fold(-G_RANGE, f64::max)
    }
}

/// Map `x` onto `[0, 1]`. Falls back to the raw values when rounding would
/// merge neighbouring points.
fn rescale(x: &[f64]) -> (f64, f64, Vec<f64>) {
    let offset = x[0];
    let span = x[x.len() - 1] - offset;
    if span > 0.0 && span.is_finite() {
        let t: Vec<f64> = x.iter().map(|&v| (v - offset) / span).collect();
        if t.windows(2).all(|p| p[1] > p[0]) {
            return (offset, span, t);
        }
    }
    (0.0, 1.0, x.to_vec())
}

fn logit(p: f64) -> f64 {
    let p = p.clamp(EPS, 1.0 - EPS);
    (p / (1.0 - p)).ln()
}

/// IRLS weights and working response for the current predictor.
fn calc_wz(g: &[f64], y: &[f64], m: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let mut w = Vec::with_capacity(g.len());
    let mut z = Vec::with_capacity(g.len());
    for ((&gi, &yi), &mi) in g.iter().zip(y).zip(m) {
        let e = gi.exp();
        let p = (e / (1.0 + e)).clamp(EPS, 1.0 - EPS);
        assert!(p > 0.0 && p < 1.0, "probability out of range: {}", p);
        let wi = (mi * p * (1.0 - p)).max(EPS);
        let zi = (gi + (yi - p * mi) / wi).clamp(-G_RANGE, G_RANGE);
        assert!(wi.is_finite() && zi.is_finite(), "non-finite IRLS step");
        w.push(wi);
        z.push(zi);
    }
    (w, z)
}
