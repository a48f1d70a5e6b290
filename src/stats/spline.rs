//! Penalised natural cubic smoothing splines in Reinsch form.
//!
//! For knots `t`, working responses `z` and weights `w` the smoothed values
//! `g` minimise `Σ w_i (z_i - g_i)² + α ∫ g''(t)² dt`. With the band
//! matrices `Q` (n × n-2) and `R` (n-2 × n-2) of the knot sequence the
//! solution is
//!
//! ```text
//! (R + α Qᵀ W⁻¹ Q) γ = Qᵀ z,    g = z - α W⁻¹ Q γ
//! ```
//!
//! where `γ` holds the second derivatives at the interior knots. The system
//! is pentadiagonal and solved by a banded LDLᵀ factorisation; the central
//! band of its inverse gives the leave-one-out residuals used to pick `α`.

/// `log10(α)` search range.
const LOG_ALPHA_MIN: f64 = -10.0;
const LOG_ALPHA_MAX: f64 = 6.0;
const GOLDEN_ITERATIONS: usize = 30;

/// Band matrices `Q` and `R` of a fixed, strictly increasing knot sequence.
#[derive(Debug, Clone)]
pub struct SplineDesign {
    knots: Vec<f64>,
    // column j of Q is nonzero on rows j, j + 1 and j + 2
    q0: Vec<f64>,
    q1: Vec<f64>,
    q2: Vec<f64>,
    // diagonal and first superdiagonal of R
    r0: Vec<f64>,
    r1: Vec<f64>,
}

/// Result of one penalised fit.
#[derive(Debug, Clone, PartialEq)]
pub struct Smoothed {
    /// Smoothed values at the knots.
    pub g: Vec<f64>,
    /// Second derivatives at every knot; zero at both ends.
    pub gamma: Vec<f64>,
    /// Weighted leave-one-out cross-validation score.
    pub cv: f64,
}

impl SplineDesign {
    pub fn new(knots: &[f64]) -> Self {
        assert!(
            knots.windows(2).all(|p| p[1] > p[0]),
            "spline knots must be strictly increasing"
        );
        let h: Vec<f64> = knots.windows(2).map(|p| p[1] - p[0]).collect();
        let k = knots.len().saturating_sub(2);

        let mut design = SplineDesign {
            knots: knots.to_vec(),
            q0: Vec::with_capacity(k),
            q1: Vec::with_capacity(k),
            q2: Vec::with_capacity(k),
            r0: Vec::with_capacity(k),
            r1: Vec::with_capacity(k),
        };
        for j in 0..k {
            design.q0.push(1.0 / h[j]);
            design.q1.push(-1.0 / h[j] - 1.0 / h[j + 1]);
            design.q2.push(1.0 / h[j + 1]);
            design.r0.push((h[j] + h[j + 1]) / 3.0);
            design.r1.push(if j + 1 < k { h[j + 1] / 6.0 } else { 0.0 });
        }
        design
    }

    pub fn knots(&self) -> &[f64] {
        &self.knots
    }

    fn interior(&self) -> usize {
        self.q0.len()
    }

    /// Fit `z` with weights `w` at smoothing weight `alpha`.
    ///
    /// With fewer than three knots nothing can be penalised and `z` comes
    /// back unchanged.
    pub fn smooth(&self, z: &[f64], w: &[f64], alpha: f64) -> Smoothed {
        let n = self.knots.len();
        let k = self.interior();
        assert_eq!(z.len(), n);
        assert_eq!(w.len(), n);
        if k == 0 {
            return Smoothed {
                g: z.to_vec(),
                gamma: vec![0.0; n],
                cv: 0.0,
            };
        }

        let dw: Vec<f64> = w.iter().map(|&wi| 1.0 / wi).collect();
        let ldl = BandedLdl::factor(&self.system(&dw, alpha));

        let qtz: Vec<f64> = (0..k)
            .map(|j| self.q0[j] * z[j] + self.q1[j] * z[j + 1] + self.q2[j] * z[j + 2])
            .collect();
        let inner = ldl.solve(&qtz);
        let qg = self.q_times(&inner);
        let g: Vec<f64> = (0..n).map(|i| z[i] - alpha * dw[i] * qg[i]).collect();

        // leave-one-out residual i is (Qγ)_i / (Q M⁻¹ Qᵀ)_ii
        let band = ldl.inverse_band();
        let mut cv = 0.0;
        for i in 0..n {
            let u = self.qsqt_diag(&band, i);
            if u > 0.0 {
                let r = qg[i] / u;
                cv += w[i] * r * r;
            }
        }
        cv /= n as f64;

        let mut gamma = vec![0.0; n];
        gamma[1..=k].copy_from_slice(&inner);
        Smoothed { g, gamma, cv }
    }

    /// Smoothing weight with the lowest cross-validation score: a coarse
    /// scan over decades, then a golden-section refinement around the best.
    pub fn choose_alpha(&self, z: &[f64], w: &[f64]) -> f64 {
        if self.interior() == 0 {
            return 1.0;
        }
        let cv = |log_alpha: f64| self.smooth(z, w, 10f64.powf(log_alpha)).cv;

        let steps = (LOG_ALPHA_MAX - LOG_ALPHA_MIN) as usize;
        let mut best = (LOG_ALPHA_MIN, f64::INFINITY);
        for step in 0..=steps {
            let log_alpha = LOG_ALPHA_MIN + step as f64;
            let score = cv(log_alpha);
            if score < best.1 {
                best = (log_alpha, score);
            }
        }

        let ratio = (5f64.sqrt() - 1.0) / 2.0;
        let mut lo = (best.0 - 1.0).max(LOG_ALPHA_MIN);
        let mut hi = (best.0 + 1.0).min(LOG_ALPHA_MAX);
        let mut c = hi - ratio * (hi - lo);
        let mut d = lo + ratio * (hi - lo);
        let (mut fc, mut fd) = (cv(c), cv(d));
        for _ in 0..GOLDEN_ITERATIONS {
            if fc < fd {
                hi = d;
                d = c;
                fd = fc;
                c = hi - ratio * (hi - lo);
                fc = cv(c);
            } else {
                lo = c;
                c = d;
                fc = fd;
                d = lo + ratio * (hi - lo);
                fd = cv(d);
            }
        }
        let refined = (lo + hi) / 2.0;
        let log_alpha = if cv(refined) < best.1 { refined } else { best.0 };
        log::trace!("Spline smoothing weight alpha=10^{:.3}", log_alpha);
        10f64.powf(log_alpha)
    }

    /// Diagonals of `R + α Qᵀ diag(dw) Q`.
    fn system(&self, dw: &[f64], alpha: f64) -> [Vec<f64>; 3] {
        let k = self.interior();
        let (q0, q1, q2) = (&self.q0, &self.q1, &self.q2);
        let mut a0 = vec![0.0; k];
        let mut a1 = vec![0.0; k];
        let mut a2 = vec![0.0; k];
        for j in 0..k {
            a0[j] = self.r0[j]
                + alpha * (q0[j] * q0[j] * dw[j] + q1[j] * q1[j] * dw[j + 1] + q2[j] * q2[j] * dw[j + 2]);
            if j + 1 < k {
                a1[j] = self.r1[j]
                    + alpha * (q1[j] * q0[j + 1] * dw[j + 1] + q2[j] * q1[j + 1] * dw[j + 2]);
            }
            if j + 2 < k {
                a2[j] = alpha * q2[j] * q0[j + 2] * dw[j + 2];
            }
        }
        [a0, a1, a2]
    }

    fn q_times(&self, v: &[f64]) -> Vec<f64> {
        let mut out = vec![0.0; self.knots.len()];
        for (j, &vj) in v.iter().enumerate() {
            out[j] += self.q0[j] * vj;
            out[j + 1] += self.q1[j] * vj;
            out[j + 2] += self.q2[j] * vj;
        }
        out
    }

    /// `(Q S Qᵀ)_ii` for the band `S` of `M⁻¹`.
    fn qsqt_diag(&self, band: &InverseBand, i: usize) -> f64 {
        let k = self.interior();
        let mut row: [(usize, f64); 3] = [(0, 0.0); 3];
        let mut len = 0;
        if i < k {
            row[len] = (i, self.q0[i]);
            len += 1;
        }
        if i >= 1 && i - 1 < k {
            row[len] = (i - 1, self.q1[i - 1]);
            len += 1;
        }
        if i >= 2 && i - 2 < k {
            row[len] = (i - 2, self.q2[i - 2]);
            len += 1;
        }
        let row = &row[..len];
        row.iter()
            .flat_map(|&(a, qa)| row.iter().map(move |&(b, qb)| qa * qb * band.get(a, b)))
            .sum()
    }
}

/// `M = L D Lᵀ` for a symmetric pentadiagonal `M`, with `L` unit lower
/// triangular of bandwidth two.
#[derive(Debug, Clone)]
struct BandedLdl {
    d: Vec<f64>,
    /// `L[i][i-1]`
    l1: Vec<f64>,
    /// `L[i][i-2]`
    l2: Vec<f64>,
}

impl BandedLdl {
    fn factor([a0, a1, a2]: &[Vec<f64>; 3]) -> Self {
        let k = a0.len();
        let mut d = Vec::with_capacity(k);
        let mut l1 = Vec::with_capacity(k);
        let mut l2 = Vec::with_capacity(k);
        for i in 0..k {
            let l2i = if i >= 2 { a2[i - 2] / d[i - 2] } else { 0.0 };
            let l1i = if i >= 1 {
                let coupled = if i >= 2 { l2i * d[i - 2] * l1[i - 1] } else { 0.0 };
                (a1[i - 1] - coupled) / d[i - 1]
            } else {
                0.0
            };
            let mut di = a0[i];
            if i >= 1 {
                di -= l1i * l1i * d[i - 1];
            }
            if i >= 2 {
                di -= l2i * l2i * d[i - 2];
            }
            d.push(di);
            l1.push(l1i);
            l2.push(l2i);
        }
        BandedLdl { d, l1, l2 }
    }

    fn solve(&self, b: &[f64]) -> Vec<f64> {
        let k = self.d.len();
        let mut y = b.to_vec();
        for i in 0..k {
            if i >= 1 {
                y[i] -= self.l1[i] * y[i - 1];
            }
            if i >= 2 {
                y[i] -= self.l2[i] * y[i - 2];
            }
        }
        let mut x = vec![0.0; k];
        for i in (0..k).rev() {
            let mut v = y[i] / self.d[i];
            if i + 1 < k {
                v -= self.l1[i + 1] * x[i + 1];
            }
            if i + 2 < k {
                v -= self.l2[i + 2] * x[i + 2];
            }
            x[i] = v;
        }
        x
    }

    /// Central band of `M⁻¹` (Hutchinson and de Hoog).
    fn inverse_band(&self) -> InverseBand {
        let k = self.d.len();
        let mut s0 = vec![0.0; k];
        let mut s1 = vec![0.0; k];
        let mut s2 = vec![0.0; k];
        for i in (0..k).rev() {
            let mut right1 = 0.0;
            let mut right2 = 0.0;
            if i + 1 < k {
                right1 = -self.l1[i + 1] * s0[i + 1];
                if i + 2 < k {
                    right1 -= self.l2[i + 2] * s1[i + 1];
                    right2 = -(self.l1[i + 1] * s1[i + 1] + self.l2[i + 2] * s0[i + 2]);
                }
            }
            let mut diag = 1.0 / self.d[i];
            if i + 1 < k {
                diag -= self.l1[i + 1] * right1;
            }
            if i + 2 < k {
                diag -= self.l2[i + 2] * right2;
            }
            s0[i] = diag;
            s1[i] = right1;
            s2[i] = right2;
        }
        InverseBand { s0, s1, s2 }
    }
}

struct InverseBand {
    s0: Vec<f64>,
    s1: Vec<f64>,
    s2: Vec<f64>,
}

impl InverseBand {
    fn get(&self, a: usize, b: usize) -> f64 {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        match hi - lo {
            0 => self.s0[lo],
            1 => self.s1[lo],
            2 => self.s2[lo],
            _ => 0.0,
        }
    }
}

/// Natural cubic spline through `values` at `knots`, linear beyond the
/// outer knots.
#[derive(Debug, Clone, PartialEq)]
pub struct NaturalSpline {
    knots: Vec<f64>,
    values: Vec<f64>,
    gamma: Vec<f64>,
}

impl NaturalSpline {
    pub fn new(knots: Vec<f64>, values: Vec<f64>, gamma: Vec<f64>) -> Self {
        assert!(!knots.is_empty(), "spline needs at least one knot");
        assert_eq!(knots.len(), values.len());
        assert_eq!(knots.len(), gamma.len());
        NaturalSpline { knots, values, gamma }
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn eval(&self, x: f64) -> f64 {
        let (t, g, gamma) = (&self.knots, &self.values, &self.gamma);
        let n = t.len();
        if n == 1 {
            return g[0];
        }
        if x <= t[0] {
            let h = t[1] - t[0];
            let slope = (g[1] - g[0]) / h - h * gamma[1] / 6.0;
            return g[0] + slope * (x - t[0]);
        }
        if x >= t[n - 1] {
            let h = t[n - 1] - t[n - 2];
            let slope = (g[n - 1] - g[n - 2]) / h + h * gamma[n - 2] / 6.0;
            return g[n - 1] + slope * (x - t[n - 1]);
        }
        let i = t.partition_point(|&v| v <= x) - 1;
        let h = t[i + 1] - t[i];
        let a = x - t[i];
        let b = t[i + 1] - x;
        (a * g[i + 1] + b * g[i]) / h
            - a * b / 6.0 * ((1.0 + a / h) * gamma[i + 1] + (1.0 + b / h) * gamma[i])
    }
}
