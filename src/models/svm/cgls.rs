//! Conjugate gradient least squares over the active examples.
//!
//! Solves `min_w 0.5 λ |w|² + 0.5 Σ_{i ∈ active} C_i (y_i - w·x_i)²`
//! starting from the given `w`, updating the outputs of the active examples
//! alongside.
use crate::models::classifier_trait::TrainingSet;

pub struct Cgls<'s, 'a> {
    pub set: &'s TrainingSet<'a>,
    pub costs: &'s [f64],
    pub lambda: f64,
    pub epsilon: f64,
    pub max_iterations: usize,
}

impl<'s, 'a> Cgls<'s, 'a> {
    /// Returns `true` when the residual criterion was met.
    pub fn solve(&self, active: &[usize], w: &mut [f64], o: &mut [f64]) -> bool {
        let set = self.set;
        let d = w.len();
        let bias = d - 1;
        let labels = &set.labels;

        let mut z: Vec<f64> = active
            .iter()
            .map(|&i| self.costs[i] * (labels[i] - o[i]))
            .collect();
        let mut q = vec![0.0; active.len()];

        let mut r = vec![0.0; d];
        self.residual(active, &z, w, &mut r);
        let mut p = r.clone();
        let mut omega1: f64 = r.iter().map(|v| v * v).sum();
        if omega1 == 0.0 {
            return true;
        }
        let mut omega_p = omega1;
        let epsilon2 = self.epsilon * self.epsilon;

        for _ in 0..self.max_iterations {
            let mut omega_q = 0.0;
            for (k, &i) in active.iter().enumerate() {
                let row = set.rows[i];
                let t = row.iter().zip(&p).map(|(x, pj)| x * pj).sum::<f64>() + p[bias];
                q[k] = t;
                omega_q += self.costs[i] * t * t;
            }
            let gamma = omega1 / (self.lambda * omega_p + omega_q);
            let inv_omega2 = 1.0 / omega1;

            for (wj, pj) in w.iter_mut().zip(&p) {
                *wj += gamma * pj;
            }
            let mut omega_z = 0.0;
            for (k, &i) in active.iter().enumerate() {
                o[i] += gamma * q[k];
                z[k] -= gamma * self.costs[i] * q[k];
                omega_z += z[k] * z[k];
            }

            self.residual(active, &z, w, &mut r);
            omega1 = r.iter().map(|v| v * v).sum();
            if omega1 < epsilon2 * omega_z || omega1 == 0.0 {
                return true;
            }

            let scale = omega1 * inv_omega2;
            omega_p = 0.0;
            for (pj, rj) in p.iter_mut().zip(&r) {
                *pj = rj + *pj * scale;
                omega_p += *pj * *pj;
            }
        }
        false
    }

    /// `r = Σ_k z_k x_k - λ w`
    fn residual(&self, active: &[usize], z: &[f64], w: &[f64], r: &mut [f64]) {
        let bias = r.len() - 1;
        r.iter_mut().for_each(|v| *v = 0.0);
        for (k, &i) in active.iter().enumerate() {
            for (rj, x) in r.iter_mut().zip(self.set.rows[i]) {
                *rj += z[k] * x;
            }
            r[bias] += z[k];
        }
        for (rj, wj) in r.iter_mut().zip(w) {
            *rj -= self.lambda * wj;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_matches_ridge_solution() {
        // 1-D ridge regression with bias: rows x = 1, 2, 3 and targets y = 1, -1, 1
        let rows: Vec<Vec<f64>> = vec![vec![1.0], vec![2.0], vec![3.0]];
        let mut set = TrainingSet::default();
        set.push(&rows[0], true);
        set.push(&rows[1], false);
        set.push(&rows[2], true);
        let costs = vec![1.0; 3];
        let cgls = Cgls {
            set: &set,
            costs: &costs,
            lambda: 1.0,
            epsilon: 1e-12,
            max_iterations: 100,
        };
        let mut w = vec![0.0; 2];
        let mut o = vec![0.0; 3];
        assert!(cgls.solve(&[0, 1, 2], &mut w, &mut o));

        // normal equations (X'X + I) w = X'y with X = [[1,1],[2,1],[3,1]]
        // [[15, 6], [6, 4]] w = [2, 1]  =>  w = [2/24, 3/24]
        assert_relative_eq!(w[0], 2.0 / 24.0, epsilon = 1e-9);
        assert_relative_eq!(w[1], 3.0 / 24.0, epsilon = 1e-9);
        for i in 0..3 {
            assert_relative_eq!(o[i], set.output(i, &w), epsilon = 1e-9);
        }
    }

    #[test]
    fn test_empty_active_set_only_shrinks() {
        let rows: Vec<Vec<f64>> = vec![vec![1.0]];
        let mut set = TrainingSet::default();
        set.push(&rows[0], true);
        let costs = vec![1.0];
        let cgls = Cgls {
            set: &set,
            costs: &costs,
            lambda: 1.0,
            epsilon: 1e-10,
            max_iterations: 50,
        };
        let mut w = vec![0.0, 0.0];
        let mut o = vec![0.0];
        assert!(cgls.solve(&[], &mut w, &mut o));
        assert_eq!(w, vec![0.0, 0.0]);
    }
}
