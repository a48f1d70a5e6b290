//! Exact line search along `w -> w_bar` for the L2-loss objective.
//!
//! The objective is piecewise quadratic in the step; its derivative changes
//! slope wherever an example enters or leaves the margin. Breakpoints are
//! visited in order until the derivative turns non-negative.

#[derive(Debug, Clone)]
struct Delta {
    delta: f64,
    index: usize,
    s: f64,
}

/// Optimal step `δ` so that `w + δ (w_bar - w)` minimises the objective.
pub fn line_search(
    w: &[f64],
    w_bar: &[f64],
    lambda: f64,
    o: &[f64],
    o_bar: &[f64],
    labels: &[f64],
    costs: &[f64],
) -> f64 {
    let mut omega_l = 0.0;
    let mut omega_r = 0.0;
    for (&wi, &wbi) in w.iter().zip(w_bar) {
        let diff = wbi - wi;
        omega_l += wi * diff;
        omega_r += wbi * diff;
    }
    let mut l = lambda * omega_l;
    let mut r = lambda * omega_r;

    let mut deltas = Vec::new();
    for i in 0..o.len() {
        let y = labels[i];
        let diff = y * (o_bar[i] - o[i]);
        if y * o[i] < 1.0 {
            if diff > 0.0 {
                deltas.push(Delta {
                    delta: (1.0 - y * o[i]) / diff,
                    index: i,
                    s: -1.0,
                });
            }
            l += costs[i] * (o[i] - y) * (o_bar[i] - o[i]);
            r += costs[i] * (o_bar[i] - y) * (o_bar[i] - o[i]);
        } else if diff < 0.0 {
            deltas.push(Delta {
                delta: (1.0 - y * o[i]) / diff,
                index: i,
                s: 1.0,
            });
        }
    }
    deltas.sort_by(|a, b| a.delta.total_cmp(&b.delta));

    for d in &deltas {
        let delta_prime = l + d.delta * (r - l);
        if delta_prime >= 0.0 {
            break;
        }
        let ii = d.index;
        let diff = d.s * costs[ii] * (o_bar[ii] - o[ii]);
        l += diff * (o[ii] - labels[ii]);
        r += diff * (o_bar[ii] - labels[ii]);
    }

    if r == l {
        return 1.0;
    }
    -l / (r - l)
}
