//! Choice and validation of the initial search direction.
//!
//! Training starts from a single weight vector per fold. After the last
//! iteration the learned vectors must find at least one target at the test
//! FDR and no fewer targets than the starting direction did; otherwise they
//! are replaced by the starting direction again.
use crate::scores::Scores;

#[derive(Debug, Clone)]
pub struct SanityCheck {
    fdr: f64,
    override_direction: bool,
    /// Normalized initial weights, bias last.
    init_weights: Option<Vec<f64>>,
    /// Signed 1-based feature number.
    default_direction: Option<i32>,
    initial_positives: usize,
}

impl SanityCheck {
    pub fn new(fdr: f64, override_direction: bool) -> Self {
        SanityCheck {
            fdr,
            override_direction,
            init_weights: None,
            default_direction: None,
            initial_positives: 0,
        }
    }

    pub fn with_init_weights(mut self, weights: Vec<f64>) -> Self {
        self.init_weights = Some(weights);
        self
    }

    pub fn with_default_direction(mut self, direction: Option<i32>) -> Self {
        self.default_direction = direction;
        self
    }

    /// Targets found at the test FDR by the initial direction, summed over
    /// the test partitions.
    pub fn initial_positives(&self) -> usize {
        self.initial_positives
    }

    /// Fill `weights` with the starting direction of every fold and record
    /// how many targets it finds on the test partitions.
    ///
    /// # Arguments
    ///
    /// * `test` - Held-out partitions, one per fold
    /// * `train` - Training partitions, searched when no direction was given
    /// * `weights` - One weight vector per fold, overwritten
    pub fn init_direction(&mut self, test: &mut [Scores], train: &mut [Scores], weights: &mut [Vec<f64>]) {
        if let Some(init) = &self.init_weights {
            log::info!("Using the supplied initial weights as search direction");
            for w in weights.iter_mut() {
                w.clone_from(init);
            }
        } else {
            self.default_weights(train, weights);
        }

        self.initial_positives = count_positives(test, weights, self.fdr);
        if self.initial_positives == 0 && self.init_weights.is_some() {
            log::warn!(
                "No targets found at q <= {} with the supplied initial weights; falling back to the default direction",
                self.fdr
            );
            self.default_weights(train, weights);
            self.initial_positives = count_positives(test, weights, self.fdr);
        }
        if self.initial_positives == 0 {
            log::warn!("No targets found at q <= {} with the initial direction", self.fdr);
        }
    }

    /// `true` when the trained `weights` are kept. On failure they are reset
    /// to the default direction, unless direction overriding is enabled.
    pub fn validate_direction(&self, test: &mut [Scores], train: &mut [Scores], weights: &mut [Vec<f64>]) -> bool {
        let over_fdr = count_positives(test, weights, self.fdr);
        let problem = if over_fdr == 0 {
            Some(format!("No targets found with q <= {}", self.fdr))
        } else if self.initial_positives > over_fdr {
            Some(format!(
                "Fewer identifications after training ({}) than with the initial direction ({})",
                over_fdr, self.initial_positives
            ))
        } else {
            None
        };

        match problem {
            None => true,
            Some(message) if self.override_direction => {
                log::warn!("{}; keeping the learned direction as requested", message);
                true
            }
            Some(message) => {
                log::error!("{}; resetting to the default direction", message);
                self.default_weights(train, weights);
                false
            }
        }
    }

    /// The explicit default direction if one was configured, otherwise the
    /// best single feature of each training partition.
    fn default_weights(&self, train: &mut [Scores], weights: &mut [Vec<f64>]) {
        if let Some(direction) = self.default_direction {
            let feature = direction.unsigned_abs() as usize - 1;
            let sign = f64::from(direction.signum());
            for w in weights.iter_mut() {
                w.iter_mut().for_each(|v| *v = 0.0);
                w[feature] = sign;
            }
            return;
        }
        for (fold, (set, w)) in train.iter_mut().zip(weights.iter_mut()).enumerate() {
            w.iter_mut().for_each(|v| *v = 0.0);
            match set.init_direction(self.fdr) {
                Some(direction) => w[direction.feature] = direction.sign,
                None => {
                    log::warn!(
                        "No informative feature in fold {}; starting from the first feature",
                        fold + 1
                    );
                    w[0] = 1.0;
                }
            }
        }
    }
}

fn count_positives(sets: &mut [Scores], weights: &[Vec<f64>], fdr: f64) -> usize {
    sets.iter_mut()
        .zip(weights)
        .map(|(set, w)| set.calc_scores(w, fdr))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::psm::{Label, Psm};
    use crate::scores::ScoreHolder;
    use std::sync::Arc;

    /// Feature 0 separates perfectly when negated, feature 1 alternates
    /// between 0 and 1 in both classes.
    fn fold() -> Scores {
        let holders = (0..20)
            .map(|i| {
                let target = i < 10;
                let label = if target { Label::Target } else { Label::Decoy };
                let f0 = if target { -(i as f64) - 10.0 } else { i as f64 };
                let psm = Psm::new(format!("p{}", i), "K.PEP.A", ["P"], vec![f0, (i % 2) as f64]);
                ScoreHolder::new(label, Arc::new(psm))
            })
            .collect();
        Scores::from_holders(holders)
    }

    #[test]
    fn test_search_direction() {
        let mut check = SanityCheck::new(0.01, false);
        let mut train = vec![fold()];
        let mut test = vec![fold()];
        let mut w = vec![vec![0.0; 3]];
        check.init_direction(&mut test, &mut train, &mut w);
        assert_eq!(w[0], vec![-1.0, 0.0, 0.0]);
        assert_eq!(check.initial_positives(), 10);
    }

    #[test]
    fn test_explicit_default_direction() {
        let mut check = SanityCheck::new(0.01, false).with_default_direction(Some(-1));
        let mut train = vec![fold(), fold()];
        let mut test = vec![fold(), fold()];
        let mut w = vec![vec![0.5; 3]; 2];
        check.init_direction(&mut test, &mut train, &mut w);
        assert!(w.iter().all(|wi| wi == &vec![-1.0, 0.0, 0.0]));
        assert_eq!(check.initial_positives(), 20);
    }

    #[test]
    fn test_useless_init_weights_fall_back() {
        let mut check = SanityCheck::new(0.01, false).with_init_weights(vec![1.0, 0.0, 0.0]);
        let mut train = vec![fold()];
        let mut test = vec![fold()];
        let mut w = vec![vec![0.0; 3]];
        check.init_direction(&mut test, &mut train, &mut w);
        assert_eq!(w[0], vec![-1.0, 0.0, 0.0]);
        assert_eq!(check.initial_positives(), 10);
    }

    #[test]
    fn test_validation_resets_worse_direction() {
        let mut check = SanityCheck::new(0.01, false);
        let mut train = vec![fold()];
        let mut test = vec![fold()];
        let mut w = vec![vec![0.0; 3]];
        check.init_direction(&mut test, &mut train, &mut w);

        w[0] = vec![1.0, 0.0, 0.0];
        assert!(!check.validate_direction(&mut test, &mut train, &mut w));
        assert_eq!(w[0], vec![-1.0, 0.0, 0.0]);

        assert!(check.validate_direction(&mut test, &mut train, &mut w));
    }

    #[test]
    fn test_override_keeps_learned_direction() {
        let mut check = SanityCheck::new(0.01, true);
        let mut train = vec![fold()];
        let mut test = vec![fold()];
        let mut w = vec![vec![0.0; 3]];
        check.init_direction(&mut test, &mut train, &mut w);

        w[0] = vec![1.0, 0.0, 0.0];
        assert!(check.validate_direction(&mut test, &mut train, &mut w));
        assert_eq!(w[0], vec![1.0, 0.0, 0.0]);
    }
}
