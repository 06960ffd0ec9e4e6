use super::Loss;
use crate::storage::SharedData;

/// Quantile (pinball) loss at level `tau`.
#[derive(Debug, Clone, Copy)]
pub struct QuantileLoss {
    tau: f32,
}

impl QuantileLoss {
    /// Returns a new `QuantileLoss`.
    ///
    /// # Arguments
    /// * `tau` - The quantile to estimate, in `[0, 1]`.
    pub fn new(tau: f32) -> Self {
        Self { tau }
    }
}

impl Loss for QuantileLoss {
    fn get_loss(&self, _sd: &SharedData, prediction: f32, label: f32) -> f32 {
        let e = label - prediction;
        if e > 0. {
            self.tau * e
        } else {
            -(1. - self.tau) * e
        }
    }

    fn get_update(&self, prediction: f32, label: f32, eta_t: f32, pred_per_update: f32) -> f32 {
        let e = label - prediction;

        if e == 0. {
            0.
        } else if e > 0. {
            (self.tau * eta_t).min(e) / pred_per_update
        } else {
            -((1. - self.tau) * eta_t).min(-e) / pred_per_update
        }
    }

    fn get_unsafe_update(&self, prediction: f32, label: f32, eta_t: f32, norm: f32) -> f32 {
        let e = label - prediction;

        if e == 0. {
            0.
        } else if e > 0. {
            self.tau * eta_t / norm
        } else {
            -(1. - self.tau) * eta_t / norm
        }
    }

    fn first_derivative(&self, _sd: &SharedData, prediction: f32, label: f32) -> f32 {
        let e = label - prediction;

        if e == 0. {
            0.
        } else if e > 0. {
            -self.tau
        } else {
            1. - self.tau
        }
    }

    fn get_square_grad(&self, prediction: f32, label: f32) -> f32 {
        let e = label - prediction;

        if e == 0. {
            0.
        } else if e > 0. {
            self.tau * self.tau
        } else {
            (1. - self.tau) * (1. - self.tau)
        }
    }

    fn get_reverting_weight(&self, sd: &SharedData, prediction: f32, eta_t: f32) -> f32 {
        let threshold = 0.5 * (sd.min_label + sd.max_label);
        let v = if prediction > threshold {
            -(1. - self.tau)
        } else {
            self.tau
        };

        (threshold - prediction) / (eta_t * v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loss_is_asymmetric() {
        let sd = SharedData::default();
        let loss = QuantileLoss::new(0.9);

        assert!((loss.get_loss(&sd, 0., 1.) - 0.9).abs() < 1e-6);
        assert!((loss.get_loss(&sd, 1., 0.) - 0.1).abs() < 1e-6);
    }

    #[test]
    fn safe_step_is_capped_by_the_residual() {
        let loss = QuantileLoss::new(0.5);
        let (eta_t, norm) = (0.01, 4.);

        assert_eq!(
            loss.get_update(0., 1., eta_t, norm),
            loss.get_unsafe_update(0., 1., eta_t, norm)
        );
        assert_eq!(
            loss.get_update(1., 0., eta_t, norm),
            loss.get_unsafe_update(1., 0., eta_t, norm)
        );
        assert_eq!(loss.get_update(0., 0.1, 10., 2.), 0.05);
    }

    #[test]
    fn derivative_sign_follows_residual() {
        let sd = SharedData::default();
        let loss = QuantileLoss::new(0.5);

        assert_eq!(loss.first_derivative(&sd, 0., 1.), -0.5);
        assert_eq!(loss.first_derivative(&sd, 1., 0.), 0.5);
        assert_eq!(loss.first_derivative(&sd, 1., 1.), 0.);
    }
}
