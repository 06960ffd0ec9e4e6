use super::Loss;
use crate::storage::SharedData;

const PREDICTION_BOUND: f32 = 50.;

/// Logistic loss for labels in `{-1, 1}`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogisticLoss;

impl LogisticLoss {
    /// Returns a new `LogisticLoss`.
    pub fn new() -> Self {
        Self
    }
}

/// Approximates `W(exp(x)) - x`, where `W` is the Lambert W function. The absolute
/// error is below `9e-5`.
fn wexpmx(x: f32) -> f32 {
    let w = if x >= 1. {
        0.86 * x + 0.01
    } else {
        (0.8 * x - 0.65).exp()
    };
    let r = if x >= 1. {
        x - w.ln() - w
    } else {
        0.2 * x + 0.65 - w
    };
    let t = 1. + w;
    let u = 2. * t * (t + 2. * r / 3.);

    w * (1. + r / t * (u - r) / (u - 2. * r)) - x
}

impl Loss for LogisticLoss {
    fn get_loss(&self, _sd: &SharedData, prediction: f32, label: f32) -> f32 {
        (1. + (-label * prediction).exp()).ln()
    }

    fn get_update(&self, prediction: f32, label: f32, eta_t: f32, pred_per_update: f32) -> f32 {
        let d = (label * prediction).exp();

        if eta_t < 1e-6 {
            return label * eta_t / ((1. + d) * pred_per_update);
        }

        let x = eta_t + label * prediction + d;
        let w = wexpmx(x);
        -(label * w + prediction) / pred_per_update
    }

    fn get_unsafe_update(&self, prediction: f32, label: f32, eta_t: f32, norm: f32) -> f32 {
        let d = (label * prediction).exp();
        label * eta_t / ((1. + d) * norm)
    }

    fn first_derivative(&self, _sd: &SharedData, prediction: f32, label: f32) -> f32 {
        -label / (1. + (label * prediction).exp())
    }

    fn get_square_grad(&self, prediction: f32, label: f32) -> f32 {
        let grad = -label / (1. + (label * prediction).exp());
        grad * grad
    }

    fn get_reverting_weight(&self, _sd: &SharedData, prediction: f32, eta_t: f32) -> f32 {
        let z = -prediction.abs();
        (1. - z - z.exp()) / eta_t
    }

    fn fixed_label_range(&self) -> Option<(f32, f32)> {
        Some((-PREDICTION_BOUND, PREDICTION_BOUND))
    }
}
