use super::Loss;
use crate::storage::SharedData;

/// Squared error loss, aware of the observed label range.
#[derive(Debug, Default, Clone, Copy)]
pub struct SquaredLoss;

impl SquaredLoss {
    /// Returns a new `SquaredLoss`.
    pub fn new() -> Self {
        Self
    }
}

impl Loss for SquaredLoss {
    fn get_loss(&self, sd: &SharedData, prediction: f32, label: f32) -> f32 {
        let (min, max) = (sd.min_label, sd.max_label);

        if (min..=max).contains(&prediction) {
            return (prediction - label).powi(2);
        }

        // Outside of the label range, charge the loss of the clamped prediction
        // plus its linear extension.
        if prediction < min {
            if label == min {
                0.
            } else {
                (label - min).powi(2) + 2. * (label - min) * (min - prediction)
            }
        } else if label == max {
            0.
        } else {
            (max - label).powi(2) + 2. * (max - label) * (prediction - max)
        }
    }

    fn get_update(&self, prediction: f32, label: f32, eta_t: f32, pred_per_update: f32) -> f32 {
        if eta_t < 1e-6 {
            return 2. * (label - prediction) * eta_t / pred_per_update;
        }

        (label - prediction) * (1. - (-2. * eta_t).exp()) / pred_per_update
    }

    fn get_unsafe_update(&self, prediction: f32, label: f32, eta_t: f32, norm: f32) -> f32 {
        2. * (label - prediction) * eta_t / norm
    }

    fn first_derivative(&self, sd: &SharedData, prediction: f32, label: f32) -> f32 {
        let prediction = sd.bound_prediction(prediction);
        2. * (prediction - label)
    }

    fn get_square_grad(&self, prediction: f32, label: f32) -> f32 {
        let grad = 2. * (prediction - label);
        grad * grad
    }

    fn get_reverting_weight(&self, sd: &SharedData, prediction: f32, eta_t: f32) -> f32 {
        let threshold = 0.5 * (sd.min_label + sd.max_label);
        let alternative = if prediction > threshold {
            sd.min_label
        } else {
            sd.max_label
        };

        ((alternative - prediction) / (alternative - threshold)).ln() / eta_t
    }
}
