use super::Loss;
use crate::storage::SharedData;

/// Hinge loss for labels in `{-1, 1}`.
#[derive(Debug, Default, Clone, Copy)]
pub struct HingeLoss;

impl HingeLoss {
    /// Returns a new `HingeLoss`.
    pub fn new() -> Self {
        Self
    }
}

impl Loss for HingeLoss {
    fn get_loss(&self, _sd: &SharedData, prediction: f32, label: f32) -> f32 {
        (1. - label * prediction).max(0.)
    }

    fn get_update(&self, prediction: f32, label: f32, eta_t: f32, pred_per_update: f32) -> f32 {
        if label * prediction >= 1. {
            return 0.;
        }

        let err = 1. - label * prediction;
        label * eta_t.min(err) / pred_per_update
    }

    fn get_unsafe_update(&self, prediction: f32, label: f32, eta_t: f32, norm: f32) -> f32 {
        if label * prediction >= 1. {
            return 0.;
        }

        label * eta_t / norm
    }

    fn first_derivative(&self, _sd: &SharedData, prediction: f32, label: f32) -> f32 {
        if label * prediction >= 1. { 0. } else { -label }
    }

    fn get_square_grad(&self, prediction: f32, label: f32) -> f32 {
        if label * prediction >= 1. { 0. } else { 1. }
    }

    fn get_reverting_weight(&self, _sd: &SharedData, prediction: f32, eta_t: f32) -> f32 {
        prediction.abs() / eta_t
    }

    fn fixed_label_range(&self) -> Option<(f32, f32)> {
        Some((-1., 1.))
    }
}
