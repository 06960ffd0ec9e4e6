use crate::storage::SharedData;

/// The loss-function boundary the update engine is written against.
///
/// Every method receives the raw (already clamped) prediction. Methods that need
/// the observed label range take the shared training counters.
pub trait Loss: Send {
    /// The loss of a single prediction.
    fn get_loss(&self, sd: &SharedData, prediction: f32, label: f32) -> f32;

    /// The importance-invariant update step.
    ///
    /// # Arguments
    /// * `prediction` - The current prediction.
    /// * `label` - The target.
    /// * `eta_t` - The effective learning rate for this example.
    /// * `pred_per_update` - How much the prediction moves per unit of update.
    fn get_update(&self, prediction: f32, label: f32, eta_t: f32, pred_per_update: f32) -> f32;

    /// The plain gradient step, unbounded for large `eta_t`.
    fn get_unsafe_update(&self, prediction: f32, label: f32, eta_t: f32, norm: f32) -> f32;

    /// The derivative of the loss with respect to the prediction.
    fn first_derivative(&self, sd: &SharedData, prediction: f32, label: f32) -> f32;

    /// The squared gradient accumulated by the adaptive rule.
    fn get_square_grad(&self, prediction: f32, label: f32) -> f32;

    /// The importance weight needed to move the prediction across the decision
    /// threshold, used to score unlabeled examples in active learning.
    fn get_reverting_weight(&self, sd: &SharedData, prediction: f32, eta_t: f32) -> f32;

    /// A label range the loss imposes on predictions. When `None`, the range is
    /// widened as labels are observed.
    fn fixed_label_range(&self) -> Option<(f32, f32)> {
        None
    }
}
