use log::warn;

use crate::{context::TrainingContext, example::Example, storage::SharedData};

use super::trunc_weight;

/// The raw linear prediction, `initial + sum(w * x)`.
pub fn inline_predict(ctx: &TrainingContext, ec: &Example) -> f32 {
    let mut prediction = ec.label.initial;
    ec.for_each_feature(&ctx.interactions, |x, index| {
        prediction += ctx.weights.weight(index) * x;
    });
    prediction
}

/// The linear prediction with every weight soft thresholded by `gravity`.
pub fn trunc_predict(ctx: &TrainingContext, ec: &Example, gravity: f32) -> f32 {
    let mut prediction = ec.label.initial;
    ec.for_each_feature(&ctx.interactions, |x, index| {
        prediction += trunc_weight(ctx.weights.weight(index), gravity) * x;
    });
    prediction
}

/// Clamps a prediction to the observed label range, replacing non finite values
/// with `0`.
pub fn finalize_prediction(sd: &SharedData, prediction: f32) -> f32 {
    if !prediction.is_finite() {
        warn!(
            example = sd.example_number + 1;
            "non finite prediction {prediction}, replacing with 0"
        );
        return 0.;
    }

    sd.bound_prediction(prediction)
}
