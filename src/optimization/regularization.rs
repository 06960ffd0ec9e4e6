use log::debug;

use crate::context::TrainingContext;

/// Soft thresholds `w` by `gravity`, returning `0` when `|w| <= gravity`.
#[inline]
pub fn trunc_weight(w: f32, gravity: f32) -> f32 {
    if gravity < w.abs() {
        let sign = if w < 0. { -1. } else { 1. };
        w - sign * gravity
    } else {
        0.
    }
}

/// Folds the pending regularization into the weights and resets it.
///
/// Calling this twice in a row leaves the weights unchanged the second time.
pub fn sync_weights(ctx: &mut TrainingContext) {
    let sd = &mut ctx.sd;

    if sd.gravity == 0. && sd.contraction == 1. {
        return;
    }

    if ctx.reg_mode != 0 {
        debug!(gravity = sd.gravity, contraction = sd.contraction; "flushing regularization");

        let gravity = sd.gravity as f32;
        let contraction = sd.contraction as f32;

        for group in ctx.weights.groups_mut() {
            group[0] = trunc_weight(group[0], gravity) * contraction;
        }
    }

    sd.gravity = 0.;
    sd.contraction = 1.;
}
