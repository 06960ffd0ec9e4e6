use crate::{
    Result,
    audit::print_audit_features,
    context::TrainingContext,
    example::Example,
    learner::Learner,
    persistence::{self, ModelIo},
    training::PassController,
};

use super::{
    PowerData, compute_rate_decay, finalize_prediction, inline_predict, sync_weights,
    trunc_predict,
};

/// Below this magnitude the pending contraction is folded into the weights.
const MIN_CONTRACTION: f64 = 1e-10;
const DERIVATIVE_EPSILON: f64 = 1e-8;

/// Online gradient descent over the shared weight table.
///
/// Every combination of update rule flags is a separate monomorphization:
/// `ADAPTIVE`, `NORMALIZED` and `FEATURE_MASK` are slot offsets inside a weight
/// group, `0` meaning the statistic is disabled.
pub struct Gd<
    const SQRT_RATE: bool,
    const ADAPTIVE: usize,
    const NORMALIZED: usize,
    const FEATURE_MASK: usize,
> {
    truncated: bool,
    pass: PassController,
}

struct NormData {
    grad_squared: f32,
    pred_per_update: f32,
    norm_x: f32,
    pd: PowerData,
}

impl<const SQRT_RATE: bool, const ADAPTIVE: usize, const NORMALIZED: usize, const FEATURE_MASK: usize>
    Gd<SQRT_RATE, ADAPTIVE, NORMALIZED, FEATURE_MASK>
{
    /// Creates a new `Gd` learner.
    ///
    /// # Arguments
    /// * `truncated` - Whether predictions soft threshold weights by the pending L1 gravity.
    /// * `early_stop_thres` - The amount of non improving holdout evaluations before stopping.
    /// * `check_every` - Holdout evaluations only stop the run on passes divisible by this.
    pub fn new(truncated: bool, early_stop_thres: usize, check_every: usize) -> Self {
        Self {
            truncated,
            pass: PassController::new(early_stop_thres, check_every),
        }
    }

    /// Accumulates the adaptive and normalized statistics of one feature.
    #[inline]
    fn pred_per_update_feature(nd: &mut NormData, x: f32, w: &mut [f32]) {
        // A zero value leaves the normalizer and the gradient sum at zero, so
        // the feature can neither move the prediction nor be scaled.
        if x == 0. || (FEATURE_MASK != 0 && w[FEATURE_MASK] != 1.) {
            return;
        }

        let x2 = x * x;

        if ADAPTIVE != 0 {
            w[ADAPTIVE] += nd.grad_squared * x2;
        }

        if NORMALIZED != 0 {
            let x_abs = x.abs();

            if x_abs > w[NORMALIZED] {
                // The scale grew, shrink the weight so past updates keep their effect.
                if w[NORMALIZED] > 0. {
                    let rescale = w[NORMALIZED] / x_abs;
                    w[0] *= if SQRT_RATE {
                        if ADAPTIVE != 0 {
                            rescale
                        } else {
                            rescale * rescale
                        }
                    } else {
                        (rescale * rescale).powf(-nd.pd.minus_power_t_norm)
                    };
                }
                w[NORMALIZED] = x_abs;
            }

            nd.norm_x += x2 / (w[NORMALIZED] * w[NORMALIZED]);
        }

        let rate_decay = compute_rate_decay::<SQRT_RATE, ADAPTIVE, NORMALIZED>(&nd.pd, w);
        nd.pred_per_update += x2 * rate_decay;
    }

    /// How much the prediction moves per unit of update, updating the per-feature
    /// statistics on the way.
    fn pred_per_update(ctx: &mut TrainingContext, ec: &Example, label: f32) -> f32 {
        let ld = &ec.label;
        let grad_squared = ctx.loss.get_square_grad(ld.prediction, label) * ld.weight;

        if grad_squared == 0. {
            return 1.;
        }

        let mut nd = NormData {
            grad_squared,
            pred_per_update: 0.,
            norm_x: 0.,
            pd: ctx.power_data(),
        };

        ec.for_each_feature(&ctx.interactions, |x, index| {
            Self::pred_per_update_feature(&mut nd, x, ctx.weights.group_mut(index));
        });

        if NORMALIZED != 0 {
            let total_weight = ctx.total_weight(ec);
            ctx.sd.normalized_sum_norm_x += ld.weight * nd.norm_x;
            let avg_norm = ctx.sd.normalized_sum_norm_x / total_weight;

            if SQRT_RATE {
                nd.pred_per_update /= if ADAPTIVE != 0 {
                    avg_norm.sqrt()
                } else {
                    avg_norm
                };
            } else {
                nd.pred_per_update *= avg_norm.powf(nd.pd.minus_power_t_norm);
            }
        }

        nd.pred_per_update
    }

    /// Computes `ec.loss` and the scaled update `ec.eta_round`, folding the
    /// regularization of this step into the pending gravity and contraction.
    fn compute_update(ctx: &mut TrainingContext, ec: &mut Example) {
        let ld = ec.label;
        let t = if ctx.cfg.active && ld.label.is_some() {
            ctx.sd.weighted_unlabeled_examples as f32
        } else {
            (ec.example_t as f64 - ctx.sd.weighted_holdout_examples) as f32
        };

        ec.eta_round = 0.;

        if let Some(label) = ld.label {
            ec.loss = ctx.loss.get_loss(&ctx.sd, ld.prediction, label) * ld.weight;
        }

        match ld.label {
            Some(label) if !ec.test_only => {
                if !ctx.cfg.training || ec.loss <= 0. {
                    return;
                }

                let pred_per_update = if ADAPTIVE != 0 || NORMALIZED != 0 {
                    Self::pred_per_update(ctx, ec, label)
                } else {
                    ec.total_sum_feat_sq
                };

                let power_t = ctx.cfg.power_t;
                let mut eta_t = ctx.eta * pred_per_update * ld.weight;
                if ADAPTIVE == 0 && power_t != 0. {
                    eta_t *= t.powf(-power_t);
                }

                let update = if ctx.rule.invariant {
                    ctx.loss
                        .get_update(ld.prediction, label, eta_t, pred_per_update)
                } else {
                    ctx.loss
                        .get_unsafe_update(ld.prediction, label, eta_t, pred_per_update)
                };

                if ctx.reg_mode != 0 && update.abs() as f64 > DERIVATIVE_EPSILON {
                    let dev1 = ctx.loss.first_derivative(&ctx.sd, ld.prediction, label) as f64;
                    let eta_bar = if dev1.abs() > DERIVATIVE_EPSILON {
                        -(update as f64) / dev1
                    } else {
                        0.
                    };

                    if dev1.abs() > DERIVATIVE_EPSILON {
                        ctx.sd.contraction *= 1. - ctx.cfg.l2_lambda as f64 * eta_bar;
                    }
                    ctx.sd.gravity += eta_bar * ctx.cfg.l1_lambda as f64;
                }

                ec.eta_round = (update as f64 / ctx.sd.contraction) as f32;
            }
            _ if ctx.cfg.active => {
                let eta_t = ctx.eta / t.powf(ctx.cfg.power_t);
                ec.revert_weight = ctx
                    .loss
                    .get_reverting_weight(&ctx.sd, ld.prediction, eta_t);
            }
            _ => {}
        }
    }

    /// Applies `update` to every trainable feature of `ec`.
    fn train(ctx: &mut TrainingContext, ec: &Example, mut update: f32) {
        if update.abs() == 0. {
            return;
        }

        let pd = ctx.power_data();

        if NORMALIZED != 0 {
            let mut avg_norm = ctx.sd.normalized_sum_norm_x / ctx.total_weight(ec);
            if SQRT_RATE {
                avg_norm = avg_norm.sqrt();
                update /= if ADAPTIVE != 0 {
                    avg_norm
                } else {
                    avg_norm * avg_norm
                };
            } else {
                update *= (avg_norm * avg_norm).powf(pd.minus_power_t_norm);
            }
        }

        ec.for_each_feature(&ctx.interactions, |x, index| {
            let w = ctx.weights.group_mut(index);
            if x != 0. && (FEATURE_MASK == 0 || w[FEATURE_MASK] == 1.) {
                w[0] += update * compute_rate_decay::<SQRT_RATE, ADAPTIVE, NORMALIZED>(&pd, w) * x;
            }
        });
    }
}

impl<const SQRT_RATE: bool, const ADAPTIVE: usize, const NORMALIZED: usize, const FEATURE_MASK: usize>
    Learner for Gd<SQRT_RATE, ADAPTIVE, NORMALIZED, FEATURE_MASK>
{
    fn predict(&mut self, ctx: &mut TrainingContext, ec: &mut Example) {
        ec.partial_prediction = if self.truncated {
            trunc_predict(ctx, ec, ctx.sd.gravity as f32)
        } else {
            inline_predict(ctx, ec)
        };

        let contracted = ec.partial_prediction * ctx.sd.contraction as f32;
        ec.label.prediction = finalize_prediction(&ctx.sd, contracted);

        if ctx.cfg.audit || ctx.hash_inv() {
            print_audit_features(ctx, ec);
        }
    }

    fn learn(&mut self, ctx: &mut TrainingContext, ec: &mut Example) {
        assert!(ec.in_use, "learning from an example that is not in use");

        self.predict(ctx, ec);

        let weight = ec.label.weight;
        if (ctx.holdout_set_off() || !ec.test_only) && weight > 0. {
            self.update(ctx, ec);
        } else if weight > 0.
            && let Some(label) = ec.label.label
        {
            ec.loss = ctx.loss.get_loss(&ctx.sd, ec.label.prediction, label) * weight;
        }
    }

    fn update(&mut self, ctx: &mut TrainingContext, ec: &mut Example) {
        Self::compute_update(ctx, ec);

        if ec.eta_round != 0. {
            Self::train(ctx, ec, ec.eta_round);

            if ctx.sd.contraction < MIN_CONTRACTION {
                sync_weights(ctx);
            }
        }
    }

    fn save_load(&mut self, ctx: &mut TrainingContext, io: &mut ModelIo<'_>) -> Result<()> {
        persistence::save_load(ctx, io)
    }

    fn end_pass(&mut self, ctx: &mut TrainingContext) -> Result<()> {
        self.pass.end_pass(ctx)
    }
}
