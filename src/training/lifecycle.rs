use std::path::PathBuf;

use log::{debug, info};

use crate::{
    Result,
    context::TrainingContext,
    optimization::sync_weights,
    persistence::{dump_inverted, dump_regressor},
    synchronization::{accumulate_avg, accumulate_scalar, accumulate_weighted_avg},
};

/// Tracks holdout progress across passes and decides when to stop early.
#[derive(Debug, Clone)]
pub struct PassController {
    no_win_counter: usize,
    early_stop_thres: usize,
    check_every: usize,
}

impl PassController {
    /// Creates a new `PassController`.
    ///
    /// # Arguments
    /// * `early_stop_thres` - Non improving holdout evaluations tolerated before stopping.
    /// * `check_every` - Stops may only happen on passes divisible by this.
    pub fn new(early_stop_thres: usize, check_every: usize) -> Self {
        Self {
            no_win_counter: 0,
            early_stop_thres,
            check_every,
        }
    }

    /// The amount of consecutive holdout evaluations without improvement.
    pub fn no_win_counter(&self) -> usize {
        self.no_win_counter
    }

    /// Closes a pass: flushes regularization, averages the weights across the
    /// group, decays the learning rate, checkpoints and evaluates the holdout set.
    pub fn end_pass(&mut self, ctx: &mut TrainingContext) -> Result<()> {
        sync_weights(ctx);

        if let Some(group) = ctx.all_reduce.as_deref_mut() {
            if ctx.rule.adaptive {
                accumulate_weighted_avg(group, &mut ctx.weights)?;
            } else {
                accumulate_avg(group, &mut ctx.weights, 0)?;
            }
        }

        ctx.eta *= ctx.cfg.decay_learning_rate;
        debug!(pass = ctx.current_pass, eta = ctx.eta; "pass finished");

        if ctx.cfg.save_per_pass {
            let pass = ctx.current_pass;
            save_predictor(ctx, pass)?;
        }

        ctx.current_pass += 1;

        if ctx.holdout_set_off() {
            return Ok(());
        }

        if self.summarize_holdout_set(ctx)? {
            finalize_regressor(ctx)?;
        }

        let on_check_pass = self.check_every <= 1 || ctx.current_pass % self.check_every == 0;
        if self.no_win_counter == self.early_stop_thres && on_check_pass {
            info!(
                best_pass = ctx.sd.holdout_best_pass,
                best_loss = ctx.sd.holdout_best_loss;
                "holdout loss stopped improving, terminating early"
            );
            ctx.set_done();
        }

        Ok(())
    }

    /// Scores the holdout examples of the pass that just ended.
    ///
    /// # Returns
    /// Whether the holdout loss improved on the best seen so far.
    fn summarize_holdout_set(&mut self, ctx: &mut TrainingContext) -> Result<bool> {
        let sd = &mut ctx.sd;

        let mut this_loss = if sd.weighted_holdout_examples_since_last_pass > 0. {
            (sd.holdout_sum_loss_since_last_pass / sd.weighted_holdout_examples_since_last_pass)
                as f32
        } else {
            f32::MAX
        };

        if let Some(group) = ctx.all_reduce.as_deref_mut() {
            this_loss = accumulate_scalar(group, this_loss)?;
        }

        sd.weighted_holdout_examples_since_last_pass = 0.;
        sd.holdout_sum_loss_since_last_pass = 0.;

        if this_loss < sd.holdout_best_loss {
            sd.holdout_best_loss = this_loss;
            sd.holdout_best_pass = ctx.current_pass;
            self.no_win_counter = 0;
            return Ok(true);
        }

        self.no_win_counter += 1;
        Ok(false)
    }
}

/// Writes every configured final model. Does nothing once the run stopped
/// early, so the model of the best holdout pass is kept.
pub fn finalize_regressor(ctx: &mut TrainingContext) -> Result<()> {
    if ctx.is_done() {
        return Ok(());
    }

    if let Some(path) = ctx.cfg.final_regressor.clone() {
        dump_regressor(ctx, &path, false)?;
    }

    if let Some(path) = ctx.cfg.readable_model.clone() {
        dump_regressor(ctx, &path, true)?;
    }

    if let Some(path) = ctx.cfg.invert_hash.clone() {
        dump_inverted(ctx, &path)?;
    }

    Ok(())
}

/// Writes the per pass checkpoint `<final_regressor>.<pass>`.
pub fn save_predictor(ctx: &mut TrainingContext, pass: usize) -> Result<()> {
    let Some(base) = &ctx.cfg.final_regressor else {
        return Ok(());
    };

    let mut path = base.clone().into_os_string();
    path.push(format!(".{pass}"));
    dump_regressor(ctx, &PathBuf::from(path), false)
}
