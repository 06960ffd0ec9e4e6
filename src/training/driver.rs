use std::io::{BufRead, Write};

use log::info;

use super::{GdBuilder, finalize_regressor};
use crate::{
    Result,
    config::{GdConfig, HoldoutSpec},
    context::TrainingContext,
    example::Example,
    learner::Learner,
    persistence::ModelIo,
};

/// Whether the `counter`-th example of a pass belongs to the holdout set.
fn is_test_only(counter: u64, holdout: &HoldoutSpec, holdout_set_off: bool) -> bool {
    if holdout_set_off {
        return false;
    }

    if holdout.after > 0 {
        counter > holdout.after
    } else {
        counter % holdout.period == 0
    }
}

/// Prepares an example for learning: assigns its position, holdout membership
/// and feature statistics, and advances the example clock.
pub fn setup_example(ctx: &mut TrainingContext, ec: &mut Example) {
    ctx.pass_examples += 1;

    ec.example_counter = ctx.pass_examples;
    ec.in_use = true;
    ec.test_only = is_test_only(ec.example_counter, &ctx.cfg.holdout, ctx.holdout_set_off());
    ec.partial_prediction = 0.;
    ec.loss = 0.;
    ec.eta_round = 0.;
    ec.revert_weight = 0.;

    if let Some(label) = ec.label.label {
        ctx.set_minmax(label);
    }

    ec.compute_feature_stats(&ctx.interactions);

    ctx.sd.t += ec.label.weight as f64;
    ec.example_t = ctx.sd.t as f32;
}

/// Adds a learned example to the running counters.
pub fn account_example(ctx: &mut TrainingContext, ec: &Example) {
    let sd = &mut ctx.sd;
    let ld = &ec.label;
    let weight = ld.weight as f64;
    let loss = ec.loss as f64;

    if ec.test_only {
        sd.weighted_holdout_examples += weight;
        sd.weighted_holdout_examples_since_last_pass += weight;
        sd.holdout_sum_loss += loss;
        sd.holdout_sum_loss_since_last_pass += loss;
    } else {
        match ld.label {
            Some(label) => {
                sd.weighted_examples += weight;
                sd.weighted_labels += label as f64 * weight;
            }
            None => sd.weighted_unlabeled_examples += weight,
        }
        sd.sum_loss += loss;
        sd.sum_loss_since_last_dump += loss;
    }

    sd.example_number += 1;
    sd.total_features += ec.num_features as u64;
}

/// Feeds examples through a learner pass after pass.
pub struct Driver {
    learner: Box<dyn Learner>,
    ctx: TrainingContext,
}

impl Driver {
    /// Creates a new `Driver`.
    ///
    /// # Arguments
    /// * `learner` - The top of the learning stack.
    /// * `ctx` - The context the learner was built for.
    pub fn new(learner: Box<dyn Learner>, ctx: TrainingContext) -> Self {
        Self { learner, ctx }
    }

    /// Builds the learner described by `cfg` and wraps it in a `Driver`.
    pub fn from_config(cfg: GdConfig) -> Result<Self> {
        let (learner, ctx) = GdBuilder::new().build(cfg)?;
        Ok(Self::new(learner, ctx))
    }

    pub fn context(&self) -> &TrainingContext {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut TrainingContext {
        &mut self.ctx
    }

    pub fn is_done(&self) -> bool {
        self.ctx.is_done()
    }

    /// Learns from a single example and accounts for it.
    pub fn learn(&mut self, ec: &mut Example) {
        setup_example(&mut self.ctx, ec);
        self.learner.learn(&mut self.ctx, ec);
        account_example(&mut self.ctx, ec);
    }

    /// Predicts an example without learning from it.
    pub fn predict(&mut self, ec: &mut Example) -> f32 {
        self.learner.predict(&mut self.ctx, ec);
        ec.label.prediction
    }

    /// Closes the current pass.
    pub fn end_pass(&mut self) -> Result<()> {
        self.ctx.pass_examples = 0;
        self.learner.end_pass(&mut self.ctx)
    }

    /// Runs the configured amount of passes over `examples`, stopping early when
    /// the holdout loss stops improving, then finishes the run.
    pub fn run(&mut self, examples: &mut [Example]) -> Result<()> {
        for pass in 0..self.ctx.cfg.passes {
            if self.is_done() {
                break;
            }

            for ec in examples.iter_mut() {
                self.learn(ec);
            }

            info!(
                pass = pass,
                examples = self.ctx.sd.example_number,
                average_loss = self.ctx.sd.average_loss();
                "pass complete"
            );

            self.end_pass()?;
        }

        self.finish()
    }

    /// Writes the configured final models and releases the learner.
    pub fn finish(&mut self) -> Result<()> {
        finalize_regressor(&mut self.ctx)?;
        self.learner.finish(&mut self.ctx);
        Ok(())
    }

    /// Writes the model to `tx`.
    pub fn save(&mut self, tx: &mut dyn Write, text: bool) -> Result<()> {
        let mut io = ModelIo::writer(tx, text);
        self.learner.save_load(&mut self.ctx, &mut io)
    }

    /// Replaces the model with the one read from `rx`.
    pub fn load(&mut self, rx: &mut dyn BufRead, text: bool) -> Result<()> {
        let mut io = ModelIo::reader(rx, text);
        self.learner.save_load(&mut self.ctx, &mut io)
    }
}
