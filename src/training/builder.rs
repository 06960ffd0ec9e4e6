use std::{fs::File, io::BufReader};

use log::{info, warn};

use crate::{
    Result,
    config::GdConfig,
    context::{TrainingContext, UpdateRule},
    initialization::initialize_regressor,
    learner::Learner,
    loss,
    optimization::Gd,
    persistence::{ModelIo, load_feature_mask, save_load},
    storage::{SlotLayout, WeightStore},
    synchronization::TcpAllReduce,
};

const DEFAULT_ETA: f32 = 0.5;
const EXPLICIT_RULE_ETA: f32 = 10.;
const MIN_FINAL_DECAY: f32 = 0.0001;

/// The learning rate and clock a run starts from, given its update rule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuleSetup {
    pub rule: UpdateRule,
    pub eta: f32,
    pub initial_t: f32,
    pub t: f64,
    pub weighted_unlabeled_examples: f64,
}

/// Resolves the update rule flags and the starting learning rate.
///
/// Without an explicit rule, the adaptive, normalized and invariant rules are
/// all on. An explicit rule enables only what it names, and then the plain rule
/// without adaptive or normalized statistics starts its clock at `1`.
///
/// Evaluation runs resolve the same rule as the training run that produced
/// their model, so both share a weight layout.
pub fn resolve_update_rule(cfg: &GdConfig) -> RuleSetup {
    let (adaptive, normalized, invariant, explicit) = match cfg.update_rule {
        Some(rule) => (rule.adaptive, rule.normalized, rule.invariant, true),
        None => (true, true, true, false),
    };

    let mut eta = cfg.learning_rate.unwrap_or(DEFAULT_ETA);
    let mut initial_t = cfg.initial_t.unwrap_or(0.);
    let mut t = initial_t as f64;
    let mut weighted_unlabeled_examples = 0.;

    if explicit {
        if cfg.learning_rate.is_none() && !(adaptive && normalized) {
            eta = EXPLICIT_RULE_ETA;
        }

        if !adaptive && !normalized {
            if cfg.initial_t.is_none() {
                t = 1.;
                weighted_unlabeled_examples = 1.;
                initial_t = 1.;
            }
            eta *= (t as f32).powf(cfg.power_t);
        }
    }

    RuleSetup {
        rule: UpdateRule {
            adaptive,
            normalized,
            invariant,
            sqrt_rate: cfg.power_t == 0.5,
        },
        eta,
        initial_t,
        t,
        weighted_unlabeled_examples,
    }
}

/// Builds a ready to train learner and its context from a configuration.
#[derive(Default)]
pub struct GdBuilder;

impl GdBuilder {
    /// Creates a new `GdBuilder`.
    pub fn new() -> Self {
        Self
    }

    /// Builds a new learner following a configuration.
    ///
    /// Joins the distributed group and loads the feature mask and initial
    /// regressor when configured.
    ///
    /// # Arguments
    /// * `cfg` - The run configuration.
    pub fn build(&self, cfg: GdConfig) -> Result<(Box<dyn Learner>, TrainingContext)> {
        cfg.validate()?;

        let setup = resolve_update_rule(&cfg);
        let rule = setup.rule;

        let final_decay = cfg.decay_learning_rate.powi(cfg.passes as i32);
        if final_decay < MIN_FINAL_DECAY {
            warn!(
                decay = cfg.decay_learning_rate,
                passes = cfg.passes;
                "the learning rate will decay to {final_decay} by the last pass"
            );
        }

        let layout = SlotLayout::new(rule.adaptive, rule.normalized, cfg.feature_mask.is_some());
        let weights = WeightStore::new(cfg.num_bits, layout);
        let loss = loss::from_spec(cfg.loss);

        let mut ctx = TrainingContext::new(cfg, rule, weights, loss);
        ctx.eta = setup.eta;
        ctx.initial_t = setup.initial_t;
        ctx.sd.t = setup.t;
        ctx.sd.weighted_unlabeled_examples = setup.weighted_unlabeled_examples;

        if let Some(dist) = &ctx.cfg.distributed {
            ctx.all_reduce = Some(Box::new(TcpAllReduce::connect(dist)?));
        }

        initialize_regressor(&mut ctx)?;

        if let Some(path) = ctx.cfg.feature_mask.clone() {
            let mut rx = BufReader::new(File::open(&path)?);
            load_feature_mask(&mut ctx, &mut rx, false)?;
        }

        if let Some(path) = ctx.cfg.initial_regressor.clone() {
            let mut rx = BufReader::new(File::open(&path)?);
            save_load(&mut ctx, &mut ModelIo::reader(&mut rx, false))?;
            info!(path:? = path; "initial regressor loaded");
        }

        let learner = self.resolve_sqrt_rate(&ctx, layout);

        info!(
            adaptive = rule.adaptive,
            normalized = rule.normalized,
            invariant = rule.invariant,
            stride = layout.stride(),
            eta = ctx.eta;
            "learner built"
        );

        Ok((learner, ctx))
    }

    fn resolve_sqrt_rate(&self, ctx: &TrainingContext, layout: SlotLayout) -> Box<dyn Learner> {
        if ctx.rule.sqrt_rate {
            self.resolve_stats::<true>(ctx, layout)
        } else {
            self.resolve_stats::<false>(ctx, layout)
        }
    }

    fn resolve_stats<const SQRT_RATE: bool>(
        &self,
        ctx: &TrainingContext,
        layout: SlotLayout,
    ) -> Box<dyn Learner> {
        match (ctx.rule.adaptive, ctx.rule.normalized) {
            (false, false) => self.resolve_feature_mask::<SQRT_RATE, 0, 0, 1>(ctx, layout),
            (true, false) => self.resolve_feature_mask::<SQRT_RATE, 1, 0, 2>(ctx, layout),
            (false, true) => self.resolve_feature_mask::<SQRT_RATE, 0, 1, 2>(ctx, layout),
            (true, true) => self.resolve_feature_mask::<SQRT_RATE, 1, 2, 3>(ctx, layout),
        }
    }

    fn resolve_feature_mask<
        const SQRT_RATE: bool,
        const ADAPTIVE: usize,
        const NORMALIZED: usize,
        const NEXT: usize,
    >(
        &self,
        ctx: &TrainingContext,
        layout: SlotLayout,
    ) -> Box<dyn Learner> {
        if layout.feature_mask != 0 {
            self.terminate_build::<SQRT_RATE, ADAPTIVE, NORMALIZED, NEXT>(ctx)
        } else {
            self.terminate_build::<SQRT_RATE, ADAPTIVE, NORMALIZED, 0>(ctx)
        }
    }

    fn terminate_build<
        const SQRT_RATE: bool,
        const ADAPTIVE: usize,
        const NORMALIZED: usize,
        const FEATURE_MASK: usize,
    >(
        &self,
        ctx: &TrainingContext,
    ) -> Box<dyn Learner> {
        let truncated = ctx.reg_mode & 1 == 1;
        let holdout = &ctx.cfg.holdout;

        Box::new(Gd::<SQRT_RATE, ADAPTIVE, NORMALIZED, FEATURE_MASK>::new(
            truncated,
            holdout.early_terminate,
            holdout.check_every_n_passes,
        ))
    }
}
