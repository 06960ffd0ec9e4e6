use std::{
    collections::BTreeMap,
    io::{self, Write},
};

use crate::{
    config::GdConfig,
    example::{Example, Interactions},
    loss::Loss,
    optimization::PowerData,
    storage::{SharedData, WeightStore},
    synchronization::AllReduce,
};

/// Whether more passes over the data are wanted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassState {
    Training,
    Finished,
}

/// The update rule flags a run resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateRule {
    pub adaptive: bool,
    pub normalized: bool,
    pub invariant: bool,
    pub sqrt_rate: bool,
}

/// Everything a learner reads and mutates besides its own state: the weight
/// table, the shared counters, the loss and the run wide settings.
pub struct TrainingContext {
    pub cfg: GdConfig,
    pub rule: UpdateRule,
    pub weights: WeightStore,
    pub sd: SharedData,
    pub loss: Box<dyn Loss>,
    pub interactions: Interactions,
    /// The current base learning rate.
    pub eta: f32,
    pub initial_t: f32,
    /// Bit 0 enables L1, bit 1 enables L2.
    pub reg_mode: u8,
    pub current_pass: usize,
    pub state: PassState,
    /// Human readable feature names to table positions, collected while auditing.
    pub name_index_map: BTreeMap<String, u32>,
    pub all_reduce: Option<Box<dyn AllReduce>>,
    pub audit_out: Box<dyn Write + Send>,
    /// Whether observed labels widen the prediction range.
    pub widen_labels: bool,
    /// Examples set up during the current pass.
    pub pass_examples: u64,
}

impl TrainingContext {
    /// Creates a new `TrainingContext` with fresh counters and no collective group.
    ///
    /// # Arguments
    /// * `cfg` - The run configuration.
    /// * `rule` - The resolved update rule.
    /// * `weights` - The weight table.
    /// * `loss` - The loss function.
    pub fn new(cfg: GdConfig, rule: UpdateRule, weights: WeightStore, loss: Box<dyn Loss>) -> Self {
        let mut sd = SharedData::default();
        let mut widen_labels = true;

        if let Some((min, max)) = loss.fixed_label_range() {
            (sd.min_label, sd.max_label) = (min, max);
            widen_labels = false;
        }

        if let Some(min) = cfg.min_prediction {
            sd.min_label = min;
            widen_labels = false;
        }

        if let Some(max) = cfg.max_prediction {
            sd.max_label = max;
            widen_labels = false;
        }

        let reg_mode = (cfg.l1_lambda > 0.) as u8 | (((cfg.l2_lambda > 0.) as u8) << 1);
        let interactions = Interactions::new(&cfg.pairs, &cfg.triples);

        Self {
            eta: cfg.learning_rate.unwrap_or(0.5),
            initial_t: cfg.initial_t.unwrap_or(0.),
            cfg,
            rule,
            weights,
            sd,
            loss,
            interactions,
            reg_mode,
            current_pass: 0,
            state: PassState::Training,
            name_index_map: BTreeMap::new(),
            all_reduce: None,
            audit_out: Box::new(io::stdout()),
            widen_labels,
            pass_examples: 0,
        }
    }

    /// Whether holdout examples are trained on instead of evaluated.
    pub fn holdout_set_off(&self) -> bool {
        self.cfg.holdout_set_off()
    }

    pub fn power_data(&self) -> PowerData {
        PowerData::new(self.cfg.power_t, self.rule.adaptive, self.cfg.fast_inv_sqrt)
    }

    /// The weighted example count the normalizer is averaged over.
    pub fn total_weight(&self, ec: &Example) -> f32 {
        if self.holdout_set_off() {
            ec.example_t
        } else {
            (ec.example_t as f64 - self.sd.weighted_holdout_examples) as f32
        }
    }

    /// Whether feature names are being collected for the inverted hash model.
    pub fn hash_inv(&self) -> bool {
        self.cfg.invert_hash.is_some()
    }

    pub fn set_done(&mut self) {
        self.state = PassState::Finished;
    }

    pub fn is_done(&self) -> bool {
        self.state == PassState::Finished
    }

    /// Widens the prediction range to include `label` unless the range is fixed.
    pub fn set_minmax(&mut self, label: f32) {
        if self.widen_labels {
            self.sd.set_minmax(label);
        }
    }
}
