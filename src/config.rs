use std::{fs, net::SocketAddr, path::Path, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{GdErr, Result};

const DEFAULT_NUM_BITS: u32 = 18;
const MAX_NUM_BITS: u32 = 30;
const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// The explicit choice of update rule flags. When absent from the configuration,
/// the adaptive, normalized and invariant rules are all enabled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateRuleSpec {
    pub adaptive: bool,
    pub normalized: bool,
    pub invariant: bool,
}

/// The specification for the `Loss` trait.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossSpec {
    #[default]
    Squared,
    Logistic,
    Hinge,
    Quantile {
        tau: f32,
    },
}

/// Holdout evaluation and early stopping settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HoldoutSpec {
    pub off: bool,
    pub period: u64,
    pub after: u64,
    pub early_terminate: usize,
    pub check_every_n_passes: usize,
}

impl Default for HoldoutSpec {
    fn default() -> Self {
        Self {
            off: false,
            period: 10,
            after: 0,
            early_terminate: 3,
            check_every_n_passes: 1,
        }
    }
}

/// Where and how this node joins the collective averaging group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributedSpec {
    pub span_server: SocketAddr,
    pub unique_id: u64,
    pub total: usize,
    pub node: usize,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl DistributedSpec {
    /// Returns the upper bound for a single collective operation.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

/// The full configuration of a training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GdConfig {
    pub num_bits: u32,
    pub learning_rate: Option<f32>,
    pub power_t: f32,
    pub initial_t: Option<f32>,
    pub decay_learning_rate: f32,
    pub l1_lambda: f32,
    pub l2_lambda: f32,
    pub update_rule: Option<UpdateRuleSpec>,
    pub feature_mask: Option<PathBuf>,
    pub initial_constant: Option<f32>,
    pub loss: LossSpec,
    pub passes: usize,
    pub holdout: HoldoutSpec,
    pub training: bool,
    pub save_resume: bool,
    pub save_per_pass: bool,
    pub initial_regressor: Option<PathBuf>,
    pub final_regressor: Option<PathBuf>,
    pub readable_model: Option<PathBuf>,
    pub invert_hash: Option<PathBuf>,
    pub audit: bool,
    pub fast_inv_sqrt: bool,
    pub min_prediction: Option<f32>,
    pub max_prediction: Option<f32>,
    pub pairs: Vec<String>,
    pub triples: Vec<String>,
    pub random_weights: bool,
    pub seed: Option<u64>,
    pub active: bool,
    pub distributed: Option<DistributedSpec>,
}

impl Default for GdConfig {
    fn default() -> Self {
        Self {
            num_bits: DEFAULT_NUM_BITS,
            learning_rate: None,
            power_t: 0.5,
            initial_t: None,
            decay_learning_rate: 1.,
            l1_lambda: 0.,
            l2_lambda: 0.,
            update_rule: None,
            feature_mask: None,
            initial_constant: None,
            loss: LossSpec::default(),
            passes: 1,
            holdout: HoldoutSpec::default(),
            training: true,
            save_resume: false,
            save_per_pass: false,
            initial_regressor: None,
            final_regressor: None,
            readable_model: None,
            invert_hash: None,
            audit: false,
            fast_inv_sqrt: false,
            min_prediction: None,
            max_prediction: None,
            pairs: Vec::new(),
            triples: Vec::new(),
            random_weights: false,
            seed: None,
            active: false,
            distributed: None,
        }
    }
}

impl GdConfig {
    /// Parses and validates a JSON configuration.
    ///
    /// # Arguments
    /// * `json` - The configuration document.
    ///
    /// # Returns
    /// The parsed configuration or an error if it is malformed or inconsistent.
    pub fn from_json(json: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(json)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reads, parses and validates a JSON configuration file.
    ///
    /// # Arguments
    /// * `path` - Location of the configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Whether the holdout set is disabled for this run. Holdout evaluation only
    /// makes sense with more than one pass over the data.
    pub fn holdout_set_off(&self) -> bool {
        self.holdout.off || self.passes <= 1
    }

    /// Checks the invariants the engine relies on.
    pub fn validate(&self) -> Result<()> {
        if self.num_bits == 0 || self.num_bits > MAX_NUM_BITS {
            return invalid(format!(
                "num_bits must be in 1..={MAX_NUM_BITS}, got {}",
                self.num_bits
            ));
        }

        if self.power_t < 0. {
            return invalid(format!("power_t must be non negative, got {}", self.power_t));
        }

        if self.decay_learning_rate <= 0. {
            return invalid(format!(
                "decay_learning_rate must be positive, got {}",
                self.decay_learning_rate
            ));
        }

        if self.l1_lambda < 0. || self.l2_lambda < 0. {
            return invalid("regularization strengths must be non negative".to_string());
        }

        if let LossSpec::Quantile { tau } = self.loss
            && !(0. ..=1.).contains(&tau)
        {
            return invalid(format!("quantile tau must be in [0, 1], got {tau}"));
        }

        if self.holdout.period == 0 {
            return invalid("holdout period must be positive".to_string());
        }

        if let (Some(min), Some(max)) = (self.min_prediction, self.max_prediction)
            && min > max
        {
            return invalid(format!(
                "min_prediction {min} is above max_prediction {max}"
            ));
        }

        if let Some(pair) = self.pairs.iter().find(|p| p.len() != 2) {
            return invalid(format!("pair `{pair}` must name exactly two namespaces"));
        }

        if let Some(triple) = self.triples.iter().find(|t| t.len() != 3) {
            return invalid(format!("triple `{triple}` must name exactly three namespaces"));
        }

        if let Some(dist) = &self.distributed
            && (dist.total == 0 || dist.node >= dist.total)
        {
            return invalid(format!(
                "distributed node {} is outside of a group of {}",
                dist.node, dist.total
            ));
        }

        Ok(())
    }
}

fn invalid<T>(detail: String) -> Result<T> {
    Err(GdErr::InvalidConfig(detail))
}
