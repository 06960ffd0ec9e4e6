mod gd;
mod predict;
mod rate_decay;
mod regularization;

pub use gd::Gd;
pub use predict::{finalize_prediction, inline_predict, trunc_predict};
pub use rate_decay::{PowerData, compute_rate_decay, fast_inv_sqrt};
pub use regularization::{sync_weights, trunc_weight};
