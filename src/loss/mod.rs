mod hinge;
mod logistic;
mod loss_fn;
mod quantile;
mod squared;

pub use hinge::HingeLoss;
pub use logistic::LogisticLoss;
pub use loss_fn::Loss;
pub use quantile::QuantileLoss;
pub use squared::SquaredLoss;

use crate::config::LossSpec;

/// Builds the loss function a `LossSpec` names.
///
/// # Arguments
/// * `spec` - The loss specification.
pub fn from_spec(spec: LossSpec) -> Box<dyn Loss> {
    match spec {
        LossSpec::Squared => Box::new(SquaredLoss::new()),
        LossSpec::Logistic => Box::new(LogisticLoss::new()),
        LossSpec::Hinge => Box::new(HingeLoss::new()),
        LossSpec::Quantile { tau } => Box::new(QuantileLoss::new(tau)),
    }
}
