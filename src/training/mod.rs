mod builder;
mod driver;
mod lifecycle;

pub use builder::{GdBuilder, RuleSetup, resolve_update_rule};
pub use driver::{Driver, account_example, setup_example};
pub use lifecycle::{PassController, finalize_regressor, save_predictor};
