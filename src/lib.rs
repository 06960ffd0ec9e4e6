pub mod audit;
pub mod config;
pub mod context;
pub mod data;
mod error;
pub mod example;
pub mod initialization;
pub mod learner;
pub mod loss;
pub mod optimization;
pub mod persistence;
pub mod storage;
pub mod synchronization;
mod testing;
pub mod training;

pub use config::GdConfig;
pub use context::TrainingContext;
pub use error::{GdErr, Result};
pub use example::Example;
pub use learner::Learner;
