mod shared;
mod weights;

pub use shared::SharedData;
pub use weights::{SlotLayout, WeightStore};
