#![cfg(test)]

use crate::{
    GdConfig, context::TrainingContext, example::Example, learner::Learner, training::GdBuilder,
};

/// Builds a learner and its context from a JSON configuration.
pub fn learner(json: &str) -> (Box<dyn Learner>, TrainingContext) {
    let cfg = GdConfig::from_json(json).unwrap();
    GdBuilder::new().build(cfg).unwrap()
}

pub fn context(json: &str) -> TrainingContext {
    learner(json).1
}

/// An example with the given `(value, index)` features in namespace `a` and no
/// bias feature.
pub fn example(label: Option<f32>, features: &[(f32, u32)]) -> Example {
    let mut ec = Example::new(label);
    for &(x, index) in features {
        ec.push_feature(b'a', x, index);
    }
    ec
}
